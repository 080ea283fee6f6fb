//! Assistant persona: voice selection plus the system instruction the
//! transport opens the session with.

use crate::config::{Config, SubjectConfig};

/// Persona carried in the transport handshake.
///
/// The response modality is always audio; the only knobs are the prebuilt
/// voice and the instruction text built from the subject's facts.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub voice: String,
    pub subject: SubjectConfig,
}

impl Persona {
    pub fn new(voice: impl Into<String>, subject: SubjectConfig) -> Self {
        Self {
            voice: voice.into(),
            subject,
        }
    }

    /// Build a persona from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api.voice.clone(), config.subject.clone())
    }

    /// Render the free-text system instruction.
    ///
    /// Identity and tone are fixed; the subject block is filled from config
    /// so the same binary can represent a different portfolio.
    pub fn system_instruction(&self) -> String {
        let s = &self.subject;
        let software = s.software.join(", ");
        let clients = s
            .clients
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "SYSTEM IDENTITY:\n\
             You are \"Animus\", the advanced interface for the portfolio of a Video Editor.\n\
             - TONE: High-tech, professional, slightly robotic.\n\
             - PHRASES: Use \"Synchronizing,\" \"Data Retrieved,\" \"Memory Sequence.\"\n\
             - CONSTRAINT: Keep answers short (under 3 sentences).\n\
             \n\
             SUBJECT DATA (THE USER):\n\
             - REAL NAME: {name}\n\
             - ALIAS: \"{alias}\" (Refer to him as {alias}).\n\
             - EXPERIENCE: {experience}.\n\
             - SPECIALTY: {specialty}.\n\
             - SOFTWARE: {software}.\n\
             - KEY TRAIT: {key_trait}.\n\
             \n\
             ALLIANCES (CLIENT LIST):\n\
             {clients}\n\
             - (And various other high-profile entities).\n\
             \n\
             INSTRUCTIONS:\n\
             - If asked \"Who is this?\", reply with his alias and experience level.\n\
             - If asked about \"Style\", mention his proficiency in motion design and pacing.\n\
             - If asked \"Why hire him?\", emphasize that he doesn't just edit; he creates revenue-generating content.\n",
            name = s.name,
            alias = s.alias,
            experience = s.experience,
            specialty = s.specialty,
            software = software,
            key_trait = s.key_trait,
            clients = clients,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_instruction_contains_subject_facts() {
        let persona = Persona::new("Charon", SubjectConfig::default());
        let text = persona.system_instruction();

        assert!(text.contains("Gagan Kashyap"));
        assert!(text.contains("\"Ezio\""));
        assert!(text.contains("Adobe After Effects, Premiere Pro"));
        assert!(text.contains("- Whaletrading"));
    }

    #[test]
    fn system_instruction_reflects_custom_subject() {
        let subject = SubjectConfig {
            name: "A. Nonymous".to_string(),
            alias: "Altair".to_string(),
            clients: vec!["Acme".to_string()],
            ..SubjectConfig::default()
        };
        let persona = Persona::new("Kore", subject);
        let text = persona.system_instruction();

        assert!(text.contains("A. Nonymous"));
        assert!(text.contains("Refer to him as Altair"));
        assert!(text.contains("- Acme"));
        assert!(!text.contains("Gagan"));
    }

    #[test]
    fn from_config_picks_up_voice() {
        let mut config = Config::default();
        config.api.voice = "Puck".to_string();
        let persona = Persona::from_config(&config);
        assert_eq!(persona.voice, "Puck");
    }
}
