use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub audio: AudioConfig,
    pub subject: SubjectConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// API credential. Usually left unset here and supplied via
    /// the VOXLINK_API_KEY environment variable instead.
    pub key: Option<String>,
    pub model: String,
    pub voice: String,
}

/// Audio capture/playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_samples: usize,
}

/// Facts about the subject the assistant represents.
///
/// Rendered into the persona's system instruction on session start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubjectConfig {
    pub name: String,
    pub alias: String,
    pub experience: String,
    pub specialty: String,
    pub software: Vec<String>,
    pub key_trait: String,
    pub clients: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            model: defaults::DEFAULT_MODEL.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            input_sample_rate: defaults::INPUT_SAMPLE_RATE,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            frame_samples: defaults::CAPTURE_FRAME_SAMPLES,
        }
    }
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            name: "Gagan Kashyap".to_string(),
            alias: "Ezio".to_string(),
            experience: "4+ Years".to_string(),
            specialty: "Motion Design & Documentary Editing".to_string(),
            software: vec![
                "Adobe After Effects".to_string(),
                "Premiere Pro".to_string(),
            ],
            key_trait: "Revenue-Focused (generates ROI/Views for clients)".to_string(),
            clients: vec![
                "Gagiegram".to_string(),
                "Iamlucid".to_string(),
                "Whaletrading".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Invalid TOML is reported and falls back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    log::warn!("ignoring invalid config at {}: {}", path.display(), e);
                    Self::default()
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXLINK_API_KEY → api.key
    /// - VOXLINK_MODEL → api.model
    /// - VOXLINK_VOICE → api.voice
    /// - VOXLINK_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(defaults::API_KEY_ENV) {
            if !key.is_empty() {
                self.api.key = Some(key);
            }
        }

        if let Ok(model) = std::env::var("VOXLINK_MODEL") {
            if !model.is_empty() {
                self.api.model = model;
            }
        }

        if let Ok(voice) = std::env::var("VOXLINK_VOICE") {
            if !voice.is_empty() {
                self.api.voice = voice;
            }
        }

        if let Ok(device) = std::env::var("VOXLINK_AUDIO_DEVICE") {
            if !device.is_empty() {
                self.audio.device = Some(device);
            }
        }

        self
    }

    /// Serialize the configuration to a TOML string (for `config init`).
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Default configuration file path (~/.config/voxlink/config.toml).
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxlink")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.model, defaults::DEFAULT_MODEL);
        assert_eq!(config.api.voice, "Charon");
        assert!(config.api.key.is_none());
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.subject.alias, "Ezio");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nvoice = \"Kore\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.api.voice, "Kore");
        // Untouched sections keep their defaults
        assert_eq!(config.api.model, defaults::DEFAULT_MODEL);
        assert_eq!(config.audio.frame_samples, defaults::CAPTURE_FRAME_SAMPLES);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = Config::load(Path::new("/nonexistent/voxlink.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/voxlink.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml at all [[[").unwrap();

        let config = Config::load_or_default(file.path());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_subject_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[subject]\nname = \"A. Nonymous\"\nalias = \"Altair\"\nclients = [\"Acme\"]"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.subject.alias, "Altair");
        assert_eq!(config.subject.clients, vec!["Acme".to_string()]);
    }

    #[test]
    fn test_to_toml_round_trip() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
