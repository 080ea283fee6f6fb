//! Command-line interface for voxlink
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Realtime voice uplink to a generative audio service
#[derive(Parser, Debug)]
#[command(name = "voxlink", version, about = "Realtime voice uplink to a generative audio service")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: transitions, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Generative model override
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Prebuilt voice name for assistant speech
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// API key (overrides config and VOXLINK_API_KEY)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Record assistant audio to a WAV file
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// End the session after this long. Examples: 90s, 5m, 1h30m
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,
}

/// Parse a session timeout string.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (seconds), single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file if none exists
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["voxlink"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.device.is_none());
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::try_parse_from([
            "voxlink",
            "--device",
            "hw:1",
            "--voice",
            "Charon",
            "--model",
            "gemini-test",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.device.as_deref(), Some("hw:1"));
        assert_eq!(cli.voice.as_deref(), Some("Charon"));
        assert_eq!(cli.model.as_deref(), Some("gemini-test"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_devices_subcommand() {
        let cli = Cli::try_parse_from(["voxlink", "devices"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Devices)));
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["voxlink", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn test_timeout_bare_seconds() {
        assert_eq!(parse_timeout("90"), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn test_timeout_humantime() {
        assert_eq!(parse_timeout("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_timeout("45s"), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn test_timeout_rejects_garbage() {
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_verbosity_count() {
        let cli = Cli::try_parse_from(["voxlink", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
