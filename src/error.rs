//! Error types for voxlink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlinkError {
    // Configuration errors
    #[error("API credential missing (set api.key or VOXLINK_API_KEY)")]
    MissingCredential,

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capture errors
    #[error("Microphone access denied: {message}")]
    CaptureDenied { message: String },

    #[error("Audio device not found: {device}")]
    CaptureDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    Capture { message: String },

    // Transport errors
    #[error("Uplink handshake failed: {message}")]
    Handshake { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // Inbound audio errors (never terminal for the session)
    #[error("Audio decode failed: {message}")]
    Decode { message: String },

    // Playback errors
    #[error("Audio playback failed: {message}")]
    Playback { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxlinkError {
    /// Short status string shown next to the "Standby" indicator when a
    /// session ends in error.
    pub fn status_line(&self) -> String {
        match self {
            VoxlinkError::MissingCredential => "Credential Missing".to_string(),
            VoxlinkError::CaptureDenied { .. } | VoxlinkError::CaptureDeviceNotFound { .. } => {
                "Audio Uplink Failed".to_string()
            }
            VoxlinkError::Handshake { .. } => "Uplink Refused".to_string(),
            VoxlinkError::Transport { .. } => "Connection Severed".to_string(),
            other => other.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxlinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_missing_credential_display() {
        let error = VoxlinkError::MissingCredential;
        assert!(error.to_string().contains("VOXLINK_API_KEY"));
    }

    #[test]
    fn test_capture_denied_display() {
        let error = VoxlinkError::CaptureDenied {
            message: "permission prompt dismissed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Microphone access denied: permission prompt dismissed"
        );
    }

    #[test]
    fn test_capture_device_not_found_display() {
        let error = VoxlinkError::CaptureDeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_handshake_display() {
        let error = VoxlinkError::Handshake {
            message: "401 unauthorized".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Uplink handshake failed: 401 unauthorized"
        );
    }

    #[test]
    fn test_transport_display() {
        let error = VoxlinkError::Transport {
            message: "connection reset".to_string(),
        };
        assert_eq!(error.to_string(), "Transport error: connection reset");
    }

    #[test]
    fn test_decode_display() {
        let error = VoxlinkError::Decode {
            message: "odd byte length".to_string(),
        };
        assert_eq!(error.to_string(), "Audio decode failed: odd byte length");
    }

    #[test]
    fn test_status_line_is_short() {
        let error = VoxlinkError::Transport {
            message: "tls handshake eof while reading".to_string(),
        };
        assert_eq!(error.status_line(), "Connection Severed");

        let error = VoxlinkError::CaptureDenied {
            message: "denied".to_string(),
        };
        assert_eq!(error.status_line(), "Audio Uplink Failed");

        let error = VoxlinkError::MissingCredential;
        assert_eq!(error.status_line(), "Credential Missing");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoxlinkError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: VoxlinkError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoxlinkError>();
        assert_sync::<VoxlinkError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
