//! voxlink - Realtime voice uplink to a generative audio service
//!
//! Streams microphone audio to a bidirectional generative-audio session and
//! plays the assistant's replies back without gaps. The session core is
//! device- and network-free; concrete audio devices and the WebSocket
//! transport plug in at the edges.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod persona;
pub mod session;
pub mod transport;

// Composition root - needs real devices, the live transport, and the CLI
#[cfg(all(feature = "cpal-audio", feature = "live", feature = "cli"))]
pub mod app;

// Core seams (capture → session → playback)
pub use audio::capture::{CaptureFrame, CaptureSource};
pub use audio::codec::{decode_frame, encode_frame, EncodedFrame, PcmBuffer};
pub use audio::playback::{AudioClock, PlaybackScheduler, PlaybackSink, SourceId};
pub use transport::{Connection, RealtimeTransport, ServerMessage, TransportEvent};

// Session
pub use session::{Session, SessionEvent, SessionSettings, SessionStatus, StatusReport};

// Error handling
pub use error::{Result, VoxlinkError};

// Config
pub use config::Config;
pub use persona::Persona;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
