//! Audio plumbing for the uplink session.
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐         ┌───────────┐
//! │ Capture  │──▶│ CapturePump │──▶│  codec    │── wire ─▶│ Transport │
//! │ (16kHz)  │   │ (frames)    │   │ (encode)  │          └─────┬─────┘
//! └──────────┘   └─────────────┘   └───────────┘                │
//!                                                               ▼
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐          inbound PCM
//! │ Playback │◀──│  Scheduler  │◀──│  codec    │◀──────── (24kHz b64)
//! │  sink    │   │ (gapless)   │   │ (decode)  │
//! └──────────┘   └─────────────┘   └───────────┘
//! ```

pub mod capture;
pub mod codec;
#[cfg(feature = "cpal-audio")]
pub mod cpal_io;
pub mod playback;

pub use capture::{CaptureFrame, CapturePump, CapturePumpHandle, CaptureSource, MockCaptureSource};
pub use codec::{decode_frame, encode_frame, EncodedFrame, PcmBuffer};
#[cfg(feature = "cpal-audio")]
pub use cpal_io::{list_devices, suppress_audio_warnings, CpalCaptureSource, CpalPlaybackSink};
pub use playback::{
    AudioClock, ManualClock, MockSink, PlaybackScheduler, PlaybackSink, SourceId, SystemClock,
};
