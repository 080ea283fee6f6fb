//! Default configuration constants for voxlink.
//!
//! Shared across the capture, playback and transport layers so the wire
//! format and the audio contexts always agree.

/// Capture sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and is what the remote
/// service expects on the uplink.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Playback sample rate in Hz.
///
/// Matches the remote service's fixed PCM output rate. Inbound chunks are
/// decoded at this rate regardless of the capture rate.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Channel count of inbound audio. The service sends mono PCM.
pub const OUTPUT_CHANNELS: usize = 1;

/// Samples per outbound capture frame.
///
/// 4096 samples at 16kHz is 256ms per frame, a good balance between
/// transport overhead and conversational latency.
pub const CAPTURE_FRAME_SAMPLES: usize = 4_096;

/// Default realtime model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice. "Charon" is the deeper, more authoritative voice.
pub const DEFAULT_VOICE: &str = "Charon";

/// Live API WebSocket endpoint (API key appended as a query parameter).
pub const LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Environment variable consulted for the API credential.
pub const API_KEY_ENV: &str = "VOXLINK_API_KEY";

/// Mime descriptor for raw PCM at the given sample rate.
///
/// The transport tags every outbound frame with this so the remote side
/// knows how to interpret the payload.
pub fn pcm_mime(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_mime_includes_rate() {
        assert_eq!(pcm_mime(INPUT_SAMPLE_RATE), "audio/pcm;rate=16000");
        assert_eq!(pcm_mime(OUTPUT_SAMPLE_RATE), "audio/pcm;rate=24000");
    }

    #[test]
    fn capture_frame_duration_is_sub_second() {
        let secs = CAPTURE_FRAME_SAMPLES as f64 / INPUT_SAMPLE_RATE as f64;
        assert!(secs < 1.0, "capture frames should stay well under 1s");
    }
}
