//! PCM wire codec.
//!
//! Outbound: float samples → 16-bit little-endian PCM → base64, tagged with
//! a mime descriptor carrying the sample rate. Inbound: the reverse, with
//! channel deinterleaving into a playback buffer.

use crate::defaults;
use crate::error::{Result, VoxlinkError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// One outbound audio frame in transport framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Base64-encoded 16-bit little-endian PCM.
    pub data: String,
    /// Mime descriptor, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

/// A decoded, playback-ready audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Per-channel sample data, each channel the same length.
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Buffer duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Encode one captured frame of float samples for transport.
///
/// Samples are linearly scaled by 32768 and clamped to the i16 range, so
/// values outside −1.0..1.0 saturate instead of wrapping.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> EncodedFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }

    EncodedFrame {
        data: BASE64.encode(&bytes),
        mime_type: defaults::pcm_mime(sample_rate),
    }
}

/// Decode one inbound base64 PCM payload into a playback buffer.
///
/// The byte count must be even (16-bit samples) and divide evenly across
/// the channel count. Interleaved input is split per channel.
pub fn decode_frame(data: &str, sample_rate: u32, num_channels: usize) -> Result<PcmBuffer> {
    if num_channels == 0 {
        return Err(VoxlinkError::Decode {
            message: "channel count must be non-zero".to_string(),
        });
    }

    let bytes = BASE64.decode(data).map_err(|e| VoxlinkError::Decode {
        message: format!("invalid base64: {}", e),
    })?;

    if bytes.len() % 2 != 0 {
        return Err(VoxlinkError::Decode {
            message: format!("odd byte length {} for 16-bit PCM", bytes.len()),
        });
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    if samples.len() % num_channels != 0 {
        return Err(VoxlinkError::Decode {
            message: format!(
                "{} samples do not divide across {} channels",
                samples.len(),
                num_channels
            ),
        });
    }

    let frame_count = samples.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(frame_count); num_channels];
    for (i, &sample) in samples.iter().enumerate() {
        channels[i % num_channels].push(sample as f32 / 32768.0);
    }

    Ok(PcmBuffer {
        channels,
        sample_rate,
    })
}
