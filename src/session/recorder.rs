//! Optional WAV tap for assistant audio.

use crate::audio::codec::PcmBuffer;
use crate::error::{Result, VoxlinkError};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Writes assistant audio to a mono 16-bit WAV file as it is scheduled.
pub struct WavTap {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavTap {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| VoxlinkError::Io(
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        ))?;
        Ok(Self { writer })
    }

    /// Appends a buffer, averaging channels down to mono.
    pub fn write(&mut self, buffer: &PcmBuffer) -> Result<()> {
        let frames = buffer.frames();
        let channels = buffer.channels.len();
        if channels == 0 {
            return Ok(());
        }
        for i in 0..frames {
            let mut acc = 0.0f32;
            for ch in &buffer.channels {
                acc += ch[i];
            }
            let sample = (acc / channels as f32).clamp(-1.0, 1.0);
            let value = (sample * 32767.0) as i16;
            self.writer.write_sample(value).map_err(write_error)?;
        }
        Ok(())
    }

    /// Finishes the file, patching up the WAV header.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize().map_err(write_error)
    }
}

fn write_error(e: hound::Error) -> VoxlinkError {
    VoxlinkError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        e.to_string(),
    ))
}
