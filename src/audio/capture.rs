//! Microphone capture seam.
//!
//! `CaptureSource` abstracts the platform microphone so the session can be
//! driven by a mock in tests. `CapturePump` turns the polled source into an
//! ordered stream of frames on a channel.

use crate::defaults;
use crate::error::{Result, VoxlinkError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// Trait for microphone capture devices.
///
/// `start` acquires the device (this is where a permission prompt or device
/// grab can fail); `read_frame` returns captured float samples in temporal
/// order. Implementations must tolerate `stop` on a never-started source.
pub trait CaptureSource: Send {
    /// Acquire the device and begin capturing.
    fn start(&mut self) -> Result<()>;

    /// Release the device. Must be safe to call repeatedly.
    fn stop(&mut self) -> Result<()>;

    /// Read all samples captured since the last call.
    ///
    /// Returns an empty vector when no new audio is available yet.
    fn read_samples(&mut self) -> Result<Vec<f32>>;
}

/// One outbound capture frame, numbered in capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    pub sequence: u64,
    pub samples: Vec<f32>,
}

/// Configuration for the capture pump.
#[derive(Debug, Clone)]
pub struct CapturePumpConfig {
    /// Samples per emitted frame.
    pub frame_samples: usize,
    /// Channel buffer size (number of frames).
    pub channel_buffer_size: usize,
    /// Polling interval when no samples are available (ms).
    pub poll_interval_ms: u64,
}

impl Default for CapturePumpConfig {
    fn default() -> Self {
        Self {
            frame_samples: defaults::CAPTURE_FRAME_SAMPLES,
            channel_buffer_size: 64,
            poll_interval_ms: 10,
        }
    }
}

/// Pump that polls a capture source on a background thread and emits
/// fixed-size, sequence-numbered frames.
///
/// Frames are emitted strictly in capture order; a trailing partial frame is
/// flushed when the pump stops.
pub struct CapturePump {
    source: Box<dyn CaptureSource>,
    config: CapturePumpConfig,
    sequence: AtomicU64,
    running: Arc<AtomicBool>,
}

impl CapturePump {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self::with_config(source, CapturePumpConfig::default())
    }

    pub fn with_config(source: Box<dyn CaptureSource>, config: CapturePumpConfig) -> Self {
        Self {
            source,
            config,
            sequence: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the source and the pump thread.
    ///
    /// Returns a frame receiver and a stop handle. The thread exits when the
    /// handle is stopped or the receiver is dropped, releasing the source.
    pub fn start(mut self) -> Result<(mpsc::Receiver<CaptureFrame>, CapturePumpHandle)> {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let running = self.running.clone();

        self.source.start()?;
        running.store(true, Ordering::SeqCst);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let frame_samples = self.config.frame_samples.max(1);

        thread::spawn(move || {
            let mut pending: Vec<f32> = Vec::with_capacity(frame_samples * 2);

            while running.load(Ordering::SeqCst) {
                match self.source.read_samples() {
                    Ok(samples) if !samples.is_empty() => {
                        pending.extend_from_slice(&samples);
                        let mut dropped = false;
                        while pending.len() >= frame_samples {
                            let frame_data: Vec<f32> = pending.drain(..frame_samples).collect();
                            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                            let frame = CaptureFrame {
                                sequence: seq,
                                samples: frame_data,
                            };
                            if tx.blocking_send(frame).is_err() {
                                dropped = true;
                                break;
                            }
                        }
                        if dropped {
                            break;
                        }
                    }
                    Ok(_) => {
                        thread::sleep(poll_interval);
                    }
                    Err(e) => {
                        log::error!("capture read failed: {}", e);
                        break;
                    }
                }
            }

            // Flush the partial tail so the final utterance isn't clipped
            if !pending.is_empty() {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                tx.blocking_send(CaptureFrame {
                    sequence: seq,
                    samples: pending,
                })
                .ok();
            }

            if let Err(e) = self.source.stop() {
                log::warn!("capture stop failed: {}", e);
            }
        });

        let handle = CapturePumpHandle {
            running: self.running.clone(),
        };

        Ok((rx, handle))
    }
}

/// Handle to stop a running capture pump.
#[derive(Clone)]
pub struct CapturePumpHandle {
    running: Arc<AtomicBool>,
}

impl CapturePumpHandle {
    /// Stops the pump thread, which releases the underlying source.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true if the pump is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Mock capture source for testing
#[derive(Debug, Clone)]
pub struct MockCaptureSource {
    is_started: bool,
    samples: Vec<f32>,
    deny_permission: bool,
    should_fail_read: bool,
}

impl MockCaptureSource {
    pub fn new() -> Self {
        Self {
            is_started: false,
            samples: vec![0.0; 256],
            deny_permission: false,
            should_fail_read: false,
        }
    }

    /// Sets the samples returned by each `read_samples` call.
    pub fn with_samples(mut self, samples: Vec<f32>) -> Self {
        self.samples = samples;
        self
    }

    /// Makes `start` fail as if the user denied microphone access.
    pub fn with_permission_denied(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    /// Makes `read_samples` fail after a successful start.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.deny_permission {
            return Err(VoxlinkError::CaptureDenied {
                message: "mock permission denied".to_string(),
            });
        }
        self.is_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if !self.is_started {
            return Ok(Vec::new());
        }
        if self.should_fail_read {
            return Err(VoxlinkError::Capture {
                message: "mock read failure".to_string(),
            });
        }
        Ok(self.samples.clone())
    }
}
