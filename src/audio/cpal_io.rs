//! Real audio I/O using CPAL (Cross-Platform Audio Library).
//!
//! Capture side: 16kHz mono float frames for the uplink. Playback side: a
//! pull-based sink consuming scheduled sources strictly in order, which is
//! what realizes gapless playback on actual hardware.

use crate::audio::capture::CaptureSource;
use crate::audio::codec::PcmBuffer;
use crate::audio::playback::{PlaybackSink, SourceId};
use crate::defaults;
use crate::error::{Result, VoxlinkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers when
/// probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Quiet the audio backends before the first CPAL probe.
///
/// # Safety
/// Modifies environment variables; call at startup before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never useful for a voice conversation.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List usable audio input devices, preferred ones marked "\[recommended\]".
///
/// # Errors
/// Returns `VoxlinkError::Capture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| VoxlinkError::Capture {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;

        let mut device_names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                if should_filter_device(&name) {
                    continue;
                }
                if is_preferred_device(&name) {
                    device_names.push(format!("{} [recommended]", name));
                } else {
                    device_names.push(name);
                }
            }
        }

        Ok(device_names)
    })
}

/// Best default input device: PipeWire, then Pulse, then system default.
fn best_default_input_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if is_preferred_device(&name) {
                        return Ok(device);
                    }
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| VoxlinkError::CaptureDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

fn input_device_by_name(name: &str) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| VoxlinkError::Capture {
            message: format!("Failed to enumerate devices: {}", e),
        })?;

        for device in devices {
            if let Ok(dev_name) = device.name() {
                if dev_name == name {
                    return Ok(device);
                }
            }
        }

        Err(VoxlinkError::CaptureDeviceNotFound {
            device: name.to_string(),
        })
    })
}

/// Map a stream-build failure onto the session's error taxonomy.
///
/// CPAL reports an OS-level access refusal as a device-not-available or
/// backend-specific error; surface those as a denied grant.
fn map_build_error(e: &cpal::BuildStreamError) -> VoxlinkError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => VoxlinkError::CaptureDenied {
            message: "device unavailable or in exclusive use".to_string(),
        },
        other => {
            let text = other.to_string();
            if text.to_lowercase().contains("denied") {
                VoxlinkError::CaptureDenied { message: text }
            } else {
                VoxlinkError::Capture {
                    message: format!("Failed to build input stream: {}", text),
                }
            }
        }
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from one thread at a time; stream
/// methods are called synchronously and never cross thread boundaries.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Mix multi-channel audio to mono by averaging channels.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear resampler, good enough for speech.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = *samples.get(idx + 1).unwrap_or(&a);
        out.push(a + (b - a) * frac);
    }

    out
}

/// Microphone capture at 16kHz mono f32.
///
/// Tries the preferred format first, then falls back to the device's native
/// config with software downmix and resampling. Some PipeWire-ALSA setups
/// accept non-native configs but never fire the data callback, hence the
/// callback-count probe in `start`.
pub struct CpalCaptureSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<f32>>>,
    callback_count: Arc<std::sync::atomic::AtomicU64>,
    sample_rate: u32,
}

impl CpalCaptureSource {
    /// Create a capture source for the named device, or the best default.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = match device_name {
            Some(name) => input_device_by_name(name)?,
            None => best_default_input_device()?,
        };

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            sample_rate: defaults::INPUT_SAMPLE_RATE,
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        use std::sync::atomic::Ordering;

        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            log::error!("audio input stream error: {}", err);
        };

        // f32/16kHz/mono — PipeWire/PulseAudio convert transparently
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // i16/16kHz/mono — for devices that only expose integer formats
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(|&s| s as f32 / 32768.0));
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Capture at the device's native config, converting in software.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;
        use std::sync::atomic::Ordering;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| VoxlinkError::Capture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        log::info!(
            "capturing at native format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            log::error!("audio input stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let mono = downmix(data, native_channels);
                        let converted = resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| map_build_error(&e)),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let mono = downmix(&floats, native_channels);
                        let converted = resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| map_build_error(&e)),
            fmt => Err(VoxlinkError::Capture {
                message: format!(
                    "Unsupported native sample format: {:?}. Try --device.",
                    fmt
                ),
            }),
        }
    }
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self) -> Result<()> {
        use std::sync::atomic::Ordering;

        if self.stream.is_some() {
            return Ok(()); // Already started
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| VoxlinkError::Capture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Probe whether the callback actually fires; some PipeWire-ALSA
        // setups accept non-native configs but never deliver data.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }

            let native_stream = self.build_stream_native()?;
            native_stream.play().map_err(|e| VoxlinkError::Capture {
                message: format!("Failed to start native audio stream: {}", e),
            })?;
            native_stream
        } else {
            stream
        };

        self.stream = Some(SendableStream(final_stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(sendable_stream) = self.stream.take() {
            sendable_stream.0.pause().map_err(|e| VoxlinkError::Capture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut buffer = self.buffer.lock().map_err(|e| VoxlinkError::Capture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;

        let samples = buffer.clone();
        buffer.clear();
        Ok(samples)
    }
}

struct QueuedSource {
    id: SourceId,
    samples: Vec<f32>,
    pos: usize,
}

struct SinkQueue {
    entries: VecDeque<QueuedSource>,
}

/// Playback sink on the default output device.
///
/// Scheduled sources are consumed strictly in schedule order from a shared
/// FIFO inside the output callback; a source's id is reported on the ended
/// channel once its last sample has been written to the device. `stop`
/// removes a source whether it is queued or currently draining.
pub struct CpalPlaybackSink {
    queue: Arc<Mutex<SinkQueue>>,
    _stream: SendableStream,
    device_rate: u32,
}

impl CpalPlaybackSink {
    /// Open the output stream. Completed source ids arrive on `ended_tx`.
    pub fn new(ended_tx: mpsc::UnboundedSender<SourceId>) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();
            host.default_output_device()
                .ok_or_else(|| VoxlinkError::CaptureDeviceNotFound {
                    device: "default output".to_string(),
                })
        })?;

        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(defaults::OUTPUT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::new(Mutex::new(SinkQueue {
            entries: VecDeque::new(),
        }));

        let err_callback = |err| {
            log::error!("audio output stream error: {}", err);
        };

        // Preferred: mono at the service output rate
        let cb_queue = Arc::clone(&queue);
        let cb_ended = ended_tx.clone();
        let built = device.build_output_stream(
            &preferred_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                fill_output(&cb_queue, &cb_ended, data, 1);
            },
            err_callback,
            None,
        );

        let (stream, device_rate) = match built {
            Ok(stream) => (stream, defaults::OUTPUT_SAMPLE_RATE),
            Err(_) => {
                // Fall back to the device's native config
                let default_config =
                    device
                        .default_output_config()
                        .map_err(|e| VoxlinkError::Playback {
                            message: format!("Failed to query output config: {}", e),
                        })?;
                let native_rate = default_config.sample_rate().0;
                let native_channels = default_config.channels() as usize;
                let stream_config: cpal::StreamConfig = default_config.into();

                let cb_queue = Arc::clone(&queue);
                let cb_ended = ended_tx.clone();
                let stream = device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            fill_output(&cb_queue, &cb_ended, data, native_channels);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| VoxlinkError::Playback {
                        message: format!("Failed to build output stream: {}", e),
                    })?;
                (stream, native_rate)
            }
        };

        stream.play().map_err(|e| VoxlinkError::Playback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        Ok(Self {
            queue,
            _stream: SendableStream(stream),
            device_rate,
        })
    }
}

/// Fill one output callback buffer from the FIFO, reporting drained sources.
fn fill_output(
    queue: &Arc<Mutex<SinkQueue>>,
    ended: &mpsc::UnboundedSender<SourceId>,
    data: &mut [f32],
    channels: usize,
) {
    let channels = channels.max(1);
    let mut guard = match queue.lock() {
        Ok(g) => g,
        Err(_) => {
            data.fill(0.0);
            return;
        }
    };

    for frame in data.chunks_mut(channels) {
        let sample = loop {
            let front_state = match guard.entries.front_mut() {
                Some(entry) if entry.pos < entry.samples.len() => {
                    let s = entry.samples[entry.pos];
                    entry.pos += 1;
                    Some(s)
                }
                Some(_) => None,
                None => break 0.0,
            };
            match front_state {
                Some(s) => break s,
                None => {
                    if let Some(done) = guard.entries.pop_front() {
                        ended.send(done.id).ok();
                    }
                }
            }
        };
        for out in frame.iter_mut() {
            *out = sample;
        }
    }

    // Report sources that finished exactly at the buffer boundary
    while guard
        .entries
        .front()
        .map(|e| e.pos >= e.samples.len())
        .unwrap_or(false)
    {
        if let Some(done) = guard.entries.pop_front() {
            ended.send(done.id).ok();
        }
    }
}

impl PlaybackSink for CpalPlaybackSink {
    fn begin(&mut self, id: SourceId, buffer: PcmBuffer, _start_at: f64) -> Result<()> {
        // FIFO consumption already plays sources back-to-back; the scheduled
        // start time is ordering metadata here.
        let frames = buffer.frames();
        let mut mono = Vec::with_capacity(frames);
        let channel_count = buffer.channels.len().max(1);
        for i in 0..frames {
            let sum: f32 = buffer.channels.iter().map(|c| c[i]).sum();
            mono.push(sum / channel_count as f32);
        }

        let samples = resample(&mono, buffer.sample_rate, self.device_rate);

        let mut guard = self.queue.lock().map_err(|_| VoxlinkError::Playback {
            message: "output queue poisoned".to_string(),
        })?;
        guard.entries.push_back(QueuedSource {
            id,
            samples,
            pos: 0,
        });
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut guard) = self.queue.lock() {
            guard.entries.retain(|entry| entry.id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_downmix_stereo_averages() {
        let mixed = downmix(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mixed, vec![0.5, 0.5]);
    }

    #[test]
    fn test_downmix_mono_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_resample_halves_length_when_downsampling() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let out = resample(&samples, 48_000, 24_000);
        assert_eq!(out.len(), 240);
        // Values stay within the input range
        assert!(out.iter().all(|&s| (0.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_resample_upsamples_monotone_signal() {
        let samples: Vec<f32> = (0..160).map(|i| i as f32).collect();
        let out = resample(&samples, 16_000, 24_000);
        assert!(out.len() > samples.len());
        for pair in out.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices_returns_at_least_one_device() {
        let devices = list_devices();
        assert!(devices.is_ok());
        assert!(!devices.unwrap().is_empty());
    }

    #[test]
    fn test_create_with_invalid_device_name() {
        let source = CpalCaptureSource::new(Some("NonExistentDevice12345"));
        assert!(source.is_err());
        match source {
            Err(VoxlinkError::CaptureDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            Err(VoxlinkError::Capture { .. }) => {
                // Enumeration itself can fail on headless CI
            }
            other => panic!("Expected a capture error, got {:?}", other.err()),
        }
    }
}
