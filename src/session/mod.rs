//! Voice uplink session.
//!
//! Owns the conversation state machine and wires capture, transport, and
//! playback together. All state transitions funnel through [`Session::handle`]
//! so the lifecycle is testable without any real device or network:
//!
//! ```text
//! Idle -> Connecting -> Listening <-> Speaking
//!   ^                       |            |
//!   +------- teardown ------+------------+
//! ```
//!
//! Capture runs from the moment the session starts (the device grant happens
//! before the network handshake), but frames are only forwarded once the
//! remote side has acknowledged the setup.

use crate::audio::capture::{
    CaptureFrame, CaptureSource, CapturePump, CapturePumpConfig, CapturePumpHandle,
};
use crate::audio::codec::{decode_frame, encode_frame, EncodedFrame, PcmBuffer};
use crate::audio::playback::{PlaybackScheduler, SourceId};
use crate::defaults;
use crate::error::{Result, VoxlinkError};
use crate::persona::Persona;
use crate::transport::{RealtimeTransport, TransportEvent};
use std::path::Path;
use tokio::sync::{mpsc, watch};

mod recorder;

pub use recorder::WavTap;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session active.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Connected, forwarding microphone audio.
    Listening,
    /// Assistant audio is playing; microphone still forwards.
    Speaking,
}

impl SessionStatus {
    /// Human-readable status line for the UI.
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Standby",
            SessionStatus::Connecting => "Uplink...",
            SessionStatus::Listening => "Listening",
            SessionStatus::Speaking => "Transmitting",
        }
    }
}

/// Snapshot published to observers on every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: SessionStatus,
    pub error: Option<String>,
}

/// Events driving the session state machine.
///
/// The run loop translates transport events and playback completions into
/// these; tests can feed them directly.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Remote acknowledged the handshake.
    Opened,
    /// Base64 PCM chunk from the assistant.
    Audio(String),
    /// The assistant was interrupted; queued audio is stale.
    Interrupted,
    /// A scheduled playback source finished.
    PlaybackEnded(SourceId),
    /// The connection closed.
    Closed { reason: String },
    /// Transport-level failure.
    TransportError(String),
}

/// Audio parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: usize,
    pub frame_samples: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            input_sample_rate: defaults::INPUT_SAMPLE_RATE,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            output_channels: defaults::OUTPUT_CHANNELS,
            frame_samples: defaults::CAPTURE_FRAME_SAMPLES,
        }
    }
}

pub struct Session {
    transport: Box<dyn RealtimeTransport>,
    capture: Option<Box<dyn CaptureSource>>,
    scheduler: PlaybackScheduler,
    persona: Persona,
    settings: SessionSettings,
    status: SessionStatus,
    last_error: Option<String>,
    status_tx: watch::Sender<StatusReport>,
    recorder: Option<WavTap>,

    // Wiring populated by start() and torn down by stop()
    outbound: Option<mpsc::Sender<EncodedFrame>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    capture_rx: Option<mpsc::Receiver<CaptureFrame>>,
    capture_handle: Option<CapturePumpHandle>,
}

impl Session {
    pub fn new(
        transport: Box<dyn RealtimeTransport>,
        capture: Box<dyn CaptureSource>,
        scheduler: PlaybackScheduler,
        persona: Persona,
        settings: SessionSettings,
    ) -> Self {
        let (status_tx, _) = watch::channel(StatusReport {
            status: SessionStatus::Idle,
            error: None,
        });
        Self {
            transport,
            capture: Some(capture),
            scheduler,
            persona,
            settings,
            status: SessionStatus::Idle,
            last_error: None,
            status_tx,
            recorder: None,
            outbound: None,
            events: None,
            capture_rx: None,
            capture_handle: None,
        }
    }

    /// Tap assistant audio into a WAV file for later review.
    pub fn record_to(&mut self, path: &Path) -> Result<()> {
        self.recorder = Some(WavTap::create(path, self.settings.output_sample_rate)?);
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx
            .send(StatusReport {
                status: self.status,
                error: self.last_error.clone(),
            })
            .ok();
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            log::debug!("session: {} -> {}", self.status.label(), status.label());
            self.status = status;
        }
        self.publish();
    }

    fn fail(&mut self, error: &VoxlinkError) {
        log::error!("session error: {}", error);
        self.last_error = Some(error.status_line());
        self.publish();
    }

    /// Begin a session: acquire the microphone, then connect the transport.
    ///
    /// The microphone grant happens first so a denied device never results in
    /// a half-open connection. The session stays in `Connecting` until the
    /// remote acknowledges the handshake ([`SessionEvent::Opened`]).
    ///
    /// A session drives one uplink; construct a new one to reconnect.
    ///
    /// # Errors
    ///
    /// Returns the capture or handshake error; the session is back in `Idle`
    /// with `last_error` set when this returns `Err`.
    pub async fn start(&mut self) -> Result<()> {
        if self.status != SessionStatus::Idle {
            log::warn!("start ignored: session already {}", self.status.label());
            return Ok(());
        }

        let source = self.capture.take().ok_or_else(|| VoxlinkError::Capture {
            message: "capture source already consumed".to_string(),
        })?;

        self.last_error = None;
        self.set_status(SessionStatus::Connecting);

        let pump = CapturePump::with_config(
            source,
            CapturePumpConfig {
                frame_samples: self.settings.frame_samples,
                ..CapturePumpConfig::default()
            },
        );
        let (capture_rx, capture_handle) = match pump.start() {
            Ok(pair) => pair,
            Err(e) => {
                self.fail(&e);
                self.set_status(SessionStatus::Idle);
                return Err(e);
            }
        };

        let connection = match self.transport.connect(&self.persona).await {
            Ok(c) => c,
            Err(e) => {
                capture_handle.stop();
                self.fail(&e);
                self.set_status(SessionStatus::Idle);
                return Err(e);
            }
        };

        self.capture_rx = Some(capture_rx);
        self.capture_handle = Some(capture_handle);
        self.outbound = Some(connection.outbound);
        self.events = Some(connection.events);
        Ok(())
    }

    /// Applies one event to the state machine.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened => {
                if self.status == SessionStatus::Connecting {
                    self.set_status(SessionStatus::Listening);
                }
            }
            SessionEvent::Audio(data) => {
                if !self.is_active() {
                    return;
                }
                match decode_frame(
                    &data,
                    self.settings.output_sample_rate,
                    self.settings.output_channels,
                ) {
                    Ok(buffer) => self.enqueue_playback(buffer),
                    Err(e) => {
                        // Skip the chunk; the stream stays usable
                        log::warn!("dropping undecodable audio chunk: {}", e);
                    }
                }
            }
            SessionEvent::Interrupted => {
                if self.is_active() {
                    self.scheduler.cancel_all();
                    self.set_status(SessionStatus::Listening);
                }
            }
            SessionEvent::PlaybackEnded(id) => {
                if self.scheduler.on_ended(id) && self.status == SessionStatus::Speaking {
                    self.set_status(SessionStatus::Listening);
                }
            }
            SessionEvent::Closed { reason } => {
                if self.status == SessionStatus::Connecting {
                    self.fail(&VoxlinkError::Handshake { message: reason });
                } else if self.status != SessionStatus::Idle {
                    self.fail(&VoxlinkError::Transport { message: reason });
                }
                self.stop();
            }
            SessionEvent::TransportError(message) => {
                if self.status != SessionStatus::Idle {
                    self.fail(&VoxlinkError::Transport { message });
                }
                self.stop();
            }
        }
    }

    fn enqueue_playback(&mut self, buffer: PcmBuffer) {
        if let Some(tap) = &mut self.recorder {
            if let Err(e) = tap.write(&buffer) {
                log::warn!("recording tap failed, disabling: {}", e);
                self.recorder = None;
            }
        }
        match self.scheduler.schedule(buffer) {
            Ok(_) => self.set_status(SessionStatus::Speaking),
            Err(e) => log::warn!("playback scheduling failed: {}", e),
        }
    }

    fn is_active(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Listening | SessionStatus::Speaking
        )
    }

    /// Tears the session down. Safe to call repeatedly and on a session that
    /// never started.
    pub fn stop(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            handle.stop();
        }
        self.capture_rx = None;
        // Dropping the sender closes the outbound half of the connection
        self.outbound = None;
        self.events = None;
        self.scheduler.cancel_all();
        if let Some(tap) = self.recorder.take() {
            if let Err(e) = tap.finalize() {
                log::warn!("recording finalize failed: {}", e);
            }
        }
        if self.status != SessionStatus::Idle {
            self.set_status(SessionStatus::Idle);
        }
    }

    /// Drives the session until teardown.
    ///
    /// `ended_rx` carries playback-completion notices from the output sink;
    /// `shutdown_rx` requests an orderly stop (e.g. on ctrl-c).
    pub async fn run(
        &mut self,
        ended_rx: &mut mpsc::UnboundedReceiver<SourceId>,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) {
        let mut events = match self.events.take() {
            Some(events) => events,
            None => return,
        };
        let mut capture_rx = self.capture_rx.take();

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransportEvent::Opened) => self.handle(SessionEvent::Opened),
                        Some(TransportEvent::Message(msg)) => {
                            if msg.interrupted {
                                self.handle(SessionEvent::Interrupted);
                            }
                            if let Some(audio) = msg.audio {
                                self.handle(SessionEvent::Audio(audio));
                            }
                        }
                        Some(TransportEvent::Closed { reason }) => {
                            self.handle(SessionEvent::Closed { reason });
                        }
                        Some(TransportEvent::Error(message)) => {
                            self.handle(SessionEvent::TransportError(message));
                        }
                        None => {
                            self.handle(SessionEvent::Closed {
                                reason: "transport channel closed".to_string(),
                            });
                        }
                    }
                }
                frame = recv_frame(&mut capture_rx) => {
                    match frame {
                        Some(frame) => self.forward_frame(frame).await,
                        None => capture_rx = None,
                    }
                }
                Some(id) = ended_rx.recv() => {
                    self.handle(SessionEvent::PlaybackEnded(id));
                }
                _ = shutdown_rx.recv() => {
                    log::info!("shutdown requested");
                    self.stop();
                }
            }

            if self.status == SessionStatus::Idle {
                break;
            }
        }

        self.stop();
    }

    async fn forward_frame(&mut self, frame: CaptureFrame) {
        // Frames captured before the remote ack are dropped, not queued
        if !self.is_active() {
            return;
        }
        let encoded = encode_frame(&frame.samples, self.settings.input_sample_rate);
        if let Some(tx) = &self.outbound {
            if tx.send(encoded).await.is_err() {
                log::warn!("outbound channel closed, dropping capture frame");
                self.outbound = None;
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn recv_frame(rx: &mut Option<mpsc::Receiver<CaptureFrame>>) -> Option<CaptureFrame> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
