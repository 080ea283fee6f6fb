//! Realtime transport seam.
//!
//! The session talks to the remote generative-audio service exclusively
//! through [`RealtimeTransport`], so the concrete WebSocket client can be
//! swapped for a scripted mock in tests. A connected transport is a pair of
//! channels: outbound encoded frames in, inbound [`TransportEvent`]s out.

use crate::audio::codec::EncodedFrame;
use crate::error::{Result, VoxlinkError};
use crate::persona::Persona;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[cfg(feature = "live")]
pub mod live;

/// One message from the remote side.
///
/// A message may carry inbound audio, an interruption flag, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMessage {
    /// Base64 PCM payload at the service's fixed output rate.
    pub audio: Option<String>,
    /// The remote side detected the user interjecting over playback.
    pub interrupted: bool,
}

/// Inbound control and data events from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Session handshake completed; the uplink is live.
    Opened,
    Message(ServerMessage),
    Closed { reason: String },
    Error(String),
}

/// A connected transport session.
///
/// Dropping the connection tears the underlying channel down.
pub struct Connection {
    /// Outbound audio frames, transmitted in send order.
    pub outbound: mpsc::Sender<EncodedFrame>,
    /// Inbound events, delivered in arrival order.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Factory seam for opening realtime sessions.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a bidirectional session configured with the given persona.
    ///
    /// Resolves once the connection is established and the persona
    /// configuration has been submitted; the `Opened` event follows when
    /// the remote side acknowledges. Errors map to
    /// [`VoxlinkError::Handshake`].
    async fn connect(&self, persona: &Persona) -> Result<Connection>;
}

/// Scripted transport for tests.
///
/// `connect` hands out a pre-wired [`Connection`]; the paired
/// [`MockTransportHandle`] pushes events to the session and observes the
/// frames it sent.
pub struct MockTransport {
    connection: Mutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
    fail_handshake: bool,
}

/// Test-side handle for a [`MockTransport`].
pub struct MockTransportHandle {
    pub events: mpsc::Sender<TransportEvent>,
    pub sent: mpsc::Receiver<EncodedFrame>,
    connected: Arc<AtomicBool>,
}

impl MockTransportHandle {
    /// Whether `connect` was ever called on the paired transport.
    pub fn was_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl MockTransport {
    /// Transport whose single connection is driven by the returned handle.
    pub fn new() -> (Self, MockTransportHandle) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(false));

        let transport = Self {
            connection: Mutex::new(Some(Connection {
                outbound: frame_tx,
                events: event_rx,
            })),
            connected: connected.clone(),
            fail_handshake: false,
        };
        let handle = MockTransportHandle {
            events: event_tx,
            sent: frame_rx,
            connected,
        };
        (transport, handle)
    }

    /// Transport that refuses every handshake.
    pub fn failing() -> Self {
        Self {
            connection: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            fail_handshake: true,
        }
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn connect(&self, _persona: &Persona) -> Result<Connection> {
        self.connected.store(true, Ordering::SeqCst);
        if self.fail_handshake {
            return Err(VoxlinkError::Handshake {
                message: "mock handshake refused".to_string(),
            });
        }
        let conn = self
            .connection
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        conn.ok_or_else(|| VoxlinkError::Handshake {
            message: "mock transport already connected".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubjectConfig;

    fn persona() -> Persona {
        Persona::new("Charon", SubjectConfig::default())
    }

    #[tokio::test]
    async fn test_mock_transport_round_trip() {
        let (transport, mut handle) = MockTransport::new();
        let mut conn = transport.connect(&persona()).await.unwrap();

        handle.events.send(TransportEvent::Opened).await.unwrap();
        assert_eq!(conn.events.recv().await, Some(TransportEvent::Opened));

        let frame = EncodedFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        conn.outbound.send(frame.clone()).await.unwrap();
        assert_eq!(handle.sent.recv().await, Some(frame));
    }

    #[tokio::test]
    async fn test_mock_transport_single_connection() {
        let (transport, _handle) = MockTransport::new();
        let _conn = transport.connect(&persona()).await.unwrap();

        let second = transport.connect(&persona()).await;
        assert!(matches!(second, Err(VoxlinkError::Handshake { .. })));
    }

    #[tokio::test]
    async fn test_failing_transport() {
        let transport = MockTransport::failing();
        let result = transport.connect(&persona()).await;
        assert!(matches!(result, Err(VoxlinkError::Handshake { .. })));
    }
}
