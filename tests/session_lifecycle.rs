//! End-to-end session lifecycle tests over mock devices and transport.

use std::time::Duration;
use tokio::sync::mpsc;
use voxlink::audio::capture::MockCaptureSource;
use voxlink::audio::playback::{ManualClock, MockSink, PlaybackScheduler};
use voxlink::config::SubjectConfig;
use voxlink::encode_frame;
use voxlink::transport::{MockTransport, ServerMessage, TransportEvent};
use voxlink::{
    Persona, RealtimeTransport, Session, SessionSettings, SessionStatus, VoxlinkError,
};

fn build_session(
    transport: Box<dyn RealtimeTransport>,
    source: MockCaptureSource,
) -> (Session, MockSink) {
    let sink = MockSink::new();
    let scheduler = PlaybackScheduler::new(Box::new(sink.clone()), Box::new(ManualClock::new()));
    let session = Session::new(
        transport,
        Box::new(source),
        scheduler,
        Persona::new("Charon", SubjectConfig::default()),
        SessionSettings::default(),
    );
    (session, sink)
}

/// Records every status the session passes through.
fn spawn_status_collector(
    mut rx: tokio::sync::watch::Receiver<voxlink::StatusReport>,
) -> tokio::task::JoinHandle<Vec<SessionStatus>> {
    // Capture the starting status before the session can move on
    let first = rx.borrow_and_update().status;
    tokio::spawn(async move {
        let mut seen = vec![first];
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().status;
            if seen.last() != Some(&status) {
                seen.push(status);
            }
        }
        seen
    })
}

/// Drains frames the session sends so the outbound channel never backs up.
fn spawn_frame_drainer(mut handle_sent: mpsc::Receiver<voxlink::EncodedFrame>) -> tokio::task::JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut mimes = Vec::new();
        while let Some(frame) = handle_sent.recv().await {
            mimes.push(frame.mime_type);
        }
        mimes
    })
}

async fn run_with_timeout(
    session: &mut Session,
    ended_rx: &mut mpsc::UnboundedReceiver<voxlink::SourceId>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) {
    tokio::time::timeout(Duration::from_secs(5), session.run(ended_rx, shutdown_rx))
        .await
        .expect("session run loop did not finish");
}

#[tokio::test]
async fn test_full_lifecycle_walk() {
    let (transport, handle) = MockTransport::new();
    let events = handle.events;
    let sent = handle.sent;
    let source = MockCaptureSource::new().with_samples(vec![0.1; 4096]);
    let (mut session, sink) = build_session(Box::new(transport), source);

    let statuses = spawn_status_collector(session.subscribe());
    let drainer = spawn_frame_drainer(sent);

    session.start().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Connecting);

    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    let chunk = encode_frame(&[0.2; 2400], 24_000);
    let driver = tokio::spawn(async move {
        events.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        events
            .send(TransportEvent::Message(ServerMessage {
                audio: Some(chunk.data),
                interrupted: false,
            }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The sink reports the scheduled source as finished
        ended_tx.send(0).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(()).await.unwrap();
    });

    run_with_timeout(&mut session, &mut ended_rx, &mut shutdown_rx).await;
    driver.await.unwrap();

    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.last_error().is_none());

    // Playback was scheduled exactly once
    assert_eq!(sink.begun().len(), 1);

    // Microphone frames reached the transport at the capture rate
    drop(session);
    let mimes = drainer.await.unwrap();
    assert!(!mimes.is_empty());
    assert!(mimes.iter().all(|m| m == "audio/pcm;rate=16000"));

    let seen = statuses.await.unwrap();
    assert_eq!(
        seen,
        vec![
            SessionStatus::Idle,
            SessionStatus::Connecting,
            SessionStatus::Listening,
            SessionStatus::Speaking,
            SessionStatus::Listening,
            SessionStatus::Idle,
        ]
    );
}

#[tokio::test]
async fn test_permission_denied_never_touches_transport() {
    let (transport, handle) = MockTransport::new();
    let source = MockCaptureSource::new().with_permission_denied();
    let (mut session, _sink) = build_session(Box::new(transport), source);

    let result = session.start().await;
    assert!(matches!(result, Err(VoxlinkError::CaptureDenied { .. })));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(!handle.was_connected());
}

#[tokio::test]
async fn test_remote_close_reports_severed() {
    let (transport, handle) = MockTransport::new();
    let events = handle.events;
    let sent = handle.sent;
    let source = MockCaptureSource::new().with_samples(vec![0.1; 4096]);
    let (mut session, _sink) = build_session(Box::new(transport), source);
    let _drainer = spawn_frame_drainer(sent);

    session.start().await.unwrap();

    let (_ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    let driver = tokio::spawn(async move {
        events.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        events
            .send(TransportEvent::Closed {
                reason: "remote hung up".to_string(),
            })
            .await
            .unwrap();
    });

    run_with_timeout(&mut session, &mut ended_rx, &mut shutdown_rx).await;
    driver.await.unwrap();

    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.last_error(), Some("Connection Severed"));
}

#[tokio::test]
async fn test_interruption_resets_playback_queue() {
    let (transport, handle) = MockTransport::new();
    let events = handle.events;
    let sent = handle.sent;
    let source = MockCaptureSource::new().with_samples(vec![0.1; 4096]);
    let (mut session, sink) = build_session(Box::new(transport), source);
    let _drainer = spawn_frame_drainer(sent);

    session.start().await.unwrap();

    let (_ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    // 0.1s of audio at the output rate
    let chunk = encode_frame(&[0.2; 2400], 24_000);
    let first = chunk.data.clone();
    let second = chunk.data.clone();
    let third = chunk.data;

    let driver = tokio::spawn(async move {
        events.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        for data in [first, second] {
            events
                .send(TransportEvent::Message(ServerMessage {
                    audio: Some(data),
                    interrupted: false,
                }))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        events
            .send(TransportEvent::Message(ServerMessage {
                interrupted: true,
                audio: None,
            }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        events
            .send(TransportEvent::Message(ServerMessage {
                audio: Some(third),
                interrupted: false,
            }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(()).await.unwrap();
    });

    run_with_timeout(&mut session, &mut ended_rx, &mut shutdown_rx).await;
    driver.await.unwrap();

    // Both queued sources were stopped by the interruption
    let stopped = sink.stopped();
    assert!(stopped.len() >= 2);

    // Gapless queueing before the interruption, fresh timeline after it
    let begun = sink.begun();
    assert_eq!(begun.len(), 3);
    assert_eq!(begun[0].1, 0.0);
    assert!((begun[1].1 - 0.1).abs() < 1e-9);
    assert_eq!(begun[2].1, 0.0);
}

#[tokio::test]
async fn test_teardown_is_idempotent_after_run() {
    let (transport, handle) = MockTransport::new();
    let events = handle.events;
    let sent = handle.sent;
    let source = MockCaptureSource::new().with_samples(vec![0.1; 4096]);
    let (mut session, _sink) = build_session(Box::new(transport), source);
    let _drainer = spawn_frame_drainer(sent);

    session.start().await.unwrap();

    let (_ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    let driver = tokio::spawn(async move {
        events.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).await.unwrap();
    });

    run_with_timeout(&mut session, &mut ended_rx, &mut shutdown_rx).await;
    driver.await.unwrap();

    assert_eq!(session.status(), SessionStatus::Idle);
    session.stop();
    session.stop();
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.last_error().is_none());
}
