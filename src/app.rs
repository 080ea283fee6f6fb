//! Application entry point.
//!
//! Composes the real devices and transport into a session:
//! microphone → uplink → assistant audio playback.

use crate::audio::cpal_io::{suppress_audio_warnings, CpalCaptureSource, CpalPlaybackSink};
use crate::audio::playback::{PlaybackScheduler, SystemClock};
use crate::config::Config;
use crate::error::VoxlinkError;
use crate::persona::Persona;
use crate::session::{Session, SessionSettings, SessionStatus, StatusReport};
use crate::transport::live::LiveTransport;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// CLI overrides applied on top of the loaded configuration.
#[derive(Debug, Default)]
pub struct SessionOptions {
    pub device: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub api_key: Option<String>,
    pub record: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub quiet: bool,
    pub verbosity: u8,
}

/// Run a live voice session until ctrl-c, timeout, or remote close.
///
/// # Errors
///
/// Returns an error when the credential is missing, the microphone or
/// speaker cannot be opened, or the session ends in a transport failure.
pub async fn run_session_command(mut config: Config, opts: SessionOptions) -> anyhow::Result<()> {
    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    if let Some(d) = opts.device {
        config.audio.device = Some(d);
    }
    if let Some(m) = opts.model {
        config.api.model = m;
    }
    if let Some(v) = opts.voice {
        config.api.voice = v;
    }
    if let Some(k) = opts.api_key {
        config.api.key = Some(k);
    }

    let api_key = config
        .api
        .key
        .clone()
        .ok_or(VoxlinkError::MissingCredential)?;

    let persona = Persona::from_config(&config);
    let settings = SessionSettings {
        input_sample_rate: config.audio.input_sample_rate,
        output_sample_rate: config.audio.output_sample_rate,
        frame_samples: config.audio.frame_samples,
        ..SessionSettings::default()
    };

    let capture = CpalCaptureSource::new(config.audio.device.as_deref())?;
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let sink = CpalPlaybackSink::new(ended_tx)?;
    let scheduler = PlaybackScheduler::new(Box::new(sink), Box::new(SystemClock::new()));
    let transport = LiveTransport::new(api_key, config.api.model.clone());

    let mut session = Session::new(
        Box::new(transport),
        Box::new(capture),
        scheduler,
        persona,
        settings,
    );

    if let Some(path) = &opts.record {
        session.record_to(path)?;
        if !opts.quiet {
            eprintln!("Recording assistant audio to {}", path.display());
        }
    }

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    // ctrl-c requests an orderly teardown
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_tx.send(()).await.ok();
        }
    });

    if let Some(timeout) = opts.timeout {
        let timeout_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timeout_tx.send(()).await.ok();
        });
    }

    if !opts.quiet {
        spawn_status_printer(session.subscribe(), opts.verbosity);
    }

    session.start().await?;
    session.run(&mut ended_rx, &mut shutdown_rx).await;

    if let Some(error) = session.last_error() {
        if !opts.quiet {
            eprintln!("{} {}", "●".red(), error.red());
        }
        anyhow::bail!("session ended in error: {}", error);
    }

    Ok(())
}

/// Prints status transitions as they happen.
fn spawn_status_printer(mut status_rx: tokio::sync::watch::Receiver<StatusReport>, verbosity: u8) {
    tokio::spawn(async move {
        loop {
            let report = status_rx.borrow_and_update().clone();
            print_status(&report, verbosity);
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    });
}

fn print_status(report: &StatusReport, verbosity: u8) {
    match report.status {
        SessionStatus::Idle => {
            if let Some(error) = &report.error {
                eprintln!("{} {} ({})", "●".red(), report.status.label(), error.red());
            } else {
                eprintln!("{} {}", "●".white(), report.status.label());
            }
        }
        SessionStatus::Connecting => {
            eprintln!("{} {}", "●".yellow(), report.status.label());
        }
        SessionStatus::Listening => {
            eprintln!("{} {}", "●".green(), report.status.label());
        }
        SessionStatus::Speaking => {
            eprintln!("{} {}", "●".cyan(), report.status.label());
        }
    }
    if verbosity >= 2 {
        log::debug!("status report: {:?}", report);
    }
}
