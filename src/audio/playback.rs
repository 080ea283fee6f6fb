//! Gapless playback scheduling.
//!
//! Inbound audio chunks arrive at irregular network intervals; the scheduler
//! assigns each one a start time so chunks play back-to-back with no gap and
//! no overlap. It also owns the cancellation set used on interruption.

use crate::audio::codec::PcmBuffer;
use crate::error::Result;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Identifier for one scheduled playback source.
pub type SourceId = u64;

/// Playback timeline clock, in seconds.
///
/// Behind a trait so tests can drive time by hand.
pub trait AudioClock: Send {
    fn now(&self) -> f64;
}

/// Monotonic wall clock starting at zero when created.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for tests. Cloned handles share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    time: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secs: f64) {
        if let Ok(mut t) = self.time.lock() {
            *t = secs;
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut t) = self.time.lock() {
            *t += secs;
        }
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.time.lock().map(|t| *t).unwrap_or(0.0)
    }
}

/// Output half of the platform audio surface.
///
/// `begin` hands a decoded buffer to the device with its scheduled start
/// time; `stop` cancels a source whether or not it has started. Completion
/// is reported out-of-band (the real sink signals when a source's samples
/// are fully consumed; the session feeds that back via
/// [`PlaybackScheduler::on_ended`]).
pub trait PlaybackSink: Send {
    fn begin(&mut self, id: SourceId, buffer: PcmBuffer, start_at: f64) -> Result<()>;

    fn stop(&mut self, id: SourceId);
}

/// Scheduler owning the playback clock position and the active-source set.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    clock: Box<dyn AudioClock>,
    next_start_time: f64,
    active: BTreeSet<SourceId>,
    next_id: SourceId,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>, clock: Box<dyn AudioClock>) -> Self {
        Self {
            sink,
            clock,
            next_start_time: 0.0,
            active: BTreeSet::new(),
            next_id: 0,
        }
    }

    /// Schedule a decoded buffer for gapless playback.
    ///
    /// Start time is the later of the previous chunk's scheduled end and the
    /// clock's current position, so chunks concatenate seamlessly but never
    /// start in the past. The source is registered in the active set before
    /// the sink is told to start it.
    pub fn schedule(&mut self, buffer: PcmBuffer) -> Result<SourceId> {
        let start_at = self.next_start_time.max(self.clock.now());
        let duration = buffer.duration_secs();

        let id = self.next_id;
        self.next_id += 1;

        self.active.insert(id);
        if let Err(e) = self.sink.begin(id, buffer, start_at) {
            self.active.remove(&id);
            return Err(e);
        }

        self.next_start_time = start_at + duration;
        Ok(id)
    }

    /// Record natural completion of a source.
    ///
    /// Each source is removed exactly once; completions arriving after a
    /// cancellation are ignored. Returns true when no scheduled audio
    /// remains.
    pub fn on_ended(&mut self, id: SourceId) -> bool {
        self.active.remove(&id);
        self.active.is_empty()
    }

    /// Cancel every scheduled source (started or not) and reset the clock
    /// position to zero, so the next chunk starts fresh relative to "now".
    pub fn cancel_all(&mut self) {
        let ids: Vec<SourceId> = self.active.iter().copied().collect();
        for id in ids {
            self.sink.stop(id);
        }
        self.active.clear();
        self.next_start_time = 0.0;
    }

    /// True when no source is scheduled or playing.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of currently scheduled-but-unfinished sources.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Timeline position the next chunk would be appended at.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

/// Recording sink for tests, with a cloneable handle for inspection.
#[derive(Clone, Default)]
pub struct MockSink {
    state: Arc<Mutex<MockSinkState>>,
}

#[derive(Default)]
struct MockSinkState {
    begun: Vec<(SourceId, f64, f64)>,
    stopped: Vec<SourceId>,
    fail_begin: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_begin_failure(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_begin = true;
        }
        self
    }

    /// `(id, start_at, duration)` for every `begin` call, in order.
    pub fn begun(&self) -> Vec<(SourceId, f64, f64)> {
        self.state.lock().map(|s| s.begun.clone()).unwrap_or_default()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.state
            .lock()
            .map(|s| s.stopped.clone())
            .unwrap_or_default()
    }
}

impl PlaybackSink for MockSink {
    fn begin(&mut self, id: SourceId, buffer: PcmBuffer, start_at: f64) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| crate::error::VoxlinkError::Playback {
            message: "mock sink poisoned".to_string(),
        })?;
        if state.fail_begin {
            return Err(crate::error::VoxlinkError::Playback {
                message: "mock begin failure".to_string(),
            });
        }
        state.begun.push((id, start_at, buffer.duration_secs()));
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut state) = self.state.lock() {
            state.stopped.push(id);
        }
    }
}
