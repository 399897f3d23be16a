use crate::clock::{Clock, SystemClock};
use crate::error::{ConnectFlowError, Result};
use crate::playback::decoder::PlaybackBuffer;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Identifier of one scheduled buffer on an output.
pub type SlotId = u64;

/// Sink that plays buffers at absolute positions on its own timeline.
///
/// Time is a `Duration` since the output was opened. Implementations must
/// start a buffer exactly at the requested position, or immediately when
/// that position has already passed.
pub trait PlaybackOutput: Send {
    /// Current position of the output timeline.
    fn current_time(&self) -> Duration;

    /// Schedule `buffer` to start at `at`.
    fn start_at(&mut self, slot: SlotId, buffer: &PlaybackBuffer, at: Duration) -> Result<()>;

    /// Cut a scheduled or sounding buffer immediately.
    fn stop(&mut self, slot: SlotId);

    /// Stop everything and release the device.
    fn close(&mut self);
}

/// Opens a [`PlaybackOutput`] for each session.
pub trait OutputFactory: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackOutput>>;
}

/// One `start_at` call observed by a [`VirtualOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEntry {
    pub slot: SlotId,
    pub start: Duration,
    pub duration: Duration,
    pub samples: usize,
}

impl ScheduledEntry {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

#[derive(Debug, Default)]
struct PlaybackRecord {
    scheduled: Vec<ScheduledEntry>,
    stopped: Vec<(SlotId, Duration)>,
    opened: usize,
    closed: usize,
}

/// Shared record of everything done to virtual outputs.
#[derive(Debug, Clone, Default)]
pub struct PlaybackLog {
    inner: Arc<Mutex<PlaybackRecord>>,
}

impl PlaybackLog {
    fn lock(&self) -> Option<MutexGuard<'_, PlaybackRecord>> {
        self.inner.lock().ok()
    }

    /// Every scheduled buffer in call order.
    pub fn scheduled(&self) -> Vec<ScheduledEntry> {
        self.lock().map(|r| r.scheduled.clone()).unwrap_or_default()
    }

    /// Every stopped slot with the time it was cut.
    pub fn stopped(&self) -> Vec<(SlotId, Duration)> {
        self.lock().map(|r| r.stopped.clone()).unwrap_or_default()
    }

    pub fn opened_count(&self) -> usize {
        self.lock().map(|r| r.opened).unwrap_or_default()
    }

    pub fn closed_count(&self) -> usize {
        self.lock().map(|r| r.closed).unwrap_or_default()
    }
}

/// Output that plays nothing and keeps time with a [`Clock`].
///
/// Used for tests and for muted sessions.
pub struct VirtualOutput {
    clock: Arc<dyn Clock>,
    origin: Instant,
    log: PlaybackLog,
    closed: bool,
}

impl VirtualOutput {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_log(clock, PlaybackLog::default())
    }

    fn with_log(clock: Arc<dyn Clock>, log: PlaybackLog) -> Self {
        let origin = clock.now();
        if let Some(mut record) = log.lock() {
            record.opened += 1;
        }
        Self {
            clock,
            origin,
            log,
            closed: false,
        }
    }

    pub fn log(&self) -> PlaybackLog {
        self.log.clone()
    }
}

impl PlaybackOutput for VirtualOutput {
    fn current_time(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.origin)
    }

    fn start_at(&mut self, slot: SlotId, buffer: &PlaybackBuffer, at: Duration) -> Result<()> {
        if self.closed {
            return Err(ConnectFlowError::AudioOutput {
                message: "output is closed".to_string(),
            });
        }
        if let Some(mut record) = self.log.lock() {
            record.scheduled.push(ScheduledEntry {
                slot,
                start: at,
                duration: buffer.duration(),
                samples: buffer.len(),
            });
        }
        Ok(())
    }

    fn stop(&mut self, slot: SlotId) {
        let now = self.current_time();
        if let Some(mut record) = self.log.lock() {
            record.stopped.push((slot, now));
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut record) = self.log.lock() {
            record.closed += 1;
        }
    }
}

/// Factory for [`VirtualOutput`]s sharing one [`PlaybackLog`].
#[derive(Clone)]
pub struct VirtualOutputFactory {
    clock: Arc<dyn Clock>,
    log: PlaybackLog,
    fail: bool,
}

impl VirtualOutputFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            log: PlaybackLog::default(),
            fail: false,
        }
    }

    /// Refuse to open any output.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn log(&self) -> PlaybackLog {
        self.log.clone()
    }
}

impl Default for VirtualOutputFactory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl OutputFactory for VirtualOutputFactory {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackOutput>> {
        if self.fail {
            return Err(ConnectFlowError::AudioOutput {
                message: "virtual output refused to open".to_string(),
            });
        }
        Ok(Box::new(VirtualOutput::with_log(
            Arc::clone(&self.clock),
            self.log.clone(),
        )))
    }
}
