//! Recording workflow for the ordered list of gesture prompts.
//!
//! ```text
//! idle --start--> running --pause--> paused --resume--> running
//!   ^                |  (countdown hits 0, settle delay, export)
//!   +----------------+--> idle (next prompt)  or  done (after the last prompt)
//! ```
//!
//! The controller is driven from a single thread. Time is passed in explicitly so the UI can
//! poll it once per render and tests can step it deterministically.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{
    access::Owner,
    collector::FrameRecord,
    config::SessionConfig,
    error::{Error, Result},
    export::{CsvExporter, ExportReceipt, FileSink},
};

const TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Done = 3,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Done => "done",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionStatus::Running,
            2 => SessionStatus::Paused,
            3 => SessionStatus::Done,
            _ => SessionStatus::Idle,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status and recording generation shared with the capture and detector threads.
///
/// Both live in one atomic word so a reader never pairs a status with another recording's
/// generation. Only the controller writes it.
#[derive(Clone, Debug)]
pub struct StatusCell(Arc<AtomicU64>);

const STATUS_BITS: u32 = 8;

fn pack(status: SessionStatus, generation: u32) -> u64 {
    ((generation as u64) << STATUS_BITS) | status as u64
}

fn unpack(word: u64) -> (SessionStatus, u32) {
    (
        SessionStatus::from_u8((word & 0xff) as u8),
        (word >> STATUS_BITS) as u32,
    )
}

impl StatusCell {
    pub fn new(status: SessionStatus) -> Self {
        Self(Arc::new(AtomicU64::new(pack(status, 0))))
    }

    pub fn load(&self) -> SessionStatus {
        unpack(self.0.load(Ordering::Acquire)).0
    }

    pub fn generation(&self) -> u32 {
        unpack(self.0.load(Ordering::Acquire)).1
    }

    /// The generation of the recording in progress, or `None` unless running.
    pub fn recording(&self) -> Option<u32> {
        match unpack(self.0.load(Ordering::Acquire)) {
            (SessionStatus::Running, generation) => Some(generation),
            _ => None,
        }
    }

    /// Replaces the status and keeps the current generation.
    pub fn store(&self, status: SessionStatus) {
        let generation = self.generation();
        self.publish(status, generation);
    }

    fn publish(&self, status: SessionStatus, generation: u32) {
        self.0.store(pack(status, generation), Ordering::Release);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(SessionStatus::Idle)
    }
}

/// One-second countdown shared by `start` and `resume`.
#[derive(Clone, Debug)]
struct Countdown {
    total: u32,
    remaining: u32,
    next_tick: Option<Instant>,
}

impl Countdown {
    fn new(total: u32) -> Self {
        Self {
            total,
            remaining: total,
            next_tick: None,
        }
    }

    fn reset(&mut self) {
        self.remaining = self.total;
        self.next_tick = None;
    }

    fn arm(&mut self, now: Instant) {
        self.next_tick = Some(now + TICK);
    }

    fn disarm(&mut self) {
        self.next_tick = None;
    }

    /// Applies every tick due by `now`. Returns `true` once, when the countdown reaches zero.
    fn advance(&mut self, now: Instant) -> bool {
        let Some(mut next) = self.next_tick else {
            return false;
        };
        while now >= next && self.remaining > 0 {
            self.remaining -= 1;
            next += TICK;
        }
        if self.remaining == 0 {
            self.next_tick = None;
            true
        } else {
            self.next_tick = Some(next);
            false
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Conclusion {
    Exported(ExportReceipt),
    /// The recording had already been exported; nothing happened.
    AlreadySaved,
}

pub struct SessionController {
    owner: Owner,
    prompts: Vec<String>,
    index: usize,
    status: StatusCell,
    generation: u32,
    countdown: Countdown,
    settle_delay: Duration,
    settle_deadline: Option<Instant>,
    buffer: Vec<FrameRecord>,
    exporter: CsvExporter,
}

impl SessionController {
    pub fn new(owner: Owner, prompts: Vec<String>, config: &SessionConfig) -> Self {
        Self {
            owner,
            prompts,
            index: 0,
            status: StatusCell::default(),
            generation: 0,
            countdown: Countdown::new(config.countdown_secs),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            settle_deadline: None,
            buffer: Vec::new(),
            exporter: CsvExporter::new(),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn status(&self) -> SessionStatus {
        self.status.load()
    }

    /// Handle for the pipeline threads.
    pub fn status_cell(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn gesture_index(&self) -> usize {
        self.index
    }

    pub fn gesture_count(&self) -> usize {
        self.prompts.len()
    }

    pub fn gesture(&self) -> &str {
        self.prompts
            .get(self.index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Identifies the current recording; bumped by every `start`.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn remaining_secs(&self) -> u32 {
        self.countdown.remaining
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the countdown has expired and the session is waiting out the settle delay.
    pub fn is_settling(&self) -> bool {
        self.settle_deadline.is_some()
    }

    pub fn is_last_gesture(&self) -> bool {
        self.index + 1 >= self.prompts.len()
    }

    fn set_status(&mut self, status: SessionStatus) {
        let previous = self.status.load();
        if previous != status {
            log::info!(
                "session {} -> {} (gesture {}/{} {:?})",
                previous,
                status,
                self.index + 1,
                self.prompts.len(),
                self.gesture()
            );
        }
        self.status.publish(status, self.generation);
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            action,
            status: self.status(),
        }
    }

    /// Begins recording the current prompt from a clean buffer and a full countdown.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.status() == SessionStatus::Done {
            return Err(Error::SessionComplete);
        }
        self.buffer.clear();
        self.exporter.reset();
        self.settle_deadline = None;
        self.countdown.reset();
        self.countdown.arm(now);
        self.generation = self.generation.wrapping_add(1).max(1);
        self.set_status(SessionStatus::Running);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.status() != SessionStatus::Running || self.is_settling() {
            return Err(self.invalid("pause"));
        }
        self.countdown.disarm();
        self.set_status(SessionStatus::Paused);
        Ok(())
    }

    /// Continues the countdown from the remaining value kept at pause.
    pub fn resume(&mut self, now: Instant) -> Result<()> {
        if self.status() != SessionStatus::Paused {
            return Err(self.invalid("resume"));
        }
        self.countdown.arm(now);
        self.set_status(SessionStatus::Running);
        Ok(())
    }

    pub fn previous(&mut self) -> Result<usize> {
        if self.status() != SessionStatus::Idle || self.index == 0 {
            return Err(self.invalid("go to the previous gesture"));
        }
        self.index -= 1;
        Ok(self.index)
    }

    pub fn next(&mut self) -> Result<usize> {
        if self.status() != SessionStatus::Idle || self.is_last_gesture() {
            return Err(self.invalid("go to the next gesture"));
        }
        self.index += 1;
        Ok(self.index)
    }

    /// Appends a record built for the recording in progress. Records delivered in another
    /// state, or built for an earlier recording, are dropped.
    pub fn collect(&mut self, record: FrameRecord) -> bool {
        if self.status() != SessionStatus::Running {
            log::trace!("dropping frame delivered while {}", self.status());
            return false;
        }
        if record.generation() != self.generation {
            log::debug!(
                "dropping frame from recording {} during recording {}",
                record.generation(),
                self.generation
            );
            return false;
        }
        self.buffer.push(record);
        true
    }

    /// Advances the countdown and, once the settle delay after expiry has passed, concludes.
    pub fn poll(&mut self, now: Instant, sink: &mut dyn FileSink) -> Option<Result<Conclusion>> {
        if self.status() == SessionStatus::Running && self.countdown.advance(now) {
            log::debug!(
                "countdown expired for {:?}, settling for {:?}",
                self.gesture(),
                self.settle_delay
            );
            self.settle_deadline = Some(now + self.settle_delay);
        }

        match self.settle_deadline {
            Some(deadline) if now >= deadline => Some(self.conclude(sink)),
            _ => None,
        }
    }

    /// Ends the current recording early through the regular export path.
    pub fn stop(&mut self, sink: &mut dyn FileSink) -> Result<Conclusion> {
        self.conclude(sink)
    }

    /// Exports the buffer and moves on to the next prompt, or to `done` after the last one.
    ///
    /// With an empty buffer no file is written, the session returns to `idle` on the same
    /// prompt and [`Error::EmptyCapture`] is returned for the caller to surface. If the file
    /// cannot be written the session pauses with the buffer intact.
    pub fn conclude(&mut self, sink: &mut dyn FileSink) -> Result<Conclusion> {
        if self.exporter.is_saved() {
            return Ok(Conclusion::AlreadySaved);
        }
        if !matches!(
            self.status(),
            SessionStatus::Running | SessionStatus::Paused
        ) {
            return Err(self.invalid("finish recording"));
        }

        self.countdown.disarm();
        self.settle_deadline = None;

        let gesture = self.gesture().to_string();
        match self
            .exporter
            .export(&self.owner, &gesture, &mut self.buffer, sink)
        {
            Ok(Some(receipt)) => {
                if self.is_last_gesture() {
                    self.set_status(SessionStatus::Done);
                } else {
                    self.index += 1;
                    self.set_status(SessionStatus::Idle);
                }
                Ok(Conclusion::Exported(receipt))
            }
            Ok(None) => Ok(Conclusion::AlreadySaved),
            Err(err @ Error::EmptyCapture { .. }) => {
                log::warn!("nothing captured for {gesture:?}");
                self.set_status(SessionStatus::Idle);
                Err(err)
            }
            Err(err) => {
                // Paused keeps the buffer reachable: stop retries the export, start discards it.
                log::warn!("recording for {gesture:?} not saved: {err}");
                self.set_status(SessionStatus::Paused);
                Err(err)
            }
        }
    }
}
