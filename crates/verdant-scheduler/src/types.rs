use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::time::Duration;
use verdant_core::{ScheduleEntry, TimeOfDay};

/// A schedule entry pinned to a calendar date. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub entry: ScheduleEntry,
    pub date: NaiveDate,
    /// `date` + `entry.start_time`; this is what gets recorded on success.
    pub scheduled_at: NaiveDateTime,
}

impl Occurrence {
    pub fn new(entry: &ScheduleEntry, date: NaiveDate) -> Self {
        Self {
            entry: entry.clone(),
            date,
            scheduled_at: entry.scheduled_at(date),
        }
    }

    pub fn schedule_id(&self) -> &str {
        &self.entry.id
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entry.id, self.scheduled_at.format("%Y-%m-%d %H:%M"))
    }
}

/// When an armed job fires next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every day at the given local time.
    Daily(TimeOfDay),
    /// A fixed period after the previous run finished.
    Every(Duration),
}

/// What an armed job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Index into the schedule entry list.
    Watering { entry: usize },
    PeriodicCapture,
    DailySummary,
}

/// Lifecycle of an armed job within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Waiting for `next_fire`.
    Idle,
    /// Selected by the current tick, queued behind earlier jobs.
    Due,
    /// Currently executing on the control loop.
    Running,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Idle => "idle",
            JobPhase::Due => "due",
            JobPhase::Running => "running",
        };
        write!(f, "{s}")
    }
}

/// An in-memory job record inspected on every tick.
#[derive(Debug, Clone)]
pub struct ArmedJob {
    /// Human-readable label for logs.
    pub name: String,
    pub kind: JobKind,
    pub cadence: Cadence,
    pub next_fire: NaiveDateTime,
    pub phase: JobPhase,
    /// Tick instant of the most recent firing, if any.
    pub last_fired: Option<NaiveDateTime>,
    pub run_count: u32,
    /// Error message of the most recent run, cleared on success.
    pub last_error: Option<String>,
}

impl ArmedJob {
    pub fn new(
        name: impl Into<String>,
        kind: JobKind,
        cadence: Cadence,
        next_fire: NaiveDateTime,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            cadence,
            next_fire,
            phase: JobPhase::Idle,
            last_fired: None,
            run_count: 0,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.phase == JobPhase::Idle && self.next_fire <= now
    }
}
