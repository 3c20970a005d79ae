//! Clock abstraction so schedule decisions can be tested against a frozen "now".

use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDateTime, Timelike};

/// Source of local wall-clock time.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time, truncated to whole seconds.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<NaiveDateTime>>,
}

impl FakeClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += duration;
    }

    /// Set the clock to a specific instant
    pub fn set(&self, instant: NaiveDateTime) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
