use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A wall-clock time of day with minute precision, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// The instant this time of day falls on `date`.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidTime {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(|| invalid("expected HH:MM"))?;
        if m.len() != 2 || h.is_empty() || h.len() > 2 {
            return Err(invalid("expected HH:MM"));
        }
        let hour: u32 = h.parse().map_err(|_| invalid("hour is not a number"))?;
        let minute: u32 = m.parse().map_err(|_| invalid("minute is not a number"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| invalid("out of range"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One configured watering slot. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    /// Stable identity: the nominal start time as written in the config.
    pub id: String,
    pub start_time: TimeOfDay,
    /// Pump run time in seconds.
    pub duration_secs: u64,
    /// Minimum calendar days between completed runs (1 = daily).
    pub interval_days: u32,
}

impl ScheduleEntry {
    /// Build an entry whose id is the canonical `HH:MM` form of `start_time`.
    pub fn new(start_time: TimeOfDay, duration_secs: u64, interval_days: u32) -> Self {
        Self {
            id: start_time.to_string(),
            start_time,
            duration_secs,
            interval_days,
        }
    }

    /// Nominal start of this entry's occurrence on `date`.
    pub fn scheduled_at(&self, date: NaiveDate) -> NaiveDateTime {
        self.start_time.on(date)
    }

    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.duration_secs)
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for {}s every {} day(s)",
            self.id, self.duration_secs, self.interval_days
        )
    }
}
