use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timestamp format written to the state record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Formats accepted when reading a state record back.
const ACCEPTED_FORMATS: &[&str] = &[TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Last successful completion per schedule entry.
///
/// An id is only ever written after its pump run finished; an absent id
/// means "never watered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WateringState {
    last_watered: BTreeMap<String, NaiveDateTime>,
}

impl WateringState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_watered(&self, schedule_id: &str) -> Option<NaiveDateTime> {
        self.last_watered.get(schedule_id).copied()
    }

    pub fn record(&mut self, schedule_id: impl Into<String>, at: NaiveDateTime) {
        self.last_watered.insert(schedule_id.into(), at);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NaiveDateTime)> {
        self.last_watered.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.last_watered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_watered.is_empty()
    }

    /// Build state from loosely-typed `(id, timestamp)` pairs, skipping any
    /// entry whose timestamp cannot be parsed.
    pub fn from_raw_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut state = Self::new();
        for (id, raw) in entries {
            let id = id.into();
            match parse_timestamp(raw.as_ref()) {
                Some(at) => state.record(id, at),
                None => warn!(
                    schedule = %id,
                    value = raw.as_ref(),
                    "unreadable last-watered timestamp; treating entry as never watered"
                ),
            }
        }
        state
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
