use chrono::{Duration, NaiveDateTime};

use crate::types::Cadence;

/// Upper bound for `Cadence::Every` periods (one year).
const MAX_PERIOD_SECS: i64 = 366 * 24 * 60 * 60;

/// Compute the next local firing time for `cadence` strictly *after* `from`.
///
/// `from` is the instant the previous run finished (or process start for the
/// first arm), so a job delayed by a long watering is pushed back rather than
/// fired twice.
pub fn compute_next_fire(cadence: &Cadence, from: NaiveDateTime) -> NaiveDateTime {
    match cadence {
        Cadence::Daily(time) => {
            // Build today's candidate at HH:MM:00.
            let candidate = time.on(from.date());
            if candidate > from {
                candidate
            } else {
                // Today's slot has passed; advance to tomorrow.
                candidate + Duration::days(1)
            }
        }

        Cadence::Every(period) => {
            // Sub-second periods round up so the job can never spin.
            let secs = i64::try_from(period.as_secs())
                .unwrap_or(MAX_PERIOD_SECS)
                .clamp(1, MAX_PERIOD_SECS);
            from + Duration::seconds(secs)
        }
    }
}
