//! Startup catch-up: run whatever should already have happened today.

use chrono::NaiveDateTime;
use tracing::{info, warn};
use verdant_core::{Actuator, ScheduleEntry};

use crate::executor::WateringExecutor;
use crate::resolver::resolve_due;

/// What one catch-up pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    /// Occurrences found due, in configuration order.
    pub due: Vec<String>,
    pub executed: usize,
    pub failed: usize,
}

/// Execute every occurrence due at `now`, one after another, in the order
/// the entries are configured.
///
/// Runs before the scheduler loop starts. A second pass with unchanged state
/// finds nothing due.
pub async fn run_catch_up<A: Actuator>(
    now: NaiveDateTime,
    entries: &[ScheduleEntry],
    executor: &mut WateringExecutor<A>,
) -> CatchUpReport {
    let due = resolve_due(now, entries, executor.state());
    let mut report = CatchUpReport {
        due: due.iter().map(|o| o.schedule_id().to_string()).collect(),
        ..Default::default()
    };

    if due.is_empty() {
        info!(%now, "catch-up: nothing missed");
        return report;
    }
    info!(%now, count = due.len(), "catch-up: running missed waterings");

    for occurrence in &due {
        match executor.execute(occurrence).await {
            Ok(_) => report.executed += 1,
            Err(e) => {
                // Left unrecorded; the daily job or the next start retries it.
                warn!(occurrence = %occurrence, error = %e, "catch-up watering failed");
                report.failed += 1;
            }
        }
    }

    info!(executed = report.executed, failed = report.failed, "catch-up finished");
    report
}
