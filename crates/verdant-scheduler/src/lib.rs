//! `verdant-scheduler`: decides when to water, runs the pump, remembers it.
//!
//! # Overview
//!
//! The [`resolver`] answers "is this entry due now?" from the schedule, the
//! clock and the persisted [`state::WateringState`]. The
//! [`executor::WateringExecutor`] runs one cycle and records it. On startup
//! [`catchup::run_catch_up`] executes the most recent missed occurrence of
//! each entry, then the [`engine::SchedulerEngine`] polls its armed jobs
//! once a second.
//!
//! # Jobs
//!
//! | Job               | Cadence                    | Action                          |
//! |-------------------|----------------------------|---------------------------------|
//! | watering (per entry) | daily at the entry's HH:MM | resolve, then execute if due |
//! | periodic capture  | every N seconds            | emit `PeriodicCapture` hooks    |
//! | daily summary     | daily at HH:MM             | emit `DailySummary` hooks       |

pub mod catchup;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod schedule;
pub mod state;
pub mod store;
pub mod types;

pub use catchup::{run_catch_up, CatchUpReport};
pub use engine::{JobPlan, SchedulerEngine};
pub use error::{PersistenceError, Result, SchedulerError};
pub use executor::{ExecutionOutcome, WateringExecutor};
pub use resolver::{is_due, next_eligible_date, resolve_due, resolve_entry, resolve_slot};
pub use state::WateringState;
pub use store::{open_store, JsonStateStore, SqliteStateStore, StateStore};
pub use types::{ArmedJob, Cadence, JobKind, JobPhase, Occurrence};
