//! `verdant-core`: configuration, schedule types and the device seams shared
//! by the scheduler and the daemon.

pub mod actuator;
pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use actuator::Actuator;
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::VerdantConfig;
pub use error::{ActuationError, ConfigError};
pub use types::{ScheduleEntry, TimeOfDay};
