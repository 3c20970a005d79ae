//! The pump seam. The engine only ever switches it on and off.

use crate::error::ActuationError;

/// A single on/off device driven by the watering executor.
///
/// Implementations must make `deactivate` safe to call when the device is
/// already off: the executor and the daemon call it on every exit path.
pub trait Actuator: Send {
    fn activate(&mut self) -> Result<(), ActuationError>;

    fn deactivate(&mut self) -> Result<(), ActuationError>;

    /// Label used in log fields.
    fn name(&self) -> &str {
        "pump"
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn activate(&mut self) -> Result<(), ActuationError> {
        (**self).activate()
    }

    fn deactivate(&mut self) -> Result<(), ActuationError> {
        (**self).deactivate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
