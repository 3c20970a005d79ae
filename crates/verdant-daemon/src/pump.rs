//! Pump adapters: a relay on a sysfs GPIO line, and a dry-run stand-in.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use verdant_core::config::{PumpConfig, PumpKind};
use verdant_core::{ActuationError, Actuator};

/// Build the pump selected by `[pump]`. `dry_run` forces the dry-run adapter.
///
/// The returned pump is already switched off.
pub fn build(config: &PumpConfig, dry_run: bool) -> Result<Box<dyn Actuator>, ActuationError> {
    if dry_run || config.kind == PumpKind::DryRun {
        info!(pin = config.pin, "dry-run pump: relay will not be touched");
        return Ok(Box::new(DryRunPump::default()));
    }
    let relay = SysfsRelay::open(&config.gpio_root, config.pin, config.active_high)?;
    Ok(Box::new(relay))
}

/// Relay driven through `/sys/class/gpio/gpioN/value`.
pub struct SysfsRelay {
    line: PathBuf,
    pin: u32,
    active_high: bool,
}

impl SysfsRelay {
    /// Export `pin` if needed, set it as an output and switch the relay off.
    pub fn open(root: impl AsRef<Path>, pin: u32, active_high: bool) -> Result<Self, ActuationError> {
        let root = root.as_ref();
        let line = root.join(format!("gpio{pin}"));
        if !line.exists() {
            debug!(pin, root = %root.display(), "exporting gpio line");
            fs::write(root.join("export"), pin.to_string())?;
        }
        fs::write(line.join("direction"), "out")?;

        let mut relay = Self {
            line,
            pin,
            active_high,
        };
        relay.deactivate()?;
        info!(pin, active_high, "pump initialised on gpio");
        Ok(relay)
    }

    fn drive(&self, on: bool) -> std::io::Result<()> {
        let level = if on == self.active_high { "1" } else { "0" };
        fs::write(self.line.join("value"), level)
    }
}

impl Actuator for SysfsRelay {
    fn activate(&mut self) -> Result<(), ActuationError> {
        self.drive(true)
            .map_err(|e| ActuationError::Activate(format!("gpio{}: {e}", self.pin)))?;
        info!(pin = self.pin, "pump on");
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), ActuationError> {
        self.drive(false)
            .map_err(|e| ActuationError::Deactivate(format!("gpio{}: {e}", self.pin)))?;
        info!(pin = self.pin, "pump off");
        Ok(())
    }

    fn name(&self) -> &str {
        "gpio-relay"
    }
}

/// Logs what the relay would do.
#[derive(Debug, Default)]
pub struct DryRunPump {
    running: bool,
}

impl Actuator for DryRunPump {
    fn activate(&mut self) -> Result<(), ActuationError> {
        self.running = true;
        info!("pump on (dry run)");
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), ActuationError> {
        if self.running {
            info!("pump off (dry run)");
        }
        self.running = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
