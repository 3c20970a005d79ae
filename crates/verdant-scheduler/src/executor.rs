//! One watering cycle: photos, pump on, wait, pump off, record.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};
use verdant_core::{ActuationError, Actuator};
use verdant_hooks::{HookContext, HookEngine, HookEvent};

use crate::error::PersistenceError;
use crate::state::WateringState;
use crate::store::StateStore;
use crate::types::Occurrence;

/// How a successful cycle ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Recorded in memory and persisted.
    Recorded,
    /// Recorded in memory only; the store rejected the write.
    RecordedInMemory,
}

/// Keeps the pump on for as long as it is alive.
///
/// Dropping the guard (including when the owning future is dropped on
/// shutdown) switches the pump off.
struct PumpGuard<'a, A: Actuator> {
    actuator: &'a mut A,
    engaged: bool,
}

impl<'a, A: Actuator> PumpGuard<'a, A> {
    fn engage(actuator: &'a mut A) -> Result<Self, ActuationError> {
        if let Err(e) = actuator.activate() {
            // The relay may have latched before the error surfaced.
            if let Err(off) = actuator.deactivate() {
                error!(pump = actuator.name(), error = %off, "deactivate after failed activation also failed");
            }
            return Err(e);
        }
        Ok(Self {
            actuator,
            engaged: true,
        })
    }

    fn release(mut self) -> Result<(), ActuationError> {
        self.engaged = false;
        self.actuator.deactivate()
    }
}

impl<A: Actuator> Drop for PumpGuard<'_, A> {
    fn drop(&mut self) {
        if self.engaged {
            warn!(pump = self.actuator.name(), "watering interrupted; switching pump off");
            if let Err(e) = self.actuator.deactivate() {
                error!(pump = self.actuator.name(), error = %e, "pump may still be running");
            }
        }
    }
}

/// Runs watering cycles and owns the watering state.
///
/// The state is only touched here, on the control loop, so no locking is
/// needed. `execute` awaits the full pump run; the caller's loop is stalled
/// for that long.
pub struct WateringExecutor<A: Actuator> {
    actuator: A,
    hooks: Arc<HookEngine>,
    store: Box<dyn StateStore>,
    state: WateringState,
}

impl<A: Actuator> WateringExecutor<A> {
    /// Build an executor, loading the current state from `store`.
    pub fn new(
        actuator: A,
        hooks: Arc<HookEngine>,
        store: Box<dyn StateStore>,
    ) -> Result<Self, PersistenceError> {
        let state = store.load()?;
        info!(location = %store.location(), entries = state.len(), "watering state loaded");
        Ok(Self::with_state(actuator, hooks, store, state))
    }

    pub fn with_state(
        actuator: A,
        hooks: Arc<HookEngine>,
        store: Box<dyn StateStore>,
        state: WateringState,
    ) -> Self {
        Self {
            actuator,
            hooks,
            store,
            state,
        }
    }

    pub fn state(&self) -> &WateringState {
        &self.state
    }

    /// Run `occurrence` to completion. The caller has already decided it is due.
    ///
    /// On any pump error the state is left untouched so the occurrence stays
    /// eligible. A failed state write is logged and the in-memory state still
    /// advances.
    pub async fn execute(
        &mut self,
        occurrence: &Occurrence,
    ) -> Result<ExecutionOutcome, ActuationError> {
        let entry = &occurrence.entry;
        let duration = entry.duration();
        info!(
            schedule = %entry.id,
            scheduled_at = %occurrence.scheduled_at,
            duration_secs = entry.duration_secs,
            "starting watering"
        );

        self.hooks
            .emit(watering_context(HookEvent::BeforeWatering, occurrence))
            .await;

        let started = Instant::now();
        let guard = match PumpGuard::engage(&mut self.actuator) {
            Ok(g) => g,
            Err(e) => {
                error!(schedule = %entry.id, code = e.code(), error = %e, "pump activation failed; occurrence left unrecorded");
                return Err(e);
            }
        };

        // Midpoint hooks may only use what is left of the run; the pump goes
        // off at `started + duration` whether or not they have finished.
        let deadline = started + duration;
        tokio::time::sleep_until(started + duration / 2).await;
        let midpoint = self
            .hooks
            .emit(watering_context(HookEvent::WateringMidpoint, occurrence));
        if tokio::time::timeout_at(deadline, midpoint).await.is_err() {
            warn!(schedule = %entry.id, "midpoint hooks still running at end of watering; abandoned");
        }
        tokio::time::sleep_until(deadline).await;

        if let Err(e) = guard.release() {
            error!(schedule = %entry.id, code = e.code(), error = %e, "pump deactivation failed; occurrence left unrecorded");
            return Err(e);
        }
        let ran_for = started.elapsed();

        self.hooks
            .emit(watering_context(HookEvent::AfterWatering, occurrence))
            .await;

        self.state.record(entry.id.clone(), occurrence.scheduled_at);
        let outcome = match self.store.save(&self.state) {
            Ok(()) => ExecutionOutcome::Recorded,
            Err(e) => {
                warn!(
                    schedule = %entry.id,
                    location = %self.store.location(),
                    error = %e,
                    "watering done but state not persisted; a restart may repeat it"
                );
                ExecutionOutcome::RecordedInMemory
            }
        };

        info!(
            schedule = %entry.id,
            ran_for_ms = ran_for.as_millis() as u64,
            persisted = outcome == ExecutionOutcome::Recorded,
            "watering completed"
        );
        Ok(outcome)
    }

    /// Best-effort pump off, for shutdown paths.
    pub fn shutdown(&mut self) {
        match self.actuator.deactivate() {
            Ok(()) => info!(pump = self.actuator.name(), "pump off for shutdown"),
            Err(e) => error!(pump = self.actuator.name(), error = %e, "shutdown deactivation failed"),
        }
    }
}

fn watering_context(event: HookEvent, occurrence: &Occurrence) -> HookContext {
    HookContext::new(event)
        .with_schedule(occurrence.entry.id.clone())
        .with_payload(serde_json::json!({
            "scheduled_at": occurrence.scheduled_at.to_string(),
            "duration_secs": occurrence.entry.duration_secs,
        }))
}
