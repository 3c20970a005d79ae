//! The polling loop: armed jobs for watering, photos and the daily summary.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use verdant_core::{Actuator, Clock, ScheduleEntry, TimeOfDay};
use verdant_hooks::{HookContext, HookEngine, HookEvent};

use crate::catchup::run_catch_up;
use crate::error::Result;
use crate::executor::WateringExecutor;
use crate::resolver::resolve_slot;
use crate::schedule::compute_next_fire;
use crate::state::format_timestamp;
use crate::types::{ArmedJob, Cadence, JobKind, JobPhase};

/// Which non-watering jobs to arm, and how the loop behaves.
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// Period of the photo job; `None` disables it.
    pub capture_interval: Option<Duration>,
    /// Time of the daily summary; `None` disables it.
    pub summary_time: Option<TimeOfDay>,
    pub poll_interval: Duration,
    /// Run the catch-up pass before the first tick.
    pub catch_up: bool,
}

impl Default for JobPlan {
    fn default() -> Self {
        Self {
            capture_interval: None,
            summary_time: None,
            poll_interval: Duration::from_secs(1),
            catch_up: true,
        }
    }
}

/// Single-threaded poll loop over a fixed set of armed jobs.
///
/// Every tick collects the jobs whose `next_fire` has passed and runs them
/// one at a time, to completion, earliest first (ties in registration
/// order). A watering run stalls the loop; anything that comes due meanwhile
/// is picked up by the next tick.
pub struct SchedulerEngine<A: Actuator, C: Clock> {
    entries: Vec<ScheduleEntry>,
    executor: WateringExecutor<A>,
    hooks: Arc<HookEngine>,
    clock: C,
    jobs: Vec<ArmedJob>,
    plan: JobPlan,
}

impl<A: Actuator, C: Clock> SchedulerEngine<A, C> {
    /// Arm one watering job per entry (in configuration order), then the
    /// capture and summary jobs, relative to `clock.now()`.
    pub fn new(
        entries: Vec<ScheduleEntry>,
        executor: WateringExecutor<A>,
        hooks: Arc<HookEngine>,
        clock: C,
        plan: JobPlan,
    ) -> Self {
        let now = clock.now();
        let mut jobs = Vec::with_capacity(entries.len() + 2);

        for (index, entry) in entries.iter().enumerate() {
            let cadence = Cadence::Daily(entry.start_time);
            jobs.push(ArmedJob::new(
                format!("water {}", entry.id),
                JobKind::Watering { entry: index },
                cadence,
                compute_next_fire(&cadence, now),
            ));
        }
        if let Some(period) = plan.capture_interval {
            let cadence = Cadence::Every(period);
            jobs.push(ArmedJob::new(
                "periodic capture",
                JobKind::PeriodicCapture,
                cadence,
                compute_next_fire(&cadence, now),
            ));
        }
        if let Some(time) = plan.summary_time {
            let cadence = Cadence::Daily(time);
            jobs.push(ArmedJob::new(
                "daily summary",
                JobKind::DailySummary,
                cadence,
                compute_next_fire(&cadence, now),
            ));
        }

        for job in &jobs {
            debug!(job = %job.name, next_fire = %job.next_fire, "job armed");
        }

        Self {
            entries,
            executor,
            hooks,
            clock,
            jobs,
            plan,
        }
    }

    pub fn jobs(&self) -> &[ArmedJob] {
        &self.jobs
    }

    pub fn executor(&self) -> &WateringExecutor<A> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut WateringExecutor<A> {
        &mut self.executor
    }

    /// Earliest armed `next_fire`, if any job is armed.
    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        self.jobs.iter().map(|j| j.next_fire).min()
    }

    /// Main event loop. Polls every `plan.poll_interval` until `shutdown`
    /// broadcasts `true` (or its sender goes away).
    ///
    /// A job in flight when shutdown arrives is dropped; the pump guard and
    /// the final `shutdown()` both switch the pump off.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(jobs = self.jobs.len(), "scheduler engine started");

        if self.plan.catch_up {
            let now = self.clock.now();
            let interrupted = tokio::select! {
                _ = run_catch_up(now, &self.entries, &mut self.executor) => false,
                _ = shutdown_requested(&mut shutdown) => true,
            };
            if interrupted {
                warn!("shutdown during catch-up");
                self.executor.shutdown();
                return;
            }
        }

        let mut interval = tokio::time::interval(self.plan.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let stop = tokio::select! {
                _ = interval.tick() => false,
                _ = shutdown_requested(&mut shutdown) => true,
            };
            if stop {
                info!("scheduler engine shutting down");
                break;
            }

            let interrupted = tokio::select! {
                _ = self.tick() => false,
                _ = shutdown_requested(&mut shutdown) => true,
            };
            if interrupted {
                warn!("shutdown while a job was running; job abandoned");
                break;
            }
        }

        self.executor.shutdown();
        info!("scheduler engine stopped");
    }

    /// Run every job due at `clock.now()`. Returns the kinds fired, in order.
    pub async fn tick(&mut self) -> Vec<JobKind> {
        let now = self.clock.now();
        let mut due: Vec<usize> = (0..self.jobs.len())
            .filter(|&i| self.jobs[i].is_due(now))
            .collect();
        due.sort_by_key(|&i| (self.jobs[i].next_fire, i));

        for &i in &due {
            self.jobs[i].phase = JobPhase::Due;
        }

        let mut fired = Vec::with_capacity(due.len());
        for i in due {
            self.fire(i, now).await;
            fired.push(self.jobs[i].kind.clone());
        }
        fired
    }

    // --- private helpers ---------------------------------------------------

    async fn fire(&mut self, index: usize, tick: NaiveDateTime) {
        self.jobs[index].phase = JobPhase::Running;
        let kind = self.jobs[index].kind.clone();
        let slot = self.jobs[index].next_fire;
        debug!(job = %self.jobs[index].name, phase = %self.jobs[index].phase, %slot, "job firing");

        let result = match kind {
            JobKind::Watering { entry } => self.water(entry, slot).await,
            JobKind::PeriodicCapture => {
                self.hooks
                    .emit(HookContext::new(HookEvent::PeriodicCapture))
                    .await;
                Ok(())
            }
            JobKind::DailySummary => {
                self.hooks.emit(self.summary_context(tick)).await;
                Ok(())
            }
        };

        // Re-arm from whenever this run finished, never earlier than the tick.
        let finished = self.clock.now().max(tick);
        let job = &mut self.jobs[index];
        job.run_count += 1;
        job.last_fired = Some(tick);
        match result {
            Ok(()) => job.last_error = None,
            Err(e) => {
                warn!(job = %job.name, error = %e, "job failed; re-armed for its next slot");
                job.last_error = Some(e.to_string());
            }
        }
        job.next_fire = compute_next_fire(&job.cadence, finished);
        job.phase = JobPhase::Idle;
        debug!(job = %job.name, next_fire = %job.next_fire, "job re-armed");
    }

    /// Water the occurrence the job was armed for, which may be yesterday's
    /// if the loop was stalled across midnight.
    async fn water(&mut self, index: usize, slot: NaiveDateTime) -> Result<()> {
        let now = self.clock.now();
        let due = resolve_slot(now, &self.entries[index], slot.date(), self.executor.state());
        match due {
            Some(occurrence) => {
                self.executor.execute(&occurrence).await?;
                Ok(())
            }
            None => {
                let id = &self.entries[index].id;
                info!(schedule = %id, %now, "watering slot reached but not due; skipping");
                Ok(())
            }
        }
    }

    fn summary_context(&self, tick: NaiveDateTime) -> HookContext {
        let waterings: serde_json::Map<String, serde_json::Value> = self
            .executor
            .state()
            .iter()
            .map(|(id, at)| (id.to_string(), serde_json::Value::String(format_timestamp(at))))
            .collect();
        HookContext::new(HookEvent::DailySummary).with_payload(serde_json::json!({
            "date": tick.date().to_string(),
            "last_watered": waterings,
        }))
    }
}

/// Resolves once `true` is broadcast or the sender is dropped.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WateringState;
    use crate::store::StateStore;
    use crate::error::PersistenceError;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::sync::Mutex;
    use verdant_core::{ActuationError, FakeClock};
    use verdant_hooks::{HookDefinition, HookHandler};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Pump {
        log: Log,
        fail: bool,
    }

    impl Actuator for Pump {
        fn activate(&mut self) -> std::result::Result<(), ActuationError> {
            self.log.lock().unwrap().push("on".to_string());
            if self.fail {
                return Err(ActuationError::Activate("gpio busy".to_string()));
            }
            Ok(())
        }
        fn deactivate(&mut self) -> std::result::Result<(), ActuationError> {
            self.log.lock().unwrap().push("off".to_string());
            Ok(())
        }
    }

    struct MemoryStore;

    impl StateStore for MemoryStore {
        fn load(&self) -> std::result::Result<WateringState, PersistenceError> {
            Ok(WateringState::new())
        }
        fn save(&mut self, _state: &WateringState) -> std::result::Result<(), PersistenceError> {
            Ok(())
        }
        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    struct Recorder(Log);

    #[async_trait::async_trait]
    impl HookHandler for Recorder {
        async fn handle(&self, ctx: &HookContext) -> verdant_hooks::Result<()> {
            self.0.lock().unwrap().push(ctx.label.clone());
            Ok(())
        }
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn entry(h: u32, m: u32) -> ScheduleEntry {
        ScheduleEntry::new(TimeOfDay::new(h, m).unwrap(), 60, 1)
    }

    fn engine(
        entries: Vec<ScheduleEntry>,
        clock: &FakeClock,
        plan: JobPlan,
        log: &Log,
        fail: bool,
    ) -> SchedulerEngine<Pump, FakeClock> {
        let hooks = HookEngine::new();
        let recorder: Arc<dyn HookHandler> = Arc::new(Recorder(Arc::clone(log)));
        for event in [HookEvent::PeriodicCapture, HookEvent::DailySummary] {
            hooks.register(HookDefinition::new(format!("rec-{event}"), event, Arc::clone(&recorder)));
        }
        let hooks = Arc::new(hooks);
        let pump = Pump {
            log: Arc::clone(log),
            fail,
        };
        let executor = WateringExecutor::with_state(
            pump,
            Arc::clone(&hooks),
            Box::new(MemoryStore),
            WateringState::new(),
        );
        SchedulerEngine::new(entries, executor, hooks, clock.clone(), plan)
    }

    #[test]
    fn arms_jobs_in_registration_order() {
        let clock = FakeClock::new(at(16, 6, 0));
        let log: Log = Arc::default();
        let plan = JobPlan {
            capture_interval: Some(Duration::from_secs(1800)),
            summary_time: TimeOfDay::new(9, 0),
            ..Default::default()
        };
        let engine = engine(vec![entry(7, 0), entry(5, 0)], &clock, plan, &log, false);

        let jobs = engine.jobs();
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].next_fire, at(16, 7, 0));
        assert_eq!(jobs[1].next_fire, at(17, 5, 0)); // already past today
        assert_eq!(jobs[2].next_fire, at(16, 6, 30));
        assert_eq!(jobs[3].next_fire, at(16, 9, 0));
        assert!(jobs.iter().all(|j| j.phase == JobPhase::Idle));
        assert_eq!(engine.next_deadline(), Some(at(16, 6, 30)));
    }

    #[tokio::test(start_paused = true)]
    async fn watering_job_fires_at_start_time_and_rearms_for_tomorrow() {
        let clock = FakeClock::new(at(16, 6, 59));
        let log: Log = Arc::default();
        let mut engine = engine(vec![entry(7, 0)], &clock, JobPlan::default(), &log, false);

        assert!(engine.tick().await.is_empty());

        clock.set(at(16, 7, 0));
        let fired = engine.tick().await;

        assert_eq!(fired, vec![JobKind::Watering { entry: 0 }]);
        assert_eq!(*log.lock().unwrap(), vec!["on", "off"]);
        assert_eq!(engine.executor().state().last_watered("07:00"), Some(at(16, 7, 0)));
        assert_eq!(engine.jobs()[0].next_fire, at(17, 7, 0));
        assert_eq!(engine.jobs()[0].run_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_watering_job_skips_when_already_done_today() {
        let clock = FakeClock::new(at(16, 6, 0));
        let log: Log = Arc::default();
        let mut engine = engine(vec![entry(7, 0)], &clock, JobPlan::default(), &log, false);
        engine
            .executor_mut()
            .execute(&crate::types::Occurrence::new(&entry(7, 0), at(16, 0, 0).date()))
            .await
            .unwrap();
        log.lock().unwrap().clear();

        clock.set(at(16, 7, 0));
        let fired = engine.tick().await;

        assert_eq!(fired.len(), 1);
        assert!(log.lock().unwrap().is_empty(), "pump must not run twice");
    }

    #[tokio::test(start_paused = true)]
    async fn due_jobs_run_earliest_first_with_config_order_ties() {
        let clock = FakeClock::new(at(16, 6, 0));
        let log: Log = Arc::default();
        let plan = JobPlan {
            capture_interval: Some(Duration::from_secs(3600)), // 07:00
            summary_time: TimeOfDay::new(7, 0),
            ..Default::default()
        };
        let mut engine = engine(vec![entry(7, 0), entry(6, 30)], &clock, plan, &log, false);

        clock.set(at(16, 7, 5));
        let fired = engine.tick().await;

        assert_eq!(
            fired,
            vec![
                JobKind::Watering { entry: 1 },
                JobKind::Watering { entry: 0 },
                JobKind::PeriodicCapture,
                JobKind::DailySummary,
            ]
        );
        assert_eq!(
            *log.lock().unwrap(),
            vec!["on", "off", "on", "off", "periodic", "daily_summary"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_returns_to_idle_and_waits_for_next_slot() {
        let clock = FakeClock::new(at(16, 6, 0));
        let log: Log = Arc::default();
        let mut engine = engine(vec![entry(7, 0)], &clock, JobPlan::default(), &log, true);

        clock.set(at(16, 7, 0));
        engine.tick().await;

        let job = &engine.jobs()[0];
        assert_eq!(job.phase, JobPhase::Idle);
        assert!(job.last_error.is_some());
        assert_eq!(job.next_fire, at(17, 7, 0));
        assert!(engine.executor().state().is_empty());

        // No early retry within the same day.
        clock.set(at(16, 7, 1));
        assert!(engine.tick().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn capture_job_rearms_from_completion() {
        let clock = FakeClock::new(at(16, 6, 0));
        let log: Log = Arc::default();
        let plan = JobPlan {
            capture_interval: Some(Duration::from_secs(600)),
            ..Default::default()
        };
        let mut engine = engine(vec![entry(23, 0)], &clock, plan, &log, false);

        // Loop was busy; the capture is late but not dropped.
        clock.set(at(16, 6, 25));
        assert_eq!(engine.tick().await, vec![JobKind::PeriodicCapture]);
        assert_eq!(engine.jobs()[1].next_fire, at(16, 6, 35));

        clock.advance(ChronoDuration::minutes(10));
        assert_eq!(engine.tick().await, vec![JobKind::PeriodicCapture]);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    /// Moves the fake clock forward whenever a watering finishes, standing
    /// in for a run that took longer than planned.
    struct ClockJump(FakeClock, ChronoDuration);

    #[async_trait::async_trait]
    impl HookHandler for ClockJump {
        async fn handle(&self, _ctx: &HookContext) -> verdant_hooks::Result<()> {
            self.0.advance(self.1);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entry_passed_during_a_long_watering_runs_on_the_next_tick() {
        let clock = FakeClock::new(at(16, 6, 0));
        let log: Log = Arc::default();
        let mut engine = engine(vec![entry(7, 0), entry(7, 5)], &clock, JobPlan::default(), &log, false);
        engine.hooks.register(HookDefinition::new(
            "slow-run",
            HookEvent::AfterWatering,
            Arc::new(ClockJump(clock.clone(), ChronoDuration::minutes(10))),
        ));

        clock.set(at(16, 7, 0));
        assert_eq!(engine.tick().await, vec![JobKind::Watering { entry: 0 }]);
        assert_eq!(clock.now(), at(16, 7, 10));
        assert_eq!(engine.jobs()[0].next_fire, at(17, 7, 0));

        assert_eq!(engine.tick().await, vec![JobKind::Watering { entry: 1 }]);
        assert_eq!(*log.lock().unwrap(), vec!["on", "off", "on", "off"]);
        let state = engine.executor().state();
        assert_eq!(state.last_watered("07:00"), Some(at(16, 7, 0)));
        assert_eq!(state.last_watered("07:05"), Some(at(16, 7, 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn slot_armed_before_midnight_still_waters_after_it() {
        let clock = FakeClock::new(at(16, 23, 0));
        let log: Log = Arc::default();
        let mut engine = engine(vec![entry(23, 59)], &clock, JobPlan::default(), &log, false);
        assert_eq!(engine.jobs()[0].next_fire, at(16, 23, 59));

        // The loop was held up past midnight before it could poll.
        clock.set(at(17, 0, 5));
        assert_eq!(engine.tick().await, vec![JobKind::Watering { entry: 0 }]);
        assert_eq!(*log.lock().unwrap(), vec!["on", "off"]);
        assert_eq!(engine.executor().state().last_watered("23:59"), Some(at(16, 23, 59)));
        assert_eq!(engine.jobs()[0].next_fire, at(17, 23, 59));

        clock.set(at(17, 23, 59));
        engine.tick().await;
        assert_eq!(engine.executor().state().last_watered("23:59"), Some(at(17, 23, 59)));
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_catches_up_then_stops_on_shutdown_with_pump_off() {
        let clock = FakeClock::new(at(16, 9, 0));
        let log: Log = Arc::default();
        let engine = engine(vec![entry(7, 0)], &clock, JobPlan::default(), &log, false);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(engine.run(rx));
        tokio::time::sleep(Duration::from_secs(120)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // catch-up on, catch-up off, shutdown off
        assert_eq!(*log.lock().unwrap(), vec!["on", "off", "off"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_watering_switches_pump_off() {
        let clock = FakeClock::new(at(16, 9, 0));
        let log: Log = Arc::default();
        let engine = engine(vec![entry(7, 0)], &clock, JobPlan::default(), &log, false);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(engine.run(rx));
        // Catch-up watering runs for 60s; stop it halfway.
        tokio::time::sleep(Duration::from_secs(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.first().map(String::as_str), Some("on"));
        assert!(log.iter().skip(1).all(|s| s == "off") && log.len() >= 2);
    }
}
