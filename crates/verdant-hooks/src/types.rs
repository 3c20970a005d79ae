use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Every point in the daemon where an external collaborator is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// Process finished initialising; fired once before the loop starts.
    Startup,
    /// Immediately before the pump is switched on.
    BeforeWatering,
    /// Halfway through the pump run.
    WateringMidpoint,
    /// After the pump has been switched off.
    AfterWatering,
    /// The periodic capture job fired.
    PeriodicCapture,
    /// The daily summary job fired.
    DailySummary,
}

impl HookEvent {
    /// Default label for the event, used as the photo file prefix.
    pub fn label(&self) -> &'static str {
        match self {
            HookEvent::Startup => "startup",
            HookEvent::BeforeWatering => "before_watering",
            HookEvent::WateringMidpoint => "halfway_watering",
            HookEvent::AfterWatering => "after_watering",
            HookEvent::PeriodicCapture => "periodic",
            HookEvent::DailySummary => "daily_summary",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The runtime context passed into every hook invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    pub event: HookEvent,
    pub label: String,
    /// Set for watering events: the schedule entry being run.
    pub schedule_id: Option<String>,
    /// Free-form extras (duration, counts) for collaborators that want them.
    pub payload: serde_json::Value,
}

impl HookContext {
    pub fn new(event: HookEvent) -> Self {
        Self {
            event,
            label: event.label().to_string(),
            schedule_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_schedule(mut self, schedule_id: impl Into<String>) -> Self {
        self.schedule_id = Some(schedule_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Outcome of one `emit`: how many hooks ran and how many of them failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookReport {
    pub ran: usize,
    pub failed: usize,
}

/// Asynchronous hook handler.
///
/// Handlers talk to slow collaborators (camera, mail); the engine bounds each
/// call with the definition's timeout.
#[async_trait::async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, ctx: &HookContext) -> Result<()>;
}

/// A registered hook binding a name, event filter and handler.
#[derive(Clone)]
pub struct HookDefinition {
    /// Unique name used for deregistration and log correlation.
    pub name: String,
    pub event: HookEvent,
    pub handler: Arc<dyn HookHandler>,
    /// Lower value = earlier execution. Ties broken by registration order.
    pub priority: i32,
    pub timeout: Duration,
}

impl HookDefinition {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(name: impl Into<String>, event: HookEvent, handler: Arc<dyn HookHandler>) -> Self {
        Self {
            name: name.into(),
            event,
            handler,
            priority: 0,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
