use std::sync::RwLock;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::HookError;
use crate::types::{HookContext, HookDefinition, HookReport};

/// Central registry and dispatcher for all hooks in the daemon.
///
/// A single instance is shared across the process (`Arc<HookEngine>`). Hook
/// failures never reach the caller: `emit` logs them and reports a count.
pub struct HookEngine {
    /// Sorted by priority ascending after every registration.
    hooks: RwLock<Vec<HookDefinition>>,
}

impl HookEngine {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Register a hook. Re-sorts the list so priority order is always correct.
    pub fn register(&self, hook: HookDefinition) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        debug!(name = %hook.name, event = %hook.event, "hook registered");
        hooks.push(hook);
        // Stable sort preserves registration order within the same priority.
        hooks.sort_by_key(|h| h.priority);
    }

    /// Run every hook registered for `ctx.event`, serially, in priority order.
    ///
    /// Each call is bounded by its definition's timeout. Errors and timeouts
    /// are logged and counted, then the next hook runs.
    pub async fn emit(&self, ctx: HookContext) -> HookReport {
        // Snapshot the matching hooks so the lock is not held across awaits.
        let matching: Vec<HookDefinition> = {
            let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
            hooks.iter().filter(|h| h.event == ctx.event).cloned().collect()
        };

        let mut report = HookReport::default();
        for hook in matching {
            let t = Instant::now();
            let result = match tokio::time::timeout(hook.timeout, hook.handler.handle(&ctx)).await
            {
                Ok(result) => result,
                Err(_elapsed) => Err(HookError::Timeout {
                    ms: hook.timeout.as_millis() as u64,
                }),
            };
            let elapsed_ms = t.elapsed().as_millis() as u64;
            report.ran += 1;

            match result {
                Ok(()) => {
                    debug!(hook = %hook.name, event = %ctx.event, duration_ms = elapsed_ms, "hook completed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        hook = %hook.name,
                        event = %ctx.event,
                        duration_ms = elapsed_ms,
                        error = %e,
                        "hook failed; continuing"
                    );
                }
            }
        }
        report
    }
}

impl Default for HookEngine {
    fn default() -> Self {
        Self::new()
    }
}
