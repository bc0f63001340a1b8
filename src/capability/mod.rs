//! Capability interface consumed by the dispatcher and the scheduler.
//!
//! Capabilities are registered once at startup through
//! [`CapabilityRegistry::builder`] and never mutated by the core afterwards.

pub mod builtin;
pub mod context;
pub mod registry;

pub use context::{Context, LogNotifier, Notification, NotifyLevel, NotifyTarget, Notifier};
pub use registry::{CapabilityId, CapabilityRegistry, RegistryBuilder};

use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A unit of command-handling logic.
///
/// Only `execute` is required. Hooks return `anyhow::Result`; an `Err` or a
/// panic is logged by the caller and counted as a rejection.
pub trait Capability: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Try to handle `text`. `Ok(true)` claims the phrase and stops the cascade.
    fn execute(&self, text: &str, ctx: &Context<'_>) -> anyhow::Result<bool>;

    /// Keyword hints matched against the head of a phrase.
    fn triggers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Example phrases for the intent classifier.
    fn samples(&self) -> Vec<String> {
        Vec::new()
    }

    /// Scheduler routing key for tasks this capability owns.
    fn task_type(&self) -> Option<&str> {
        None
    }

    /// Called periodically from the main loop.
    fn on_tick(&self, _ctx: &Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a scheduled task of `task_type` comes due.
    fn on_schedule(&self, _payload: &Value, _ctx: &Context<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Run a capability hook, folding errors and panics into one `Err(String)`.
pub(crate) fn isolate<T>(hook: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
