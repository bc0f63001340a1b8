use std::fmt;
use tracing::{info, warn};

use super::registry::CapabilityRegistry;
use crate::kernel::event::{AssistantState, InputSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Warning => "warning",
            NotifyLevel::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyTarget {
    /// Answer on the channel the command arrived from.
    Reply(InputSource),
    /// Every front end.
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub level: NotifyLevel,
    pub target: NotifyTarget,
}

/// Output side of the core: UI toasts, messenger bridges and the like live behind this.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier used when no front end is attached: everything goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            NotifyLevel::Info => info!(target: "aiko::notify", severity = %n.level, "{:?}: {}", n.target, n.text),
            NotifyLevel::Warning | NotifyLevel::Error => {
                warn!(target: "aiko::notify", severity = %n.level, "{:?}: {}", n.target, n.text)
            }
        }
    }
}

/// Explicit context handed to every capability hook.
pub struct Context<'a> {
    pub state: AssistantState,
    pub input_source: InputSource,
    notifier: &'a dyn Notifier,
    registry: &'a CapabilityRegistry,
}

impl<'a> Context<'a> {
    pub fn new(
        state: AssistantState,
        input_source: InputSource,
        notifier: &'a dyn Notifier,
        registry: &'a CapabilityRegistry,
    ) -> Self {
        Self {
            state,
            input_source,
            notifier,
            registry,
        }
    }

    /// Answer on the channel the current command came from.
    pub fn reply(&self, text: impl Into<String>) {
        self.reply_with(text, NotifyLevel::Info);
    }

    pub fn reply_with(&self, text: impl Into<String>, level: NotifyLevel) {
        self.notifier.notify(Notification {
            text: text.into(),
            level,
            target: NotifyTarget::Reply(self.input_source),
        });
    }

    /// Send to every attached front end.
    pub fn broadcast(&self, text: impl Into<String>, level: NotifyLevel) {
        self.notifier.notify(Notification {
            text: text.into(),
            level,
            target: NotifyTarget::Broadcast,
        });
    }

    pub fn capabilities(&self) -> &'a CapabilityRegistry {
        self.registry
    }
}
