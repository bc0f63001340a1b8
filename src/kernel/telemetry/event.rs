use serde::{Deserialize, Serialize};

use crate::kernel::event::AssistantState;

/// Which candidate source ended a successful route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    Classifier,
    Keyword,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    PhraseRecognized,

    /// `triggered` is false when the phrase arrived inside an open window.
    Addressed { triggered: bool },

    RouteCompleted { handled_by: Option<RouteKind> },

    CapabilityFailed,

    CaptureStatus { ok: bool },

    WorkerRestarted { worker: String, attempt: u32 },

    StateTransition { from: AssistantState, to: AssistantState },

    SessionSummary {
        duration_secs: f64,
        phrases: u64,
        commands_handled: u64,
        route_success_ratio: f32,
        capture_reconnects: u64,
        worker_restarts: u64,
    },
}
