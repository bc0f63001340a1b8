use std::collections::VecDeque;

use super::event::{RouteKind, TelemetryEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub phrases: u64,
    pub addressed: u64,
    pub triggered: u64,
    pub routes_handled: u64,
    pub routes_unhandled: u64,
    pub handled_by_classifier: u64,
    pub handled_by_keyword: u64,
    pub handled_by_fallback: u64,
    pub capability_failures: u64,
    pub capture_failures: u64,
    /// Failed-to-ok transitions of the microphone.
    pub capture_reconnects: u64,
    pub worker_restarts: u64,
    pub state_transitions: u64,
}

impl TelemetrySnapshot {
    pub fn route_success_ratio(&self) -> f32 {
        let total = self.routes_handled + self.routes_unhandled;
        if total == 0 {
            0.0
        } else {
            self.routes_handled as f32 / total as f32
        }
    }
}

/// Running counters that are folded one event at a time.
///
/// Keeps the microphone's last known state so a reconnect is counted even
/// when the failure that preceded it happened long before.
#[derive(Debug, Clone, Default)]
pub struct SessionTotals {
    snap: TelemetrySnapshot,
    capture_was_down: bool,
}

impl SessionTotals {
    pub fn apply(&mut self, event: &TelemetryEvent) {
        let snap = &mut self.snap;
        match event {
            TelemetryEvent::PhraseRecognized => snap.phrases += 1,
            TelemetryEvent::Addressed { triggered } => {
                snap.addressed += 1;
                if *triggered {
                    snap.triggered += 1;
                }
            }
            TelemetryEvent::RouteCompleted { handled_by } => match handled_by {
                Some(kind) => {
                    snap.routes_handled += 1;
                    match kind {
                        RouteKind::Classifier => snap.handled_by_classifier += 1,
                        RouteKind::Keyword => snap.handled_by_keyword += 1,
                        RouteKind::Fallback => snap.handled_by_fallback += 1,
                    }
                }
                None => snap.routes_unhandled += 1,
            },
            TelemetryEvent::CapabilityFailed => snap.capability_failures += 1,
            TelemetryEvent::CaptureStatus { ok } => {
                if *ok {
                    if self.capture_was_down {
                        snap.capture_reconnects += 1;
                    }
                    self.capture_was_down = false;
                } else {
                    snap.capture_failures += 1;
                    self.capture_was_down = true;
                }
            }
            TelemetryEvent::WorkerRestarted { .. } => snap.worker_restarts += 1,
            TelemetryEvent::StateTransition { .. } => snap.state_transitions += 1,
            TelemetryEvent::SessionSummary { .. } => {}
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snap.clone()
    }
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut totals = SessionTotals::default();
    for event in events {
        totals.apply(event);
    }
    totals.snapshot()
}
