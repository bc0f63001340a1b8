use std::collections::VecDeque;
use std::time::Duration;
use tracing::info;

use super::event::TelemetryEvent;
use super::metrics::{compute_snapshot, SessionTotals, TelemetrySnapshot};

const MAX_EVENTS: usize = 10_000;

/// Bounded event log plus running session counters.
///
/// The log keeps recent history and evicts the oldest events first. The
/// counters see every recorded event, so eviction never shrinks them.
#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<TelemetryEvent>,
    capacity: usize,
    totals: SessionTotals,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(MAX_EVENTS)),
            capacity,
            totals: SessionTotals::default(),
        }
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        self.totals.apply(&event);
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Counters for the whole session, evicted events included.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.totals.snapshot()
    }

    /// Counters over the events still held in the log.
    pub fn recent_snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.buffer)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.totals = SessionTotals::default();
    }

    /// Session aggregate, built on shutdown.
    pub fn aggregate_session(&self, duration: Duration) -> TelemetryEvent {
        let snap = self.snapshot();
        TelemetryEvent::SessionSummary {
            duration_secs: duration.as_secs_f64(),
            phrases: snap.phrases,
            commands_handled: snap.routes_handled,
            route_success_ratio: snap.route_success_ratio(),
            capture_reconnects: snap.capture_reconnects,
            worker_restarts: snap.worker_restarts,
        }
    }

    pub fn log_session_summary(&self, duration: Duration) {
        if let TelemetryEvent::SessionSummary {
            duration_secs,
            phrases,
            commands_handled,
            route_success_ratio,
            capture_reconnects,
            worker_restarts,
        } = self.aggregate_session(duration)
        {
            info!(
                duration_secs,
                phrases,
                commands_handled,
                route_success_ratio,
                capture_reconnects,
                worker_restarts,
                "Session summary"
            );
        }
    }
}
