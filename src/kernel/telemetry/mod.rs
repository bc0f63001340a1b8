//! In-memory session telemetry.
//!
//! Telemetry is write-only from the pipeline's point of view: nothing in the
//! decision path reads it back. Events carry counts and tags, never phrase text
//! or audio.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{RouteKind, TelemetryEvent};
pub use metrics::{SessionTotals, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
