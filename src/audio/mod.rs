//! Microphone input: driver backends, frame re-blocking and the reconnecting capture loop.

pub mod backend;
pub mod capture;
pub mod processing;
pub mod replay;

pub use backend::{CpalBackend, InputBackend, StreamGuard};
pub use capture::{AudioCaptureService, StatusCallback};
pub use processing::{FrameSink, Heartbeat, StreamSpec};
pub use replay::WavReplayBackend;
