//! The decision core: trigger matching, the activation window, dispatch and the main loop step.

pub mod activation;
pub mod dispatcher;
pub mod event;
pub mod fuzz;
pub mod matcher;
pub mod reactor;
pub mod telemetry;
