pub mod audio;
pub mod capability;
pub mod config;
pub mod error;
pub mod intent;
pub mod kernel;
pub mod lifecycle;
pub mod scheduler;
pub mod speech;
pub mod supervisor;

// Re-export specific items for convenient access
pub use config::AikoConfig;
pub use error::{Error, Result};
pub use kernel::reactor::Reactor;
pub use supervisor::Supervisor;
