//! Persistent delayed tasks and the loop that fires them.

pub mod runner;
pub mod store;
pub mod tasks;

pub use runner::{TaskScheduler, TickReport};
pub use store::{SqliteTaskStore, TaskStore};
pub use tasks::{ScheduledTask, TaskStatus};
