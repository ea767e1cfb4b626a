//! Task execution.
//!
//! [`run`] and [`start`] drive lists of tasks through the run-once scope of a
//! context; [`CommandTask`] wraps an external program as a task.

mod command;
mod engine;

pub use command::{CommandTask, CommandTaskBuilder};
pub use engine::{run, start};
