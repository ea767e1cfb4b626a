//! Run-once task execution.
//!
//! Tasks are named async units of work. Within a [`Scope`] each task body runs
//! at most once per identity, however many times and from however many
//! concurrent call sites it is requested; later callers receive the cached
//! result. [`run`] executes tasks in order and stops at the first failure,
//! [`start`] executes them concurrently and reports every failure, and
//! [`cli::App`] maps command-line arguments onto registered tasks.

pub mod cli;
pub mod console;
pub mod core;
pub mod execution;
pub mod testing;

pub use cli::{App, Binding, CommandError, Custom, Flag, FlagParser, Outcome, Parser};
pub use console::{Console, Input, Output, Verbosity};
pub use core::context::{Context, ContextError};
pub use core::environment::Environment;
pub use core::error::{Errors, TaskError, TaskFailure};
pub use core::scope::{Scope, StateMode};
pub use core::settings::{Setting, SettingVar, Settings, SettingsError};
pub use core::task::{Alias, FnTask, Task};
pub use core::types::{ScopeId, TaskId};
pub use execution::{CommandTask, CommandTaskBuilder, run, start};
