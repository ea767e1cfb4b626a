//! Task error types.
//!
//! [`TaskError`] is what task bodies return and what the run-once tracker
//! caches, so it is `Clone`: every caller waiting on a task receives the
//! same error value.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by task bodies and by the execution engine.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// Task failed with a message.
    #[error("{0}")]
    Failed(String),

    /// External command exited unsuccessfully.
    #[error("{command} exited with code {code}")]
    CommandFailed { command: String, code: i32 },

    /// The context was cancelled while the task was running.
    #[error("cancelled")]
    Cancelled,

    /// The task body panicked.
    #[error("panic: {0}")]
    Panicked(String),

    /// A value handed to the engine could not be used as a task.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Request to exit the process with a code and no message.
    ///
    /// Process exit codes are a byte: codes outside `0..=255` end the
    /// process with code 1, the same as any other failure.
    #[error("exit code {0}")]
    Exit(i32),

    /// A failure attributed to the task that produced it.
    #[error(transparent)]
    Task(Box<TaskFailure>),

    /// Two or more failures from a concurrent run.
    #[error(transparent)]
    Multiple(Errors),

    /// Any other error.
    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Create a [`TaskError::Failed`] from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TaskError::Other(Arc::new(err))
    }

    /// Attribute this error to a task.
    pub fn attributed(self, task: impl Into<String>) -> Self {
        TaskError::Task(Box::new(TaskFailure {
            task: task.into(),
            error: self,
        }))
    }

    /// The exit code requested by a [`TaskError::Exit`], looking through attribution.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskError::Exit(code) => Some(*code),
            TaskError::Task(failure) => failure.error.exit_code(),
            _ => None,
        }
    }

    /// The attributed failures carried by this error, in report order.
    pub fn failures(&self) -> Vec<&TaskFailure> {
        match self {
            TaskError::Task(failure) => vec![failure.as_ref()],
            TaskError::Multiple(errors) => errors.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::other(err)
    }
}

impl From<super::context::ContextError> for TaskError {
    fn from(err: super::context::ContextError) -> Self {
        TaskError::other(err)
    }
}

impl From<super::settings::SettingsError> for TaskError {
    fn from(err: super::settings::SettingsError) -> Self {
        TaskError::other(err)
    }
}

/// An error attributed to the task that produced it.
#[derive(Debug, Clone, Error)]
#[error("{task}: {error}")]
pub struct TaskFailure {
    /// Resolved name of the failing task.
    pub task: String,
    /// What went wrong.
    #[source]
    pub error: TaskError,
}

/// Ordered failures collected from a concurrent run.
///
/// Only failed tasks are present; the order mirrors the order the tasks were
/// handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct Errors(Vec<TaskFailure>);

impl Errors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure.
    pub fn push(&mut self, failure: TaskFailure) {
        self.0.push(failure);
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no task failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the failures in report order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskFailure> {
        self.0.iter()
    }

    /// Collapse into a result: none is success, one is that failure, more is
    /// [`TaskError::Multiple`].
    pub fn into_result(mut self) -> Result<(), TaskError> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(TaskError::Task(Box::new(self.0.remove(0)))),
            _ => Err(TaskError::Multiple(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{}", only),
            many => write!(f, "{} errors", many.len()),
        }
    }
}

impl std::error::Error for Errors {}

impl FromIterator<TaskFailure> for Errors {
    fn from_iter<I: IntoIterator<Item = TaskFailure>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Errors {
    type Item = TaskFailure;
    type IntoIter = std::vec::IntoIter<TaskFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
