//! Execution context handed to every task.
//!
//! A [`Context`] is cheap to clone and immutable; deriving one (`with_*`)
//! produces a new value and leaves the original untouched. It carries:
//!
//! - the [`Scope`] used to deduplicate task runs
//! - the [`Console`] (environment, working directory, outputs, verbosity)
//! - a cancellation token, tied to Ctrl-C at the program boundary
//! - the positional arguments left over by a parser
//! - named values (parsed flags, help topic, caller-supplied data)

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::error::TaskError;
use super::scope::{Scope, StateMode};
use crate::console::Console;

/// Errors that can occur when reading or writing context values.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Key was not found in the context.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Failed to deserialize value from context.
    #[error("deserialization error for key '{key}': {message}")]
    DeserializationError { key: String, message: String },

    /// Failed to serialize value for context.
    #[error("serialization error for key '{key}': {message}")]
    SerializationError { key: String, message: String },
}

/// Execution context for tasks.
#[derive(Clone)]
pub struct Context {
    scope: Arc<Scope>,
    console: Arc<Console>,
    cancellation: CancellationToken,
    args: Arc<[String]>,
    values: Arc<HashMap<String, Value>>,
}

impl Context {
    /// Create a root context with a fresh scope around `console`.
    pub fn new(console: Console) -> Self {
        Self {
            scope: Arc::new(Scope::new()),
            console: Arc::new(console),
            cancellation: CancellationToken::new(),
            args: Arc::from(Vec::new()),
            values: Arc::new(HashMap::new()),
        }
    }

    /// Create a root context attached to the process console.
    pub fn from_process() -> Self {
        Self::new(Console::from_process())
    }

    /// The scope tasks are deduplicated in.
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Derive a context whose scope relates to this one according to `mode`.
    pub fn with_state(&self, mode: StateMode) -> Self {
        Self {
            scope: self.scope.derive(mode),
            ..self.clone()
        }
    }

    /// The console tasks should use for output and subprocesses.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Derive a context with a modified console.
    pub fn with_console(&self, configure: impl FnOnce(Console) -> Console) -> Self {
        Self {
            console: Arc::new(configure(self.console.as_ref().clone())),
            ..self.clone()
        }
    }

    /// Token cancelled when the program is interrupted.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Derive a context whose token is a child of this one, so it can be
    /// cancelled on its own.
    pub fn with_child_cancellation(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Positional arguments left after parsing.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Derive a context carrying `args` as the positional arguments.
    pub fn with_args(&self, args: Vec<String>) -> Self {
        Self {
            args: Arc::from(args),
            ..self.clone()
        }
    }

    /// Derive a context with `key` set to `value`.
    pub fn with_value<T: Serialize>(&self, key: &str, value: T) -> Result<Self, ContextError> {
        let value = serde_json::to_value(value).map_err(|e| ContextError::SerializationError {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.with_raw_value(key, value))
    }

    /// Derive a context with `key` set to an already serialized value.
    pub fn with_raw_value(&self, key: &str, value: Value) -> Self {
        let mut values = self.values.as_ref().clone();
        values.insert(key.to_string(), value);
        Self {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    /// Get a value by key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::DeserializationError {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Get an optional value. Returns None if the key is missing or has another type.
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Check if a key exists in the context.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Print a line to the console's stdout.
    pub fn print(&self, line: impl std::fmt::Display) -> Result<(), TaskError> {
        Ok(self.console.print(line)?)
    }

    /// Run a command through the console, stopping it if the context is cancelled.
    pub async fn run<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<(), TaskError> {
        self.console.run(&self.cancellation, program, args).await
    }

    /// Run a command through the console and return its stdout.
    pub async fn eval<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<String, TaskError> {
        self.console.eval(&self.cancellation, program, args).await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::from_process()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("scope", &self.scope.id())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("args", &self.args)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}
