//! Testing utilities for users of the errand library.
//!
//! - [`CountingTask`]: counts how often its body actually ran
//! - [`FailingTask`]: always fails with a fixed error
//! - [`PanickingTask`]: panics when run
//! - [`TaskLog`]: tasks that record the order they ran in
//! - [`CapturedConsole`]: a console whose output can be inspected
//!
//! # Example
//!
//! ```
//! use errand::testing::{CapturedConsole, CountingTask};
//!
//! # tokio_test_block(async {
//! let console = CapturedConsole::new();
//! let ctx = console.context();
//! let build = CountingTask::new("build");
//!
//! errand::run(&ctx, [build.task(), build.task()]).await.unwrap();
//! assert_eq!(build.count(), 1);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::console::{Captured, Console, Input, Output};
use crate::core::context::Context;
use crate::core::environment::Environment;
use crate::core::error::TaskError;
use crate::core::task::Task;
use crate::core::types::TaskId;

/// A task that succeeds and counts its executions.
///
/// Clones share the counter and the identity.
#[derive(Debug, Clone)]
pub struct CountingTask {
    name: String,
    runs: Arc<AtomicU32>,
    delay: Option<Duration>,
}

impl CountingTask {
    /// Create a counting task; its identity is its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs: Arc::new(AtomicU32::new(0)),
            delay: None,
        }
    }

    /// Sleep for `delay` before finishing, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times the body ran.
    pub fn count(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// A shared handle to hand to the engine.
    pub fn task(&self) -> Arc<dyn Task> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Task for CountingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        TaskId::new(&self.name)
    }

    async fn run(&self, _ctx: &Context) -> Result<(), TaskError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A task that always fails with the same error.
#[derive(Debug, Clone)]
pub struct FailingTask {
    name: String,
    error: TaskError,
    runs: Arc<AtomicU32>,
}

impl FailingTask {
    /// Fail with [`TaskError::Failed`] carrying `message`.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_error(name, TaskError::failed(message))
    }

    /// Fail with a specific error.
    pub fn with_error(name: impl Into<String>, error: TaskError) -> Self {
        Self {
            name: name.into(),
            error,
            runs: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Ask the process to exit with `code`.
    pub fn exit(name: impl Into<String>, code: i32) -> Self {
        Self::with_error(name, TaskError::Exit(code))
    }

    /// How many times the body ran.
    pub fn count(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// A shared handle to hand to the engine.
    pub fn task(&self) -> Arc<dyn Task> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        TaskId::new(&self.name)
    }

    async fn run(&self, _ctx: &Context) -> Result<(), TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A task that panics with a message.
#[derive(Debug, Clone)]
pub struct PanickingTask {
    name: String,
    message: String,
}

impl PanickingTask {
    /// Create a task that panics with `message`.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// A shared handle to hand to the engine.
    pub fn task(&self) -> Arc<dyn Task> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Task for PanickingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        TaskId::new(&self.name)
    }

    async fn run(&self, _ctx: &Context) -> Result<(), TaskError> {
        panic!("{}", self.message)
    }
}

/// Shared record of the order tasks ran in, with the arguments each saw.
#[derive(Debug, Clone, Default)]
pub struct TaskLog {
    entries: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl TaskLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A task named `name` that appends its name and context arguments to the log.
    pub fn task(&self, name: impl Into<String>) -> Arc<dyn Task> {
        Arc::new(LoggingTask {
            name: name.into(),
            log: self.clone(),
        })
    }

    /// Names of the tasks that ran, in order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Names and arguments of the tasks that ran, in order.
    pub fn entries(&self) -> Vec<(String, Vec<String>)> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Vec<String>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct LoggingTask {
    name: String,
    log: TaskLog,
}

#[async_trait]
impl Task for LoggingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        TaskId::new(&self.name)
    }

    async fn run(&self, ctx: &Context) -> Result<(), TaskError> {
        self.log
            .lock()
            .push((self.name.clone(), ctx.args().to_vec()));
        Ok(())
    }
}

/// A console writing to in-memory buffers.
#[derive(Debug, Clone)]
pub struct CapturedConsole {
    console: Console,
    stdout: Captured,
    stderr: Captured,
}

impl CapturedConsole {
    /// Capture both streams, with an empty environment.
    pub fn new() -> Self {
        Self::with_env(Environment::new())
    }

    /// Capture both streams, with `env` as the environment. Subprocesses
    /// read no stdin.
    pub fn with_env(env: Environment) -> Self {
        let (out, stdout) = Output::capture();
        let (err, stderr) = Output::capture();
        Self {
            console: Console::new(env, out, err).with_stdin(Input::Null),
            stdout,
            stderr,
        }
    }

    /// The console.
    pub fn console(&self) -> Console {
        self.console.clone()
    }

    /// A fresh root context around the console.
    pub fn context(&self) -> Context {
        Context::new(self.console())
    }

    /// Everything written to stdout.
    pub fn stdout(&self) -> String {
        self.stdout.contents()
    }

    /// Everything written to stderr.
    pub fn stderr(&self) -> String {
        self.stderr.contents()
    }
}

impl Default for CapturedConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{run, start};

    #[tokio::test]
    async fn test_counting_task_clones_share_count() {
        let task = CountingTask::new("count");
        let ctx = CapturedConsole::new().context();

        run(&ctx, [task.task()]).await.unwrap();
        run(&CapturedConsole::new().context(), [task.clone().task()])
            .await
            .unwrap();

        assert_eq!(task.count(), 2);
    }

    #[tokio::test]
    async fn test_failing_task() {
        let task = FailingTask::new("lint", "style violations");

        let err = run(&CapturedConsole::new().context(), [task.task()])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "lint: style violations");
        assert_eq!(task.count(), 1);
        assert_eq!(FailingTask::exit("quit", 4).task().name(), "quit");
    }

    #[tokio::test]
    async fn test_panicking_task() {
        let task = PanickingTask::new("explode", "kaboom");

        let err = start(&CapturedConsole::new().context(), [task.task()])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "explode: panic: kaboom");
    }

    #[tokio::test]
    async fn test_task_log_records_order_and_args() {
        let log = TaskLog::new();
        let ctx = CapturedConsole::new()
            .context()
            .with_args(vec!["x".to_string()]);

        run(&ctx, [log.task("a"), log.task("b")]).await.unwrap();

        assert_eq!(log.names(), vec!["a", "b"]);
        assert_eq!(log.entries()[0].1, vec!["x".to_string()]);
    }

    #[test]
    fn test_captured_console() {
        let console = CapturedConsole::with_env(Environment::new().with_var("K", "v"));

        console.console().print("out").unwrap();
        console.console().print_error("err").unwrap();

        assert_eq!(console.stdout(), "out\n");
        assert_eq!(console.stderr(), "err\n");
        assert_eq!(console.console().env().get("K"), Some("v"));
    }
}
