//! External command task.
//!
//! [`CommandTask`] runs one program through the console of the context it is
//! called with, so it picks up that console's environment, working directory,
//! verbosity and the context's cancellation.
//!
//! ```rust
//! use errand::{CommandTask, Task};
//! use std::time::Duration;
//!
//! let sources = CommandTask::builder("find")
//!     .name("list rust sources")
//!     .args([".", "-name", "*.rs"])
//!     .build();
//! assert_eq!(sources.name(), "list rust sources");
//!
//! let fetch = CommandTask::builder("curl")
//!     .args(["-s", "https://example.com/health"])
//!     .env("NO_COLOR", "1")
//!     .timeout(Duration::from_secs(30))
//!     .build();
//! assert_eq!(fetch.name(), "curl");
//! ```
//!
//! A non-zero exit fails with [`TaskError::CommandFailed`]; an elapsed
//! timeout fails with [`TaskError::Failed`] and kills the child.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

use crate::console::format_command_with_env;
use crate::core::context::Context;
use crate::core::environment::Environment;
use crate::core::error::TaskError;
use crate::core::task::Task;
use crate::core::types::TaskId;

/// A task that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    id: TaskId,
    program: String,
    args: Vec<String>,
    environment: Environment,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandTask {
    /// Create a new builder for a command task.
    pub fn builder(program: impl Into<String>) -> CommandTaskBuilder {
        CommandTaskBuilder::new(program)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory override.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The command line with this task's own variables in front.
    pub fn command_line(&self) -> String {
        command_line(&self.environment, &self.program, &self.args)
    }
}

#[async_trait]
impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        self.id.clone()
    }

    async fn run(&self, ctx: &Context) -> Result<(), TaskError> {
        // Task-level variables and directory take precedence over the console's.
        let mut env = ctx.console().env().clone();
        env.merge(&self.environment);
        let mut console = ctx.console().clone().with_env(env);
        if let Some(dir) = &self.working_dir {
            console = console.with_dir(dir.clone());
        }

        let execution = console.run(ctx.cancellation(), &self.program, &self.args);
        match self.timeout {
            Some(duration) => timeout(duration, execution).await.map_err(|_| {
                TaskError::failed(format!(
                    "{} timed out after {:?}",
                    self.command_line(),
                    duration
                ))
            })?,
            None => execution.await,
        }
    }

    fn help(&self, command: &str) -> Option<String> {
        Some(format!("COMMAND: {}\nRUNS: {}", command, self.command_line()))
    }
}

/// Builder for creating `CommandTask` instances.
#[derive(Debug, Clone)]
pub struct CommandTaskBuilder {
    name: Option<String>,
    id: Option<TaskId>,
    program: String,
    args: Vec<String>,
    environment: Environment,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandTaskBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: None,
            id: None,
            program: program.into(),
            args: Vec::new(),
            environment: Environment::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the task name. Defaults to the program.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the identity. Defaults to the full command line including this
    /// task's variables, so two tasks running the same command are
    /// deduplicated.
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable for this command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.set(key, value);
        self
    }

    /// Merge environment variables for this command.
    pub fn environment(mut self, env: Environment) -> Self {
        self.environment.merge(&env);
        self
    }

    /// Run in `dir` instead of the console's directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Fail if the command runs longer than `duration`.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Build the task.
    pub fn build(self) -> CommandTask {
        let command_line = command_line(&self.environment, &self.program, &self.args);
        CommandTask {
            name: self.name.unwrap_or_else(|| self.program.clone()),
            id: self.id.unwrap_or_else(|| TaskId::new(command_line)),
            program: self.program,
            args: self.args,
            environment: self.environment,
            working_dir: self.working_dir,
            timeout: self.timeout,
        }
    }
}

fn command_line(env: &Environment, program: &str, args: &[String]) -> String {
    format_command_with_env(env.iter(), program, args)
}
