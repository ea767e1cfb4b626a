//! Command resolution errors.

use thiserror::Error;

use crate::core::error::TaskError;
use crate::core::settings::SettingsError;

/// A task's parser rejected its arguments.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Arguments did not match the declared flags.
    #[error("{0}")]
    Invalid(String),

    /// A flag value could not be converted to the declared type.
    #[error("invalid value {value:?} for flag --{flag}: {message}")]
    InvalidValue {
        flag: String,
        value: String,
        message: String,
    },
}

/// Errors returned while resolving and running a command line.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// No registered name matches the arguments.
    #[error("unknown command {0:?}; try \"help\" for a list of commands")]
    UnknownCommand(String),

    /// A task's settings could not be applied from the environment.
    #[error("{source} in {task:?}")]
    Settings {
        task: String,
        #[source]
        source: SettingsError,
    },

    /// A task's parser rejected its arguments.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Help was requested for a topic that is not a registered name.
    #[error("no help available for {0:?}")]
    NoHelp(String),

    /// A binding was registered without a usable name.
    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// A planned task failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl CommandError {
    /// The exit code a task asked for, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Task(err) => err.exit_code(),
            _ => None,
        }
    }
}
