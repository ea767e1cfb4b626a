//! Environment-sourced settings.
//!
//! A [`Setting`] binds a typed [`SettingVar`] to an environment variable name.
//! The command resolver applies a task's settings from the console
//! environment before the task is planned; tasks read the variables when they
//! run.
//!
//! ```
//! use errand::{Environment, Setting, SettingVar, Settings};
//!
//! let jobs = SettingVar::new(4u32);
//! let settings = Settings::new().with(Setting::new(&jobs, "BUILD_JOBS", "parallel build jobs"));
//!
//! let env = Environment::new().with_var("BUILD_JOBS", "8");
//! settings.apply(|name| env.lookup(name)).unwrap();
//! assert_eq!(jobs.get(), 8);
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// A value from the environment could not be assigned to its variable.
#[derive(Debug, Clone, Error)]
#[error("invalid value {value:?} for {name}: {message}")]
pub struct SettingsError {
    /// Environment variable name.
    pub name: String,
    /// Raw value found in the environment.
    pub value: String,
    /// Why the value was rejected.
    pub message: String,
}

/// A shared, typed variable that settings assign to.
///
/// Clones refer to the same storage.
pub struct SettingVar<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> SettingVar<T> {
    /// Create a variable holding `initial`, which doubles as the default shown in help.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replace the current value.
    pub fn set(&self, value: T) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Read the current value through a closure.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T: Clone> SettingVar<T> {
    /// Get a copy of the current value.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T> Clone for SettingVar<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for SettingVar<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SettingVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| f.debug_tuple("SettingVar").field(value).finish())
    }
}

/// Type-erased target a setting assigns to.
pub trait SettingTarget: Send + Sync {
    /// Parse `value` and store it.
    fn assign(&self, value: &str) -> Result<(), String>;

    /// Render the current value; empty means "no default worth showing".
    fn current(&self) -> String;
}

impl<T> SettingTarget for SettingVar<T>
where
    T: FromStr + Display + Send + Sync,
    T::Err: Display,
{
    fn assign(&self, value: &str) -> Result<(), String> {
        let parsed = value.parse::<T>().map_err(|e| e.to_string())?;
        self.set(parsed);
        Ok(())
    }

    fn current(&self) -> String {
        self.with(|value| value.to_string())
    }
}

/// One variable bound to an environment name.
#[derive(Clone)]
pub struct Setting {
    target: Arc<dyn SettingTarget>,
    name: String,
    usage: String,
}

impl Setting {
    /// Bind `var` to the environment variable `name`.
    pub fn new<T>(var: &SettingVar<T>, name: impl Into<String>, usage: impl Into<String>) -> Self
    where
        T: FromStr + Display + Send + Sync + 'static,
        T::Err: Display,
    {
        Self {
            target: Arc::new(var.clone()),
            name: name.into(),
            usage: usage.into(),
        }
    }

    /// Environment variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the setting controls.
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// Current value of the bound variable.
    pub fn current(&self) -> String {
        self.target.current()
    }

    /// One aligned help line for this setting: `(name, description)`.
    pub fn explanation(&self) -> (String, String) {
        let current = self.current();
        let description = if current.is_empty() {
            self.usage.clone()
        } else {
            format!("{} (default: {:?})", self.usage, current)
        };
        (self.name.clone(), description)
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("current", &self.current())
            .finish()
    }
}

/// Ordered list of settings.
#[derive(Debug, Clone, Default)]
pub struct Settings(Vec<Setting>);

impl Settings {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a setting.
    pub fn with(mut self, setting: Setting) -> Self {
        self.0.push(setting);
        self
    }

    /// Append a setting.
    pub fn push(&mut self, setting: Setting) {
        self.0.push(setting);
    }

    /// Number of settings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no settings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.0.iter()
    }

    /// Assign every setting whose name `lookup` resolves, stopping at the
    /// first value that cannot be parsed. Settings without a name are skipped
    /// and names the lookup does not know keep their current value.
    pub fn apply(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), SettingsError> {
        for setting in &self.0 {
            if setting.name.is_empty() {
                continue;
            }
            let Some(value) = lookup(&setting.name) else {
                continue;
            };
            setting
                .target
                .assign(&value)
                .map_err(|message| SettingsError {
                    name: setting.name.clone(),
                    value,
                    message,
                })?;
        }
        Ok(())
    }
}

impl FromIterator<Setting> for Settings {
    fn from_iter<I: IntoIterator<Item = Setting>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
