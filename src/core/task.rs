//! Task trait and function adapters.
//!
//! The [`Task`] trait is the uniform unit of work. Most tasks are plain async
//! functions wrapped with [`FnTask`] or the [`task!`](crate::task) macro,
//! which derives the task's name and identity from the function path.
//!
//! # Example
//!
//! ```ignore
//! use errand::{Context, TaskError, task};
//!
//! async fn check_links(ctx: Context) -> Result<(), TaskError> {
//!     ctx.console().print("checking links")?;
//!     Ok(())
//! }
//!
//! let check = task!(check_links);
//! assert_eq!(check.name(), "check_links");
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::context::Context;
use super::error::TaskError;
use super::types::TaskId;

/// A named, run-once unit of work.
///
/// Tasks are expected to be idempotent per identity: the engine runs a body
/// at most once for each [`TaskId`] within a scope.
#[async_trait]
pub trait Task: Send + Sync {
    /// Name used in error attribution and, unless a binding overrides it, on
    /// the command line.
    fn name(&self) -> &str;

    /// Identity the engine deduplicates on.
    fn id(&self) -> TaskId;

    /// Execute the task.
    async fn run(&self, ctx: &Context) -> Result<(), TaskError>;

    /// Optional usage text explaining the task's arguments, shown by `help <task>`
    /// when the task's parser does not provide its own.
    fn help(&self, _command: &str) -> Option<String> {
        None
    }
}

type TaskFn = dyn Fn(Context) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync;

/// A task wrapping an async function.
#[derive(Clone)]
pub struct FnTask {
    name: String,
    id: TaskId,
    func: Arc<TaskFn>,
}

impl FnTask {
    /// Wrap `func`, which receives the execution context.
    ///
    /// The identity defaults to the name; closures that share a name but not a
    /// body should be given distinct identities with [`with_id`](Self::with_id).
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let name = name.into();
        Self {
            id: TaskId::new(&name),
            name,
            func: Arc::new(move |ctx: Context| func(ctx).boxed()),
        }
    }

    /// Wrap a fallible function that does not need the context.
    pub fn without_context<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self::new(name, move |_ctx| func())
    }

    /// Wrap a function that cannot fail.
    pub fn infallible<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(name, move |_ctx| {
            let fut = func();
            async move {
                fut.await;
                Ok(())
            }
        })
    }

    /// Assign an explicit identity.
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    /// Share the task behind a trait object.
    pub fn shared(self) -> Arc<dyn Task> {
        Arc::new(self)
    }
}

#[async_trait]
impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        self.id.clone()
    }

    async fn run(&self, ctx: &Context) -> Result<(), TaskError> {
        (self.func)(ctx.clone()).await
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A task presented under another name.
///
/// The identity is the wrapped task's, so an alias and its original never both run.
#[derive(Clone)]
pub struct Alias {
    name: String,
    task: Arc<dyn Task>,
}

impl Alias {
    /// Present `task` as `name`.
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            task,
        }
    }

    /// The wrapped task.
    pub fn inner(&self) -> &Arc<dyn Task> {
        &self.task
    }
}

#[async_trait]
impl Task for Alias {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TaskId {
        self.task.id()
    }

    async fn run(&self, ctx: &Context) -> Result<(), TaskError> {
        self.task.run(ctx).await
    }

    fn help(&self, command: &str) -> Option<String> {
        self.task.help(command)
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alias")
            .field("name", &self.name)
            .field("id", &self.task.id())
            .finish()
    }
}

/// Wrap an async function `fn(Context) -> Result<(), TaskError>` as a shared task.
///
/// The name is the path as written and the identity is the path of the
/// function where it is defined, so the same function wrapped in different
/// modules is the same task.
///
/// ```ignore
/// errand::run(&ctx, [task!(check_spelling), task!(check_links)]).await?;
/// ```
#[macro_export]
macro_rules! task {
    ($func:ident) => {
        $crate::FnTask::new(stringify!($func), $func)
            .with_id(::std::any::type_name_of_val(&$func))
            .shared()
    };
    ($($segment:ident)::+) => {
        $crate::FnTask::new(stringify!($($segment)::+), $($segment)::+)
            .with_id(::std::any::type_name_of_val(&$($segment)::+))
            .shared()
    };
}
