//! Sequential and concurrent task execution.
//!
//! Both entry points dedupe through the scope of the calling [`Context`]: a
//! task that already completed in that scope returns its cached result, and
//! concurrent callers for the same identity share a single run.
//!
//! ```ignore
//! // Fails fast: check_links does not run if check_spelling fails.
//! errand::run(&ctx, [task!(check_spelling), task!(check_links)]).await?;
//!
//! // Runs both and reports every failure.
//! errand::start(&ctx, [task!(check_spelling), task!(check_links)]).await?;
//! ```

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span};

use crate::core::context::Context;
use crate::core::error::{Errors, TaskError, TaskFailure};
use crate::core::task::Task;

/// Run `tasks` one after another, stopping at the first failure.
///
/// The returned error is attributed to the failing task; tasks after it are
/// not started.
pub async fn run<I>(ctx: &Context, tasks: I) -> Result<(), TaskError>
where
    I: IntoIterator<Item = Arc<dyn Task>>,
{
    let tasks = normalize(tasks)?;
    for task in &tasks {
        execute(ctx, task.as_ref()).await.map_err(|err| err.attributed(task.name()))?;
    }
    Ok(())
}

/// Run `tasks` concurrently and wait for all of them.
///
/// Every task is spawned before any is awaited. Failures are reported in the
/// order the tasks were given: one failure is returned as is, two or more
/// as [`TaskError::Multiple`].
pub async fn start<I>(ctx: &Context, tasks: I) -> Result<(), TaskError>
where
    I: IntoIterator<Item = Arc<dyn Task>>,
{
    let tasks = normalize(tasks)?;
    debug!(scope = %ctx.scope().id(), count = tasks.len(), "starting tasks");

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let ctx = ctx.clone();
            let name = task.name().to_string();
            let handle = tokio::spawn(async move { execute(&ctx, task.as_ref()).await });
            (name, handle)
        })
        .collect();

    let mut errors = Errors::new();
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(TaskError::Panicked(join_err.to_string())),
        };
        if let Err(error) = result {
            errors.push(TaskFailure { task: name, error });
        }
    }
    errors.into_result()
}

fn normalize<I>(tasks: I) -> Result<Vec<Arc<dyn Task>>, TaskError>
where
    I: IntoIterator<Item = Arc<dyn Task>>,
{
    tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| {
            if task.name().trim().is_empty() {
                Err(TaskError::InvalidTask(format!("task #{} has no name", index + 1)))
            } else if task.id().is_blank() {
                Err(TaskError::InvalidTask(format!(
                    "task {:?} has no identity",
                    task.name()
                )))
            } else {
                Ok(task)
            }
        })
        .collect()
}

/// Run one task through the scope's completion cell.
async fn execute(ctx: &Context, task: &dyn Task) -> Result<(), TaskError> {
    let id = task.id();
    let scope = ctx.scope();
    let span = info_span!("task", task = %task.name(), scope = %scope.id());

    async {
        if scope.is_complete(&id) {
            debug!("cached");
        }
        let result = scope
            .run_once(&id, || async {
                debug!("running");
                match AssertUnwindSafe(task.run(ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
                }
            })
            .await;
        if let Err(err) = &result {
            debug!(error = %err, "task failed");
        }
        result
    }
    .instrument(span)
    .await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
