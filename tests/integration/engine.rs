//! Execution engine integration tests.
//!
//! Tests that verify run-once behaviour across sequential, concurrent and
//! nested calls sharing one scope.

use errand::testing::{CountingTask, FailingTask, PanickingTask, TaskLog};
use errand::{FnTask, Task, TaskError, run, start};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{captured, failed_tasks, wait_until};

/// A task that runs `inner` through the engine.
fn calls(name: &str, inner: Arc<dyn Task>, concurrently: bool) -> Arc<dyn Task> {
    FnTask::new(name, move |ctx| {
        let inner = Arc::clone(&inner);
        async move {
            if concurrently {
                start(&ctx, [inner]).await
            } else {
                run(&ctx, [inner]).await
            }
        }
    })
    .shared()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nested_concurrent_callers_share_one_run() {
    let (_console, ctx) = captured();
    let shared = CountingTask::new("compile").with_delay(Duration::from_millis(30));

    let lint = calls("lint", shared.task(), false);
    let test = calls("test", shared.task(), true);
    let docs = calls("docs", shared.task(), false);

    start(&ctx, [lint, test, docs]).await.unwrap();

    assert_eq!(shared.count(), 1);
}

#[tokio::test]
async fn test_mixed_sequential_and_concurrent_calls() {
    let (_console, ctx) = captured();
    let task = CountingTask::new("fetch");

    start(&ctx, [task.task(), task.task()]).await.unwrap();
    run(&ctx, [task.task()]).await.unwrap();
    start(&ctx, [task.task()]).await.unwrap();

    assert_eq!(task.count(), 1);
}

#[tokio::test]
async fn test_sequential_stops_and_later_tasks_never_run() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let broken = FailingTask::new("t2", "broken");

    let err = run(&ctx, [log.task("t1"), broken.task(), log.task("t3"), log.task("t4")])
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "t2: broken");
    assert_eq!(log.names(), vec!["t1"]);
}

#[tokio::test]
async fn test_concurrent_runs_everything_and_reports_in_input_order() {
    let (_console, ctx) = captured();
    let ok = CountingTask::new("ok");
    let slow_failure = FnTask::new("slow", |_ctx| async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Err::<(), _>(TaskError::failed("late"))
    })
    .shared();

    let err = start(
        &ctx,
        [
            slow_failure,
            ok.task(),
            PanickingTask::new("panicky", "bad state").task(),
            FailingTask::new("fast", "early").task(),
        ],
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "3 errors");
    assert_eq!(failed_tasks(&err), vec!["slow", "panicky", "fast"]);
    let messages: Vec<_> = err.failures().iter().map(|f| f.error.to_string()).collect();
    assert_eq!(messages, vec!["late", "panic: bad state", "early"]);
    assert_eq!(ok.count(), 1);
}

#[tokio::test]
async fn test_failure_inside_nested_run_is_attributed_twice() {
    let (_console, ctx) = captured();
    let inner = FailingTask::new("check-links", "dead link").task();
    let outer = calls("check", inner, false);

    let err = run(&ctx, [outer]).await.unwrap_err();

    assert_eq!(err.to_string(), "check: check-links: dead link");
}

#[tokio::test]
async fn test_failure_is_cached_for_later_callers() {
    let (_console, ctx) = captured();
    let failing = FailingTask::new("migrate", "locked");

    let first = run(&ctx, [failing.task()]).await.unwrap_err();
    let second = start(&ctx, [failing.task()]).await.unwrap_err();

    assert_eq!(first.to_string(), "migrate: locked");
    assert_eq!(second.to_string(), "migrate: locked");
    assert_eq!(failing.count(), 1);
}

#[tokio::test]
async fn test_invalid_task_rejected_before_anything_runs() {
    let (_console, ctx) = captured();
    let task = CountingTask::new("fine");
    let unnamed = FnTask::new("", |_ctx| async { Ok::<(), TaskError>(()) }).shared();

    let err = start(&ctx, [task.task(), unnamed]).await.unwrap_err();

    assert!(matches!(err, TaskError::InvalidTask(_)));
    assert_eq!(task.count(), 0);
}

#[tokio::test]
async fn test_cancellation_reaches_running_task() {
    let (_console, ctx) = captured();
    let started = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&started);
    let waiter = FnTask::new("wait", move |ctx| {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            ctx.cancelled().await;
            Err::<(), _>(TaskError::Cancelled)
        }
    })
    .shared();

    let handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { start(&ctx, [waiter]).await }
    });
    wait_until(
        || started.load(std::sync::atomic::Ordering::SeqCst),
        Duration::from_secs(2),
    )
    .await;
    ctx.cancellation().cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "wait: cancelled");
}

#[cfg(unix)]
#[tokio::test]
async fn test_tasks_run_commands_through_their_console() {
    let (console, ctx) = captured();
    let ctx = ctx.with_console(|c| c.with_env(errand::Environment::from_process()));
    let echo = FnTask::new("echo", |ctx| async move {
        let text = ctx.eval("printf", &["%s", "captured"]).await?;
        ctx.print(text.to_uppercase())
    })
    .shared();

    run(&ctx, [echo]).await.unwrap();

    assert_eq!(console.stdout(), "CAPTURED\n");
    assert!(console.stderr().starts_with(">> printf %s captured\n"));
}
