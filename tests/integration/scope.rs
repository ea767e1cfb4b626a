//! Scope derivation integration tests.

use errand::testing::CountingTask;
use errand::{StateMode, Task, run, start};

use crate::common::captured;

#[tokio::test]
async fn test_inherit_shares_completions_both_ways() {
    let (_console, parent) = captured();
    let child = parent.with_state(StateMode::Inherit);
    let a = CountingTask::new("a");
    let b = CountingTask::new("b");

    run(&parent, [a.task()]).await.unwrap();
    run(&child, [a.task(), b.task()]).await.unwrap();
    run(&parent, [b.task()]).await.unwrap();

    assert_eq!((a.count(), b.count()), (1, 1));
}

#[tokio::test]
async fn test_isolate_sees_parent_results_but_not_the_reverse() {
    let (_console, parent) = captured();
    let before = CountingTask::new("before");
    let after = CountingTask::new("after");

    run(&parent, [before.task()]).await.unwrap();
    let child = parent.with_state(StateMode::Isolate);

    // Completed before the split: cached in the child.
    run(&child, [before.task()]).await.unwrap();
    assert_eq!(before.count(), 1);

    // First run in the child: invisible to the parent.
    run(&child, [after.task()]).await.unwrap();
    run(&parent, [after.task()]).await.unwrap();
    assert_eq!(after.count(), 2);

    // And the child does not see what the parent ran after the split.
    let late = CountingTask::new("late");
    run(&parent, [late.task()]).await.unwrap();
    run(&child, [late.task()]).await.unwrap();
    assert_eq!(late.count(), 2);
}

#[tokio::test]
async fn test_reset_runs_everything_again() {
    let (_console, parent) = captured();
    let task = CountingTask::new("setup");

    start(&parent, [task.task()]).await.unwrap();
    let fresh = parent.with_state(StateMode::Reset);
    start(&fresh, [task.task()]).await.unwrap();
    start(&fresh, [task.task()]).await.unwrap();

    assert_eq!(task.count(), 2);
    assert!(fresh.scope().is_complete(&task.task().id()));
}

#[tokio::test]
async fn test_separate_roots_do_not_share() {
    let task = CountingTask::new("build");
    let (_a, first) = captured();
    let (_b, second) = captured();

    run(&first, [task.task()]).await.unwrap();
    run(&second, [task.task()]).await.unwrap();

    assert_eq!(task.count(), 2);
    assert_ne!(first.scope().id(), second.scope().id());
}
