//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use errand::testing::CapturedConsole;
use errand::{Context, Environment, TaskError};
use std::time::Duration;

/// Own a list of argument literals.
pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// A captured console with a context around it.
pub fn captured() -> (CapturedConsole, Context) {
    let console = CapturedConsole::new();
    let ctx = console.context();
    (console, ctx)
}

/// A captured console whose environment holds `vars`.
pub fn captured_with_env(vars: &[(&str, &str)]) -> (CapturedConsole, Context) {
    let env = vars
        .iter()
        .fold(Environment::new(), |env, (k, v)| env.with_var(*k, *v));
    let console = CapturedConsole::with_env(env);
    let ctx = console.context();
    (console, ctx)
}

/// Poll `condition` every 5ms until it holds.
///
/// # Panics
///
/// Panics if `timeout` elapses first.
pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) {
    let start = tokio::time::Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Collect the task names of every attributed failure in `err`.
pub fn failed_tasks(err: &TaskError) -> Vec<String> {
    err.failures().into_iter().map(|f| f.task.clone()).collect()
}
