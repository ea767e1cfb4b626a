//! Command resolver integration tests.
//!
//! Tests that verify matching, planning and running of command lines.

use errand::cli::{CommandError, Custom, Flag, FlagParser};
use errand::testing::{CountingTask, FailingTask, TaskLog};
use errand::{App, Binding, FnTask, Outcome, Setting, SettingVar, TaskError, Verbosity, run};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::{args, captured, captured_with_env};

fn app(bindings: Vec<Binding>) -> App {
    App::builder().program("site").tasks(bindings).build().unwrap()
}

#[tokio::test]
async fn test_parserless_tasks_chain() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let app = app(vec![
        Binding::new(log.task("build")),
        Binding::new(log.task("test")),
        Binding::new(log.task("deploy")),
    ]);

    app.run(&ctx, args(&["test", "build", "test"])).await.unwrap();

    // The second "test" is the same identity in the same scope.
    assert_eq!(log.names(), vec!["test", "build"]);
}

#[tokio::test]
async fn test_longest_name_wins() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let app = app(vec![
        Binding::new(log.task("list")),
        Binding::new(log.task("go")).name("list go sources"),
    ]);

    app.run(&ctx, args(&["list", "go", "sources"])).await.unwrap();
    assert_eq!(log.names(), vec!["go"]);

    let err = app.run(&ctx, args(&["list", "go"])).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "unknown command \"go\"; try \"help\" for a list of commands"
    );
}

#[tokio::test]
async fn test_unknown_command_plans_nothing() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let app = app(vec![Binding::new(log.task("build"))]);

    let err = app
        .run(&ctx, args(&["build", "deploy", "now"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::UnknownCommand(ref rest) if rest == "deploy now"));
    assert!(log.names().is_empty());
}

#[tokio::test]
async fn test_first_failure_stops_the_plan() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let broken = FailingTask::new("lint", "style");
    let app = app(vec![
        Binding::new(log.task("fmt")),
        Binding::new(broken.task()),
        Binding::new(log.task("test")),
    ]);

    let err = app
        .run(&ctx, args(&["fmt", "lint", "test"]))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "lint: style");
    assert_eq!(log.names(), vec!["fmt"]);
}

#[tokio::test]
async fn test_parser_consumes_remaining_arguments() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let app = app(vec![
        Binding::new(log.task("build")),
        Binding::new(log.task("exec")).parser(Custom::new()),
    ]);

    app.run(&ctx, args(&["build", "exec", "build", "--flag"]))
        .await
        .unwrap();

    assert_eq!(
        log.entries(),
        vec![
            ("build".to_string(), Vec::new()),
            ("exec".to_string(), args(&["build", "--flag"])),
        ]
    );
}

#[tokio::test]
async fn test_flag_values_reach_the_task() {
    let (_console, ctx) = captured();
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    let sleep = FnTask::new("sleep", move |ctx| {
        let slot = Arc::clone(&slot);
        async move {
            *slot.lock().unwrap() = ctx.value::<Duration>("duration");
            Ok::<(), TaskError>(())
        }
    })
    .shared();
    let app = app(vec![Binding::new(sleep).parser(
        FlagParser::new().flag(Flag::duration("duration").short('t').default("1s")),
    )]);

    app.run(&ctx, args(&["sleep", "-t", "1h30m"])).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(Duration::from_secs(5400)));
}

#[tokio::test]
async fn test_parse_error_is_reported() {
    let (_console, ctx) = captured();
    let task = CountingTask::new("sleep");
    let app = app(vec![
        Binding::new(task.task()).parser(FlagParser::new().flag(Flag::duration("duration"))),
    ]);

    let err = app
        .run(&ctx, args(&["sleep", "--duration", "forever"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Parse(_)));
    assert_eq!(task.count(), 0);
}

#[tokio::test]
async fn test_settings_applied_from_console_environment() {
    let (_console, ctx) = captured_with_env(&[("SITE_OUTPUT", "dist")]);
    let output = SettingVar::new(String::from("public"));
    let task = CountingTask::new("generate-html");
    let app = app(vec![
        Binding::new(task.task()).setting(Setting::new(&output, "SITE_OUTPUT", "output")),
    ]);

    app.run(&ctx, args(&["generate-html"])).await.unwrap();

    assert_eq!(output.get(), "dist");
    assert_eq!(task.count(), 1);
}

#[tokio::test]
async fn test_invalid_setting_names_the_task() {
    let (_console, ctx) = captured_with_env(&[("SITE_JOBS", "many")]);
    let jobs = SettingVar::new(4u32);
    let task = CountingTask::new("generate-html");
    let app = app(vec![
        Binding::new(task.task()).setting(Setting::new(&jobs, "SITE_JOBS", "parallel renders")),
    ]);

    let err = app
        .run(&ctx, args(&["generate-html"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Settings { .. }));
    assert_eq!(
        err.to_string(),
        "invalid value \"many\" for SITE_JOBS: invalid digit found in string in \"generate-html\""
    );
    assert_eq!(task.count(), 0);
}

#[tokio::test]
async fn test_default_task_used_without_arguments() {
    let (_console, ctx) = captured();
    let log = TaskLog::new();
    let app = App::builder()
        .default_task("build")
        .task(Binding::new(log.task("build")))
        .build()
        .unwrap();

    app.run(&ctx, Vec::<String>::new()).await.unwrap();

    assert_eq!(log.names(), vec!["build"]);
}

#[tokio::test]
async fn test_help_flag_after_parserless_task_explains_it() {
    let (console, ctx) = captured();
    let log = TaskLog::new();
    let app = app(vec![
        Binding::new(log.task("build")),
        Binding::new(log.task("test")),
    ]);

    app.run(&ctx, args(&["build", "test", "--help"])).await.unwrap();

    assert!(log.names().is_empty());
    assert_eq!(console.stderr(), "COMMAND: site test\n");
}

#[tokio::test]
async fn test_help_flag_inside_parser_explains_task() {
    let (console, ctx) = captured();
    let task = CountingTask::new("sleep");
    let app = app(vec![
        Binding::new(task.task()).parser(FlagParser::new().flag(Flag::duration("duration"))),
    ]);

    app.run(&ctx, args(&["sleep", "-h"])).await.unwrap();

    assert_eq!(task.count(), 0);
    assert!(console.stderr().starts_with("COMMAND: site sleep [flag...] [argument...]\n"));
}

#[tokio::test]
async fn test_verbosity_flags_set_console_verbosity() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::clone(&seen);
    let report = FnTask::new("report", move |ctx| {
        let slot = Arc::clone(&slot);
        async move {
            slot.lock().unwrap().push(ctx.console().verbosity());
            Ok::<(), TaskError>(())
        }
    })
    .shared();
    let app = App::builder()
        .program("site")
        .task(Binding::new(report))
        .verbosity()
        .build()
        .unwrap();

    // Each run gets a fresh root so the report is not cached.
    for argv in [
        args(&["report"]),
        args(&["report", "-q"]),
        args(&["report", "--silent"]),
        args(&["report", "-s", "-v"]),
    ] {
        let (_console, ctx) = captured();
        app.run(&ctx, argv).await.unwrap();
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Verbosity::Normal,
            Verbosity::Quiet,
            Verbosity::Silent,
            Verbosity::Verbose
        ]
    );
}

#[tokio::test]
async fn test_console_hook_applies_to_every_task() {
    let (_console, ctx) = captured();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<Binding> = ["one", "two"]
        .into_iter()
        .map(|name| {
            let slot = Arc::clone(&seen);
            Binding::new(
                FnTask::new(name, move |ctx| {
                    let slot = Arc::clone(&slot);
                    async move {
                        let stage = ctx.console().env().get("STAGE").map(str::to_string);
                        slot.lock().unwrap().push(stage);
                        Ok::<(), TaskError>(())
                    }
                })
                .shared(),
            )
        })
        .collect();
    let app = App::builder()
        .console(|console| console.with_var("STAGE", "test"))
        .tasks(tasks)
        .build()
        .unwrap();

    app.run(&ctx, args(&["one", "two"])).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some("test".to_string()), Some("test".to_string())]
    );
}

#[tokio::test]
async fn test_tasks_shared_between_commands_run_once() {
    let (_console, ctx) = captured();
    let links = CountingTask::new("check-links");
    let inner = links.task();
    let check = FnTask::new("check", move |ctx| {
        let inner = Arc::clone(&inner);
        async move { run(&ctx, [inner]).await }
    })
    .shared();
    let app = app(vec![Binding::new(check), Binding::new(links.task())]);

    app.run(&ctx, args(&["check", "check-links"])).await.unwrap();

    assert_eq!(links.count(), 1);
}

#[tokio::test]
async fn test_exit_request_maps_to_outcome() {
    let (console, ctx) = captured();
    let app = app(vec![Binding::new(FailingTask::exit("quit", 3).task())]);

    let outcome = Outcome::from_result(app.run(&ctx, args(&["quit"])).await);
    outcome.report(console.console().stderr());

    assert!(matches!(outcome, Outcome::Exit(3)));
    assert_eq!(console.stderr(), "");
}

#[tokio::test]
async fn test_failure_maps_to_exit_code_one() {
    let (console, ctx) = captured();
    let app = app(vec![Binding::new(FailingTask::new("build", "no compiler").task())]);

    let outcome = Outcome::from_result(app.run(&ctx, args(&["build"])).await);
    outcome.report(console.console().stderr());

    assert_eq!(outcome.code(), 1);
    assert_eq!(console.stderr(), "!! build: no compiler\n");
}
