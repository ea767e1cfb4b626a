//! Help output integration tests.

use errand::cli::{Custom, Flag, FlagParser};
use errand::testing::{CountingTask, TaskLog};
use errand::{App, Binding, CommandTask, Setting, SettingVar};
use std::sync::Arc;

use crate::common::{args, captured};

fn site(output: &SettingVar<String>, jobs: &SettingVar<u32>) -> App {
    App::builder()
        .program("site")
        .task(Binding::new(CountingTask::new("check-spelling").task()).usage("checks spelling"))
        .task(
            Binding::new(CountingTask::new("check-links").task())
                .usage("checks links\nfollowing redirects"),
        )
        .task(
            Binding::new(CountingTask::new("generate-html").task())
                .usage("generates HTML")
                .setting(Setting::new(output, "SITE_OUTPUT", "where HTML is written"))
                .setting(Setting::new(jobs, "SITE_JOBS", "parallel renders")),
        )
        .task(
            Binding::new(CountingTask::new("publish").task())
                .usage("uploads the site")
                .setting(Setting::new(output, "SITE_OUTPUT", "where HTML is written")),
        )
        .task(
            Binding::new(CountingTask::new("sleep").task())
                .usage("sleeps")
                .parser(
                    FlagParser::new().flag(
                        Flag::duration("duration")
                            .short('t')
                            .usage("how long to sleep")
                            .default("1s"),
                    ),
                ),
        )
        .build()
        .unwrap()
}

fn vars() -> (SettingVar<String>, SettingVar<u32>) {
    (SettingVar::new(String::from("public")), SettingVar::new(4))
}

#[tokio::test]
async fn test_listing() {
    let (output, jobs) = vars();
    let (console, ctx) = captured();

    site(&output, &jobs).run(&ctx, args(&["help"])).await.unwrap();

    let expected = concat!(
        "COMMANDS:\n",
        "  site check-spelling  checks spelling\n",
        "  site check-links     checks links\n",
        "  site generate-html   generates HTML\n",
        "  site publish         uploads the site\n",
        "  site sleep           sleeps\n",
        "\n",
        "SETTINGS:\n",
        "  SITE_OUTPUT  where HTML is written (default: \"public\")\n",
        "  SITE_JOBS    parallel renders (default: \"4\")\n",
    );
    assert_eq!(console.stderr(), expected);
    assert_eq!(console.stdout(), "");
}

#[tokio::test]
async fn test_no_arguments_and_help_flag_list_commands() {
    let (output, jobs) = vars();
    let app = site(&output, &jobs);

    for argv in [Vec::new(), args(&["-h"]), args(&["--help"])] {
        let (console, ctx) = captured();
        app.run(&ctx, argv).await.unwrap();
        assert!(console.stderr().starts_with("COMMANDS:\n  site check-spelling"));
    }
}

#[tokio::test]
async fn test_listing_without_settings() {
    let (console, ctx) = captured();
    let log = TaskLog::new();
    let app = App::builder()
        .program("tool")
        .task(Binding::new(log.task("build")))
        .build()
        .unwrap();

    app.run(&ctx, args(&["help"])).await.unwrap();

    assert_eq!(console.stderr(), "COMMANDS:\n  tool build\n");
}

#[tokio::test]
async fn test_explain_uses_parser_help() {
    let (output, jobs) = vars();
    let (console, ctx) = captured();

    site(&output, &jobs)
        .run(&ctx, args(&["help", "sleep"]))
        .await
        .unwrap();

    assert_eq!(
        console.stderr(),
        concat!(
            "COMMAND: site sleep [flag...] [argument...]\n",
            "FLAGS:\n",
            "  -t, --duration duration  how long to sleep (default 1s)\n",
        )
    );
}

#[tokio::test]
async fn test_help_flag_first_takes_topic() {
    let (output, jobs) = vars();
    let (console, ctx) = captured();

    site(&output, &jobs)
        .run(&ctx, args(&["-h", "generate-html"]))
        .await
        .unwrap();

    assert_eq!(
        console.stderr(),
        concat!(
            "COMMAND: site generate-html\n",
            "SETTINGS:\n",
            "  SITE_OUTPUT  where HTML is written (default: \"public\")\n",
            "  SITE_JOBS    parallel renders (default: \"4\")\n",
        )
    );
}

#[tokio::test]
async fn test_explain_uses_task_help_and_multiword_topics() {
    let (console, ctx) = captured();
    let sources: Arc<dyn errand::Task> = Arc::new(
        CommandTask::builder("find")
            .name("list rust sources")
            .args([".", "-name", "*.rs"])
            .build(),
    );
    let app = App::builder()
        .program("site")
        .task(Binding::new(sources))
        .task(Binding::new(CountingTask::new("ql").task()).parser(Custom::new().usage("<query>")))
        .build()
        .unwrap();

    app.run(&ctx, args(&["help", "list", "rust", "sources"]))
        .await
        .unwrap();
    app.run(&ctx.with_state(errand::StateMode::Reset), args(&["help", "ql"]))
        .await
        .unwrap();

    assert_eq!(
        console.stderr(),
        "COMMAND: site list rust sources\nRUNS: find . -name '*.rs'\nCOMMAND: site ql <query>\n"
    );
}

#[tokio::test]
async fn test_unknown_topic() {
    let (output, jobs) = vars();
    let (_console, ctx) = captured();

    let err = site(&output, &jobs)
        .run(&ctx, args(&["help", "deploy"]))
        .await
        .unwrap_err();

    assert!(
        err.to_string()
            .ends_with("no help available for \"deploy\"")
    );
}
