//! Demonstration command line built on errand.
//!
//! ```text
//! errand                       # lists commands
//! errand help sleep            # explains one command
//! errand check -v              # runs both checks, echoing verbosely
//! errand sleep -t 250ms        # flags after a task name go to its parser
//! errand exec ls -la           # everything after exec is passed through
//! ```

use errand::cli::{Custom, Flag, FlagParser};
use errand::{
    App, Binding, CommandTask, Context, Setting, SettingVar, Task, TaskError, run, task,
};
use std::process::ExitCode;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static SITE_OUTPUT: LazyLock<SettingVar<String>> =
    LazyLock::new(|| SettingVar::new(String::from("public")));

async fn check(ctx: Context) -> Result<(), TaskError> {
    run(&ctx, [task!(check_spelling), task!(check_links)]).await
}

async fn check_spelling(ctx: Context) -> Result<(), TaskError> {
    ctx.print("checking spelling")
}

async fn check_links(ctx: Context) -> Result<(), TaskError> {
    ctx.print("checking links")
}

async fn generate_html(ctx: Context) -> Result<(), TaskError> {
    // Links are checked before anything is written, even when invoked alone.
    run(&ctx, [task!(check_links)]).await?;
    ctx.print(format!("generating HTML into {}", SITE_OUTPUT.get()))
}

async fn sleep(ctx: Context) -> Result<(), TaskError> {
    let duration = ctx
        .value::<Duration>("duration")
        .unwrap_or(Duration::from_secs(1));
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = ctx.cancelled() => Err(TaskError::failed("sleep interrupted")),
    }
}

async fn exec(ctx: Context) -> Result<(), TaskError> {
    let Some((program, args)) = ctx.args().split_first() else {
        return Err(TaskError::failed("exec needs a program to run"));
    };
    ctx.run(program, args).await
}

fn list_rust_sources() -> Arc<dyn Task> {
    Arc::new(
        CommandTask::builder("find")
            .name("list rust sources")
            .args([".", "-name", "*.rs"])
            .build(),
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let app = App::builder()
        .task(Binding::new(task!(check)).usage("runs all of the checks"))
        .task(Binding::new(task!(check_spelling)).usage("checks spelling"))
        .task(Binding::new(task!(check_links)).usage("checks links"))
        .task(
            Binding::new(task!(generate_html))
                .usage("generates HTML")
                .setting(Setting::new(&SITE_OUTPUT, "SITE_OUTPUT", "where HTML is written")),
        )
        .task(Binding::new(list_rust_sources()).usage("finds Rust source files"))
        .task(
            Binding::new(task!(sleep))
                .usage("sleeps for a certain amount of time")
                .parser(
                    FlagParser::new().flag(
                        Flag::duration("duration")
                            .short('t')
                            .usage("how long to sleep")
                            .default("1s"),
                    ),
                ),
        )
        .task(
            Binding::new(task!(exec))
                .usage("runs a program through the console")
                .parser(Custom::new().usage("<program> [argument...]")),
        )
        .verbosity()
        .build();

    match app {
        Ok(app) => app.main().await,
        Err(err) => {
            eprintln!("!! {}", err);
            ExitCode::FAILURE
        }
    }
}
