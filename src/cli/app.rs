//! Command-line resolver.
//!
//! An [`App`] maps a flat argument list onto registered tasks. Names may be
//! several words long (`list rust sources`); the longest registered name that
//! prefixes the remaining arguments wins. A task without a parser consumes
//! only its name, so several tasks can be chained in one invocation; a task
//! with a parser receives everything after its name.
//!
//! ```ignore
//! use errand::cli::{App, Binding, Flag, FlagParser};
//!
//! let app = App::builder()
//!     .program("site")
//!     .task(Binding::new(task!(check)).usage("runs every check"))
//!     .task(
//!         Binding::new(task!(sleep))
//!             .parser(FlagParser::new().flag(Flag::duration("duration").short('d').default("1s"))),
//!     )
//!     .verbosity()
//!     .build()?;
//!
//! let code = app.main().await;
//! ```

use std::fmt;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span};

use super::error::CommandError;
use super::help::{HELP, HelpTask};
use super::parser::{FlagParser, HelpParser, Parser};
use super::sanitize::sanitize;
use crate::console::{Console, Output, Verbosity};
use crate::core::context::Context;
use crate::core::error::TaskError;
use crate::core::settings::{Setting, Settings};
use crate::core::task::{Alias, Task};
use crate::execution;

const HELP_FLAGS: [&str; 2] = ["-h", "--help"];

type ContextHook = Arc<dyn Fn(Context) -> Context + Send + Sync>;

fn is_help_flag(arg: &str) -> bool {
    HELP_FLAGS.contains(&arg)
}

/// A task as it is offered on the command line.
pub struct Binding {
    task: Arc<dyn Task>,
    name: Option<String>,
    usage: String,
    parser: Option<Box<dyn Parser>>,
    settings: Settings,
}

impl Binding {
    /// Offer `task` under a name derived from its own (see
    /// [`sanitize`](super::sanitize)).
    pub fn new(task: Arc<dyn Task>) -> Self {
        Self {
            task,
            name: None,
            usage: String::new(),
            parser: None,
            settings: Settings::new(),
        }
    }

    /// Use an explicit name; whitespace separates its words.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Usage text; its first line is shown in the command listing.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Hand every argument after the name to `parser`.
    pub fn parser(mut self, parser: impl Parser + 'static) -> Self {
        self.parser = Some(Box::new(parser));
        self
    }

    /// Apply `setting` from the environment before the task is planned.
    pub fn setting(mut self, setting: Setting) -> Self {
        self.settings.push(setting);
        self
    }

    /// Apply all of `settings` from the environment.
    pub fn settings(mut self, settings: Settings) -> Self {
        for setting in settings.iter() {
            self.settings.push(setting.clone());
        }
        self
    }

    fn bind(self) -> Result<Bound, CommandError> {
        let raw = self
            .name
            .clone()
            .unwrap_or_else(|| sanitize(self.task.name()));
        let words: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            return Err(CommandError::InvalidBinding(format!(
                "task {:?} has no command name",
                self.task.name()
            )));
        }
        let name = words.join(" ");
        let task = if name == self.task.name() {
            self.task
        } else {
            Arc::new(Alias::new(name.clone(), self.task)) as Arc<dyn Task>
        };
        Ok(Bound {
            words,
            name,
            task,
            usage: self.usage,
            parser: self.parser,
            settings: self.settings,
        })
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("task", &self.task.name())
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("parser", &self.parser.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

/// A registered binding with its resolved name.
pub(crate) struct Bound {
    words: Vec<String>,
    name: String,
    task: Arc<dyn Task>,
    usage: String,
    parser: Option<Box<dyn Parser>>,
    settings: Settings,
}

impl Bound {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn usage(&self) -> &str {
        &self.usage
    }

    pub(crate) fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub(crate) fn parser(&self) -> Option<&dyn Parser> {
        self.parser.as_deref()
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    fn matches(&self, args: &[String]) -> bool {
        args.len() >= self.words.len() && self.words.iter().zip(args).all(|(w, a)| w == a)
    }
}

/// Everything the resolver and the help task need to know.
pub(crate) struct Catalog {
    program: String,
    default_task: String,
    bindings: Vec<Bound>,
    hooks: Vec<ContextHook>,
}

impl Catalog {
    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn bindings(&self) -> &[Bound] {
        &self.bindings
    }

    /// The binding with the longest name prefixing `args`; the first
    /// registered wins among equals.
    pub(crate) fn lookup(&self, args: &[String]) -> Option<&Bound> {
        let mut best: Option<&Bound> = None;
        for bound in &self.bindings {
            if bound.matches(args) && best.is_none_or(|b| bound.words.len() > b.words.len()) {
                best = Some(bound);
            }
        }
        best
    }

    /// The binding whose name is exactly `topic`.
    pub(crate) fn find(&self, topic: &str) -> Option<&Bound> {
        let words: Vec<&str> = topic.split_whitespace().collect();
        self.bindings
            .iter()
            .find(|bound| bound.words.iter().map(String::as_str).eq(words.iter().copied()))
    }
}

/// Builder for [`App`].
pub struct AppBuilder {
    program: Option<String>,
    default_task: String,
    bindings: Vec<Binding>,
    hooks: Vec<ContextHook>,
    verbosity: bool,
}

impl AppBuilder {
    fn new() -> Self {
        Self {
            program: None,
            default_task: HELP.to_string(),
            bindings: Vec::new(),
            hooks: Vec::new(),
            verbosity: false,
        }
    }

    /// Name shown in help. Defaults to the executable's file name.
    pub fn program(mut self, name: impl Into<String>) -> Self {
        self.program = Some(name.into());
        self
    }

    /// Arguments used when none are given. Defaults to `help`.
    pub fn default_task(mut self, name: impl Into<String>) -> Self {
        self.default_task = name.into();
        self
    }

    /// Register a binding.
    pub fn task(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Register several bindings.
    pub fn tasks(mut self, bindings: impl IntoIterator<Item = Binding>) -> Self {
        self.bindings.extend(bindings);
        self
    }

    /// Adjust the console of every task context.
    pub fn console(mut self, configure: impl Fn(Console) -> Console + Send + Sync + 'static) -> Self {
        self.hooks
            .push(Arc::new(move |ctx: Context| ctx.with_console(|console| configure(console))));
        self
    }

    /// Add `-v/--verbose`, `-q/--quiet` and `-s/--silent` to every task and
    /// apply them to the console. Tasks without a parser get a flag parser,
    /// so they take all following arguments instead of chaining.
    pub fn verbosity(mut self) -> Self {
        self.verbosity = true;
        self.hooks.push(Arc::new(|ctx: Context| {
            let flag = |name: &str| ctx.value::<bool>(name).unwrap_or(false);
            let verbosity = if flag("verbose") {
                Some(Verbosity::Verbose)
            } else if flag("quiet") {
                Some(Verbosity::Quiet)
            } else if flag("silent") {
                Some(Verbosity::Silent)
            } else {
                None
            };
            match verbosity {
                Some(verbosity) => ctx.with_console(|console| console.with_verbosity(verbosity)),
                None => ctx,
            }
        }));
        self
    }

    /// Resolve names and freeze the catalog.
    pub fn build(self) -> Result<App, CommandError> {
        let mut bound = Vec::with_capacity(self.bindings.len());
        for binding in self.bindings {
            let mut binding = binding.bind()?;
            if self.verbosity {
                let parser = binding
                    .parser
                    .get_or_insert_with(|| Box::new(FlagParser::new()) as Box<dyn Parser>);
                parser.bool_flag("verbose", 'v', "log commands and their stderr");
                parser.bool_flag(
                    "quiet",
                    'q',
                    "log commands and their stderr only if they fail",
                );
                parser.bool_flag("silent", 's', "suppress command logging entirely");
            }
            bound.push(binding);
        }

        let program = self.program.unwrap_or_else(default_program);
        let default_task = self.default_task;
        let hooks = self.hooks;
        let catalog = Arc::new_cyclic(|weak| {
            let help = Bound {
                words: vec![HELP.to_string()],
                name: HELP.to_string(),
                task: Arc::new(HelpTask::new(weak.clone())),
                usage: "lists commands, or explains one".to_string(),
                parser: Some(Box::new(HelpParser)),
                settings: Settings::new(),
            };
            let mut bindings = Vec::with_capacity(bound.len() + 1);
            bindings.push(help);
            bindings.extend(bound);
            Catalog {
                program,
                default_task,
                bindings,
                hooks,
            }
        });
        Ok(App { catalog })
    }
}

fn default_program() -> String {
    std::env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .map(|name| match name.strip_suffix(".exe") {
            Some(stem) => stem.to_string(),
            None => name,
        })
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// Resolves argument lists into tasks and runs them.
pub struct App {
    catalog: Arc<Catalog>,
}

impl App {
    /// Start building an app.
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Name shown in help.
    pub fn program(&self) -> &str {
        &self.catalog.program
    }

    /// Registered command names in registration order, `help` first.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.catalog.bindings.iter().map(|bound| bound.name.as_str())
    }

    /// Resolve `args` into a plan and run it.
    ///
    /// The whole argument list is resolved before any task runs: unknown
    /// commands, bad settings and parse errors are reported without side
    /// effects. Planned tasks then run in order through
    /// [`execution::run`], stopping at the first failure.
    pub async fn run<I, S>(&self, ctx: &Context, args: I) -> Result<(), CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            args = self
                .catalog
                .default_task
                .split_whitespace()
                .map(str::to_string)
                .collect();
        } else if is_help_flag(&args[0]) {
            args[0] = HELP.to_string();
        }

        let span = info_span!("command", program = %self.catalog.program);
        self.execute(ctx, &args).instrument(span).await
    }

    async fn execute(&self, ctx: &Context, args: &[String]) -> Result<(), CommandError> {
        let Some(jobs) = self.plan(ctx, args)? else {
            return Ok(());
        };
        for (job_ctx, task) in jobs {
            debug!(task = %task.name(), "running planned task");
            execution::run(&job_ctx, [task]).await?;
        }
        Ok(())
    }

    /// Build the execution plan. `None` means help was shown instead.
    fn plan(
        &self,
        ctx: &Context,
        args: &[String],
    ) -> Result<Option<Vec<(Context, Arc<dyn Task>)>>, CommandError> {
        let catalog = &self.catalog;
        let mut rest = args;
        let mut jobs = Vec::new();

        while !rest.is_empty() {
            let bound = catalog
                .lookup(rest)
                .ok_or_else(|| CommandError::UnknownCommand(rest.join(" ")))?;
            debug!(command = %bound.name, "matched");

            bound
                .settings
                .apply(|name| ctx.console().env().lookup(name))
                .map_err(|source| CommandError::Settings {
                    task: bound.name.clone(),
                    source,
                })?;
            rest = &rest[bound.words.len()..];

            let mut job_ctx = ctx.clone();
            if let Some(parser) = &bound.parser {
                let command = format!("{} {}", catalog.program, bound.name);
                match parser.parse(ctx, &command, rest)? {
                    Some(parsed) => job_ctx = parsed,
                    None => {
                        catalog.explain(ctx.console().stderr(), &bound.name)?;
                        return Ok(None);
                    }
                }
                rest = &[];
            }
            for hook in &catalog.hooks {
                job_ctx = hook(job_ctx);
            }

            if rest.first().is_some_and(|arg| is_help_flag(arg)) {
                catalog.explain(ctx.console().stderr(), &bound.name)?;
                return Ok(None);
            }
            jobs.push((job_ctx, Arc::clone(&bound.task)));
        }
        Ok(Some(jobs))
    }

    /// Run with the process arguments and environment, cancelling on Ctrl-C,
    /// and turn the result into an exit code.
    pub async fn main(&self) -> ExitCode {
        let ctx = Context::from_process();
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        let outcome = Outcome::from_result(self.run(&ctx, std::env::args().skip(1)).await);
        outcome.report(ctx.console().stderr());
        outcome.exit_code()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("program", &self.catalog.program)
            .field("default_task", &self.catalog.default_task)
            .field("commands", &self.commands().collect::<Vec<_>>())
            .finish()
    }
}

/// How a run ends at the process boundary.
#[derive(Debug)]
pub enum Outcome {
    /// Everything succeeded.
    Success,
    /// A task asked to exit with this code and no message.
    Exit(i32),
    /// Anything else; reported and mapped to exit code 1.
    Failure(CommandError),
}

impl Outcome {
    /// Classify the result of [`App::run`].
    pub fn from_result(result: Result<(), CommandError>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(err) => match err.exit_code() {
                Some(code) => Outcome::Exit(code),
                None => Outcome::Failure(err),
            },
        }
    }

    /// The numeric exit code.
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Exit(code) => *code,
            Outcome::Failure(_) => 1,
        }
    }

    /// Print `!! <error>` for failures.
    pub fn report(&self, out: &Output) {
        if let Outcome::Failure(err) = self {
            let _ = out.write_line(format!("!! {}", err));
            let _ = out.flush();
        }
    }

    /// The exit code as a process [`ExitCode`]. Codes outside `0..=255`
    /// become 1.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(exit_byte(self.code()))
    }
}

fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

impl From<TaskError> for Outcome {
    fn from(err: TaskError) -> Self {
        Outcome::from_result(Err(CommandError::Task(err)))
    }
}
