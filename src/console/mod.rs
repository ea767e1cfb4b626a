//! Console: where tasks write output and how they run subprocesses.
//!
//! A [`Console`] bundles the environment, working directory, stdout/stderr
//! [`Output`]s and a [`Verbosity`]. It is immutable; the `with_*` methods
//! derive a modified copy, which is how the command resolver applies console
//! options to each task's context.
//!
//! Subprocesses started with [`Console::run`] or [`Console::eval`] are echoed
//! as `>> <command>`. Their stdout streams into the console's stdout as it is
//! produced (or is collected, for `eval`), they read stdin according to the
//! console's [`Input`], and their stderr is handled according to verbosity:
//!
//! | verbosity | echo            | child stderr         | on failure        |
//! |-----------|-----------------|----------------------|-------------------|
//! | Normal    | always          | shown if it fails    | `!! <error>`      |
//! | Verbose   | always          | live, indented       | `!! <error>`      |
//! | Quiet     | only on failure | shown if it fails    | `!! <error>`      |
//! | Silent    | never           | never                | nothing           |

mod format;
mod indent;

pub use format::{format_command, format_command_with_env, quote};
pub use indent::indent_into;

use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::environment::Environment;
use crate::core::error::TaskError;

/// Indent applied to a child's stderr when it is relayed.
const CHILD_INDENT: &str = "   ";

/// How much the console reports about the commands it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Echo commands; show their stderr only when they fail.
    #[default]
    Normal,
    /// Echo commands and relay their stderr.
    Verbose,
    /// Stay quiet unless a command fails.
    Quiet,
    /// Never write to stderr.
    Silent,
}

/// Where subprocesses read their stdin from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Input {
    /// Share the process stdin, so interactive commands work.
    #[default]
    Inherit,
    /// Read nothing; stdin is at end of file.
    Null,
}

impl Input {
    fn stdio(self) -> Stdio {
        match self {
            Input::Inherit => Stdio::inherit(),
            Input::Null => Stdio::null(),
        }
    }
}

struct Sink {
    writer: Box<dyn Write + Send>,
    at_line_start: bool,
}

/// A shared, cloneable output stream.
///
/// Indented outputs derived with [`indented`](Self::indented) share their
/// parent's underlying writer and line state, so nested indents compose.
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Sink>>,
    indent: Arc<str>,
}

impl Output {
    /// Wrap any writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Sink {
                writer: Box::new(writer),
                at_line_start: true,
            })),
            indent: Arc::from(""),
        }
    }

    /// The process stdout.
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// The process stderr.
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// An output that discards everything.
    pub fn sink() -> Self {
        Self::from_writer(io::sink())
    }

    /// An in-memory output and a handle to read back what was written.
    pub fn capture() -> (Self, Captured) {
        let captured = Captured::default();
        (Self::from_writer(captured.clone()), captured)
    }

    /// Derive an output that adds `prefix` to the start of every line.
    pub fn indented(&self, prefix: &str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            indent: Arc::from(format!("{}{}", self.indent, prefix)),
        }
    }

    /// Write raw bytes, applying the indent.
    pub fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if self.indent.is_empty() {
            sink.at_line_start = data.last().map_or(sink.at_line_start, |b| *b == b'\n');
            return sink.writer.write_all(data);
        }
        let mut out = Vec::new();
        let mut at_line_start = sink.at_line_start;
        indent_into(&mut out, data, self.indent.as_bytes(), &mut at_line_start);
        sink.writer.write_all(&out)?;
        sink.at_line_start = at_line_start;
        Ok(())
    }

    /// Write one line.
    pub fn write_line(&self, line: impl Display) -> io::Result<()> {
        self.write_bytes(format!("{}\n", line).as_bytes())
    }

    /// Flush the underlying writer.
    pub fn flush(&self) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
            .flush()
    }

    /// Whether the next byte written starts a new line.
    pub fn at_line_start(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .at_line_start
    }
}

// Writes go straight to the shared sink, so they are always ready.
impl AsyncWrite for Output {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.write_bytes(buf).map(|()| buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Output::flush(&self))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Output::flush(self)
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("indent", &self.indent)
            .finish_non_exhaustive()
    }
}

/// Bytes written to an [`Output::capture`] output.
#[derive(Debug, Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Discard what was written so far.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Environment, working directory and output streams for tasks.
#[derive(Debug, Clone)]
pub struct Console {
    env: Environment,
    dir: Option<PathBuf>,
    stdout: Output,
    stderr: Output,
    stdin: Input,
    verbosity: Verbosity,
}

impl Console {
    /// Create a console from its parts. Subprocesses inherit the process stdin.
    pub fn new(env: Environment, stdout: Output, stderr: Output) -> Self {
        Self {
            env,
            dir: None,
            stdout,
            stderr,
            stdin: Input::default(),
            verbosity: Verbosity::default(),
        }
    }

    /// The process environment, stdout and stderr.
    pub fn from_process() -> Self {
        Self::new(Environment::from_process(), Output::stdout(), Output::stderr())
    }

    /// An empty environment with no stdin and all output discarded.
    pub fn detached() -> Self {
        Self::new(Environment::new(), Output::sink(), Output::sink()).with_stdin(Input::Null)
    }

    /// Replace the environment.
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Add or override one environment variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.set(key, value);
        self
    }

    /// Set the working directory for subprocesses.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Replace stdout.
    pub fn with_stdout(mut self, stdout: Output) -> Self {
        self.stdout = stdout;
        self
    }

    /// Replace stderr.
    pub fn with_stderr(mut self, stderr: Output) -> Self {
        self.stderr = stderr;
        self
    }

    /// Choose where subprocesses read stdin from.
    pub fn with_stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    /// Indent both stdout and stderr.
    pub fn indented(mut self, prefix: &str) -> Self {
        self.stdout = self.stdout.indented(prefix);
        self.stderr = self.stderr.indented(prefix);
        self
    }

    /// Set the verbosity for [`run`](Self::run) and [`eval`](Self::eval).
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// The environment.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The working directory, if one was set.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The stdout stream.
    pub fn stdout(&self) -> &Output {
        &self.stdout
    }

    /// The stderr stream.
    pub fn stderr(&self) -> &Output {
        &self.stderr
    }

    /// Where subprocesses read stdin from.
    pub fn stdin(&self) -> Input {
        self.stdin
    }

    /// The verbosity.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Print a line to stdout.
    pub fn print(&self, line: impl Display) -> io::Result<()> {
        self.stdout.write_line(line)
    }

    /// Print a line to stderr.
    pub fn print_error(&self, line: impl Display) -> io::Result<()> {
        self.stderr.write_line(line)
    }

    /// Build a command configured with this console's environment and directory.
    pub fn command<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(AsRef::as_ref));
        cmd.env_clear();
        cmd.envs(self.env.iter());
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(self.stdin.stdio());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run a command, streaming its stdout to the console's stdout.
    ///
    /// Output produced before a failure or cancellation stays written.
    pub async fn run<S: AsRef<str>>(
        &self,
        cancellation: &CancellationToken,
        program: &str,
        args: &[S],
    ) -> Result<(), TaskError> {
        self.execute(cancellation, program, args, self.stdout.clone())
            .await
    }

    /// Run a command and return its stdout.
    pub async fn eval<S: AsRef<str>>(
        &self,
        cancellation: &CancellationToken,
        program: &str,
        args: &[S],
    ) -> Result<String, TaskError> {
        let (stdout, captured) = Output::capture();
        self.execute(cancellation, program, args, stdout).await?;
        Ok(captured.contents())
    }

    async fn execute<S: AsRef<str>>(
        &self,
        cancellation: &CancellationToken,
        program: &str,
        args: &[S],
        stdout: Output,
    ) -> Result<(), TaskError> {
        let command_line = format_command(program, args);
        let echo = format!(">> {}\n", command_line);
        if matches!(self.verbosity, Verbosity::Normal | Verbosity::Verbose) {
            self.stderr.write_bytes(echo.as_bytes())?;
        }
        debug!(command = %command_line, "running command");

        let mut cmd = self.command(program, args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // Verbose relays stderr as it arrives; otherwise it is held for the report.
        let live = self.verbosity == Verbosity::Verbose;
        let (stderr, held) = if live {
            (self.stderr.indented(CHILD_INDENT), None)
        } else {
            let (output, captured) = Output::capture();
            (output, Some(captured))
        };

        let result = match cmd.spawn() {
            Ok(mut child) => {
                let status = tokio::select! {
                    status = drive(&mut child, stdout, stderr.clone()) => status,
                    _ = cancellation.cancelled() => {
                        let _ = child.start_kill();
                        debug!(command = %command_line, "command cancelled");
                        return Err(TaskError::Cancelled);
                    }
                };
                if live && !stderr.at_line_start() {
                    stderr.write_bytes(b"\n")?;
                }
                match status? {
                    status if status.success() => Ok(()),
                    status => Err(TaskError::CommandFailed {
                        command: command_line,
                        code: status.code().unwrap_or(-1),
                    }),
                }
            }
            Err(err) => Err(TaskError::from(err)),
        };

        let held = held.map(|captured| captured.contents()).unwrap_or_default();
        self.report(&echo, held.as_bytes(), &result)?;
        result
    }

    fn report(
        &self,
        echo: &str,
        child_stderr: &[u8],
        result: &Result<(), TaskError>,
    ) -> io::Result<()> {
        let relay = |out: &Output| -> io::Result<()> {
            if child_stderr.is_empty() {
                return Ok(());
            }
            let indented = out.indented(CHILD_INDENT);
            indented.write_bytes(child_stderr)?;
            if !child_stderr.ends_with(b"\n") {
                indented.write_bytes(b"\n")?;
            }
            Ok(())
        };

        match self.verbosity {
            Verbosity::Silent => Ok(()),
            Verbosity::Verbose => {
                if let Err(err) = result {
                    self.stderr.write_line(format!("!! {}", err))?;
                }
                Ok(())
            }
            Verbosity::Normal | Verbosity::Quiet => {
                let Err(err) = result else {
                    return Ok(());
                };
                if self.verbosity == Verbosity::Quiet {
                    self.stderr.write_bytes(echo.as_bytes())?;
                }
                relay(&self.stderr)?;
                self.stderr.write_line(format!("!! {}", err))
            }
        }
    }
}

/// Copy the child's stdout and stderr into `stdout` and `stderr` as they
/// arrive, then wait for it to exit.
async fn drive(child: &mut Child, stdout: Output, stderr: Output) -> io::Result<ExitStatus> {
    let (out, err, status) = tokio::join!(
        pump(child.stdout.take(), stdout),
        pump(child.stderr.take(), stderr),
        child.wait(),
    );
    out?;
    err?;
    status
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, mut output: Output) -> io::Result<()> {
    if let Some(mut reader) = reader {
        tokio::io::copy(&mut reader, &mut output).await?;
    }
    Ok(())
}

impl Default for Console {
    fn default() -> Self {
        Self::from_process()
    }
}
