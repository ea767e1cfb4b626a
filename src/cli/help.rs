//! The built-in `help` task.
//!
//! Without a topic it lists every command and every setting; with one it
//! explains a single command. Output goes to the console's stderr.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

use super::app::{Bound, Catalog};
use super::error::CommandError;
use super::parser::HELP_TOPIC;
use crate::console::Output;
use crate::core::context::Context;
use crate::core::error::TaskError;
use crate::core::settings::Settings;
use crate::core::task::Task;
use crate::core::types::TaskId;

/// Name the help task is registered under.
pub const HELP: &str = "help";

/// Render two-column rows indented by two spaces, the left column padded to
/// its widest entry.
pub(crate) fn table(rows: &[(String, String)]) -> String {
    let width = rows
        .iter()
        .map(|(left, _)| left.chars().count())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for (left, right) in rows {
        if right.is_empty() {
            out.push_str(&format!("  {}\n", left));
        } else {
            out.push_str(&format!("  {:<width$}  {}\n", left, right, width = width));
        }
    }
    out
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim_end_matches('\r')
}

fn settings_rows<'a>(settings: impl Iterator<Item = &'a Settings>) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    settings
        .flat_map(Settings::iter)
        .filter(|setting| seen.insert(setting.name().to_string()))
        .map(|setting| setting.explanation())
        .collect()
}

impl Catalog {
    /// Write the `COMMANDS:` listing and, if any command has settings, the
    /// `SETTINGS:` listing.
    pub(crate) fn list(&self, out: &Output) -> Result<(), CommandError> {
        let commands: Vec<_> = self
            .bindings()
            .iter()
            .filter(|bound| bound.name() != HELP)
            .map(|bound| {
                (
                    format!("{} {}", self.program(), bound.name()),
                    first_line(bound.usage()).to_string(),
                )
            })
            .collect();

        let mut text = String::from("COMMANDS:\n");
        text.push_str(&table(&commands));

        let settings = settings_rows(self.bindings().iter().map(Bound::settings));
        if !settings.is_empty() {
            text.push_str("\nSETTINGS:\n");
            text.push_str(&table(&settings));
        }
        out.write_bytes(text.as_bytes()).map_err(TaskError::from)?;
        Ok(())
    }

    /// Explain one command: its parser's help, else the task's own help,
    /// else just the command line, followed by its settings.
    pub(crate) fn explain(&self, out: &Output, topic: &str) -> Result<(), CommandError> {
        let bound = self
            .find(topic)
            .ok_or_else(|| CommandError::NoHelp(topic.to_string()))?;
        let command = format!("{} {}", self.program(), bound.name());

        let help = bound
            .parser()
            .and_then(|parser| parser.help(&command))
            .or_else(|| bound.task().help(&command))
            .unwrap_or_else(|| format!("COMMAND: {}", command));

        let mut text = help.trim_end().to_string();
        text.push('\n');
        if !bound.settings().is_empty() {
            text.push_str("SETTINGS:\n");
            text.push_str(&table(&settings_rows(std::iter::once(bound.settings()))));
        }
        out.write_bytes(text.as_bytes()).map_err(TaskError::from)?;
        Ok(())
    }
}

/// Lists commands, or explains the one named by the parsed topic.
pub(crate) struct HelpTask {
    catalog: Weak<Catalog>,
}

impl HelpTask {
    pub(crate) fn new(catalog: Weak<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Task for HelpTask {
    fn name(&self) -> &str {
        HELP
    }

    fn id(&self) -> TaskId {
        TaskId::new(concat!(module_path!(), "::", "HelpTask"))
    }

    async fn run(&self, ctx: &Context) -> Result<(), TaskError> {
        let catalog: Arc<Catalog> = self
            .catalog
            .upgrade()
            .ok_or_else(|| TaskError::failed("command catalog is gone"))?;
        let out = ctx.console().stderr();
        let result = match ctx.value::<String>(HELP_TOPIC) {
            Some(topic) => catalog.explain(out, &topic),
            None => catalog.list(out),
        };
        result.map_err(|err| match err {
            CommandError::Task(err) => err,
            other => TaskError::other(other),
        })
    }
}
