//! Argument parsers bound to tasks.
//!
//! A [`Parser`] receives every argument left after a task's name and turns
//! them into a derived [`Context`]. Returning `Ok(None)` means the user asked
//! for help; the resolver then explains the task instead of running anything.
//!
//! [`FlagParser`] declares typed flags and parses them with `clap`:
//!
//! ```
//! use errand::cli::{Flag, FlagParser, Parser};
//! use errand::{Console, Context};
//! use std::time::Duration;
//!
//! let parser = FlagParser::new()
//!     .flag(Flag::duration("duration").short('d').usage("how long to sleep").default("1s"))
//!     .flag(Flag::bool("dry-run").usage("only print what would happen"));
//!
//! let ctx = Context::new(Console::detached());
//! let args = vec!["-d".to_string(), "250ms".to_string(), "extra".to_string()];
//! let parsed = parser.parse(&ctx, "site sleep", &args).unwrap().unwrap();
//!
//! assert_eq!(parsed.value::<Duration>("duration"), Some(Duration::from_millis(250)));
//! assert_eq!(parsed.value::<bool>("dry-run"), Some(false));
//! assert_eq!(parsed.args(), ["extra".to_string()]);
//! ```

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::error::ParseError;
use super::help::table;
use crate::core::context::Context;

/// Context key holding the help topic parsed by [`HelpParser`].
pub const HELP_TOPIC: &str = "help.topic";

const ARGUMENTS: &str = "[argument...]";
const HELP_ARG: &str = "[help]";

/// Parses the arguments that follow a task's name.
pub trait Parser: Send + Sync {
    /// Parse `args` for `command` (the program name followed by the task
    /// name). `Ok(None)` means help was requested.
    fn parse(
        &self,
        ctx: &Context,
        command: &str,
        args: &[String],
    ) -> Result<Option<Context>, ParseError>;

    /// Explain the accepted arguments, if the parser can.
    fn help(&self, _command: &str) -> Option<String> {
        None
    }

    /// Add a boolean flag whose value is stored under `name`. Returns false
    /// when the parser does not accept injected flags or the flag would clash
    /// with one it already has.
    fn bool_flag(&mut self, _name: &str, _short: char, _usage: &str) -> bool {
        false
    }
}

/// Captures all arguments unparsed, for tasks that interpret them directly.
#[derive(Debug, Clone, Default)]
pub struct Custom {
    usage: Option<String>,
}

impl Custom {
    /// Create a pass-through parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal help text shown for the task.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }
}

impl Parser for Custom {
    fn parse(
        &self,
        ctx: &Context,
        _command: &str,
        args: &[String],
    ) -> Result<Option<Context>, ParseError> {
        Ok(Some(ctx.with_args(args.to_vec())))
    }

    fn help(&self, command: &str) -> Option<String> {
        self.usage
            .as_ref()
            .map(|usage| format!("COMMAND: {} {}", command, usage))
    }
}

/// Parser for the built-in help task: the arguments name the topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpParser;

impl Parser for HelpParser {
    fn parse(
        &self,
        ctx: &Context,
        _command: &str,
        args: &[String],
    ) -> Result<Option<Context>, ParseError> {
        if args.is_empty() {
            return Ok(Some(ctx.clone()));
        }
        let topic = args.join(" ");
        Ok(Some(ctx.with_raw_value(HELP_TOPIC, Value::String(topic))))
    }

    fn help(&self, command: &str) -> Option<String> {
        Some(format!("COMMAND: {} [topic...]", command))
    }
}

/// The type of value a [`Flag`] takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Bool,
    String,
    Int,
    Uint,
    Float,
    Duration,
    Strings,
    Time,
    Custom,
}

impl FlagKind {
    fn value_name(self) -> &'static str {
        match self {
            FlagKind::Bool => "",
            FlagKind::String | FlagKind::Strings => "string",
            FlagKind::Int => "int",
            FlagKind::Uint => "uint",
            FlagKind::Float => "float",
            FlagKind::Duration => "duration",
            FlagKind::Time => "time",
            FlagKind::Custom => "value",
        }
    }

    /// Convert raw text into the JSON value stored in the context.
    fn convert(self, raw: &str) -> Result<Value, String> {
        match self {
            FlagKind::Bool => raw
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|e| e.to_string()),
            FlagKind::String => Ok(Value::String(raw.to_string())),
            FlagKind::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| e.to_string()),
            FlagKind::Uint => raw
                .parse::<u64>()
                .map(Value::from)
                .map_err(|e| e.to_string()),
            FlagKind::Float => {
                let parsed = raw.parse::<f64>().map_err(|e| e.to_string())?;
                serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| "not a finite number".to_string())
            }
            FlagKind::Duration => {
                let parsed = parse_duration(raw)?;
                serde_json::to_value(parsed).map_err(|e| e.to_string())
            }
            FlagKind::Strings => Ok(Value::Array(
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )),
            // Converted by the flag's own converter.
            FlagKind::Time | FlagKind::Custom => Ok(Value::String(raw.to_string())),
        }
    }

    fn zero(self) -> Value {
        match self {
            FlagKind::Bool => Value::Bool(false),
            FlagKind::String => Value::String(String::new()),
            FlagKind::Int | FlagKind::Uint => Value::from(0),
            FlagKind::Float => Value::from(0.0),
            FlagKind::Duration => serde_json::json!({ "secs": 0, "nanos": 0 }),
            FlagKind::Strings => Value::Array(Vec::new()),
            FlagKind::Time | FlagKind::Custom => Value::Null,
        }
    }
}

/// Time zone applied to [`Flag::time`] values written without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Local,
    Utc,
}

impl Zone {
    fn resolve(self, naive: NaiveDateTime) -> Result<DateTime<FixedOffset>, String> {
        match self {
            Zone::Utc => Ok(naive.and_utc().fixed_offset()),
            Zone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.fixed_offset())
                .ok_or_else(|| format!("{} does not exist in the local time zone", naive)),
        }
    }
}

/// Parse `raw` with a chrono `layout`. Layouts without an offset are read in
/// `zone`; layouts without a time of day give midnight.
fn parse_time(raw: &str, layout: &str, zone: Zone) -> Result<DateTime<FixedOffset>, String> {
    if let Ok(time) = DateTime::parse_from_str(raw, layout) {
        return Ok(time);
    }
    let naive = match NaiveDateTime::parse_from_str(raw, layout) {
        Ok(naive) => naive,
        Err(err) => NaiveDate::parse_from_str(raw, layout)
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|_| format!("{} (expected layout {:?})", err, layout))?,
    };
    zone.resolve(naive)
}

type ConvertFn = dyn Fn(&str) -> Result<Value, String> + Send + Sync;

#[derive(Clone)]
struct Converter(Arc<ConvertFn>);

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Converter")
    }
}

/// One flag declared on a [`FlagParser`].
#[derive(Debug, Clone)]
pub struct Flag {
    name: String,
    short: Option<char>,
    usage: String,
    kind: FlagKind,
    default: Option<String>,
    converter: Option<Converter>,
}

impl Flag {
    fn new(kind: FlagKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short: None,
            usage: String::new(),
            kind,
            default: None,
            converter: None,
        }
    }

    fn with_converter(
        kind: FlagKind,
        name: impl Into<String>,
        convert: impl Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        let mut flag = Self::new(kind, name);
        flag.converter = Some(Converter(Arc::new(convert)));
        flag
    }

    /// A switch; present means `true`.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(FlagKind::Bool, name)
    }

    /// A string value.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(FlagKind::String, name)
    }

    /// A signed integer.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(FlagKind::Int, name)
    }

    /// An unsigned integer.
    pub fn uint(name: impl Into<String>) -> Self {
        Self::new(FlagKind::Uint, name)
    }

    /// A floating point number.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(FlagKind::Float, name)
    }

    /// A duration such as `1h30m`, `250ms` or `1.5s`, read back as
    /// [`std::time::Duration`].
    pub fn duration(name: impl Into<String>) -> Self {
        Self::new(FlagKind::Duration, name)
    }

    /// A list of strings; repeat the flag or separate values with commas.
    pub fn strings(name: impl Into<String>) -> Self {
        Self::new(FlagKind::Strings, name)
    }

    /// A point in time written in a chrono `layout` such as `"%Y-%m-%d %H:%M"`.
    /// Values without an offset are read in `zone`. Read it back as a
    /// `chrono::DateTime`; without a default an absent flag reads as `None`.
    pub fn time(name: impl Into<String>, layout: impl Into<String>, zone: Zone) -> Self {
        let layout = layout.into();
        Self::with_converter(FlagKind::Time, name, move |raw| {
            let time = parse_time(raw, &layout, zone)?;
            serde_json::to_value(time).map_err(|e| e.to_string())
        })
    }

    /// A value of any type parsed with [`FromStr`] and read back with
    /// `Context::value::<T>`. Without a default an absent flag reads as `None`.
    pub fn custom<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Serialize + 'static,
        T::Err: fmt::Display,
    {
        Self::with_converter(FlagKind::Custom, name, |raw| {
            let value = raw.parse::<T>().map_err(|e| e.to_string())?;
            serde_json::to_value(value).map_err(|e| e.to_string())
        })
    }

    /// Single-character alias.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Help text.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Value used when the flag is not given, written as it would be on the
    /// command line.
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Flag name, also the context key of its value.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flag's value type.
    pub fn kind(&self) -> FlagKind {
        self.kind
    }

    fn arg(&self) -> Arg {
        let arg = Arg::new(self.name.clone())
            .long(self.name.clone())
            .help(self.usage.clone());
        let arg = match self.short {
            Some(short) => arg.short(short),
            None => arg,
        };
        match self.kind {
            FlagKind::Bool => arg.action(ArgAction::SetTrue),
            FlagKind::Strings => arg
                .action(ArgAction::Append)
                .num_args(1)
                .value_name(self.kind.value_name()),
            _ => arg
                .action(ArgAction::Set)
                .num_args(1)
                .value_name(self.kind.value_name()),
        }
    }

    fn convert(&self, raw: &str) -> Result<Value, String> {
        match &self.converter {
            Some(Converter(convert)) => convert(raw),
            None => self.kind.convert(raw),
        }
    }

    fn value(&self, matches: &ArgMatches) -> Result<Value, ParseError> {
        let invalid = |value: &str, message: String| ParseError::InvalidValue {
            flag: self.name.clone(),
            value: value.to_string(),
            message,
        };

        match self.kind {
            FlagKind::Bool => {
                if matches.get_flag(&self.name) {
                    return Ok(Value::Bool(true));
                }
            }
            FlagKind::Strings => {
                if let Some(values) = matches.get_many::<String>(&self.name) {
                    let mut items = Vec::new();
                    for raw in values {
                        match self.kind.convert(raw) {
                            Ok(Value::Array(parsed)) => items.extend(parsed),
                            Ok(other) => items.push(other),
                            Err(message) => return Err(invalid(raw, message)),
                        }
                    }
                    return Ok(Value::Array(items));
                }
            }
            _ => {
                if let Some(raw) = matches.get_one::<String>(&self.name) {
                    return self.convert(raw).map_err(|message| invalid(raw, message));
                }
            }
        }

        match &self.default {
            Some(raw) => self.convert(raw).map_err(|message| invalid(raw, message)),
            None => Ok(self.kind.zero()),
        }
    }

    fn help_row(&self) -> (String, String) {
        let mut left = match self.short {
            Some(short) => format!("-{}, --{}", short, self.name),
            None => format!("    --{}", self.name),
        };
        if self.kind != FlagKind::Bool {
            left.push(' ');
            left.push_str(self.kind.value_name());
        }
        let right = match &self.default {
            Some(default) if !default.is_empty() => {
                format!("{} (default {})", self.usage, default)
            }
            _ => self.usage.clone(),
        };
        (left, right)
    }
}

/// Typed flags followed by positional arguments, parsed with `clap`.
///
/// Flags and positional arguments may be interleaved; `--` ends flag
/// parsing. `-h`/`--help` requests help unless a declared flag claims them.
#[derive(Debug, Clone, Default)]
pub struct FlagParser {
    flags: Vec<Flag>,
}

impl FlagParser {
    /// Create a parser with no flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a flag.
    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    /// The declared flags.
    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    fn claims(&self, name: &str, short: Option<char>) -> bool {
        self.flags
            .iter()
            .any(|f| f.name == name || (short.is_some() && f.short == short))
    }

    // Injected flags also keep clear of the help flags.
    fn conflicts(&self, name: &str, short: Option<char>) -> bool {
        name == "help" || short == Some('h') || self.claims(name, short)
    }

    fn validate(&self) -> Result<(), ParseError> {
        for (i, flag) in self.flags.iter().enumerate() {
            let invalid = |message: String| Err(ParseError::Invalid(message));
            if flag.name.is_empty() || flag.name.starts_with('-') {
                return invalid(format!("invalid flag name {:?}", flag.name));
            }
            if matches!(flag.short, Some('-') | Some(' ')) {
                return invalid(format!("invalid shorthand for --{}", flag.name));
            }
            let earlier = &self.flags[..i];
            if earlier.iter().any(|f| f.name == flag.name) {
                return invalid(format!("flag --{} declared more than once", flag.name));
            }
            if let Some(short) = flag.short {
                if earlier.iter().any(|f| f.short == Some(short)) {
                    return invalid(format!("shorthand -{} declared more than once", short));
                }
            }
        }
        Ok(())
    }

    fn command(&self, command: &str) -> clap::Command {
        let mut cmd = clap::Command::new(command.to_string())
            .no_binary_name(true)
            .disable_version_flag(true)
            .disable_help_flag(true)
            .arg(
                Arg::new(ARGUMENTS)
                    .num_args(0..)
                    .action(ArgAction::Append)
                    .value_name("argument"),
            );
        for flag in &self.flags {
            cmd = cmd.arg(flag.arg());
        }

        let long = !self.claims("help", None);
        let short = !self.flags.iter().any(|f| f.short == Some('h'));
        if long || short {
            let mut help = Arg::new(HELP_ARG).action(ArgAction::Help);
            if long {
                help = help.long("help");
            }
            if short {
                help = help.short('h');
            }
            cmd = cmd.arg(help);
        }
        cmd
    }
}

impl Parser for FlagParser {
    fn parse(
        &self,
        ctx: &Context,
        command: &str,
        args: &[String],
    ) -> Result<Option<Context>, ParseError> {
        self.validate()?;
        let matches = match self.command(command).try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(err) if err.kind() == ErrorKind::DisplayHelp => return Ok(None),
            Err(err) => return Err(ParseError::Invalid(clap_message(&err))),
        };

        let mut parsed = ctx.clone();
        for flag in &self.flags {
            parsed = parsed.with_raw_value(&flag.name, flag.value(&matches)?);
        }
        let positional = matches
            .get_many::<String>(ARGUMENTS)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        Ok(Some(parsed.with_args(positional)))
    }

    fn help(&self, command: &str) -> Option<String> {
        let mut text = format!("COMMAND: {} [flag...] [argument...]\n", command);
        if !self.flags.is_empty() {
            text.push_str("FLAGS:\n");
            let rows: Vec<_> = self.flags.iter().map(Flag::help_row).collect();
            text.push_str(&table(&rows));
        }
        Some(text)
    }

    fn bool_flag(&mut self, name: &str, short: char, usage: &str) -> bool {
        if self.conflicts(name, Some(short)) {
            return false;
        }
        self.flags.push(Flag::bool(name).short(short).usage(usage));
        true
    }
}

// clap renders "error: <message>" followed by usage and tips; keep the message.
fn clap_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).trim().to_string()
}

/// Parse a duration written as a sequence of decimal numbers with units,
/// such as `300ms`, `1.5h` or `2h45m`. Valid units are `ns`, `us` (or `µs`),
/// `ms`, `s`, `m` and `h`. A bare `0` is accepted.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let s = text.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(format!("invalid duration {:?}", text));
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = s;
    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail.find(is_number).unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        rest = tail;

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration {:?}", text)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, text)),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(format!("invalid duration {:?}", text));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("invalid duration {:?}", text))?
        };
        let too_long = || format!("duration {:?} is too long", text);
        nanos = whole
            .checked_mul(scale)
            .and_then(|n| nanos.checked_add(n))
            .ok_or_else(too_long)?;
        if !fraction.is_empty() {
            let fraction = &fraction[..fraction.len().min(18)];
            let digits: u128 = fraction
                .parse()
                .map_err(|_| format!("invalid duration {:?}", text))?;
            // At most 18 digits times at most 3.6e12, well inside u128.
            nanos = nanos
                .checked_add(digits * scale / 10u128.pow(fraction.len() as u32))
                .ok_or_else(too_long)?;
        }
    }

    let secs = u64::try_from(nanos / 1_000_000_000)
        .map_err(|_| format!("duration {:?} is too long", text))?;
    Ok(Duration::new(secs, (nanos % 1_000_000_000) as u32))
}
