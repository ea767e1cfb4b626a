//! Command-line front end: bindings, parsers, help and the resolver.

mod app;
mod error;
mod help;
mod parser;
mod sanitize;

pub use app::{App, AppBuilder, Binding, Outcome};
pub use error::{CommandError, ParseError};
pub use help::HELP;
pub use parser::{
    Custom, Flag, FlagKind, FlagParser, HELP_TOPIC, HelpParser, Parser, Zone, parse_duration,
};
pub use sanitize::sanitize;
