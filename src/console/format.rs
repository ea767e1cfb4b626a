//! POSIX shell rendering of commands, used when echoing what the console runs.

use regex::Regex;
use std::sync::LazyLock;

// `=` is fine inside a word; it only matters in the leading assignment position.
static PLAIN_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^ \r\n\t*?\[\]{}|&;<>'"`\\$#!()~]+$"#).unwrap());

/// Quote `word` so a POSIX shell reads it back unchanged.
pub fn quote(word: &str) -> String {
    if PLAIN_WORD.is_match(word) {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Render a program and its arguments as one shell command line.
pub fn format_command<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = quote(program);
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg.as_ref()));
    }
    line
}

/// Render `NAME=value` assignments followed by the command.
pub fn format_command_with_env<K, V, S>(
    env: impl IntoIterator<Item = (K, V)>,
    program: &str,
    args: &[S],
) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for (name, value) in env {
        line.push_str(name.as_ref());
        line.push('=');
        line.push_str(&quote(value.as_ref()));
        line.push(' ');
    }
    line.push_str(&format_command(program, args));
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_unchanged() {
        assert_eq!(quote("find"), "find");
        assert_eq!(quote("--name=value"), "--name=value");
        assert_eq!(quote("src/main.rs"), "src/main.rs");
    }

    #[test]
    fn test_special_words_quoted() {
        assert_eq!(quote("*.rs"), "'*.rs'");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_single_quote_escaped() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_format_command() {
        assert_eq!(
            format_command("find", &[".", "-name", "*.rs"]),
            "find . -name '*.rs'"
        );
        assert_eq!(format_command::<&str>("true", &[]), "true");
    }

    #[test]
    fn test_format_command_with_env() {
        assert_eq!(
            format_command_with_env([("SPELL_LANG", "en US")], "aspell", &["check"]),
            "SPELL_LANG='en US' aspell check"
        );
        assert_eq!(
            format_command_with_env(Vec::<(&str, &str)>::new(), "make", &["all"]),
            "make all"
        );
    }
}
