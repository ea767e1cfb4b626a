//! Command names derived from task names.

use regex::Regex;
use std::sync::LazyLock;

static ACRONYM_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([\p{Lu}][\p{Ll}]+)").unwrap());
static CASE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\p{Ll}0-9])([\p{Lu}])").unwrap());
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\pL0-9]+").unwrap());

/// Turn a task or function name into a command name.
///
/// Any leading module path is dropped, CamelCase and snake_case are split
/// into words, and the words are lowercased and joined with `-`:
///
/// ```
/// use errand::cli::sanitize;
///
/// assert_eq!(sanitize("site::CheckSpelling"), "check-spelling");
/// assert_eq!(sanitize("HTTPServer"), "http-server");
/// assert_eq!(sanitize("generate_html"), "generate-html");
/// ```
pub fn sanitize(name: &str) -> String {
    let base = name
        .rfind([':', '.'])
        .map_or(name, |i| &name[i + 1..]);
    let split = ACRONYM_BOUNDARY.replace_all(base, "${1}-${2}");
    let split = CASE_BOUNDARY.replace_all(&split, "${1}-${2}");
    WORD.find_iter(&split)
        .map(|word| word.as_str().to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
