//! Line indentation for console output.
//!
//! An indent is inserted before the first byte written and again before the
//! first byte following each newline, so lines spanning several writes are
//! indented exactly once.

/// Append `data` to `out`, inserting `prefix` at the start of every line.
///
/// `at_line_start` carries the line state between calls and must start as `true`.
pub fn indent_into(out: &mut Vec<u8>, data: &[u8], prefix: &[u8], at_line_start: &mut bool) {
    if data.is_empty() {
        return;
    }
    let newlines = data.iter().filter(|b| **b == b'\n').count();
    out.reserve(data.len() + prefix.len() * (newlines + 1));

    let mut rest = data;
    while !rest.is_empty() {
        if *at_line_start {
            out.extend_from_slice(prefix);
            *at_line_start = false;
        }
        match rest.iter().position(|b| *b == b'\n') {
            Some(i) => {
                out.extend_from_slice(&rest[..=i]);
                rest = &rest[i + 1..];
                *at_line_start = true;
            }
            None => {
                out.extend_from_slice(rest);
                rest = &[];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indent(chunks: &[&str], prefix: &str) -> String {
        let mut out = Vec::new();
        let mut at_line_start = true;
        for chunk in chunks {
            indent_into(&mut out, chunk.as_bytes(), prefix.as_bytes(), &mut at_line_start);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_indents_each_line() {
        assert_eq!(indent(&["a\nb\n"], "   "), "   a\n   b\n");
    }

    #[test]
    fn test_line_spanning_writes_indented_once() {
        assert_eq!(indent(&["hel", "lo\nwor", "ld"], "> "), "> hello\n> world");
    }

    #[test]
    fn test_trailing_newline_defers_indent() {
        assert_eq!(indent(&["one\n"], ".."), "..one\n");
        assert_eq!(indent(&["one\n", "two\n"], ".."), "..one\n..two\n");
    }

    #[test]
    fn test_empty_lines_are_indented() {
        assert_eq!(indent(&["\n\n"], "-"), "-\n-\n");
    }

    #[test]
    fn test_empty_write_is_noop() {
        assert_eq!(indent(&["", ""], "-"), "");
    }
}
