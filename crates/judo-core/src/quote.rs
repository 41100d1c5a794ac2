//! POSIX single-quote shell quoting.
//!
//! Binary-safe or multi-line payloads are not a design goal here: the
//! quoted string is always handed to a remote `sh -c`, which imposes the
//! same limits regardless of how carefully we quote on this end.

/// Wrap `s` in single quotes, escaping any embedded single quote as
/// `'\''` so the remote shell sees it as a literal character rather than
/// a quote terminator.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_string() {
        assert_eq!(shell_quote("echo hi"), "'echo hi'");
    }

    #[test]
    fn escapes_embedded_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn empty_string() {
        assert_eq!(shell_quote(""), "''");
    }
}
