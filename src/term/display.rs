//! S-expression string form for terms.
//!
//! Atoms that match the safe pattern `[A-Za-z0-9_+\-*/.<>=:]+` print
//! verbatim; everything else is quoted with `\` and `"` escaped. Variables
//! print with their `?` sigil, lists parenthesized and space-separated.

use std::fmt;

use super::Term;

fn is_safe_atom(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'_' | b'+' | b'-' | b'*' | b'/' | b'.' | b'<' | b'>' | b'=' | b':'
                )
        })
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            _ => fmt::Write::write_char(f, c)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(name) => {
                if is_safe_atom(name) {
                    f.write_str(name)
                } else {
                    write_quoted(f, name)
                }
            }
            Term::Var(name) => write!(f, "?{name}"),
            Term::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}
