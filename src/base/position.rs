/// Position tracking for parse errors
///
/// Stores the source location (line/column) at which the reader failed,
/// for error reporting back to the submitter.
/// A position in source text (1-indexed line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Compute the position of a byte offset within `source`.
    ///
    /// Lines split on `\n`; columns count bytes from the line start.
    pub fn of_offset(source: &str, offset: usize) -> Self {
        let clamped = offset.min(source.len());
        let mut line = 1;
        let mut line_start = 0;
        for (i, b) in source.bytes().enumerate() {
            if i >= clamped {
                break;
            }
            if b == b'\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        Self {
            line,
            column: clamped - line_start + 1,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
