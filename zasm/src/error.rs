use crate::parser::Rule;
use pest::error::{Error as PestError, LineColLocation};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    Syntax,
    Value,
    Label,
    Convergence,
    Segment,
    Io,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Value => "value error",
            ErrorKind::Label => "label error",
            ErrorKind::Convergence => "convergence error",
            ErrorKind::Segment => "segment error",
            ErrorKind::Io => "io error",
            ErrorKind::Runtime => "runtime error",
        };
        f.write_str(name)
    }
}

/// A located diagnostic. `line` is 1-based; zero means no source position
/// applies (e.g. whole-run failures).
#[derive(Clone, Debug, PartialEq)]
pub struct AsmError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl AsmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> AsmError {
        AsmError {
            kind,
            message: message.into(),
            file: String::new(),
            line: 0,
            column: 0,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> AsmError {
        self.file = file.into();
        self.line = line;
        self
    }

    /// Converts a pest failure; only the column survives, the caller knows
    /// the real file and line of the fragment that was parsed.
    pub fn from_pest(err: &PestError<Rule>) -> AsmError {
        let column = match err.line_col {
            LineColLocation::Pos((_, col)) => col as u32,
            LineColLocation::Span((_, col), _) => col as u32,
        };
        let mut e = AsmError::new(ErrorKind::Syntax, err.variant.message());
        e.column = column;
        e
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line > 0 {
            write!(f, "{}:{}: ", self.file, self.line)?;
            if self.column > 0 {
                write!(f, "col {}: ", self.column)?;
            }
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AsmError {}

/// Ordered error accumulator bounded by `max_errors`; the first error to
/// hit the cap aborts further source processing for the pass.
#[derive(Clone, Debug, Default)]
pub struct ErrorList {
    errors: Vec<AsmError>,
    max: usize,
    overflowed: bool,
}

impl ErrorList {
    pub fn new(max: usize) -> ErrorList {
        ErrorList {
            errors: Vec::new(),
            max,
            overflowed: false,
        }
    }

    /// Records an error; returns false once the cap is reached.
    pub fn push(&mut self, error: AsmError) -> bool {
        if self.errors.len() >= self.max {
            self.overflowed = true;
            return false;
        }
        self.errors.push(error);
        self.errors.len() < self.max
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.overflowed = false;
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.errors.len() >= self.max
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<AsmError> {
        self.errors.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "{}", error)?;
        }
        if self.overflowed {
            writeln!(f, "(further errors suppressed after {})", self.max)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_cap_aborts() {
        let mut list = ErrorList::new(2);
        assert!(list.push(AsmError::new(ErrorKind::Syntax, "one")));
        assert!(!list.push(AsmError::new(ErrorKind::Syntax, "two")));
        assert!(!list.push(AsmError::new(ErrorKind::Syntax, "three")));
        assert_eq!(list.len(), 2);
        assert!(list.is_full());
    }

    #[test]
    fn display_includes_location() {
        let e = AsmError::new(ErrorKind::Label, "undefined label 'x'").at("main.asm", 12);
        assert_eq!(format!("{}", e), "main.asm:12: label error: undefined label 'x'");
    }
}
