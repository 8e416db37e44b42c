use std::fmt;

use crate::core::lexer::LexerError;
use crate::core::parser::ParserError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LexerError,
    ParseError,
    NameError,
    TypeError,
    ArgumentError,
    RuntimeError,
    DivisionByZeroError,
    IndexError,
    KeyError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error raised while evaluating. Unwinds until a `try` catches it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self { Self::new(ErrorKind::RuntimeError, message) }
    pub fn name(message: impl Into<String>) -> Self { Self::new(ErrorKind::NameError, message) }
    pub fn type_error(message: impl Into<String>) -> Self { Self::new(ErrorKind::TypeError, message) }
    pub fn argument(message: impl Into<String>) -> Self { Self::new(ErrorKind::ArgumentError, message) }
    pub fn division_by_zero() -> Self { Self::new(ErrorKind::DivisionByZeroError, "Division by zero") }
    pub fn index(message: impl Into<String>) -> Self { Self::new(ErrorKind::IndexError, message) }
    pub fn key(message: impl Into<String>) -> Self { Self::new(ErrorKind::KeyError, message) }

    /// Attach a position unless one is already recorded (innermost wins).
    pub fn at(mut self, line: usize, column: usize) -> Self {
        if self.line == 0 {
            self.line = line;
            self.column = column;
        }
        self
    }

    pub fn has_position(&self) -> bool {
        self.line > 0
    }

    /// `Kind: message`
    pub fn describe(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Failure of the whole lex → parse → run pipeline.
#[derive(Debug, Clone)]
pub enum PipelineError {
    Lex(Vec<LexerError>),
    Parse(Vec<ParserError>),
    Runtime(RuntimeError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Lex(_) => ErrorKind::LexerError,
            PipelineError::Parse(_) => ErrorKind::ParseError,
            PipelineError::Runtime(e) => e.kind,
        }
    }

    pub fn report(&self) -> ErrorReport {
        let mut report = ErrorReport::default();
        match self {
            PipelineError::Lex(errs) => {
                for e in errs {
                    report.push(ErrorKind::LexerError, &e.message, e.line, e.column);
                }
            }
            PipelineError::Parse(errs) => {
                for e in errs {
                    report.push(ErrorKind::ParseError, &e.message, e.line, e.column);
                }
            }
            PipelineError::Runtime(e) => report.push(e.kind, &e.message, e.line, e.column),
        }
        report
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Lex(errs) => write!(f, "{} lexer error(s)", errs.len()),
            PipelineError::Parse(errs) => write!(f, "{} parse error(s)", errs.len()),
            PipelineError::Runtime(e) => write!(f, "{}", e.describe()),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<RuntimeError> for PipelineError {
    fn from(e: RuntimeError) -> Self {
        PipelineError::Runtime(e)
    }
}

/// One collected diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Accumulates diagnostics across a run.
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    errors: Vec<Diagnostic>,
}

impl ErrorReport {
    pub fn push(&mut self, kind: ErrorKind, message: &str, line: usize, column: usize) {
        self.errors.push(Diagnostic {
            kind,
            message: message.to_string(),
            line,
            column,
        });
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Counts per kind, e.g. `2 error(s): 1 LexerError, 1 ParseError`.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "No errors".to_string();
        }
        let mut counts: Vec<(ErrorKind, usize)> = Vec::new();
        for d in &self.errors {
            match counts.iter_mut().find(|(k, _)| *k == d.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((d.kind, 1)),
            }
        }
        let parts: Vec<String> = counts.iter().map(|(k, n)| format!("{} {}", n, k)).collect();
        format!("{} error(s): {}", self.errors.len(), parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test] fn describe_prefixes_kind() {
        let err = RuntimeError::division_by_zero();
        assert_eq!(err.to_string(), "Division by zero");
        assert_eq!(err.describe(), "DivisionByZeroError: Division by zero");
    }

    #[test] fn innermost_position_wins() {
        let err = RuntimeError::name("Undefined variable 'x'").at(3, 4).at(1, 1);
        assert_eq!((err.line, err.column), (3, 4));
    }

    #[test] fn summary_groups_by_kind() {
        let mut report = ErrorReport::default();
        report.push(ErrorKind::LexerError, "Unterminated string", 1, 1);
        report.push(ErrorKind::ParseError, "Expected ';'", 2, 1);
        report.push(ErrorKind::ParseError, "Expected ')'", 3, 1);
        assert_eq!(report.error_count(), 3);
        assert_eq!(report.summary(), "3 error(s): 1 LexerError, 2 ParseError");
    }
}
