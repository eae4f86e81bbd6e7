//! Diagnostic collection.
//!
//! Mirrors the teacher's small hand-rolled error-enum-plus-collector
//! pattern (see the removed `codegen::error::CodeGenError`): diagnostics
//! are data, not exceptions, so a type error in one subtree never stops
//! the rest of the translation unit from being checked.

use std::fmt;
use std::rc::Rc;

/// A position in a source file. `file` is `Rc`-shared so spans stay
/// cheap to copy even after the preprocessor has spliced in included
/// files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(file: Rc<str>, line: u32, col: u32) -> Self {
        Span { file, line, col }
    }

    /// A span to attach to diagnostics that aren't tied to a specific
    /// source location (vanishingly rare; kept so `Diagnostic` never
    /// needs an `Option<Span>`).
    pub fn synthetic() -> Self {
        Span {
            file: Rc::from("<compiler>"),
            line: 0,
            col: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span, self.severity, self.message)
    }
}

/// Accumulates diagnostics for a single translation unit.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            span,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            span,
            message: message.into(),
        });
    }

    pub fn note(&mut self, span: Span, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Note,
            span,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Render every diagnostic as `<path>:<line>:<col>: <severity>: <message>`
    /// lines, one per diagnostic, for §6's stderr contract.
    pub fn format_for_stderr(&self) -> String {
        let mut out = String::new();
        for d in &self.entries {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_for_stderr())
    }
}

impl std::error::Error for Diagnostics {}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(Rc::from("a.c"), 3, 5)
    }

    #[test]
    fn has_errors_only_true_for_error_severity() {
        let mut d = Diagnostics::new();
        d.warning(span(), "implicit declaration");
        assert!(!d.has_errors());
        d.error(span(), "undeclared identifier 'x'");
        assert!(d.has_errors());
    }

    #[test]
    fn formats_as_path_line_col_severity_message() {
        let mut d = Diagnostics::new();
        d.error(span(), "undeclared identifier 'x'");
        let rendered = d.format_for_stderr();
        assert_eq!(rendered, "a.c:3:5: error: undeclared identifier 'x'\n");
    }
}
