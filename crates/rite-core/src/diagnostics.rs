use std::fmt;

use crate::Location;

/// Which phase produced a diagnostic, and how severe it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiagnosticCode {
    ParserWarning = 0,
    ParserError = 1,
    GeneratorWarning = 2,
    GeneratorError = 3,
}

impl DiagnosticCode {
    /// Prefix placed in front of every message of this kind.
    pub fn description(self) -> &'static str {
        match self {
            DiagnosticCode::ParserWarning => "syntax warning",
            DiagnosticCode::ParserError => "syntax error",
            DiagnosticCode::GeneratorWarning => "generator warning",
            DiagnosticCode::GeneratorError => "generator error",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            DiagnosticCode::ParserError | DiagnosticCode::GeneratorError
        )
    }
}

/// A single message from the parser or the generator.
///
/// `message` already carries the code's description as a prefix, e.g.
/// `"syntax error, unexpected end-of-input"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    /// Build a diagnostic for byte `offset` of `source`.
    pub fn new(code: DiagnosticCode, source: &[u8], offset: Option<usize>, message: &str) -> Self {
        let location = offset
            .map(|o| Location::from_offset(source, o))
            .unwrap_or_default();
        Self {
            code,
            location,
            message: format!("{}, {}", code.description(), message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Diagnostics accumulated by a compile context.
///
/// The list is not reset between compilations; callers clear it explicitly.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    has_errors: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.code.is_error() {
            self.has_errors = true;
        }
        self.items.push(diagnostic);
    }

    /// Whether any parser or generator error has been recorded.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Number of diagnostics with the given code.
    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.items.iter().filter(|d| d.code == code).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.code.is_error())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.has_errors = false;
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.items {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}
