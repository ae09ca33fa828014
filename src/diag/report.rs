//! Structured diagnostic types collected while a session is configured
//! and opened.

use std::fmt;

use serde::Serialize;

/// Everything noteworthy that happened while resolving configuration and
/// driving a session open.
///
/// Warnings accumulate; they are never fatal by themselves.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionReport {
    /// All diagnostics recorded so far, in emission order.
    pub diagnostics: Vec<Diagnostic>,
}

impl SessionReport {
    /// Creates a new empty report.
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    /// Records a diagnostic and mirrors it to the `log` facade.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => log::warn!("{}", diagnostic),
            Severity::Note => log::info!("{}", diagnostic),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Records a warning.
    pub fn warn(&mut self, code: DiagCode, message: impl Into<String>) {
        self.add(Diagnostic::warning(code, message));
    }

    /// Records an informational note.
    pub fn note(&mut self, code: DiagCode, message: impl Into<String>) {
        self.add(Diagnostic::note(code, message));
    }

    /// Returns the number of warnings in the report.
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Returns true if a warning with the given code was recorded.
    pub fn has_warning(&self, code: DiagCode) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.code == code)
    }

    /// Returns true if nothing was recorded.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return writeln!(f, "Session opened cleanly: no diagnostics");
        }

        writeln!(f, "Session diagnostics ({} total):", self.diagnostics.len())?;
        for diagnostic in &self.diagnostics {
            writeln!(f, "  {}", diagnostic)?;
        }
        Ok(())
    }
}

/// A single recorded diagnostic.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: Severity,

    /// A stable code for the diagnostic type.
    pub code: DiagCode,

    /// A human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Creates a new diagnostic.
    pub fn new(severity: Severity, code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
        }
    }

    /// Creates a new warning.
    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Creates a new note.
    pub fn note(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, code, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "WARN",
            Severity::Note => "NOTE",
        };
        write!(f, "[{}] {:?}: {}", severity, self.code, self.message)
    }
}

/// The severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Something was ignored or defaulted; the operation continued.
    Warning,
    /// Purely informational.
    Note,
}

/// A stable code identifying the diagnostic type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DiagCode {
    /// A transport option identifier was not recognized by the resolver.
    UnknownTransportOption,
    /// A configured transport option is not supported by the active handle.
    UnsupportedTransportOption,
    /// A fragment control carried an unusable value.
    BadFragmentValue,
    /// The checksum query control carried an unrecognized value.
    BadChecksumValue,
    /// A resource-file numeric override could not be parsed.
    BadResourceValue,
    /// A substrate variable exceeded the build limit but was tolerated.
    VariableTooLarge,
    /// Progress note emitted under `show=fetch`.
    ShowFetch,
}
