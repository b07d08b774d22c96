//! Diagnostics collected while normalizing a document.
//!
//! Every anomaly found during normalization is recorded here instead of being
//! returned as an error. Records are kept in the order they were produced.

use std::fmt;

use serde::Serialize;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Category of a normalization anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// A pointer names a location that does not exist in the document.
    DanglingReference,
    /// Following a pointer leads back to a pointer already being resolved.
    CyclicReference,
    /// The `asyncapi` version is missing or not supported. Fatal.
    UnsupportedVersion,
    /// The reference-fetch collaborator could not provide an external document.
    FetchFailure,
    /// A node has the wrong shape (scalar where an object was expected, etc).
    MalformedNode,
    /// The source text could not be deserialized. Fatal.
    InvalidDocument,
    /// Reported by the validation collaborator.
    SchemaViolation,
}

impl DiagnosticKind {
    /// Short stable code used in text output.
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::DanglingReference => "dangling-reference",
            DiagnosticKind::CyclicReference => "cyclic-reference",
            DiagnosticKind::UnsupportedVersion => "unsupported-version",
            DiagnosticKind::FetchFailure => "fetch-failure",
            DiagnosticKind::MalformedNode => "malformed-node",
            DiagnosticKind::InvalidDocument => "invalid-document",
            DiagnosticKind::SchemaViolation => "schema-violation",
        }
    }

    /// Whether this kind stops normalization before a model is built.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::UnsupportedVersion | DiagnosticKind::InvalidDocument
        )
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// JSON Pointer to the node the record is about (e.g., "/operations/send/channel").
    pub path: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        kind: DiagnosticKind,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn error(kind: DiagnosticKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, path, message)
    }

    pub fn warning(
        kind: DiagnosticKind,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, kind, path, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(
            f,
            "{}[{}]: {} - {}",
            self.severity,
            self.kind.code(),
            path,
            self.message
        )
    }
}

/// Append-only, ordered collection of diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(
            kind = diagnostic.kind.code(),
            path = %diagnostic.path,
            "{}",
            diagnostic.message
        );
        self.records.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.records.iter()
    }

    /// Returns true if any record has error severity.
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.records
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_keep_insertion_order() {
        let mut sink = Diagnostics::new();
        sink.push(Diagnostic::error(
            DiagnosticKind::DanglingReference,
            "/a",
            "first",
        ));
        sink.push(Diagnostic::warning(
            DiagnosticKind::FetchFailure,
            "/b",
            "second",
        ));

        let messages: Vec<_> = sink.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(sink.count(Severity::Error), 1);
        assert_eq!(sink.count(Severity::Warning), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::error(
            DiagnosticKind::CyclicReference,
            "/channels/loop",
            "cyclic reference #/channels/loop",
        );
        assert_eq!(
            d.to_string(),
            "error[cyclic-reference]: /channels/loop - cyclic reference #/channels/loop"
        );

        let root = Diagnostic::error(DiagnosticKind::UnsupportedVersion, "", "missing");
        assert!(root.to_string().contains(": / - missing"));
    }

    #[test]
    fn fatal_kinds() {
        assert!(DiagnosticKind::UnsupportedVersion.is_fatal());
        assert!(DiagnosticKind::InvalidDocument.is_fatal());
        assert!(!DiagnosticKind::DanglingReference.is_fatal());
        assert!(!DiagnosticKind::MalformedNode.is_fatal());
    }

    #[test]
    fn serializes_lowercase_severity() {
        let d = Diagnostic::warning(DiagnosticKind::FetchFailure, "/x", "nope");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["kind"], "fetch-failure");
    }
}
