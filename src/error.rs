//! Error types for the collaborators around normalization.
//!
//! Normalization itself never fails with an `Err`; it reports [`Diagnostic`]s.
//! These errors come from loading source text and fetching external documents.

use std::path::PathBuf;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Errors while loading a document from text or disk.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

impl From<&LoadError> for Diagnostic {
    fn from(err: &LoadError) -> Self {
        Diagnostic::error(DiagnosticKind::InvalidDocument, "", err.to_string())
    }
}

/// Errors reported by a [`Fetcher`](crate::Fetcher).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("unsupported reference {uri}")]
    Unsupported { uri: String },

    #[error("failed to load {uri}: {message}")]
    Load { uri: String, message: String },

    #[error("failed to fetch {uri}: {message}")]
    Network { uri: String, message: String },

    #[error("fragment {fragment} not found in {uri}")]
    FragmentNotFound { uri: String, fragment: String },
}

impl FetchError {
    pub fn uri(&self) -> &str {
        match self {
            FetchError::Unsupported { uri }
            | FetchError::Load { uri, .. }
            | FetchError::Network { uri, .. }
            | FetchError::FragmentNotFound { uri, .. } => uri,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            FetchError::Load { .. } | FetchError::Network { .. } => 3,
            _ => 2,
        }
    }

    /// Converts into a diagnostic located at `path`.
    pub fn to_diagnostic(&self, path: &str) -> Diagnostic {
        Diagnostic::error(DiagnosticKind::FetchFailure, path, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("asyncapi.yaml"),
        };
        assert_eq!(err.exit_code(), 3);

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = LoadError::InvalidJson { source };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn load_error_becomes_fatal_diagnostic() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("missing.json"),
        };
        let diagnostic = Diagnostic::from(&err);
        assert_eq!(diagnostic.kind, DiagnosticKind::InvalidDocument);
        assert!(diagnostic.kind.is_fatal());
        assert_eq!(diagnostic.message, "file not found: missing.json");
    }

    #[test]
    fn fetch_error_diagnostic_keeps_path() {
        let err = FetchError::Network {
            uri: "https://example.com/common.json".into(),
            message: "timed out".into(),
        };
        let diagnostic = err.to_diagnostic("/components/messages/ping");
        assert_eq!(diagnostic.kind, DiagnosticKind::FetchFailure);
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.path, "/components/messages/ping");
        assert_eq!(err.uri(), "https://example.com/common.json");
    }
}
