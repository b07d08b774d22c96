//! Document loading from text and files.
//!
//! Turns JSON or YAML source into the raw tree normalization works on.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;

/// Load a document from a file path.
///
/// `.json` files are parsed as JSON; anything else is parsed with
/// [`load_document_str`].
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist, or a parse
/// error if the content is neither JSON nor YAML.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    if path.extension().map(|e| e == "json").unwrap_or(false) {
        return serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source });
    }
    load_document_str(&content)
}

/// Load a document from JSON or YAML text.
///
/// Text starting with `{` or `[` is treated as JSON, everything else as YAML.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` or `LoadError::InvalidYaml`.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
    } else {
        serde_yaml::from_str(content).map_err(|source| LoadError::InvalidYaml { source })
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Split a reference into its document part and optional `#` fragment.
pub fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.find('#') {
        Some(idx) => (&reference[..idx], Some(&reference[idx..])),
        None => (reference, None),
    }
}
