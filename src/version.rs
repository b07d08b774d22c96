//! Version dispatch.
//!
//! Maps the document's `asyncapi` field to the structural variant that governs
//! traversal. AsyncAPI 2.x is channel-centric (operations live inside channel
//! items); 3.x is operation-centric (top-level `operations` pointing at channels).

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Top-level field holding the AsyncAPI version.
pub const VERSION_KEY: &str = "asyncapi";

/// Supported minor versions per major.
const SUPPORTED_V2_MINORS: std::ops::RangeInclusive<u32> = 0..=6;
const SUPPORTED_V3_MINORS: std::ops::RangeInclusive<u32> = 0..=0;

/// Object kinds that may carry a `traits` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Channel,
    Operation,
    Message,
}

/// Container names and composition rules for one document shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaLayout {
    /// Top-level operations container, `None` when operations live in channels.
    pub operations: Option<&'static str>,
    /// Operation keys inside a channel item (2.x `publish`/`subscribe`).
    pub channel_operations: &'static [&'static str],
    /// Field on an operation pointing at its channel.
    pub operation_channel: Option<&'static str>,
    /// Field on an operation holding its message(s).
    pub operation_messages: &'static str,
    /// Field on a channel holding a map of messages.
    pub channel_messages: Option<&'static str>,
    /// Containers under `components` that hold buildable definitions.
    pub component_containers: &'static [&'static str],
    /// Where traits may legally appear.
    pub trait_sites: &'static [Site],
    /// Authored field used as a message name when it has no map key.
    pub message_id_field: &'static str,
}

const LAYOUT_V2: SchemaLayout = SchemaLayout {
    operations: None,
    channel_operations: &["publish", "subscribe"],
    operation_channel: None,
    operation_messages: "message",
    channel_messages: None,
    component_containers: &["servers", "channels", "messages"],
    trait_sites: &[Site::Operation, Site::Message],
    message_id_field: "messageId",
};

const LAYOUT_V3: SchemaLayout = SchemaLayout {
    operations: Some("operations"),
    channel_operations: &[],
    operation_channel: Some("channel"),
    operation_messages: "messages",
    channel_messages: Some("messages"),
    component_containers: &["servers", "channels", "operations", "messages", "replies"],
    trait_sites: &[Site::Operation, Site::Message],
    message_id_field: "name",
};

impl SchemaLayout {
    pub fn bears_traits(&self, site: Site) -> bool {
        self.trait_sites.contains(&site)
    }
}

/// The structural variant selected for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "major", rename_all = "lowercase")]
pub enum VersionedSchema {
    /// Channel-centric 2.x documents.
    V2 { minor: u32 },
    /// Operation-centric 3.x documents.
    V3 { minor: u32 },
}

impl VersionedSchema {
    pub fn layout(&self) -> &'static SchemaLayout {
        match self {
            VersionedSchema::V2 { .. } => &LAYOUT_V2,
            VersionedSchema::V3 { .. } => &LAYOUT_V3,
        }
    }

    pub fn is_operation_centric(&self) -> bool {
        matches!(self, VersionedSchema::V3 { .. })
    }
}

impl fmt::Display for VersionedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionedSchema::V2 { minor } => write!(f, "2.{}", minor),
            VersionedSchema::V3 { minor } => write!(f, "3.{}", minor),
        }
    }
}

/// Select the schema variant for a document.
///
/// # Errors
///
/// Returns a single fatal `UnsupportedVersion` diagnostic when the version is
/// missing, malformed, or not supported.
pub fn select(root: &Value) -> Result<VersionedSchema, Diagnostic> {
    let path = format!("/{}", VERSION_KEY);
    let raw = match root.get(VERSION_KEY) {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(unsupported(
                &path,
                format!("version must be a string, got {}", crate::types::json_type_name(other)),
            ))
        }
        None => return Err(unsupported(&path, "missing 'asyncapi' version field")),
    };

    let (major, minor) = parse_major_minor(raw)
        .ok_or_else(|| unsupported(&path, format!("malformed version \"{}\"", raw)))?;

    match major {
        2 if SUPPORTED_V2_MINORS.contains(&minor) => Ok(VersionedSchema::V2 { minor }),
        3 if SUPPORTED_V3_MINORS.contains(&minor) => Ok(VersionedSchema::V3 { minor }),
        _ => Err(unsupported(
            &path,
            format!(
                "unsupported AsyncAPI version {} (supported: 2.0-2.6, 3.0)",
                raw
            ),
        )),
    }
}

/// Parse `MAJOR.MINOR.PATCH[-pre]` into `(major, minor)`.
fn parse_major_minor(raw: &str) -> Option<(u32, u32)> {
    let core = raw.split_once('-').map(|(core, _)| core).unwrap_or(raw);
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let _patch: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor))
}

fn unsupported(path: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::UnsupportedVersion, path, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selects_v3() {
        let schema = select(&json!({ "asyncapi": "3.0.0" })).unwrap();
        assert_eq!(schema, VersionedSchema::V3 { minor: 0 });
        assert!(schema.is_operation_centric());
        assert_eq!(schema.layout().operations, Some("operations"));
    }

    #[test]
    fn selects_every_v2_minor() {
        for minor in 0..=6 {
            let doc = json!({ "asyncapi": format!("2.{}.0", minor) });
            assert_eq!(select(&doc).unwrap(), VersionedSchema::V2 { minor });
        }
    }

    #[test]
    fn accepts_prerelease_suffix() {
        let schema = select(&json!({ "asyncapi": "3.0.0-rc.12" })).unwrap();
        assert_eq!(schema, VersionedSchema::V3 { minor: 0 });
    }

    #[test]
    fn rejects_unknown_versions() {
        for version in ["1.2.0", "2.7.0", "3.1.0", "4.0.0"] {
            let err = select(&json!({ "asyncapi": version })).unwrap_err();
            assert_eq!(err.kind, DiagnosticKind::UnsupportedVersion);
            assert_eq!(err.path, "/asyncapi");
        }
    }

    #[test]
    fn rejects_missing_and_malformed() {
        let err = select(&json!({ "info": {} })).unwrap_err();
        assert!(err.message.contains("missing"));

        let err = select(&json!({ "asyncapi": 3 })).unwrap_err();
        assert!(err.message.contains("number"));

        let err = select(&json!({ "asyncapi": "three" })).unwrap_err();
        assert!(err.message.contains("malformed"));

        assert!(select(&json!({ "asyncapi": "3.0" })).is_err());
    }

    #[test]
    fn layouts_differ_by_variant() {
        let v2 = VersionedSchema::V2 { minor: 6 }.layout();
        assert!(v2.operations.is_none());
        assert_eq!(v2.channel_operations, &["publish", "subscribe"]);
        assert!(v2.bears_traits(Site::Operation));
        assert!(!v2.bears_traits(Site::Channel));

        let v3 = VersionedSchema::V3 { minor: 0 }.layout();
        assert_eq!(v3.channel_messages, Some("messages"));
        assert!(v3.bears_traits(Site::Message));
    }

    #[test]
    fn display_major_minor() {
        assert_eq!(VersionedSchema::V2 { minor: 6 }.to_string(), "2.6");
        assert_eq!(VersionedSchema::V3 { minor: 0 }.to_string(), "3.0");
    }
}
