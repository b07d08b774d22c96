//! Internal reference resolution.
//!
//! Resolves `$ref` pointers of the form `#/channels/userSignedUp` against the
//! document they appear in. Resolution borrows from the root, so every site
//! referencing the same definition sees the same data.

use std::fmt;

use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::types::REF_KEY;

/// Why a reference string is not an internal pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerError {
    External,
    Malformed,
}

/// A parsed internal JSON Pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    segments: Vec<String>,
}

impl Pointer {
    /// Parse a `#`-prefixed pointer.
    ///
    /// # Errors
    ///
    /// `PointerError::External` for references that escape the document,
    /// `PointerError::Malformed` for `#` references that are not `#` or `#/...`.
    pub fn parse(reference: &str) -> Result<Self, PointerError> {
        let path = reference
            .strip_prefix('#')
            .ok_or(PointerError::External)?;
        if path.is_empty() {
            return Ok(Self::root());
        }
        let path = path.strip_prefix('/').ok_or(PointerError::Malformed)?;
        let segments = path
            .split('/')
            // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
            .map(|part| part.replace("~1", "/").replace("~0", "~"))
            .collect();
        Ok(Self { segments })
    }

    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Pointer to a child of this location.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment (the key under which the target sits), if any.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Render as a diagnostic path (`/channels/a`), without the leading `#`.
    pub fn to_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        out
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_path())
    }
}

/// Returns true if the reference escapes the current document.
pub fn is_external(reference: &str) -> bool {
    !reference.starts_with('#')
}

/// Parse `reference` as an internal pointer, reporting at `site` when it is not.
///
/// # Errors
///
/// A `FetchFailure` warning for an external reference left unresolved, a
/// `DanglingReference` error for a malformed internal one.
pub fn locate(reference: &str, site: &str) -> Result<Pointer, Diagnostic> {
    Pointer::parse(reference).map_err(|e| match e {
        PointerError::External => Diagnostic::warning(
            DiagnosticKind::FetchFailure,
            site,
            format!("external reference {} was not resolved", reference),
        ),
        PointerError::Malformed => Diagnostic::error(
            DiagnosticKind::DanglingReference,
            site,
            format!("malformed reference {} (expected #/...)", reference),
        ),
    })
}

/// Returns the `$ref` string if `value` is a reference wrapper.
pub fn ref_target(value: &Value) -> Option<&str> {
    value.get(REF_KEY).and_then(Value::as_str)
}

/// Resolve a single pointer against `root`.
///
/// `site` is the path of the node holding the reference, used for diagnostics.
///
/// # Errors
///
/// Returns a `DanglingReference` diagnostic if any segment is missing.
pub fn resolve<'a>(pointer: &Pointer, root: &'a Value, site: &str) -> Result<&'a Value, Diagnostic> {
    let mut current = root;
    for segment in pointer.segments() {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(arr) => array_index(segment).and_then(|i| arr.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            Diagnostic::error(
                DiagnosticKind::DanglingReference,
                site,
                format!("reference {} not found (missing segment '{}')", pointer, segment),
            )
        })?;
    }
    Ok(current)
}

/// Resolve a pointer and keep following while the target is itself a `$ref`
/// wrapper.
///
/// Returns the final node together with the pointer it was found at.
///
/// # Errors
///
/// `DanglingReference` for a missing target, `CyclicReference` when the chain
/// revisits a pointer, `FetchFailure` when the chain escapes the document.
pub fn resolve_chain<'a>(
    pointer: &Pointer,
    root: &'a Value,
    site: &str,
) -> Result<(Pointer, &'a Value), Diagnostic> {
    let mut seen = vec![pointer.clone()];
    let mut current_pointer = pointer.clone();
    let mut current = resolve(pointer, root, site)?;

    while let Some(reference) = ref_target(current) {
        let next = locate(reference, site)?;
        if seen.contains(&next) {
            return Err(cyclic(&next, site));
        }
        current = resolve(&next, root, site)?;
        seen.push(next.clone());
        current_pointer = next;
    }

    Ok((current_pointer, current))
}

/// Array index per RFC 6901: digits only, no leading zero.
fn array_index(segment: &str) -> Option<usize> {
    let digits_only = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    if !digits_only || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    segment.parse().ok()
}

pub(crate) fn cyclic(pointer: &Pointer, site: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::CyclicReference,
        site,
        format!("cyclic reference {}", pointer),
    )
}
