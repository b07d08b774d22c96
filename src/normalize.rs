//! Normalization entry point.
//!
//! Drives version selection, optional external fetching, and model building.
//! Recoverable problems never abort the run: the caller always gets the
//! diagnostics and, unless the run failed outright, a model.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::builder::Builder;
use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
use crate::fetch::{prefetch, Fetcher};
use crate::loader::load_document_str;
use crate::model::DocumentModel;
use crate::version;

/// Progress of a normalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    VersionSelected,
    ModelBuilt,
    Done,
    /// Unsupported version or undeserializable input; no model.
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Start => "start",
            Stage::VersionSelected => "version-selected",
            Stage::ModelBuilt => "model-built",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// Options for a normalization run.
#[derive(Clone, Default)]
pub struct NormalizeOptions {
    /// Remove `traits` lists from merged nodes in the output.
    pub strip_traits: bool,
    /// Collaborator for references that escape the document. When unset,
    /// external references are reported and replaced with `{}`.
    pub fetcher: Option<Arc<dyn Fetcher>>,
}

impl fmt::Debug for NormalizeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizeOptions")
            .field("strip_traits", &self.strip_traits)
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

impl NormalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether trait lists are removed from the output.
    pub fn strip_traits(mut self, strip: bool) -> Self {
        self.strip_traits = strip;
        self
    }

    /// Resolve external references through `fetcher`.
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }
}

/// Result of a normalization run.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub model: Option<DocumentModel>,
    pub diagnostics: Vec<Diagnostic>,
    pub stage: Stage,
}

impl Normalized {
    fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            model: None,
            diagnostics: vec![diagnostic],
            stage: Stage::Failed,
        }
    }

    /// Returns true if a model was produced (diagnostics may still be present).
    pub fn is_ok(&self) -> bool {
        self.model.is_some()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn into_parts(self) -> (Option<DocumentModel>, Vec<Diagnostic>) {
        (self.model, self.diagnostics)
    }
}

/// Runs normalization with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Normalize an already-deserialized document.
    pub fn normalize(&self, root: &Value) -> Normalized {
        let mut stage = Stage::Start;
        tracing::debug!(%stage, "normalization started");

        let schema = match version::select(root) {
            Ok(schema) => schema,
            Err(diagnostic) => {
                tracing::warn!("normalization failed: {}", diagnostic.message);
                return Normalized::failed(diagnostic);
            }
        };
        stage = Stage::VersionSelected;
        tracing::debug!(%stage, version = %schema);

        let mut sink = Diagnostics::new();
        let fetched;
        let root = match &self.options.fetcher {
            Some(fetcher) => {
                fetched = prefetch(root, fetcher.as_ref(), &mut sink);
                &fetched
            }
            None => root,
        };

        let model = Builder::new(root, schema)
            .strip_traits(self.options.strip_traits)
            .build(&mut sink);
        stage = Stage::ModelBuilt;
        tracing::debug!(%stage, diagnostics = sink.len());

        stage = Stage::Done;
        tracing::debug!(
            %stage,
            errors = sink.count(Severity::Error),
            warnings = sink.count(Severity::Warning),
            "normalization finished"
        );
        Normalized {
            model: Some(model),
            diagnostics: sink.into_vec(),
            stage,
        }
    }

    /// Deserialize JSON or YAML text, then normalize it.
    ///
    /// A deserialization failure ends the run in [`Stage::Failed`].
    pub fn normalize_str(&self, text: &str) -> Normalized {
        match load_document_str(text) {
            Ok(root) => self.normalize(&root),
            Err(e) => Normalized::failed(Diagnostic::from(&e)),
        }
    }
}

/// Normalize a document with default options.
pub fn normalize(root: &Value) -> Normalized {
    Normalizer::default().normalize(root)
}
