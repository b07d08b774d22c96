//! External reference fetching.
//!
//! References that escape the current document (`common.yaml#/...`,
//! `https://...`) are resolved here, before the document model is built.
//! Distinct documents are fetched in parallel and each URI is fetched at most
//! once per run. A failed fetch replaces the referencing subtree with `{}` and
//! records a `FetchFailure` diagnostic.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::FetchError;
use crate::loader::{is_url, load_document, split_reference};
use crate::resolver::{is_external, locate, ref_target, resolve, Pointer};
use crate::types::child_path;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Rounds of inlining before remaining external references are left in place.
const MAX_DEPTH: usize = 16;

/// Provides external documents by URI.
///
/// Implementations must be idempotent: the same URI yields the same result
/// within one normalization run.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        (**self).fetch(uri)
    }
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        (**self).fetch(uri)
    }
}

/// Loads relative references from the filesystem.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    base_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        if is_url(uri) {
            return Err(FetchError::Unsupported {
                uri: uri.to_string(),
            });
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        load_document(&self.base_dir.join(path)).map_err(|e| FetchError::Load {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }
}

/// Loads `http://` and `https://` references.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpFetcher {
    /// # Errors
    ///
    /// Returns `FetchError::Network` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Network {
                uri: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            uri: uri.to_string(),
            message: e.to_string(),
        };

        // Check for HTTP errors before parsing
        let body = self
            .client
            .get(uri)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(network)?;

        crate::loader::load_document_str(&body).map_err(|e| FetchError::Load {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }
}

/// Routes URLs to HTTP (when enabled) and everything else to the filesystem.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    files: FileFetcher,
    #[cfg(feature = "remote")]
    http: Result<HttpFetcher, FetchError>,
}

impl DefaultFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            files: FileFetcher::new(base_dir),
            #[cfg(feature = "remote")]
            http: HttpFetcher::new(),
        }
    }

    /// Base directory taken from the location of a document file.
    pub fn for_document(path: &Path) -> Self {
        Self::new(path.parent().unwrap_or(Path::new(".")))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        if is_url(uri) {
            #[cfg(feature = "remote")]
            return match &self.http {
                Ok(http) => http.fetch(uri),
                Err(e) => Err(FetchError::Network {
                    uri: uri.to_string(),
                    message: format!("HTTP client unavailable: {}", e),
                }),
            };
            #[cfg(not(feature = "remote"))]
            return Err(FetchError::Unsupported {
                uri: uri.to_string(),
            });
        }
        self.files.fetch(uri)
    }
}

/// Wraps a fetcher so every URI is fetched at most once.
///
/// Failures are cached too, so a broken URI is reported consistently.
pub struct CachingFetcher<F> {
    inner: F,
    cache: Mutex<HashMap<String, Result<Arc<Value>, FetchError>>>,
}

impl<F: Fetcher> CachingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct URIs fetched so far.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    fn fetch_shared(&self, uri: &str) -> Result<Arc<Value>, FetchError> {
        if let Some(hit) = self.cache.lock().get(uri) {
            tracing::debug!(uri, "fetch cache hit");
            return hit.clone();
        }
        // Lock is not held while fetching; callers deduplicate concurrent URIs.
        let result = self.inner.fetch(uri).map(Arc::new);
        self.cache.lock().insert(uri.to_string(), result.clone());
        result
    }
}

impl<F: Fetcher> Fetcher for CachingFetcher<F> {
    fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        self.fetch_shared(uri).map(|doc| (*doc).clone())
    }
}

/// Inline every external reference in `root`.
///
/// Returns a new tree; `root` is left untouched. Documents are fetched in
/// rounds: each round fetches the distinct URIs found so far in parallel, then
/// scans what it fetched for further URIs. Internal references inside fetched
/// content are resolved against the document they came from.
pub fn prefetch(root: &Value, fetcher: &dyn Fetcher, sink: &mut Diagnostics) -> Value {
    let mut pending = BTreeSet::new();
    collect_external_uris(root, &mut pending);
    if pending.is_empty() {
        return root.clone();
    }

    let cache = CachingFetcher::new(fetcher);
    let mut documents: Documents = HashMap::new();
    for round in 0..MAX_DEPTH {
        if pending.is_empty() {
            break;
        }
        tracing::debug!(round, documents = pending.len(), "fetching external documents");
        let fetched = fetch_all(&cache, pending.iter().map(String::as_str).collect());

        let mut next = BTreeSet::new();
        for doc in fetched.values().flatten() {
            collect_external_uris(doc, &mut next);
        }
        documents.extend(fetched);
        next.retain(|uri| !documents.contains_key(uri));
        pending = next;
    }
    if !pending.is_empty() {
        tracing::warn!(
            remaining = pending.len(),
            "external documents nested deeper than {} levels left unfetched",
            MAX_DEPTH
        );
    }

    let mut inliner = Inliner {
        documents: &documents,
        sink,
        expanding: Vec::new(),
    };
    inliner.inline(root, None, "")
}

type Documents = HashMap<String, Result<Arc<Value>, FetchError>>;

/// URI and content of the fetched document a node was copied from.
type Source<'d> = Option<(&'d str, &'d Value)>;

/// Copies a tree, splicing in fetched content.
struct Inliner<'d, 's> {
    documents: &'d Documents,
    sink: &'s mut Diagnostics,
    /// References expanded on the current branch, as `uri#/pointer`.
    expanding: Vec<String>,
}

impl<'d, 's> Inliner<'d, 's> {
    fn inline(&mut self, node: &Value, source: Source<'d>, path: &str) -> Value {
        match node {
            Value::Object(map) => {
                if let Some(reference) = ref_target(node) {
                    if is_external(reference) {
                        return self.inline_external(reference, path);
                    }
                    if let Some((uri, doc)) = source {
                        return self.inline_internal(reference, uri, doc, path);
                    }
                    // Root document references are left to the builder.
                    return node.clone();
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), self.inline(v, source, &child_path(path, k))))
                        .collect(),
                )
            }
            Value::Array(arr) => Value::Array(
                arr.iter()
                    .enumerate()
                    .map(|(i, v)| self.inline(v, source, &format!("{}/{}", path, i)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn inline_external(&mut self, reference: &str, path: &str) -> Value {
        let (uri, fragment) = split_reference(reference);
        let documents = self.documents;
        let Some((uri, fetched)) = documents.get_key_value(uri) else {
            return self.substitute(Diagnostic::error(
                DiagnosticKind::FetchFailure,
                path,
                format!(
                    "external reference {} is nested deeper than {} documents",
                    reference, MAX_DEPTH
                ),
            ));
        };
        let doc: &'d Value = match fetched {
            Ok(doc) => &**doc,
            Err(e) => return self.substitute(e.to_diagnostic(path)),
        };
        match select_fragment(doc, uri, fragment) {
            Ok(target) => {
                let key = format!("{}{}", uri, fragment.unwrap_or("#"));
                self.expand(key, target, Some((uri.as_str(), doc)), path)
            }
            Err(e) => self.substitute(e.to_diagnostic(path)),
        }
    }

    /// Resolve a `#/...` reference against the fetched document holding it.
    fn inline_internal(
        &mut self,
        reference: &str,
        uri: &'d str,
        doc: &'d Value,
        path: &str,
    ) -> Value {
        let found = locate(reference, path)
            .and_then(|pointer| resolve(&pointer, doc, path).map(|target| (pointer, target)));
        match found {
            Ok((pointer, target)) => {
                self.expand(format!("{}{}", uri, pointer), target, Some((uri, doc)), path)
            }
            Err(mut diagnostic) => {
                diagnostic.message = format!("{} (in {})", diagnostic.message, uri);
                self.substitute(diagnostic)
            }
        }
    }

    fn expand(&mut self, key: String, target: &'d Value, source: Source<'d>, path: &str) -> Value {
        if self.expanding.contains(&key) {
            return self.substitute(Diagnostic::error(
                DiagnosticKind::CyclicReference,
                path,
                format!("cyclic reference {}", key),
            ));
        }
        self.expanding.push(key);
        let inlined = self.inline(target, source, path);
        self.expanding.pop();
        inlined
    }

    fn substitute(&mut self, diagnostic: Diagnostic) -> Value {
        tracing::warn!(path = %diagnostic.path, "{}", diagnostic.message);
        self.sink.push(diagnostic);
        Value::Object(Map::new())
    }
}

/// Fetch distinct URIs in parallel.
fn fetch_all<F: Fetcher>(cache: &CachingFetcher<F>, uris: BTreeSet<&str>) -> Documents {
    std::thread::scope(|scope| {
        let handles: Vec<_> = uris
            .into_iter()
            .map(|uri| (uri, scope.spawn(move || cache.fetch_shared(uri))))
            .collect();

        handles
            .into_iter()
            .map(|(uri, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(FetchError::Network {
                        uri: uri.to_string(),
                        message: "fetch worker panicked".to_string(),
                    })
                });
                (uri.to_string(), result)
            })
            .collect()
    })
}

fn select_fragment<'d>(
    doc: &'d Value,
    uri: &str,
    fragment: Option<&str>,
) -> Result<&'d Value, FetchError> {
    let Some(fragment) = fragment else {
        return Ok(doc);
    };
    let not_found = || FetchError::FragmentNotFound {
        uri: uri.to_string(),
        fragment: fragment.to_string(),
    };
    let pointer = Pointer::parse(fragment).map_err(|_| not_found())?;
    resolve(&pointer, doc, "").map_err(|_| not_found())
}

/// Collect the document part of every external `$ref` in the tree.
fn collect_external_uris(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = ref_target(value) {
                if is_external(reference) {
                    out.insert(split_reference(reference).0.to_string());
                    return;
                }
            }
            for child in map.values() {
                collect_external_uris(child, out);
            }
        }
        Value::Array(arr) => {
            for item in arr {
                collect_external_uris(item, out);
            }
        }
        _ => {}
    }
}
