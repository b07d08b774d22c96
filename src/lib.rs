//! AsyncAPI Normalizer
//!
//! Turns a raw AsyncAPI document into a resolved, trait-merged, version-typed
//! document model.
//!
//! Local `$ref`s are followed (shared definitions are built once, cycles are
//! reported rather than looped), `traits` lists are merged into the nodes that
//! carry them, and the result is exposed through views matching the declared
//! AsyncAPI version (2.x channel-centric or 3.x operation-centric). Problems found
//! along the way are collected as diagnostics; only an unsupported version or
//! unreadable input stops a run.
//!
//! # Example
//!
//! ```
//! use asyncapi_normalize::normalize;
//! use serde_json::json;
//!
//! let doc = json!({
//!     "asyncapi": "3.0.0",
//!     "info": { "title": "Demo", "version": "1.0.0" },
//!     "channels": {
//!         "c": { "messages": { "m": { "$ref": "#/components/messages/ping" } } }
//!     },
//!     "components": {
//!         "messages": {
//!             "ping": {
//!                 "payload": { "type": "string" },
//!                 "traits": [{ "headers": { "type": "object" } }]
//!             }
//!         }
//!     }
//! });
//!
//! let result = normalize(&doc);
//! assert!(result.diagnostics.is_empty());
//!
//! let model = result.model.unwrap();
//! let channel = model.channel("c").unwrap();
//! let messages = channel.messages();
//! let message = messages[0];
//!
//! // Referenced messages keep the name of their definition
//! assert_eq!(message.name(), Some("ping"));
//! // Trait fields are merged in
//! assert!(message.json().contains_key("headers"));
//! ```
//!
//! # Diagnostics
//!
//! | Kind | Severity | Effect |
//! |------|----------|--------|
//! | `unsupported-version` | error | Run fails, no model |
//! | `invalid-document` | error | Run fails, no model |
//! | `dangling-reference` | error | Node replaced with `{}` |
//! | `cyclic-reference` | error | Node replaced with `{}` |
//! | `malformed-node` | error | Node replaced with `{}` |
//! | `fetch-failure` | warning/error | Node replaced with `{}` |

mod builder;
mod diagnostics;
mod error;
mod fetch;
mod loader;
mod model;
mod normalize;
mod resolver;
mod traits;
mod types;
mod validator;
mod version;

pub use builder::{build, Builder};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{FetchError, LoadError};
pub use fetch::{prefetch, CachingFetcher, DefaultFetcher, Fetcher, FileFetcher};
pub use loader::{is_url, load_document, load_document_str, split_reference};
pub use model::{Channel, Components, DocumentModel, Info, Message, Operation, Server};
pub use normalize::{normalize, NormalizeOptions, Normalized, Normalizer, Stage};
pub use resolver::{is_external, locate, ref_target, resolve, resolve_chain, Pointer, PointerError};
pub use traits::{apply_traits, merge as merge_traits, strip_traits};
pub use types::{MESSAGE_NAME_KEY, REF_KEY, TRAITS_KEY};
pub use validator::{validate_against_schema, validate_document};
pub use version::{select as select_version, SchemaLayout, Site, VersionedSchema, VERSION_KEY};

#[cfg(feature = "remote")]
pub use fetch::HttpFetcher;
