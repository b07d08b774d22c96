//! Document model construction.
//!
//! Walks the raw tree top-down (info, servers, channels, operations,
//! components). At every composable site it resolves `$ref` wrappers, folds
//! trait lists, and annotates key-derived message names. Anomalies are pushed
//! to the diagnostics sink and the offending subtree is replaced with an empty
//! structure so siblings keep building.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::model::DocumentModel;
use crate::resolver::{cyclic, locate, ref_target, resolve_chain, Pointer};
use crate::traits::merge;
use crate::types::{child_path, json_type_name, MESSAGE_NAME_KEY, REF_KEY, TRAITS_KEY};
use crate::version::{SchemaLayout, Site, VersionedSchema};

/// Top-level sections in traversal order.
const SECTIONS: &[&str] = &["info", "servers", "channels", "operations", "components"];

/// What a site is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Server,
    Channel,
    Operation,
    Message,
    Reply,
}

impl Kind {
    fn name(&self) -> &'static str {
        match self {
            Kind::Server => "server",
            Kind::Channel => "channel",
            Kind::Operation => "operation",
            Kind::Message => "message",
            Kind::Reply => "reply",
        }
    }

    fn site(&self) -> Option<Site> {
        match self {
            Kind::Channel => Some(Site::Channel),
            Kind::Operation => Some(Site::Operation),
            Kind::Message => Some(Site::Message),
            Kind::Server | Kind::Reply => None,
        }
    }

    fn for_component(container: &str) -> Option<Kind> {
        match container {
            "servers" => Some(Kind::Server),
            "channels" => Some(Kind::Channel),
            "operations" => Some(Kind::Operation),
            "messages" => Some(Kind::Message),
            "replies" => Some(Kind::Reply),
            _ => None,
        }
    }
}

/// Builds a [`DocumentModel`] from a raw tree.
pub struct Builder<'a> {
    root: &'a Value,
    schema: VersionedSchema,
    layout: &'static SchemaLayout,
    strip_traits: bool,
    /// Built definitions keyed by the location they were read from.
    built: HashMap<(Kind, Pointer), Value>,
    /// Locations currently being built, innermost last.
    in_progress: Vec<Pointer>,
    anonymous_messages: usize,
}

/// Build the model for `root` under `schema`, recording anomalies in `sink`.
pub fn build(root: &Value, schema: VersionedSchema, sink: &mut Diagnostics) -> DocumentModel {
    Builder::new(root, schema).build(sink)
}

impl<'a> Builder<'a> {
    pub fn new(root: &'a Value, schema: VersionedSchema) -> Self {
        Self {
            root,
            schema,
            layout: schema.layout(),
            strip_traits: false,
            built: HashMap::new(),
            in_progress: Vec::new(),
            anonymous_messages: 0,
        }
    }

    /// Drop `traits` from merged nodes in the output.
    pub fn strip_traits(mut self, strip: bool) -> Self {
        self.strip_traits = strip;
        self
    }

    pub fn build(mut self, sink: &mut Diagnostics) -> DocumentModel {
        let Some(root) = self.root.as_object() else {
            sink.push(malformed("", "document", self.root));
            return DocumentModel::new(self.schema, Value::Object(Map::new()));
        };

        let mut sections: HashMap<&str, Value> = HashMap::new();
        for &section in SECTIONS {
            let Some(value) = root.get(section) else {
                continue;
            };
            let built = match section {
                "info" => self.build_info(value, sink),
                "servers" => self.build_map(value, section, Kind::Server, sink),
                "channels" => self.build_map(value, section, Kind::Channel, sink),
                "operations" if self.layout.operations.is_some() => {
                    self.build_map(value, section, Kind::Operation, sink)
                }
                "components" => self.build_components(value, sink),
                _ => value.clone(),
            };
            sections.insert(section, built);
        }

        // Output keeps the source key order.
        let mut out = Map::new();
        for (key, value) in root {
            let value = sections
                .remove(key.as_str())
                .unwrap_or_else(|| value.clone());
            out.insert(key.clone(), value);
        }

        tracing::debug!(
            version = %self.schema,
            definitions = self.built.len(),
            anonymous_messages = self.anonymous_messages,
            "document model built"
        );
        DocumentModel::new(self.schema, Value::Object(out))
    }

    fn build_info(&mut self, value: &Value, sink: &mut Diagnostics) -> Value {
        if value.is_object() {
            value.clone()
        } else {
            sink.push(malformed("/info", "object", value));
            Value::Object(Map::new())
        }
    }

    /// Build every entry of a top-level map container like `channels`.
    fn build_map(
        &mut self,
        value: &Value,
        container: &str,
        kind: Kind,
        sink: &mut Diagnostics,
    ) -> Value {
        let origin = Pointer::root().join(container);
        self.build_entries(value, &origin, kind, sink)
    }

    fn build_entries(
        &mut self,
        value: &Value,
        origin: &Pointer,
        kind: Kind,
        sink: &mut Diagnostics,
    ) -> Value {
        let path = origin.to_path();
        let Some(entries) = value.as_object() else {
            sink.push(malformed(&path, "object", value));
            return Value::Object(Map::new());
        };

        let mut out = Map::new();
        for (key, entry) in entries {
            let built = self.build_site(
                entry,
                Some(origin.join(key.clone())),
                &child_path(&path, key),
                kind,
                Some(key),
                sink,
            );
            out.insert(key.clone(), built);
        }
        Value::Object(out)
    }

    fn build_components(&mut self, value: &Value, sink: &mut Diagnostics) -> Value {
        let Some(components) = value.as_object() else {
            sink.push(malformed("/components", "object", value));
            return Value::Object(Map::new());
        };

        let origin = Pointer::root().join("components");
        let mut out = Map::new();
        for (container, entries) in components {
            let kind = Kind::for_component(container)
                .filter(|_| self.layout.component_containers.contains(&container.as_str()));
            let built = match kind {
                Some(kind) => {
                    let container_origin = origin.join(container.clone());
                    self.build_entries(entries, &container_origin, kind, sink)
                }
                None => entries.clone(),
            };
            out.insert(container.clone(), built);
        }
        Value::Object(out)
    }

    /// Build a node at a composable site.
    ///
    /// `origin` is the node's location in the source document when the node
    /// was read verbatim from there; it enables sharing and cycle detection.
    /// `key` is the map key the node sits under, if any.
    fn build_site(
        &mut self,
        node: &Value,
        origin: Option<Pointer>,
        path: &str,
        kind: Kind,
        key: Option<&str>,
        sink: &mut Diagnostics,
    ) -> Value {
        if let Some(reference) = ref_target(node) {
            let mut resolved = self.deref(reference, path, kind, key, sink);
            if kind == Kind::Message {
                name_message(&mut resolved, key);
            }
            return resolved;
        }

        let Some(map) = node.as_object() else {
            sink.push(malformed(path, kind.name(), node));
            return Value::Object(Map::new());
        };

        match origin {
            Some(origin) => {
                if let Some(done) = self.built.get(&(kind, origin.clone())) {
                    tracing::debug!(pointer = %origin, "reusing built {}", kind.name());
                    return done.clone();
                }
                if self.in_progress.contains(&origin) {
                    sink.push(cyclic(&origin, path));
                    return Value::Object(Map::new());
                }
                self.in_progress.push(origin.clone());
                let built = self.build_kind(map, Some(&origin), path, kind, key, sink);
                self.in_progress.pop();
                self.built.insert((kind, origin), built.clone());
                built
            }
            None => self.build_kind(map, None, path, kind, key, sink),
        }
    }

    /// Resolve a `$ref` wrapper and build what it points at.
    ///
    /// A definition outside any messages map takes its name from `key`, the
    /// map key at the first site that references it.
    fn deref(
        &mut self,
        reference: &str,
        path: &str,
        kind: Kind,
        key: Option<&str>,
        sink: &mut Diagnostics,
    ) -> Value {
        let pointer = match locate(reference, path) {
            Ok(pointer) => pointer,
            Err(diagnostic) => {
                tracing::warn!(reference, path, "reference left unresolved");
                sink.push(diagnostic);
                return Value::Object(Map::new());
            }
        };

        if self.in_progress.contains(&pointer) {
            sink.push(cyclic(&pointer, path));
            return Value::Object(Map::new());
        }

        let (target_pointer, target) = match resolve_chain(&pointer, self.root, path) {
            Ok(found) => found,
            Err(diagnostic) => {
                tracing::warn!(reference, path, "substituting empty {}", kind.name());
                sink.push(diagnostic);
                return Value::Object(Map::new());
            }
        };

        let key = message_key(&target_pointer).or(key);
        let target_path = target_pointer.to_path();
        self.build_site(
            target,
            Some(target_pointer.clone()),
            &target_path,
            kind,
            key,
            sink,
        )
    }

    fn build_kind(
        &mut self,
        own: &Map<String, Value>,
        origin: Option<&Pointer>,
        path: &str,
        kind: Kind,
        key: Option<&str>,
        sink: &mut Diagnostics,
    ) -> Value {
        let merged = match kind.site() {
            Some(site) if self.layout.bears_traits(site) && own.contains_key(TRAITS_KEY) => {
                let traits = self.resolve_traits(own, path, sink);
                let mut merged = merge(&Value::Object(own.clone()), &traits);
                if self.strip_traits {
                    crate::traits::strip_traits(&mut merged);
                }
                match merged {
                    Value::Object(map) => map,
                    _ => own.clone(),
                }
            }
            _ => own.clone(),
        };

        let mut out = Map::new();
        for (field, value) in &merged {
            // Fields supplied by traits are not at the node's source location.
            let child_origin = origin
                .filter(|_| own.contains_key(field))
                .map(|p| p.join(field.clone()));
            let field_path = child_path(path, field);
            let built = self.build_field(kind, field, value, child_origin, &field_path, sink);
            out.insert(field.clone(), built);
        }

        let mut built = Value::Object(out);
        if kind == Kind::Message {
            name_message(&mut built, key);
            if built.get(MESSAGE_NAME_KEY).is_none() {
                let name = self.anonymous_name(&built);
                if let Value::Object(map) = &mut built {
                    map.insert(MESSAGE_NAME_KEY.to_string(), Value::String(name));
                }
            }
        }
        built
    }

    /// Build one field of a node according to the active layout.
    fn build_field(
        &mut self,
        kind: Kind,
        field: &str,
        value: &Value,
        origin: Option<Pointer>,
        path: &str,
        sink: &mut Diagnostics,
    ) -> Value {
        let layout = self.layout;
        match kind {
            Kind::Channel if layout.channel_messages == Some(field) => match origin {
                Some(origin) => self.build_entries(value, &origin, Kind::Message, sink),
                None => self.build_unrooted_entries(value, path, Kind::Message, sink),
            },
            Kind::Channel if field == "servers" && self.schema.is_operation_centric() => {
                self.build_list(value, origin, path, Kind::Server, sink)
            }
            Kind::Channel if layout.channel_operations.contains(&field) => {
                self.build_site(value, origin, path, Kind::Operation, None, sink)
            }
            Kind::Operation | Kind::Reply if layout.operation_channel == Some(field) => {
                self.build_site(value, origin, path, Kind::Channel, None, sink)
            }
            Kind::Operation | Kind::Reply if field == layout.operation_messages => {
                if self.schema.is_operation_centric() {
                    self.build_list(value, origin, path, Kind::Message, sink)
                } else {
                    self.build_v2_message(value, origin, path, sink)
                }
            }
            Kind::Operation if field == "reply" && self.schema.is_operation_centric() => {
                self.build_site(value, origin, path, Kind::Reply, None, sink)
            }
            _ => value.clone(),
        }
    }

    fn build_unrooted_entries(
        &mut self,
        value: &Value,
        path: &str,
        kind: Kind,
        sink: &mut Diagnostics,
    ) -> Value {
        let Some(entries) = value.as_object() else {
            sink.push(malformed(path, "object", value));
            return Value::Object(Map::new());
        };
        let mut out = Map::new();
        for (key, entry) in entries {
            let built = self.build_site(entry, None, &child_path(path, key), kind, Some(key), sink);
            out.insert(key.clone(), built);
        }
        Value::Object(out)
    }

    fn build_list(
        &mut self,
        value: &Value,
        origin: Option<Pointer>,
        path: &str,
        kind: Kind,
        sink: &mut Diagnostics,
    ) -> Value {
        let Some(items) = value.as_array() else {
            sink.push(malformed(path, "array", value));
            return Value::Array(Vec::new());
        };
        let items = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let index = i.to_string();
                let item_origin = origin.as_ref().map(|p| p.join(index.clone()));
                self.build_site(item, item_origin, &child_path(path, &index), kind, None, sink)
            })
            .collect();
        Value::Array(items)
    }

    /// A 2.x operation message is a single message or `{ oneOf: [...] }`.
    fn build_v2_message(
        &mut self,
        value: &Value,
        origin: Option<Pointer>,
        path: &str,
        sink: &mut Diagnostics,
    ) -> Value {
        let one_of = value
            .as_object()
            .filter(|map| !map.contains_key(REF_KEY))
            .and_then(|map| map.get("oneOf"));
        match one_of {
            Some(branches) => {
                let branches_origin = origin.map(|p| p.join("oneOf"));
                let branches_path = child_path(path, "oneOf");
                let branches = self.build_list(
                    branches,
                    branches_origin,
                    &branches_path,
                    Kind::Message,
                    sink,
                );
                let mut out = value.as_object().cloned().unwrap_or_default();
                out.insert("oneOf".to_string(), branches);
                Value::Object(out)
            }
            None => self.build_site(value, origin, path, Kind::Message, None, sink),
        }
    }

    /// Resolve the entries of a node's trait list.
    fn resolve_traits(
        &mut self,
        own: &Map<String, Value>,
        path: &str,
        sink: &mut Diagnostics,
    ) -> Vec<Value> {
        let traits_path = child_path(path, TRAITS_KEY);
        let Some(entries) = own.get(TRAITS_KEY).and_then(Value::as_array) else {
            if let Some(other) = own.get(TRAITS_KEY) {
                sink.push(malformed(&traits_path, "array", other));
            }
            return Vec::new();
        };

        let mut traits = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry_path = child_path(&traits_path, &i.to_string());
            let resolved = match ref_target(entry) {
                Some(reference) => self.resolve_trait_ref(reference, &entry_path, sink),
                None => Some(entry),
            };
            match resolved {
                Some(fragment @ Value::Object(_)) => traits.push(fragment.clone()),
                Some(other) => sink.push(malformed(&entry_path, "trait object", other)),
                None => {}
            }
        }
        traits
    }

    fn resolve_trait_ref(
        &self,
        reference: &str,
        path: &str,
        sink: &mut Diagnostics,
    ) -> Option<&'a Value> {
        let found = locate(reference, path)
            .and_then(|pointer| resolve_chain(&pointer, self.root, path));
        match found {
            Ok((_, fragment)) => Some(fragment),
            Err(diagnostic) => {
                sink.push(diagnostic);
                None
            }
        }
    }

    fn anonymous_name(&mut self, message: &Value) -> String {
        if let Some(id) = message.get(self.layout.message_id_field).and_then(Value::as_str) {
            return id.to_string();
        }
        self.anonymous_messages += 1;
        format!("<anonymous-message-{}>", self.anonymous_messages)
    }
}

/// The map key a message definition sits under, if it is in a messages map.
fn message_key(pointer: &Pointer) -> Option<&str> {
    match pointer.segments() {
        [.., container, key] if container == "messages" => Some(key.as_str()),
        _ => None,
    }
}

/// Add the key-derived name unless one is already present.
fn name_message(message: &mut Value, key: Option<&str>) {
    if let (Value::Object(map), Some(key)) = (message, key) {
        if !map.contains_key(MESSAGE_NAME_KEY) {
            map.insert(MESSAGE_NAME_KEY.to_string(), Value::String(key.to_string()));
        }
    }
}

fn malformed(path: &str, expected: &str, actual: &Value) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::MalformedNode,
        path,
        format!("expected {}, got {}", expected, json_type_name(actual)),
    )
}
