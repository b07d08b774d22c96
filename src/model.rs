//! Read-only document model.
//!
//! The model owns the normalized tree and hands out borrowed views named after
//! the active schema's containers. Views never copy the tree.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::diagnostics::Diagnostic;
use crate::types::{MESSAGE_NAME_KEY, TRAITS_KEY};
use crate::validator::validate_against_schema;
use crate::version::VersionedSchema;

/// The resolved, merged, version-typed result of normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentModel {
    schema: VersionedSchema,
    json: Value,
}

impl Serialize for DocumentModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.json.serialize(serializer)
    }
}

impl DocumentModel {
    pub(crate) fn new(schema: VersionedSchema, json: Value) -> Self {
        Self { schema, json }
    }

    pub fn schema(&self) -> VersionedSchema {
        self.schema
    }

    /// The declared `asyncapi` version string.
    pub fn version(&self) -> &str {
        self.json
            .get(crate::version::VERSION_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The flattened tree (resolved and merged view).
    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn into_json(self) -> Value {
        self.json
    }

    pub fn info(&self) -> Info<'_> {
        Info {
            json: object(self.json.get("info")),
        }
    }

    pub fn servers(&self) -> Vec<Server<'_>> {
        entries(self.json.get("servers"))
            .map(|(id, json)| Server { id, json })
            .collect()
    }

    pub fn server(&self, id: &str) -> Option<Server<'_>> {
        self.servers().into_iter().find(|s| s.id == id)
    }

    pub fn channels(&self) -> Vec<Channel<'_>> {
        entries(self.json.get("channels"))
            .map(|(id, json)| Channel {
                id,
                json,
                schema: self.schema,
            })
            .collect()
    }

    pub fn channel(&self, id: &str) -> Option<Channel<'_>> {
        self.channels().into_iter().find(|c| c.id == id)
    }

    /// All operations.
    ///
    /// For 3.x these are the top-level `operations`; for 2.x they are the
    /// `publish`/`subscribe` entries of every channel.
    pub fn operations(&self) -> Vec<Operation<'_>> {
        match self.schema {
            VersionedSchema::V3 { .. } => entries(self.json.get("operations"))
                .map(|(id, json)| Operation {
                    id: id.to_string(),
                    json,
                    schema: self.schema,
                    parent: None,
                })
                .collect(),
            VersionedSchema::V2 { .. } => self
                .channels()
                .into_iter()
                .flat_map(|channel| channel.operations())
                .collect(),
        }
    }

    pub fn operation(&self, id: &str) -> Option<Operation<'_>> {
        self.operations().into_iter().find(|o| o.id == id)
    }

    /// Every distinct message in the document.
    ///
    /// Messages reachable from channels and operations come first, followed by
    /// component messages not already seen. Copies of one definition built
    /// at several sites are equal and listed once; distinct messages sharing
    /// a name are all kept.
    pub fn messages(&self) -> Vec<Message<'_>> {
        let reachable: Vec<Message<'_>> = match self.schema {
            VersionedSchema::V3 { .. } => self
                .channels()
                .into_iter()
                .flat_map(|channel| channel.messages())
                .chain(self.operations().into_iter().flat_map(|op| op.messages()))
                .collect(),
            VersionedSchema::V2 { .. } => self
                .operations()
                .into_iter()
                .flat_map(|op| op.messages())
                .collect(),
        };

        let mut out: Vec<Message<'_>> = Vec::new();
        for message in reachable
            .into_iter()
            .chain(self.components().messages())
        {
            if !out.iter().any(|seen| seen.json() == message.json()) {
                out.push(message);
            }
        }
        out
    }

    pub fn components(&self) -> Components<'_> {
        Components {
            json: object(self.json.get("components")),
            schema: self.schema,
        }
    }
}

/// The `info` object.
#[derive(Debug, Clone, Copy)]
pub struct Info<'a> {
    json: &'a Map<String, Value>,
}

impl<'a> Info<'a> {
    pub fn title(&self) -> Option<&'a str> {
        str_field(self.json, "title")
    }

    pub fn version(&self) -> Option<&'a str> {
        str_field(self.json, "version")
    }

    pub fn description(&self) -> Option<&'a str> {
        str_field(self.json, "description")
    }

    pub fn json(&self) -> &'a Map<String, Value> {
        self.json
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Server<'a> {
    id: &'a str,
    json: &'a Map<String, Value>,
}

impl<'a> Server<'a> {
    pub fn id(&self) -> &'a str {
        self.id
    }

    /// `host` in 3.x, `url` in 2.x.
    pub fn host(&self) -> Option<&'a str> {
        str_field(self.json, "host").or_else(|| str_field(self.json, "url"))
    }

    pub fn protocol(&self) -> Option<&'a str> {
        str_field(self.json, "protocol")
    }

    pub fn json(&self) -> &'a Map<String, Value> {
        self.json
    }
}

/// A channel, identified by the key it is declared under.
#[derive(Debug, Clone, Copy)]
pub struct Channel<'a> {
    id: &'a str,
    json: &'a Map<String, Value>,
    schema: VersionedSchema,
}

impl<'a> Channel<'a> {
    pub fn id(&self) -> &'a str {
        self.id
    }

    /// The channel address; 2.x channels are addressed by their key.
    pub fn address(&self) -> Option<&'a str> {
        match self.schema {
            VersionedSchema::V3 { .. } => str_field(self.json, "address"),
            VersionedSchema::V2 { .. } => Some(self.id),
        }
    }

    pub fn description(&self) -> Option<&'a str> {
        str_field(self.json, "description")
    }

    pub fn messages(&self) -> Vec<Message<'a>> {
        match self.schema {
            VersionedSchema::V3 { .. } => entries(self.json.get("messages"))
                .map(|(_, json)| Message { json })
                .collect(),
            VersionedSchema::V2 { .. } => self
                .operations()
                .into_iter()
                .flat_map(|op| op.messages())
                .collect(),
        }
    }

    /// Operations declared inside this channel (2.x only).
    pub fn operations(&self) -> Vec<Operation<'a>> {
        let layout = self.schema.layout();
        layout
            .channel_operations
            .iter()
            .filter_map(|&action| {
                let json = self.json.get(action)?.as_object()?;
                let id = str_field(json, "operationId")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}.{}", self.id, action));
                Some(Operation {
                    id,
                    json,
                    schema: self.schema,
                    parent: Some((*self, action)),
                })
            })
            .collect()
    }

    pub fn json(&self) -> &'a Map<String, Value> {
        self.json
    }
}

/// An operation.
#[derive(Debug, Clone)]
pub struct Operation<'a> {
    id: String,
    json: &'a Map<String, Value>,
    schema: VersionedSchema,
    /// Owning channel and action key for 2.x operations.
    parent: Option<(Channel<'a>, &'static str)>,
}

impl<'a> Operation<'a> {
    /// The map key (3.x), `operationId`, or `<channel>.<action>` (2.x).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `send`/`receive` in 3.x, `publish`/`subscribe` in 2.x.
    pub fn action(&self) -> Option<&'a str> {
        match self.parent {
            Some((_, action)) => Some(action),
            None => str_field(self.json, "action"),
        }
    }

    pub fn summary(&self) -> Option<&'a str> {
        str_field(self.json, "summary")
    }

    pub fn description(&self) -> Option<&'a str> {
        str_field(self.json, "description")
    }

    /// The resolved channel of this operation.
    ///
    /// For 3.x the channel is the resolved copy embedded under `channel`, so
    /// the returned view has an empty id.
    pub fn channel(&self) -> Option<Channel<'a>> {
        if let Some((channel, _)) = self.parent {
            return Some(channel);
        }
        let json = self.json.get("channel")?.as_object()?;
        Some(Channel {
            id: "",
            json,
            schema: self.schema,
        })
    }

    pub fn messages(&self) -> Vec<Message<'a>> {
        match self.schema {
            VersionedSchema::V3 { .. } => self
                .json
                .get("messages")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Message::from_value).collect())
                .unwrap_or_default(),
            VersionedSchema::V2 { .. } => {
                let Some(message) = self.json.get("message") else {
                    return Vec::new();
                };
                match message.get("oneOf").and_then(Value::as_array) {
                    Some(branches) => branches.iter().filter_map(Message::from_value).collect(),
                    None => Message::from_value(message).into_iter().collect(),
                }
            }
        }
    }

    /// The trait list as declared, kept for provenance.
    pub fn traits(&self) -> &'a [Value] {
        traits_of(self.json)
    }

    pub fn json(&self) -> &'a Map<String, Value> {
        self.json
    }
}

/// A message.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    json: &'a Map<String, Value>,
}

impl<'a> Message<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_object().map(|json| Message { json })
    }

    /// The derived display name (`x-parser-message-name`).
    pub fn name(&self) -> Option<&'a str> {
        str_field(self.json, MESSAGE_NAME_KEY)
    }

    pub fn title(&self) -> Option<&'a str> {
        str_field(self.json, "title")
    }

    pub fn summary(&self) -> Option<&'a str> {
        str_field(self.json, "summary")
    }

    pub fn description(&self) -> Option<&'a str> {
        str_field(self.json, "description")
    }

    pub fn content_type(&self) -> Option<&'a str> {
        str_field(self.json, "contentType")
    }

    pub fn payload(&self) -> Option<&'a Value> {
        self.json.get("payload")
    }

    pub fn traits(&self) -> &'a [Value] {
        traits_of(self.json)
    }

    /// Validate an instance against this message's payload schema.
    ///
    /// Returns no diagnostics when the message declares no payload.
    pub fn validate_payload(&self, instance: &Value) -> Vec<Diagnostic> {
        match self.payload() {
            Some(schema) => validate_against_schema(schema, instance),
            None => Vec::new(),
        }
    }

    pub fn json(&self) -> &'a Map<String, Value> {
        self.json
    }
}

/// The `components` object.
#[derive(Debug, Clone, Copy)]
pub struct Components<'a> {
    json: &'a Map<String, Value>,
    schema: VersionedSchema,
}

impl<'a> Components<'a> {
    pub fn messages(&self) -> Vec<Message<'a>> {
        entries(self.json.get("messages"))
            .map(|(_, json)| Message { json })
            .collect()
    }

    pub fn channels(&self) -> Vec<Channel<'a>> {
        entries(self.json.get("channels"))
            .map(|(id, json)| Channel {
                id,
                json,
                schema: self.schema,
            })
            .collect()
    }

    pub fn servers(&self) -> Vec<Server<'a>> {
        entries(self.json.get("servers"))
            .map(|(id, json)| Server { id, json })
            .collect()
    }

    /// Any other component container (`schemas`, `messageTraits`, ...).
    pub fn get(&self, container: &str) -> Option<&'a Value> {
        self.json.get(container)
    }

    pub fn json(&self) -> &'a Map<String, Value> {
        self.json
    }
}

static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();

fn object(value: Option<&Value>) -> &Map<String, Value> {
    value
        .and_then(Value::as_object)
        .unwrap_or_else(|| EMPTY.get_or_init(Map::new))
}

fn entries<'a>(
    value: Option<&'a Value>,
) -> impl Iterator<Item = (&'a str, &'a Map<String, Value>)> + 'a {
    object(value)
        .iter()
        .filter_map(|(key, value)| Some((key.as_str(), value.as_object()?)))
}

fn str_field<'a>(json: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    json.get(key).and_then(Value::as_str)
}

fn traits_of(json: &Map<String, Value>) -> &[Value] {
    json.get(TRAITS_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v3_model() -> DocumentModel {
        DocumentModel::new(
            VersionedSchema::V3 { minor: 0 },
            json!({
                "asyncapi": "3.0.0",
                "info": { "title": "Account Service", "version": "1.0.0" },
                "servers": { "prod": { "host": "broker.example.com", "protocol": "amqp" } },
                "channels": {
                    "signup": {
                        "address": "user/signup",
                        "messages": {
                            "UserSignedUp": {
                                "x-parser-message-name": "UserSignedUp",
                                "payload": { "type": "object" }
                            }
                        }
                    }
                },
                "operations": {
                    "sendSignup": {
                        "action": "send",
                        "channel": { "address": "user/signup" },
                        "messages": [ {
                            "x-parser-message-name": "UserSignedUp",
                            "payload": { "type": "object" }
                        } ],
                        "traits": [ { "summary": "s" } ]
                    }
                },
                "components": {
                    "messages": {
                        "Ping": { "x-parser-message-name": "Ping" }
                    }
                }
            }),
        )
    }

    #[test]
    fn v3_accessors() {
        let model = v3_model();
        assert_eq!(model.version(), "3.0.0");
        assert_eq!(model.info().title(), Some("Account Service"));

        let server = model.server("prod").unwrap();
        assert_eq!(server.host(), Some("broker.example.com"));
        assert_eq!(server.protocol(), Some("amqp"));

        let channel = model.channel("signup").unwrap();
        assert_eq!(channel.address(), Some("user/signup"));
        assert_eq!(channel.messages().len(), 1);

        let op = model.operation("sendSignup").unwrap();
        assert_eq!(op.action(), Some("send"));
        assert_eq!(op.channel().unwrap().address(), Some("user/signup"));
        assert_eq!(op.traits().len(), 1);
    }

    #[test]
    fn messages_are_deduplicated_by_content() {
        let model = v3_model();
        let names: Vec<_> = model.messages().iter().filter_map(|m| m.name()).collect();
        assert_eq!(names, vec!["UserSignedUp", "Ping"]);
    }

    #[test]
    fn same_key_in_two_channels_keeps_both_messages() {
        let model = DocumentModel::new(
            VersionedSchema::V3 { minor: 0 },
            json!({
                "asyncapi": "3.0.0",
                "channels": {
                    "someChannel1": {
                        "messages": {
                            "someMessage": { "summary": "one", "x-parser-message-name": "someMessage" }
                        }
                    },
                    "someChannel2": {
                        "messages": {
                            "someMessage": { "summary": "two", "x-parser-message-name": "someMessage" }
                        }
                    }
                }
            }),
        );
        let summaries: Vec<_> = model.messages().iter().map(|m| m.summary()).collect();
        assert_eq!(summaries, vec![Some("one"), Some("two")]);
    }

    #[test]
    fn v2_operations_come_from_channels() {
        let model = DocumentModel::new(
            VersionedSchema::V2 { minor: 6 },
            json!({
                "asyncapi": "2.6.0",
                "channels": {
                    "user/signup": {
                        "publish": {
                            "operationId": "onSignup",
                            "message": { "x-parser-message-name": "Signup" }
                        },
                        "subscribe": {
                            "message": { "oneOf": [
                                { "x-parser-message-name": "A" },
                                { "x-parser-message-name": "B" }
                            ] }
                        }
                    }
                }
            }),
        );

        let ops = model.operations();
        let ids: Vec<_> = ops.iter().map(|o| o.id().to_string()).collect();
        assert_eq!(ids, vec!["onSignup", "user/signup.subscribe"]);
        assert_eq!(ops[1].action(), Some("subscribe"));
        assert_eq!(ops[0].channel().unwrap().address(), Some("user/signup"));

        let names: Vec<_> = model.messages().iter().filter_map(|m| m.name()).collect();
        assert_eq!(names, vec!["Signup", "A", "B"]);
    }

    #[test]
    fn missing_sections_are_empty() {
        let model = DocumentModel::new(VersionedSchema::V3 { minor: 0 }, json!({}));
        assert!(model.servers().is_empty());
        assert!(model.channels().is_empty());
        assert!(model.operations().is_empty());
        assert!(model.messages().is_empty());
        assert_eq!(model.info().title(), None);
        assert_eq!(model.version(), "");
    }

    #[test]
    fn payload_validation() {
        let model = v3_model();
        let channel = model.channel("signup").unwrap();
        let message = channel.messages()[0];
        assert!(message.validate_payload(&json!({ "id": 1 })).is_empty());
        assert_eq!(message.validate_payload(&json!("not an object")).len(), 1);
    }

    #[test]
    fn serializes_as_plain_tree() {
        let model = v3_model();
        let out = serde_json::to_value(&model).unwrap();
        assert_eq!(&out, model.json());
    }
}
