//! Integration tests for end-to-end normalization.

use asyncapi_normalize::{
    normalize, DiagnosticKind, FileFetcher, NormalizeOptions, Normalizer, Severity, Stage,
    VersionedSchema,
};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn normalized_json(doc: &Value) -> Value {
    let result = normalize(doc);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    result.model.unwrap().into_json()
}

mod trait_merge {
    use super::*;

    fn operation_doc(op: Value) -> Value {
        json!({
            "asyncapi": "3.0.0",
            "channels": { "channel1": {} },
            "operations": { "op": op }
        })
    }

    #[test]
    fn later_trait_wins() {
        let doc = operation_doc(json!({
            "action": "send",
            "channel": { "$ref": "#/channels/channel1" },
            "traits": [
                { "description": "some description" },
                { "description": "another description" }
            ]
        }));
        let json = normalized_json(&doc);
        assert_eq!(
            json["operations"]["op"],
            json!({
                "action": "send",
                "channel": {},
                "description": "another description",
                "traits": [
                    { "description": "some description" },
                    { "description": "another description" }
                ]
            })
        );
    }

    #[test]
    fn own_value_wins() {
        let doc = operation_doc(json!({
            "action": "send",
            "channel": { "$ref": "#/channels/channel1" },
            "description": "root description",
            "traits": [
                { "description": "some description" },
                { "description": "another description" }
            ]
        }));
        let json = normalized_json(&doc);
        assert_eq!(json["operations"]["op"]["description"], "root description");
        assert_eq!(json["operations"]["op"]["traits"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn untouched_trait_keys_survive() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "components": {
                "messages": {
                    "m": {
                        "traits": [
                            { "summary": "s1", "description": "d1" },
                            { "description": "d2" }
                        ]
                    }
                }
            }
        });
        let json = normalized_json(&doc);
        let message = &json["components"]["messages"]["m"];
        assert_eq!(message["summary"], "s1");
        assert_eq!(message["description"], "d2");
    }

    #[test]
    fn shared_definition_is_not_mutated() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": {
                "a": { "messages": { "x": { "$ref": "#/components/messages/shared" } } },
                "b": { "messages": { "y": { "$ref": "#/components/messages/shared" } } }
            },
            "components": {
                "messages": {
                    "shared": { "summary": "own", "traits": [ { "summary": "t", "title": "T" } ] }
                }
            }
        });
        let json = normalized_json(&doc);
        let x = &json["channels"]["a"]["messages"]["x"];
        let y = &json["channels"]["b"]["messages"]["y"];
        assert_eq!(x, y);
        assert_eq!(x["summary"], "own");
        assert_eq!(x["title"], "T");
        // Input is untouched
        assert!(doc["components"]["messages"]["shared"].get("title").is_none());
    }
}

mod references {
    use super::*;

    #[test]
    fn message_key_becomes_name() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": {
                "c": { "messages": { "someMessage": { "payload": { "type": "string" } } } }
            }
        });
        let json = normalized_json(&doc);
        assert_eq!(
            json["channels"]["c"]["messages"]["someMessage"],
            json!({
                "payload": { "type": "string" },
                "x-parser-message-name": "someMessage"
            })
        );
    }

    #[test]
    fn dangling_channel_does_not_stop_other_operations() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": { "real": { "address": "real" } },
            "operations": {
                "broken": { "action": "send", "channel": { "$ref": "#/channels/missing" } },
                "fine": { "action": "receive", "channel": { "$ref": "#/channels/real" } }
            }
        });
        let result = normalize(&doc);
        assert_eq!(result.stage, Stage::Done);
        assert_eq!(result.diagnostics.len(), 1);
        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::DanglingReference);
        assert_eq!(diagnostic.severity, Severity::Error);

        let model = result.model.unwrap();
        assert_eq!(model.json()["operations"]["broken"]["channel"], json!({}));
        let fine = model.operation("fine").unwrap();
        assert_eq!(fine.channel().unwrap().address(), Some("real"));
    }

    #[test]
    fn cycle_is_reported_not_followed() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": {
                "a": { "$ref": "#/channels/b" },
                "b": { "$ref": "#/channels/a" }
            }
        });
        let result = normalize(&doc);
        assert!(result.is_ok());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::CyclicReference));
    }

    #[test]
    fn external_refs_without_fetcher_warn() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": { "c": { "$ref": "common.yaml#/channels/c" } }
        });
        let result = normalize(&doc);
        assert!(result.is_ok());
        assert!(!result.has_errors());
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::FetchFailure);
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    }
}

mod version_gate {
    use super::*;

    #[test]
    fn unsupported_version_fails() {
        for version in [json!("1.2.0"), json!("4.0.0"), json!(3), json!("3.0")] {
            let doc = json!({ "asyncapi": version, "channels": { "c": { "$ref": "#/x" } } });
            let result = normalize(&doc);
            assert!(result.model.is_none());
            assert_eq!(result.diagnostics.len(), 1);
            assert_eq!(result.diagnostics[0].kind, DiagnosticKind::UnsupportedVersion);
        }
    }

    #[test]
    fn missing_version_fails() {
        let result = normalize(&json!({ "info": { "title": "t" } }));
        assert!(result.model.is_none());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn selects_layout() {
        let v2 = normalize(&json!({ "asyncapi": "2.6.0" })).model.unwrap();
        assert_eq!(v2.schema(), VersionedSchema::V2 { minor: 6 });
        let v3 = normalize(&json!({ "asyncapi": "3.0.0" })).model.unwrap();
        assert_eq!(v3.schema(), VersionedSchema::V3 { minor: 0 });
    }
}

mod v2_documents {
    use super::*;

    #[test]
    fn channel_operations_are_exposed() {
        let doc = json!({
            "asyncapi": "2.6.0",
            "info": { "title": "Signup", "version": "1.0.0" },
            "channels": {
                "user/signup": {
                    "subscribe": {
                        "operationId": "onSignup",
                        "traits": [ { "$ref": "#/components/operationTraits/kafka" } ],
                        "message": { "$ref": "#/components/messages/UserSignedUp" }
                    }
                }
            },
            "components": {
                "operationTraits": { "kafka": { "bindings": { "kafka": { "clientId": "c" } } } },
                "messages": { "UserSignedUp": { "payload": { "type": "object" } } }
            }
        });
        let result = normalize(&doc);
        assert!(result.diagnostics.is_empty());
        let model = result.model.unwrap();

        assert_eq!(model.info().title(), Some("Signup"));
        let channel = model.channel("user/signup").unwrap();
        assert_eq!(channel.address(), Some("user/signup"));

        let operations = channel.operations();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].id(), "onSignup");
        assert_eq!(operations[0].action(), Some("subscribe"));
        assert!(operations[0].json().contains_key("bindings"));

        let messages = operations[0].messages();
        assert_eq!(messages[0].name(), Some("UserSignedUp"));
    }
}

mod options {
    use super::*;

    #[test]
    fn strip_traits_hides_trait_lists() {
        let doc = json!({
            "asyncapi": "3.0.0",
            "components": {
                "messages": { "m": { "traits": [ { "summary": "s" } ] } }
            }
        });
        let result = Normalizer::new(NormalizeOptions::new().strip_traits(true)).normalize(&doc);
        let json = result.model.unwrap().into_json();
        let message = &json["components"]["messages"]["m"];
        assert_eq!(message["summary"], "s");
        assert!(message.get("traits").is_none());
    }

    #[test]
    fn file_fetcher_inlines_external_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("common.yaml"),
            "components:\n  messages:\n    ping:\n      payload:\n        $ref: '#/components/schemas/Ping'\n  schemas:\n    Ping:\n      type: string\n",
        )
        .unwrap();

        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": {
                "c": { "messages": { "m": { "$ref": "common.yaml#/components/messages/ping" } } }
            }
        });
        let options = NormalizeOptions::new().with_fetcher(FileFetcher::new(dir.path()));
        let result = Normalizer::new(options).normalize(&doc);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

        let model = result.model.unwrap();
        let message = model.channel("c").unwrap().messages()[0];
        assert_eq!(message.payload(), Some(&json!({ "type": "string" })));
        assert!(message.validate_payload(&json!("hello")).is_empty());
        assert_eq!(message.validate_payload(&json!(42)).len(), 1);
    }

    #[test]
    fn missing_external_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let doc = json!({
            "asyncapi": "3.0.0",
            "channels": { "c": { "$ref": "missing.yaml#/channels/c" } }
        });
        let options = NormalizeOptions::new().with_fetcher(FileFetcher::new(dir.path()));
        let result = Normalizer::new(options).normalize(&doc);
        assert!(result.is_ok());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::FetchFailure);
        assert_eq!(result.diagnostics[0].path, "/channels/c");
        assert_eq!(result.model.unwrap().json()["channels"]["c"], json!({}));
    }
}
