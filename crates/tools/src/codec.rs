//! Tool value codecs.
//!
//! A codec canonicalizes and validates the JSON crossing the tool
//! boundary. Codecs never mutate their inputs; round-tripping a
//! conforming value is identity modulo JSON canonicalization (serde_json
//! maps are key-sorted, so re-encoding is canonical).

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use arbor_domain::{Error, Result};

pub trait Codec: Send + Sync {
    /// Typed value to canonical JSON.
    fn encode(&self, value: &Value) -> Result<Value>;
    /// Raw JSON to the tool's typed value.
    fn decode(&self, raw: &Value) -> Result<Value>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schema codec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validates against the JSON-Schema subset tool specs use (`type`,
/// `properties`, `required`, `items`). Missing required fields surface as
/// `SchemaMismatch` carrying the field list, which drives
/// `missing_fields` retry hints.
pub struct SchemaCodec {
    schema: Value,
}

impl SchemaCodec {
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }
}

impl Codec for SchemaCodec {
    fn encode(&self, value: &Value) -> Result<Value> {
        check_schema(&self.schema, value)?;
        Ok(value.clone())
    }

    fn decode(&self, raw: &Value) -> Result<Value> {
        check_schema(&self.schema, raw)?;
        Ok(raw.clone())
    }
}

/// Validate `value` against a schema. Top-level entry for callers that
/// only need the check.
pub fn check_schema(schema: &Value, value: &Value) -> Result<()> {
    check_at(schema, value, "$")
}

fn check_at(schema: &Value, value: &Value, path: &str) -> Result<()> {
    let Some(ty) = schema.get("type").and_then(Value::as_str) else {
        return Ok(());
    };
    match ty {
        "object" => {
            let Some(obj) = value.as_object() else {
                return Err(mismatch(path, "object", value));
            };
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                let missing: Vec<String> = required
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|key| !obj.contains_key(*key))
                    .map(str::to_owned)
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::schema_mismatch(
                        format!("missing required fields at {path}: {}", missing.join(", ")),
                        missing,
                    ));
                }
            }
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (key, prop_schema) in props {
                    if let Some(child) = obj.get(key) {
                        check_at(prop_schema, child, &format!("{path}.{key}"))?;
                    }
                }
            }
            Ok(())
        }
        "array" => {
            let Some(items) = value.as_array() else {
                return Err(mismatch(path, "array", value));
            };
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_at(item_schema, item, &format!("{path}[{i}]"))?;
                }
            }
            Ok(())
        }
        "string" => {
            if value.is_string() {
                Ok(())
            } else {
                Err(mismatch(path, "string", value))
            }
        }
        "integer" => {
            if value.as_i64().is_some() || value.as_u64().is_some() {
                Ok(())
            } else {
                Err(mismatch(path, "integer", value))
            }
        }
        "number" => {
            if value.is_number() {
                Ok(())
            } else {
                Err(mismatch(path, "number", value))
            }
        }
        "boolean" => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(mismatch(path, "boolean", value))
            }
        }
        "null" => {
            if value.is_null() {
                Ok(())
            } else {
                Err(mismatch(path, "null", value))
            }
        }
        // Unknown type keywords are accepted rather than guessed at.
        _ => Ok(()),
    }
}

fn mismatch(path: &str, expected: &str, value: &Value) -> Error {
    Error::schema_mismatch(
        format!("expected {expected} at {path}, got {}", json_type(value)),
        Vec::new(),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed codec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Codec backed by a concrete serde type: decode proves the JSON
/// deserializes into `T`, re-encoding yields the canonical form.
pub struct TypedCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec for TypedCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &Value) -> Result<Value> {
        self.decode(value)
    }

    fn decode(&self, raw: &Value) -> Result<Value> {
        let typed: T = serde_json::from_value(raw.clone())
            .map_err(|e| Error::codec_failure(e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| Error::codec_failure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_domain::ErrorKind;
    use serde::Deserialize;

    fn lookup_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["id"]
        })
    }

    #[test]
    fn conforming_payload_round_trips_identically() {
        let codec = SchemaCodec::new(lookup_schema());
        let payload = serde_json::json!({"id": "x", "limit": 3});
        let decoded = codec.decode(&payload).unwrap();
        assert_eq!(codec.encode(&decoded).unwrap(), payload);
    }

    #[test]
    fn missing_required_field_lists_it() {
        let codec = SchemaCodec::new(lookup_schema());
        let err = codec.decode(&serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaMismatch);
        assert_eq!(err.missing_fields, vec!["id".to_string()]);
    }

    #[test]
    fn wrong_shape_is_schema_mismatch_without_fields() {
        let codec = SchemaCodec::new(lookup_schema());
        let err = codec.decode(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaMismatch);
        assert!(err.missing_fields.is_empty());
    }

    #[test]
    fn wrong_property_type_names_the_path() {
        let codec = SchemaCodec::new(lookup_schema());
        let err = codec
            .decode(&serde_json::json!({"id": "x", "limit": "three"}))
            .unwrap_err();
        assert!(err.message.contains("$.limit"), "message: {}", err.message);
    }

    #[test]
    fn array_items_are_checked() {
        let schema = serde_json::json!({
            "type": "array",
            "items": { "type": "string" }
        });
        assert!(check_schema(&schema, &serde_json::json!(["a", "b"])).is_ok());
        let err = check_schema(&schema, &serde_json::json!(["a", 1])).unwrap_err();
        assert!(err.message.contains("$[1]"));
    }

    #[test]
    fn schemaless_accepts_anything() {
        let codec = SchemaCodec::new(serde_json::json!({}));
        assert!(codec.decode(&serde_json::json!({"anything": [1, 2]})).is_ok());
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoPayload {
        msg: String,
    }

    #[test]
    fn typed_codec_rejects_nonconforming_json() {
        let codec: TypedCodec<EchoPayload> = TypedCodec::new();
        let err = codec.decode(&serde_json::json!({"msg": 42})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CodecFailure);
    }

    #[test]
    fn typed_codec_round_trips() {
        let codec: TypedCodec<EchoPayload> = TypedCodec::new();
        let payload = serde_json::json!({"msg": "hi"});
        assert_eq!(codec.decode(&payload).unwrap(), payload);
    }

    #[test]
    fn codec_does_not_mutate_input() {
        let codec = SchemaCodec::new(lookup_schema());
        let payload = serde_json::json!({"id": "x"});
        let before = payload.clone();
        let _ = codec.decode(&payload).unwrap();
        assert_eq!(payload, before);
    }
}
