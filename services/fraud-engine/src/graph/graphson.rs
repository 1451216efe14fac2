//! GraphSON 2 decoding
//!
//! The Gremlin HTTP endpoint answers with typed JSON where every non-string
//! scalar and every container is wrapped as `{"@type": ..., "@value": ...}`.
//! The engine works with plain `serde_json::Value`, so responses are
//! flattened once at the transport boundary.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Response envelope of the Gremlin HTTP endpoint
#[derive(Debug, Deserialize)]
pub struct GremlinResponse {
    #[serde(default)]
    pub status: GremlinStatus,
    #[serde(default)]
    pub result: GremlinResult,
}

#[derive(Debug, Default, Deserialize)]
pub struct GremlinStatus {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GremlinResult {
    #[serde(default)]
    pub data: Option<Value>,
}

/// Recursively strip GraphSON `@type`/`@value` wrappers.
///
/// Maps arrive as flat key/value pair lists and are rebuilt as JSON objects;
/// element wrappers (vertex, edge, property) reduce to their value payload.
pub fn flatten(value: Value) -> Value {
    match value {
        Value::Object(map) => flatten_object(map),
        Value::Array(items) => Value::Array(items.into_iter().map(flatten).collect()),
        other => other,
    }
}

fn flatten_object(map: Map<String, Value>) -> Value {
    let type_tag = map.get("@type").and_then(Value::as_str).map(str::to_string);
    let Some(type_tag) = type_tag else {
        // Plain object: flatten each member
        return Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, flatten(value)))
                .collect(),
        );
    };

    let inner = map.get("@value").cloned().unwrap_or(Value::Null);
    match type_tag.as_str() {
        "g:Map" => flatten_pairs(inner),
        "g:List" | "g:Set" | "g:Path" => flatten(inner),
        // Scalars carry their payload directly
        "g:Int32" | "g:Int64" | "g:Float" | "g:Double" | "g:Date" | "g:Timestamp" => {
            flatten(inner)
        }
        "g:UUID" | "g:T" | "g:Direction" => flatten(inner),
        // Elements reduce to their property payload
        "g:Vertex" | "g:Edge" | "g:VertexProperty" | "g:Property" => flatten(inner),
        _ => flatten(inner),
    }
}

/// GraphSON maps are `[k1, v1, k2, v2, ...]`
fn flatten_pairs(value: Value) -> Value {
    let Value::Array(items) = value else {
        return flatten(value);
    };
    let mut object = Map::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(val)) = (iter.next(), iter.next()) {
        object.insert(key_to_string(flatten(key)), flatten(val));
    }
    Value::Object(object)
}

/// Map keys may be strings, tokens (`T.id`, `T.label`) or numbers
pub fn key_to_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Render an opaque element id (string, number or structured) as a string
pub fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
