//! # Reference Markers
//!
//! Values that cannot be written literally into a message body are replaced by
//! small marker objects tagged with `_kind`:
//!
//! - `{"_kind": "name", "name": "df1"}` names a variable living in the worker.
//! - `{"_kind": "buffer", "index": 0}` points into the frame's transfer list.

use serde_json::Map;
use serde_json::Value;

pub const KIND_FIELD: &str = "_kind";
pub const NAME_KIND: &str = "name";
pub const BUFFER_KIND: &str = "buffer";

/// Reusable token a caller embeds in code or kwargs to stand for "the callback
/// attached to this request". The peer rewrites it per request id.
pub const CALLBACK_PLACEHOLDER: &str = "__blurr__callback_";

/// Builds a Name reference marker.
pub fn name_ref(name: &str) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), Value::String(name.to_string()));
    obj.insert(KIND_FIELD.into(), Value::String(NAME_KIND.into()));
    Value::Object(obj)
}

/// Builds a transfer-list reference marker.
pub fn buffer_ref(index: usize) -> Value {
    let mut obj = Map::new();
    obj.insert("index".into(), Value::from(index as u64));
    obj.insert(KIND_FIELD.into(), Value::String(BUFFER_KIND.into()));
    Value::Object(obj)
}

/// Returns the variable name if `value` is a Name reference marker.
pub fn as_name_ref(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get(KIND_FIELD)?.as_str()? != NAME_KIND {
        return None;
    }
    obj.get("name")?.as_str()
}

/// Returns the transfer index if `value` is a buffer reference marker.
pub fn as_buffer_ref(value: &Value) -> Option<usize> {
    let obj = value.as_object()?;
    if obj.get(KIND_FIELD)?.as_str()? != BUFFER_KIND {
        return None;
    }
    obj.get("index")?.as_u64().map(|i| i as usize)
}

/// Renames every Name reference equal to `from` inside `value`, recursively.
pub(crate) fn rename_refs(value: &mut Value, from: &str, to: &str) {
    if as_name_ref(value) == Some(from) {
        if let Some(obj) = value.as_object_mut() {
            obj.insert("name".into(), Value::String(to.to_string()));
        }
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(|v| rename_refs(v, from, to)),
        Value::Object(obj) => obj.values_mut().for_each(|v| rename_refs(v, from, to)),
        _ => (),
    }
}
