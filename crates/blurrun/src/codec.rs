//! # Wire Codec
//!
//! Converts between `Value` and the JSON carried in a message body. Buffers
//! leave the body and travel in the frame's transfer list.
//!
//! ## Invariants
//! - Handles and Name references are both written as Name reference markers,
//!   so a decoded handle comes back as a `Name`.
//! - Callbacks, proxies and non-finite floats have no wire form and are
//!   rejected rather than silently dropped.

use blurrpc::as_buffer_ref;
use blurrpc::as_name_ref;
use blurrpc::buffer_ref;
use blurrpc::name_ref;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value as JsonValue;

use crate::value::Kwargs;
use crate::value::Name;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The value only exists in this process.
    Unclonable(&'static str),
    NonFiniteFloat,
    /// A buffer reference points past the transfer list.
    MissingTransfer(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unclonable(what) => write!(f, "A {} cannot be sent over the channel", what),
            Self::NonFiniteFloat => write!(f, "Non-finite float cannot be encoded"),
            Self::MissingTransfer(index) => write!(f, "Transfer buffer {} is missing", index),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Encodes a value, appending any buffers to `transfer`.
pub fn encode(value: &Value, transfer: &mut Vec<Vec<u8>>) -> Result<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(x) => JsonValue::Number(Number::from_f64(*x).ok_or(Error::NonFiniteFloat)?),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Name(name) => name_ref(name.as_str()),
        Value::Handle(source) => name_ref(source.name()),
        Value::Buffer(bytes) => {
            transfer.push(bytes.clone());
            buffer_ref(transfer.len() - 1)
        }
        Value::Callback(_) => return Err(Error::Unclonable("callback")),
        Value::Proxy(_) => return Err(Error::Unclonable("proxy")),
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|v| encode(v, transfer))
                .collect::<Result<_>>()?,
        ),
        Value::Record(record) => JsonValue::Object(encode_map(record, transfer)?),
    })
}

/// Encodes keyword arguments into a JSON object.
pub fn encode_kwargs(kwargs: &Kwargs, transfer: &mut Vec<Vec<u8>>) -> Result<Map<String, JsonValue>> {
    encode_map(kwargs, transfer)
}

fn encode_map(map: &Kwargs, transfer: &mut Vec<Vec<u8>>) -> Result<Map<String, JsonValue>> {
    let mut out = Map::new();
    for (key, value) in map {
        out.insert(key.clone(), encode(value, transfer)?);
    }
    Ok(out)
}

/// Decodes a JSON value, resolving buffer references against `transfer`.
pub fn decode(json: &JsonValue, transfer: &[Vec<u8>]) -> Result<Value> {
    if let Some(name) = as_name_ref(json) {
        return Ok(Value::Name(Name::new(name)));
    }
    if let Some(index) = as_buffer_ref(json) {
        let bytes = transfer.get(index).ok_or(Error::MissingTransfer(index))?;
        return Ok(Value::Buffer(bytes.clone()));
    }
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Str(s.clone()),
        JsonValue::Array(items) => Value::List(
            items
                .iter()
                .map(|v| decode(v, transfer))
                .collect::<Result<_>>()?,
        ),
        JsonValue::Object(obj) => Value::Record(decode_map(obj, transfer)?),
    })
}

/// Decodes a JSON object into keyword arguments.
pub fn decode_kwargs(obj: &Map<String, JsonValue>, transfer: &[Vec<u8>]) -> Result<Kwargs> {
    decode_map(obj, transfer)
}

fn decode_map(obj: &Map<String, JsonValue>, transfer: &[Vec<u8>]) -> Result<Kwargs> {
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), decode(v, transfer)?)))
        .collect()
}
