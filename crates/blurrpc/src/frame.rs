//! # Frames
//!
//! The envelope a transport moves: a JSON body plus the buffers transferred
//! alongside it.
//!
//! ## Invariants
//! - Decoding never panics on unknown data; unknown fields are ignored.
//! - `transfer[i]` is what `{"_kind": "buffer", "index": i}` in the body points at.

use serde_json::Value;

use crate::error::Error;
use crate::error::Result;
use crate::message::Message;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub body: Vec<u8>,
    pub transfer: Vec<Vec<u8>>,
}

impl Frame {
    /// Encodes a message and attaches its transfer list.
    pub fn encode(message: &Message, transfer: Vec<Vec<u8>>) -> Result<Self> {
        let body = serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self { body, transfer })
    }

    /// Decodes the message in the body.
    pub fn decode(&self) -> Result<Message> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Malformed(e.to_string()))
    }

    /// Best-effort extraction of the `id` from a body that failed to decode,
    /// so the failure can be attributed to a single request.
    pub fn peek_id(&self) -> Option<u64> {
        let value: Value = serde_json::from_slice(&self.body).ok()?;
        value.get("id")?.as_u64()
    }
}
