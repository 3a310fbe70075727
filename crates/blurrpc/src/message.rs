//! # Messages
//!
//! One record type covers requests, terminal replies, streamed callback
//! results and channel faults. Requests always carry an `id`; a message without
//! one is a fault that cannot be attributed to any request.
//!
//! ## Invariants
//! - A reply reuses the `type` and `id` of the request it answers.
//! - `isCallbackResult` marks a non-terminal delivery; the terminal reply for
//!   the same id follows it.
//! - `partial` marks a reply whose result is only a Name stub because the real
//!   value could not be encoded.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::reference;

/// The kind of work a message asks for (or answers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Init,
    Load,
    Run,
    SetGlobal,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Load => write!(f, "load"),
            Self::Run => write!(f, "run"),
            Self::SetGlobal => write!(f, "setGlobal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: MessageKind,

    // request fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_callback: Option<String>,

    // reply fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_callback_result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl Message {
    /// An empty message of the given kind, without an id.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            id: None,
            kind,
            code: None,
            source: None,
            path: None,
            kwargs: None,
            name: None,
            value: None,
            packages: None,
            options: None,
            uses_callback: None,
            result: None,
            error: None,
            is_callback_result: None,
            partial: None,
        }
    }

    pub fn init(options: Value) -> Self {
        let mut msg = Self::new(MessageKind::Init);
        msg.options = Some(options);
        msg
    }

    pub fn load(packages: Vec<String>) -> Self {
        let mut msg = Self::new(MessageKind::Load);
        msg.packages = Some(packages);
        msg
    }

    pub fn run_code(code: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Run);
        msg.code = Some(code.into());
        msg
    }

    pub fn run_method(source: Option<String>, path: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        let mut msg = Self::new(MessageKind::Run);
        msg.source = source;
        msg.path = Some(path.into());
        msg.kwargs = Some(kwargs);
        msg
    }

    pub fn set_global(name: impl Into<String>, value: Value) -> Self {
        let mut msg = Self::new(MessageKind::SetGlobal);
        msg.name = Some(name.into());
        msg.value = Some(value);
        msg
    }

    /// A terminal successful reply.
    pub fn reply(kind: MessageKind, id: u64, result: Value) -> Self {
        let mut msg = Self::new(kind);
        msg.id = Some(id);
        msg.result = Some(result);
        msg
    }

    /// A terminal failed reply.
    pub fn failure(kind: MessageKind, id: u64, error: impl Into<String>) -> Self {
        let mut msg = Self::new(kind);
        msg.id = Some(id);
        msg.error = Some(error.into());
        msg
    }

    /// A non-terminal callback delivery for a `run` request.
    pub fn callback(id: u64, result: Value) -> Self {
        let mut msg = Self::reply(MessageKind::Run, id, result);
        msg.is_callback_result = Some(true);
        msg
    }

    /// A channel-level fault that no request can be blamed for.
    pub fn fault(kind: MessageKind, error: impl Into<String>) -> Self {
        let mut msg = Self::new(kind);
        msg.error = Some(error.into());
        msg
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_partial(mut self) -> Self {
        self.partial = Some(true);
        self
    }

    /// Names the variable a `run` request writes to, so a result that
    /// cannot be sent back can be answered with a reference to it.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.kwargs
            .get_or_insert_with(Map::new)
            .insert("target".into(), Value::String(target.into()));
        self
    }

    pub fn is_callback_result(&self) -> bool {
        self.is_callback_result.unwrap_or(false)
    }

    pub fn is_partial(&self) -> bool {
        self.partial.unwrap_or(false)
    }

    /// The `target` kwarg, if it is a plain string or a Name reference.
    pub fn target(&self) -> Option<&str> {
        let target = self.kwargs.as_ref()?.get("target")?;
        target.as_str().or_else(|| reference::as_name_ref(target))
    }

    /// Replaces a callback placeholder token with a request-unique one.
    ///
    /// Code is rewritten textually; kwargs are rewritten wherever a Name
    /// reference names the placeholder.
    pub fn rewrite_callback(&mut self, placeholder: &str, unique: &str) {
        if let Some(code) = self.code.as_mut() {
            *code = code.replace(placeholder, unique);
        }
        if let Some(kwargs) = self.kwargs.as_mut() {
            for value in kwargs.values_mut() {
                reference::rename_refs(value, placeholder, unique);
            }
        }
    }
}
