//! # Configuration
//!
//! Client settings, loadable from JSON. Every field has a default, so `{}` is
//! a valid configuration.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::backend::Feature;
use crate::error::Error;
use crate::error::Result;
use crate::names::NameMint;
use crate::peer::Timeouts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run against an in-process engine instead of a worker.
    pub local: bool,
    pub request_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    /// Capabilities the worker advertises.
    pub features: Vec<Feature>,
    /// Forwarded to the worker in the `init` message.
    pub init_options: JsonValue,
    /// Loaded with a `load` message right after `init`.
    pub packages: Vec<String>,
    /// Tag embedded in minted variable names. Random when unset.
    pub name_tag: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local: false,
            request_timeout_ms: 30_000,
            sweep_interval_ms: 1_000,
            features: vec![Feature::Buffers],
            init_options: JsonValue::Null,
            packages: Vec::new(),
            name_tag: None,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_millis(self.request_timeout_ms),
            sweep: Duration::from_millis(self.sweep_interval_ms),
        }
    }

    pub fn name_mint(&self) -> NameMint {
        match &self.name_tag {
            Some(tag) => NameMint::with_tag(tag.clone()),
            None => NameMint::new(),
        }
    }
}
