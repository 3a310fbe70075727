//! # blurrun
//!
//! Operation dispatch and async messaging for a dataframe engine that runs
//! either in this process or behind a message channel.
//!
//! ## Architecture
//!
//! - `operation`, `registry`: declarative operations and their registries.
//! - `args`, `marshal`: argument normalization and host-value marshalling.
//! - `dispatch`, `pipeline`, `mode`: running one operation or a chain of
//!   them, as structured calls (in process) or generated code (remote).
//! - `client`, `source`: the user-facing surface and backend handles,
//!   including deferred chains.
//! - `backend`, `local`, `worker`: where execution happens.
//! - `peer`, `transport`, `codec`: the request/reply layer between a client
//!   and a worker; `host` is the worker side of it.

pub mod args;
pub mod backend;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod host;
pub mod local;
pub mod logging;
pub mod marshal;
pub mod mock_engine;
pub mod mock_transport;
pub mod mode;
pub mod names;
pub mod operation;
pub mod peer;
pub mod pipeline;
pub mod python;
pub mod registry;
pub mod source;
pub mod transport;
pub mod value;
pub mod worker;

#[cfg(test)]
mod tests;

pub use args::ArgSpec;
pub use args::Args;
pub use backend::Backend;
pub use backend::Feature;
pub use backend::SharedBackend;
pub use client::Client;
pub use client::ClientBuilder;
pub use config::Config;
pub use engine::Engine;
pub use engine::EngineError;
pub use error::Error;
pub use error::Result;
pub use host::WorkerHost;
pub use local::LocalBackend;
pub use operation::Kind;
pub use operation::Operation;
pub use peer::Peer;
pub use pipeline::Invocation;
pub use registry::InitRegistry;
pub use registry::OperationRegistry;
pub use source::Source;
pub use transport::Transport;
pub use value::Callback;
pub use value::Kwargs;
pub use value::Name;
pub use value::Proxy;
pub use value::Record;
pub use value::Value;
pub use worker::WorkerBackend;
