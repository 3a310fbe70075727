//! # blurrpc
//!
//! Wire format for the channel between a client and a worker running a
//! dataframe engine.
//!
//! ## Architecture
//!
//! Every exchange is a single JSON `Message` correlated by an integer `id`.
//! Binary payloads never travel inside the JSON body: they are moved out of band
//! in the `Frame` transfer list and referenced from the body by index.
//!
//! - `message`: the message record and its kinds.
//! - `frame`: the envelope carried by a transport (JSON body + transfer list).
//! - `reference`: marker objects for Name references and transferred buffers.

pub mod error;
pub mod frame;
pub mod message;
pub mod reference;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use error::Result;
pub use frame::Frame;
pub use message::Message;
pub use message::MessageKind;
pub use reference::CALLBACK_PLACEHOLDER;
pub use reference::as_buffer_ref;
pub use reference::as_name_ref;
pub use reference::buffer_ref;
pub use reference::name_ref;
