//! Message model and body serialization.
//!
//! A message is `{client_id, command, payload}`; how it is laid out inside a
//! frame body is decided by a [`BodyFormat`].

pub use format::{BinaryFormat, BodyFormat, JsonFormat, WireFormat};
pub use message::{
    Command, Message, AUTH_BACK_PAYLOAD, AUTH_PAYLOAD, DEFAULT_PING_PAYLOAD, PONG_PAYLOAD,
};

mod format;
mod message;
