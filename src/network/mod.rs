//! Network Module Implementation
//!
//! Byte level plumbing shared by the server and the client: turning a TCP byte
//! stream into messages and back.
//!
//! # Components
//!
//! - `FrameCodec`: length-prefixed framing with a maximum frame size, usable
//!   directly or through tokio-util's `Decoder`/`Encoder`
//! - `Connection`: the read half of a socket plus the buffer partial frames wait in
//! - `MessageWriter`: the buffered write half of a socket
//!
//! Framing errors are never recovered from, the owning session closes the
//! socket as soon as one is returned.

pub use connection::{Connection, MessageWriter};
pub use frame::FrameCodec;
mod connection;
mod frame;
