//! Relay Chat wire protocol
//!
//! One WebSocket per client. Every text frame is a JSON object naming the
//! event and carrying its payload:
//!
//! ```json
//! {"event":"chat message","data":{"user":"alice","text":"hello"}}
//! ```
//!
//! Connect and disconnect are transport-native and never framed. The display
//! name travels as handshake metadata in the upgrade request's query string.

mod envelope;
mod frame;
mod handshake;

pub use envelope::Envelope;
pub use frame::{CHAT_MESSAGE_EVENT, Frame, RawFrame};
pub use handshake::{HandshakeError, HandshakeQuery, USERNAME_PARAM, WS_PATH, handshake_url};
