//! WebSocket side of the relay
//!
//! - `handshake`: origin allow-list and handshake metadata checks, run
//!   before the upgrade so rejected clients never become sessions
//! - `session`: the per-connection task bridging a socket to the registry

mod handshake;
mod session;

pub use handshake::{HandshakeRejection, OriginPolicy, resolve_display_name};
pub use session::handle_session;
