//! Client side of the relay chat: the session state machine, the chat view
//! controller and the pieces of the terminal front end.

pub mod console;
pub mod error;
pub mod session;
pub mod state;
pub mod username;
pub mod view;

pub use error::ConnectError;
pub use session::{SessionConfig, SessionHandle};
pub use state::{ConnectionState, SessionEvent};
pub use username::{UsernameError, validate_username};
pub use view::{ChatMessage, ChatView};
