//! Line-oriented terminal rendering and command parsing for `relay-chat`.

use crate::state::{ConnectionState, SessionEvent};
use crate::view::{ChatMessage, ChatView};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Status,
    Help,
    Quit,
    Say(String),
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(name) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };
        match name.split_whitespace().next().unwrap_or_default() {
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "status" => Command::Status,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
Commands:
  /connect      connect (or reconnect) to the relay
  /disconnect   leave the room
  /status       show connection state and last message
  /quit         exit
Anything else is sent as a message.";

pub fn render_message(message: &ChatMessage) -> String {
    if message.is_self {
        format!("[{}] {} (you): {}", message.time, message.user, message.text)
    } else {
        format!("[{}] {}: {}", message.time, message.user, message.text)
    }
}

/// Status line for connection transitions. Messages render via
/// [`render_message`].
pub fn render_transition(event: &SessionEvent) -> Option<&'static str> {
    match event {
        SessionEvent::Connected => Some("* online"),
        SessionEvent::Disconnected => Some("* offline (type /connect to reconnect)"),
        SessionEvent::Message(_) => None,
    }
}

pub fn render_status(view: &ChatView, state: ConnectionState) -> String {
    format!(
        "* {} as {} | {} message(s) | last: {}",
        state,
        view.username(),
        view.messages().len(),
        view.preview()
    )
}
