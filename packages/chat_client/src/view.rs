//! Chat View Controller
//!
//! Turns session events into the append-only conversation log a front end
//! renders, and routes user input back to the session.

use chat_protocol::Envelope;
use chrono::{Local, Timelike};
use uuid::Uuid;

use crate::session::SessionHandle;
use crate::state::SessionEvent;

/// Characters of the last message shown in the conversation preview.
pub const PREVIEW_CHARS: usize = 30;
pub const EMPTY_PREVIEW: &str = "No messages yet";

/// One rendered entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Local identifier; two identical envelopes still get distinct ids
    pub id: Uuid,
    pub user: String,
    pub text: String,
    /// Arrival time on the local clock, `HH:MM`
    pub time: String,
    /// Author equals the local display name (exact match)
    pub is_self: bool,
}

impl ChatMessage {
    pub fn from_envelope(envelope: Envelope, local_user: &str, at: &impl Timelike) -> Self {
        let is_self = envelope.user == local_user;
        Self {
            id: Uuid::new_v4(),
            user: envelope.user,
            text: envelope.text,
            time: display_time(at),
            is_self,
        }
    }
}

/// Zero-padded `HH:MM`.
pub fn display_time(at: &impl Timelike) -> String {
    format!("{:02}:{:02}", at.hour(), at.minute())
}

pub struct ChatView {
    session: SessionHandle,
    username: String,
    messages: Vec<ChatMessage>,
    connected: bool,
}

impl ChatView {
    pub fn new(session: SessionHandle, username: impl Into<String>) -> Self {
        Self {
            session,
            username: username.into(),
            messages: Vec::new(),
            connected: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Connect the session as this view's user.
    pub fn connect(&self) {
        self.session.connect(&self.username);
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    /// Fold one session event into the view, stamped with the local clock.
    ///
    /// Returns the appended entry for message events.
    pub fn apply(&mut self, event: SessionEvent) -> Option<&ChatMessage> {
        self.apply_at(event, &Local::now())
    }

    pub fn apply_at(&mut self, event: SessionEvent, at: &impl Timelike) -> Option<&ChatMessage> {
        match event {
            SessionEvent::Connected => {
                self.connected = true;
                None
            }
            SessionEvent::Disconnected => {
                self.connected = false;
                None
            }
            SessionEvent::Message(envelope) => {
                self.messages
                    .push(ChatMessage::from_envelope(envelope, &self.username, at));
                self.messages.last()
            }
        }
    }

    /// Send `text` if it has any content. Returns whether it was queued.
    pub fn send_message(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.session.send(text)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Start of the latest message body, or a placeholder for an empty log.
    pub fn preview(&self) -> String {
        match self.messages.last() {
            Some(last) => last.text.chars().take(PREVIEW_CHARS).collect(),
            None => EMPTY_PREVIEW.to_string(),
        }
    }
}
