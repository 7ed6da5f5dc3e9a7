use serde::{Deserialize, Serialize};

/// The unit of communication: who said what.
///
/// `user` is whatever the sender claims; nothing on the wire ties it to the
/// handshake name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub user: String,
    pub text: String,
}

impl Envelope {
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
        }
    }

    /// Build an envelope for sending. Returns `None` when `text` is blank,
    /// so an empty envelope can never be constructed for the wire.
    pub fn outgoing(user: &str, text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self::new(user, trimmed))
    }

    /// Interpret an opaque relayed payload as an envelope.
    ///
    /// Accepts only `{user: string, text: string}` with non-blank text.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let envelope: Self = serde_json::from_value(value.clone()).ok()?;
        if envelope.text.trim().is_empty() {
            return None;
        }
        Some(envelope)
    }
}
