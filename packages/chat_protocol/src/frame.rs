use serde::{Deserialize, Serialize};

use crate::Envelope;

/// Event name for chat traffic in both directions.
pub const CHAT_MESSAGE_EVENT: &str = "chat message";

/// A framed application event.
///
/// Generic over the payload so the relay can forward `data` untouched
/// (`RawFrame`) while clients decode it into an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Frame<T = Envelope> {
    #[serde(rename = "chat message")]
    ChatMessage(T),
}

/// Frame whose payload has not been checked against the envelope schema.
pub type RawFrame = Frame<serde_json::Value>;

impl<T: Serialize> Frame<T> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<T: serde::de::DeserializeOwned> Frame<T> {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl<T> Frame<T> {
    pub fn into_payload(self) -> T {
        match self {
            Frame::ChatMessage(payload) => payload,
        }
    }
}
