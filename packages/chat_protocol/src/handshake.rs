use serde::{Deserialize, Serialize};
use url::Url;

/// Path of the WebSocket endpoint on the relay server.
pub const WS_PATH: &str = "/ws";

/// Query parameter carrying the display name during the upgrade.
pub const USERNAME_PARAM: &str = "username";

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported url scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
}

/// Handshake metadata as seen by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeQuery {
    #[serde(default)]
    pub username: Option<String>,
}

impl HandshakeQuery {
    /// The display name, trimmed, or `None` if absent or blank.
    pub fn display_name(&self) -> Option<String> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// Attach `username` to a server URL as handshake metadata.
///
/// Accepts a bare `ws://host:port` (the socket path is appended) or a URL
/// that already names a path. Any existing `username` parameter is replaced.
pub fn handshake_url(server_url: &str, username: &str) -> Result<Url, HandshakeError> {
    let mut url = Url::parse(server_url)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(HandshakeError::UnsupportedScheme(other.to_string())),
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(WS_PATH);
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != USERNAME_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(USERNAME_PARAM, username);
    Ok(url)
}
