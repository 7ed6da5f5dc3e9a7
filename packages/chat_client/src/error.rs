use tokio_tungstenite::tungstenite;

/// Why a connection attempt failed.
///
/// Only ever logged: the session itself reports nothing beyond
/// `Disconnected`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("server is unavailable")]
    Unavailable,

    #[error("handshake rejected with HTTP {0}")]
    Rejected(u16),

    #[error(transparent)]
    Handshake(#[from] chat_protocol::HandshakeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let classified = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            )
            .then_some(Self::Unavailable),
            tungstenite::Error::Http(response) => Some(Self::Rejected(response.status().as_u16())),
            _ => None,
        };
        classified.unwrap_or_else(|| Self::Other(err.into()))
    }
}
