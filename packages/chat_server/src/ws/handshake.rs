//! Upgrade-time checks. Everything here runs before a session exists, so a
//! rejected connection never touches the registry.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chat_protocol::HandshakeQuery;
use std::collections::HashSet;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeRejection {
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error("missing username")]
    MissingUsername,
}

impl IntoResponse for HandshakeRejection {
    fn into_response(self) -> Response {
        let status = match self {
            HandshakeRejection::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            HandshakeRejection::MissingUsername => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Allow-list of browser origins permitted to open the socket.
///
/// Requests without an `Origin` header come from non-browser clients and are
/// let through, as are pages served by this very host. A `"*"` entry allows
/// everything.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: HashSet<String>,
    allow_any: bool,
}

impl OriginPolicy {
    pub fn new<S: AsRef<str>>(origins: &[S]) -> Self {
        let mut allowed = HashSet::new();
        let mut allow_any = false;
        for origin in origins {
            let origin = origin.as_ref().trim();
            if origin == "*" {
                allow_any = true;
            } else if !origin.is_empty() {
                allowed.insert(normalize(origin));
            }
        }
        Self { allowed, allow_any }
    }

    /// Allow every origin.
    pub fn permissive() -> Self {
        Self {
            allowed: HashSet::new(),
            allow_any: true,
        }
    }

    pub fn allows_any(&self) -> bool {
        self.allow_any
    }

    pub fn is_listed(&self, origin: &str) -> bool {
        self.allow_any || self.allowed.contains(&normalize(origin))
    }

    /// Listed origins, for building the CORS layer.
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn check(&self, origin: Option<&str>, host: Option<&str>) -> Result<(), HandshakeRejection> {
        let Some(origin) = origin else {
            return Ok(());
        };
        if self.is_listed(origin) || same_host(origin, host) {
            Ok(())
        } else {
            Err(HandshakeRejection::OriginNotAllowed(origin.to_string()))
        }
    }
}

fn normalize(origin: &str) -> String {
    origin.trim_end_matches('/').to_ascii_lowercase()
}

fn same_host(origin: &str, host: Option<&str>) -> bool {
    let (Some(host), Ok(url)) = (host, Url::parse(origin)) else {
        return false;
    };
    let Some(origin_host) = url.host_str() else {
        return false;
    };
    let origin_authority = match url.port() {
        Some(port) => format!("{origin_host}:{port}"),
        None => origin_host.to_string(),
    };
    origin_authority.eq_ignore_ascii_case(host)
}

/// Resolve the session's display name from handshake metadata.
pub fn resolve_display_name(
    query: &HandshakeQuery,
    require_username: bool,
) -> Result<Option<String>, HandshakeRejection> {
    match query.display_name() {
        Some(name) => Ok(Some(name)),
        None if require_username => Err(HandshakeRejection::MissingUsername),
        None => Ok(None),
    }
}
