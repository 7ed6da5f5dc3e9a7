use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ws::OriginPolicy;

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   relay.toml:      [server]
//                    port = 4000
//
//   env var:         RELAY_SERVER__PORT=4000   (double underscore = nesting)
//
//   CLI flag:        relay-server --port 4000  (applied last, see main.rs)

/// Environment variable prefix for config overrides.
pub const ENV_PREFIX: &str = "RELAY_";

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener and handshake settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser origins permitted to open the socket. `"*"` allows any.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Reject upgrades that carry no `username` handshake metadata.
    #[serde(default)]
    pub require_username: bool,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            require_username: false,
        }
    }
}

/// Fan-out tunables (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_session_queue_capacity")]
    pub session_queue_capacity: usize,
    /// Drop chat frames whose payload is not a well-formed envelope
    /// instead of relaying them verbatim.
    #[serde(default)]
    pub strict_envelopes: bool,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            session_queue_capacity: default_session_queue_capacity(),
            strict_envelopes: false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}
fn default_session_queue_capacity() -> usize {
    256
}

/// Build a figment that layers: defaults → config file → RELAY_* env vars.
///
/// With no explicit path, `relay.toml` in the working directory is used when
/// present. Env vars use double-underscore for nesting:
///   `RELAY_SERVER__PORT=4000`  →  `server.port = 4000`
///   `RELAY_RELAY__STRICT_ENVELOPES=true`  →  `relay.strict_envelopes = true`
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

/// Resolved server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub origins: OriginPolicy,
    pub require_username: bool,
    pub relay: RelayConfig,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Outbound frames buffered per session before deliveries are dropped
    pub session_queue_capacity: usize,
    pub strict_envelopes: bool,
}

impl ServerConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            host: fc.server.host.clone(),
            port: fc.server.port,
            origins: OriginPolicy::new(fc.server.allowed_origins.as_slice()),
            require_username: fc.server.require_username,
            relay: RelayConfig {
                // A zero-capacity mpsc channel panics
                session_queue_capacity: fc.relay.session_queue_capacity.max(1),
                strict_envelopes: fc.relay.strict_envelopes,
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}
