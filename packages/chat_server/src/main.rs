use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use chat_server::AppState;
use chat_server::config::{FileConfig, ServerConfig, load_config};

#[derive(Parser)]
#[command(name = "relay-server")]
#[command(about = "Single-room WebSocket chat relay")]
struct Args {
    /// Config file (defaults to ./relay.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the web server (0 = auto-select); overrides config
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to; overrides config
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Permitted client origin; repeatable, replaces the configured list
    #[arg(long = "allow-origin")]
    allowed_origins: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "chat_server=debug,relay_server=debug,tower_http=debug,info"
    } else {
        "chat_server=info,relay_server=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        file_config.server.port = port;
    }
    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if !args.allowed_origins.is_empty() {
        file_config.server.allowed_origins = args.allowed_origins;
    }
    let config = ServerConfig::from_file(&file_config);

    info!("Starting Relay Chat server");
    info!(
        "Allowed origins: {:?} (require username: {}, strict envelopes: {})",
        file_config.server.allowed_origins,
        config.require_username,
        config.relay.strict_envelopes
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    let actual_addr = listener.local_addr()?;

    info!("Relay listening on http://{}", actual_addr);
    info!("Endpoints:");
    info!("  GET /        - Web client");
    info!("  GET /health  - Health check");
    info!("  GET /metrics - Relay counters");
    info!("  GET /ws      - WebSocket (?username=<display name>)");

    // Create shutdown signal handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, closing relay...");
    };

    chat_server::serve(listener, AppState::new(config), shutdown_signal).await?;

    info!("Shutdown complete");
    Ok(())
}
