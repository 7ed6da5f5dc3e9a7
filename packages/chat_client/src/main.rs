use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::prelude::*;

use chat_client::console::{self, Command};
use chat_client::{ChatView, SessionConfig, SessionHandle, validate_username};

#[derive(Parser)]
#[command(name = "relay-chat")]
#[command(about = "Terminal client for the relay chat room")]
struct Args {
    /// Display name shown to other participants (2-20 characters)
    #[arg(short, long)]
    username: String,

    /// Relay server URL
    #[arg(long, default_value = "ws://127.0.0.1:3000")]
    url: String,

    /// Origin header to present during the handshake
    #[arg(long)]
    origin: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so the conversation owns stdout
    let default_directive = if args.debug {
        "chat_client=debug,relay_chat=debug,warn"
    } else {
        "chat_client=warn,relay_chat=warn,error"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let username = validate_username(&args.username).context("Invalid --username")?;

    let mut config = SessionConfig::new(args.url);
    if let Some(origin) = args.origin {
        config = config.with_origin(origin);
    }
    let session = SessionHandle::new(config);
    let mut events = session.subscribe();
    let mut view = ChatView::new(session.clone(), username);

    println!("Joining as {} (type /help for commands)", view.username());
    view.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if let Some(line) = console::render_transition(&event) {
                    println!("{}", line);
                }
                if let Some(message) = view.apply(event) {
                    println!("{}", console::render_message(message));
                }
            }

            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                match Command::parse(&line) {
                    Command::Empty => {}
                    Command::Say(text) => {
                        if !view.send_message(&text) {
                            println!("* not sent: {} (type /connect)", session.state());
                        }
                    }
                    Command::Connect => view.connect(),
                    Command::Disconnect => view.disconnect(),
                    Command::Status => println!("{}", console::render_status(&view, session.state())),
                    Command::Help => println!("{}", console::HELP),
                    Command::Unknown(name) => println!("* unknown command /{} (type /help)", name),
                    Command::Quit => break,
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}
