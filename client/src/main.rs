//! Chat Client binary
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local server
//! chat-client
//!
//! # Another server, lower turn cap
//! chat-client --server https://folio.example.com --max-turns 5
//!
//! # Logs go to stderr
//! RUST_LOG=chat_client=debug chat-client 2>client.log
//! ```

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use chat_client::{App, ChatClient};
use chat_core::{WireFormat, DEFAULT_MAX_TURNS};

/// Chat Client - talk to a folio-chat server from the terminal
#[derive(Parser, Debug)]
#[command(name = "chat-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat server base URL
    #[arg(short = 's', long, env = "CHAT_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// User turns allowed before a new conversation is required
    #[arg(long, env = "CHAT_MAX_TURNS", default_value_t = DEFAULT_MAX_TURNS)]
    max_turns: usize,

    /// Seconds without data before a reply is abandoned
    #[arg(long, default_value_t = 60)]
    idle_timeout_secs: u64,

    /// Format to assume if the server does not announce one (raw, framed)
    #[arg(long, default_value = "raw")]
    wire_format: WireFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging to stderr so it stays out of the transcript
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_client={level},chat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    anyhow::ensure!(args.max_turns >= 1, "--max-turns must be at least 1");

    let client = ChatClient::new(&args.server, Duration::from_secs(args.idle_timeout_secs))
        .context("Failed to create HTTP client")?
        .with_fallback_format(args.wire_format);
    tracing::info!(endpoint = client.endpoint(), "Chat client starting");

    let mut app = App::new(client, args.max_turns, io::stdout());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    app.run(stdin).await
}
