//! Chat Server - Streaming Portfolio Chat over HTTP
//!
//! Serves `POST /api/chat`, streaming each reply as it is generated by the
//! configured upstream (stateless chat completion or an assistant thread).
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (reads ~/.config/folio-chat/chat.toml if present)
//! OPENAI_API_KEY=sk-... chat-server
//!
//! # Assistant mode, framed output
//! chat-server --mode assistant --wire-format framed
//!
//! # Custom bind address and config file
//! chat-server --bind 0.0.0.0:8080 --config /etc/folio-chat/chat.toml
//!
//! # Verbose logging
//! RUST_LOG=debug chat-server
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (in-flight replies are drained)

mod routes;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use chat_core::{
    default_config_path, load_config_from_path, ConfigOverrides, Environment, UpstreamMode,
    WireFormat,
};

/// Chat Server - streaming portfolio chat
#[derive(Parser, Debug)]
#[command(name = "chat-server")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Response wire format (raw, framed)
    #[arg(short = 'f', long, value_name = "FORMAT")]
    wire_format: Option<WireFormat>,

    /// Upstream mode (completion, assistant)
    #[arg(short = 'm', long, value_name = "MODE")]
    mode: Option<UpstreamMode>,

    /// Deployment environment (development, production)
    #[arg(short = 'e', long, value_name = "ENV")]
    environment: Option<Environment>,

    /// Model for completion mode
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// User turns allowed per conversation
    #[arg(long, value_name = "N")]
    max_turns: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(addr) = self.bind {
            overrides = overrides.with_bind_addr(addr);
        }
        if let Some(format) = self.wire_format {
            overrides = overrides.with_wire_format(format);
        }
        if let Some(mode) = self.mode {
            overrides = overrides.with_mode(mode);
        }
        if let Some(environment) = self.environment {
            overrides = overrides.with_environment(environment);
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(max_turns) = self.max_turns {
            overrides = overrides.with_max_turns(max_turns);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_server={level},chat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Chat server starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    if let Some(ref path) = config_path {
        info!(config_path = ?path, "Config file");
    }

    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        mode = %config.mode,
        wire_format = %config.wire_format(),
        environment = %config.environment,
        max_turns = config.max_turns,
        source = ?config.source(),
        "Configuration loaded"
    );

    match server::serve(&config, shutdown_signal()).await {
        Ok(()) => {
            info!("Chat server stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Chat server stopped with error");
            Err(e)
        }
    }
}
