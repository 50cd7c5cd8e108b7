//! jsonwire: a length-prefixed message protocol over a readiness event loop.
//!
//! Every frame is a 2-byte big-endian header length, a JSON header naming
//! the payload's type, encoding, and length, and the payload itself.
//!
//! Modes:
//! - `serve`: run the lookup (or echo) service on mio worker loops
//! - `request <action> <value>`: send one request and print the reply
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod error;
mod handlers;
mod protocol;
mod runtime;

use std::net::SocketAddr;
use std::sync::Arc;

use config::{Config, HandlerKind, Mode};
use handlers::{request_message, EchoHandler, MessageHandler, Response, SearchHandler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &config.mode {
        Mode::Serve => serve(&config),
        Mode::Request { action, value } => request(&config, action, value),
    }
}

/// Run the server with the configured handler.
fn serve(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.listen,
        workers = config.workers,
        handler = ?config.handler,
        keep_alive = config.keep_alive,
        "Starting jsonwire server"
    );

    let handler: Arc<dyn MessageHandler> = match config.handler {
        HandlerKind::Search => Arc::new(SearchHandler::new(
            Arc::new(config.lookup.clone()),
            config.keep_alive,
        )),
        HandlerKind::Echo => Arc::new(EchoHandler::new(config.keep_alive)),
    };

    runtime::server::run(config, handler)?;
    Ok(())
}

/// Send one request and print what came back.
fn request(config: &Config, action: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.listen.parse()?;
    let message = request_message(action, value)?;
    info!(addr = %addr, action, value, "Sending request");

    match runtime::client::run_request(addr, message, config.limits)? {
        Some(Response::Json(value)) => match value.get("result") {
            Some(serde_json::Value::String(result)) => println!("{result}"),
            Some(result) => println!("{result}"),
            None => println!("{value}"),
        },
        Some(Response::Binary {
            content_type,
            payload,
        }) => println!("{content_type}: {payload:?}"),
        None => warn!("Connection closed without a response"),
    }
    Ok(())
}
