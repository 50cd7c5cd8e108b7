//! Configuration module for the jsonwire server and client.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

use crate::handlers::search::default_table;
use crate::protocol::codec::MAX_HEADER_LEN;
use crate::runtime::{Limits, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_LEN};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "jsonwire")]
#[command(version)]
#[command(about = "Length-prefixed JSON-header message server and client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to, or to connect to in request mode (e.g., 127.0.0.1:65432)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Message handler to serve
    #[arg(long, value_enum)]
    pub handler: Option<HandlerKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Accept connections and answer requests (default)
    Serve,
    /// Send one request and print the reply
    Request {
        /// Request action; "search" sends JSON, anything else sends binary
        action: String,
        /// Value for the action
        value: String,
    },
}

/// Which handler the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Search,
    Echo,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub wire: WireConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Search table; the built-in table is used when absent.
    pub lookup: Option<BTreeMap<String, String>>,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub workers: Option<usize>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Events drained per poll call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Keep connections open after a reply
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    #[serde(default)]
    pub handler: HandlerKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            max_connections: default_max_connections(),
            batch_size: default_batch_size(),
            keep_alive: default_keep_alive(),
            handler: HandlerKind::default(),
        }
    }
}

/// Framing limits
#[derive(Debug, Deserialize)]
pub struct WireConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Bounded by the 2-byte length prefix
    #[serde(default = "default_max_header_len")]
    pub max_header_len: u16,
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_header_len: default_max_header_len(),
            max_payload_len: default_max_payload_len(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:65432".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_batch_size() -> usize {
    1024
}

fn default_keep_alive() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_header_len() -> u16 {
    MAX_HEADER_LEN as u16
}

fn default_max_payload_len() -> usize {
    DEFAULT_MAX_PAYLOAD_LEN
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Request { action: String, value: String },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub listen: String,
    pub workers: usize,
    pub max_connections: usize,
    pub batch_size: usize,
    pub keep_alive: bool,
    pub handler: HandlerKind,
    pub limits: Limits,
    pub log_level: String,
    pub lookup: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let wire = toml_config.wire;
        if wire.chunk_size == 0 {
            return Err(ConfigError::Invalid("wire.chunk_size must be > 0".into()));
        }
        if toml_config.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "server.max_connections must be > 0".into(),
            ));
        }
        if toml_config.server.batch_size == 0 {
            return Err(ConfigError::Invalid("server.batch_size must be > 0".into()));
        }

        let workers = match cli.workers.or(toml_config.server.workers).unwrap_or(1) {
            0 => num_cpus(),
            n => n,
        };

        let mode = match cli.command {
            None | Some(Command::Serve) => Mode::Serve,
            Some(Command::Request { action, value }) => Mode::Request { action, value },
        };

        Ok(Config {
            mode,
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers,
            max_connections: toml_config.server.max_connections,
            batch_size: toml_config.server.batch_size,
            keep_alive: toml_config.server.keep_alive,
            handler: cli.handler.unwrap_or(toml_config.server.handler),
            limits: Limits {
                chunk_size: wire.chunk_size,
                max_header_len: wire.max_header_len as usize,
                max_payload_len: wire.max_payload_len,
            },
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            lookup: toml_config.lookup.unwrap_or_else(default_table),
        })
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
