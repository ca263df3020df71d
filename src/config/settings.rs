//! Command-line flags, configuration file and resolved settings.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use super::Credentials;
use crate::poll::{BridgeConfig, DEFAULT_BRIDGE_PORT, MIN_POLL_INTERVAL};

const DEFAULT_LISTEN_ADDRESS: &str = ":9314";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_LOG_LEVEL: &str = "ERROR";

/// Configuration errors. All of them stop the process at startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("either credentials_file or token need to be set")]
    MissingCredentials,
    #[error("bridge_host needs to be set")]
    MissingBridgeHost,
    #[error("token not set; credentials file needs to contain a token field")]
    EmptyToken,
    #[error("invalid listen address: {0}")]
    InvalidListenAddress(String),
    #[error("invalid metrics path {0:?}: must start with '/' and contain no ':' or '*'")]
    InvalidMetricsPath(String),
    #[error("failed to read file: {0}")]
    FileReadError(String),
    #[error("failed to parse file: {0}")]
    ParseError(String),
}

/// Command-line interface.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "nuki-exporter", version, about = "Report metrics of the Nuki bridge API")]
pub struct Cli {
    /// YAML file containing the bridge token in a `token` field; --token wins over it
    #[arg(short = 'c', long = "credentials_file", env = "CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// FQDN or IP address of the bridge
    #[arg(short = 'b', long = "bridge_host", env = "BRIDGE")]
    pub bridge_host: Option<String>,

    /// Bridge API token, wins over the credentials file
    #[arg(short = 't', long = "token", env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Address to listen on, either :port or address:port [default: :9314]
    #[arg(short = 'l', long = "listen_address", env = "LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// URL path where metrics are exposed [default: /metrics]
    #[arg(short = 'm', long = "metrics_path", env = "METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// Log level, one of DEBUG, INFO, WARN, ERROR [default: ERROR]
    #[arg(short = 'v', long = "log_level", env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Bridge API port [default: 8080]
    #[arg(long = "bridge_port", env = "BRIDGE_PORT")]
    pub bridge_port: Option<u16>,

    /// HTTP proxy for bridge requests
    #[arg(long = "proxy_url", env = "PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Seconds between polls, at least 30 [default: 30]
    #[arg(long = "interval_secs", env = "INTERVAL_SECS")]
    pub interval_secs: Option<u64>,

    /// TOML file with [bridge] and [exporter] settings
    #[arg(long = "config", env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Loads the file named by `--config`, or an empty config if none.
    pub fn load_file_config(&self) -> Result<FileConfig, ConfigError> {
        match &self.config {
            Some(path) => FileConfig::from_file(path),
            None => Ok(FileConfig::default()),
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub exporter: ExporterSection,
}

/// `[bridge]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy_url: Option<String>,
    pub credentials_file: Option<PathBuf>,
}

/// `[exporter]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterSection {
    pub listen_address: Option<String>,
    pub metrics_path: Option<String>,
    pub log_level: Option<String>,
    pub interval_secs: Option<u64>,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to `Error`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            _ => LogLevel::Error,
        })
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl LogLevel {
    /// Flag, then file, then default.
    pub fn resolve(cli: &Cli, file: &FileConfig) -> Self {
        let name = cli
            .log_level
            .as_deref()
            .or(file.exporter.log_level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL);
        name.parse().unwrap_or(LogLevel::Error)
    }

    /// Builds the subscriber filter. A valid, non-empty `rust_log` value
    /// replaces this level entirely.
    pub fn env_filter(self, rust_log: Option<&str>) -> EnvFilter {
        rust_log
            .filter(|directives| !directives.trim().is_empty())
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| {
                EnvFilter::default().add_directive(tracing::Level::from(self).into())
            })
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bridge connection.
    pub bridge: BridgeConfig,
    /// Bridge token.
    pub credentials: Credentials,
    /// Address the metrics server binds to.
    pub listen_addr: SocketAddr,
    /// Path of the scrape endpoint.
    pub metrics_path: String,
    /// Pause between poll cycles.
    pub interval: Duration,
}

impl Settings {
    /// Merges flags over file values over defaults and loads credentials.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig { bridge, exporter } = file;

        let credentials = match (cli.token, cli.credentials_file.or(bridge.credentials_file)) {
            (Some(token), _) if !token.is_empty() => Credentials::new(token)?,
            (_, Some(path)) => Credentials::from_file(path)?,
            _ => return Err(ConfigError::MissingCredentials),
        };

        let host = cli
            .bridge_host
            .or(bridge.host)
            .filter(|h| !h.trim().is_empty())
            .ok_or(ConfigError::MissingBridgeHost)?;

        let listen_address = cli
            .listen_address
            .or(exporter.listen_address)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
        let listen_addr = parse_listen_address(&listen_address)?;

        let metrics_path = cli
            .metrics_path
            .or(exporter.metrics_path)
            .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string());
        validate_metrics_path(&metrics_path)?;

        let interval = cli
            .interval_secs
            .or(exporter.interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(MIN_POLL_INTERVAL);

        Ok(Self {
            bridge: BridgeConfig {
                host,
                port: cli.bridge_port.or(bridge.port).unwrap_or(DEFAULT_BRIDGE_PORT),
                proxy_url: cli.proxy_url.or(bridge.proxy_url),
            },
            credentials,
            listen_addr,
            metrics_path,
            interval,
        })
    }
}

/// Route parameters (`:name`, `*rest`) are not allowed in the scrape path.
fn validate_metrics_path(path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path.contains([':', '*']) {
        return Err(ConfigError::InvalidMetricsPath(path.to_string()));
    }
    Ok(())
}

/// Parses `:port`, `ip:port` or `host:port`. A bare `:port` binds all interfaces.
fn parse_listen_address(address: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::InvalidListenAddress(address.to_string());

    if let Some(port) = address.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    address
        .to_socket_addrs()
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}
