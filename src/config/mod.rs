//! Process configuration.
//!
//! Settings come from command-line flags, each with an environment
//! variable fallback, then an optional TOML file, then built-in defaults.
//! The bridge token is taken from `--token`/`TOKEN` if given, otherwise
//! from a YAML credentials file. Any error here is fatal at startup.

mod credentials;
mod settings;

pub use credentials::Credentials;
pub use settings::{Cli, ConfigError, FileConfig, LogLevel, Settings};
