//! Bridge API token.

use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Bearer token for the bridge API. Immutable once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

/// Credentials file format: a YAML mapping with a `token` field.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    token: Option<String>,
}

impl Credentials {
    /// Wraps a token, rejecting empty ones.
    pub fn new(token: impl Into<String>) -> Result<Self, ConfigError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        Ok(Self { token })
    }

    /// Loads the token from a YAML credentials file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileReadError(format!("credentials file {}: {}", path.display(), e))
        })?;
        let file: CredentialsFile = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError(format!("credentials file {}: {}", path.display(), e))
        })?;

        Self::new(file.token.unwrap_or_default())
    }

    /// The raw token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}
