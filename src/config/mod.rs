/// Server settings
///
/// Settings are stored as a JSON object with camelCase keys. Every key is
/// optional; anything missing falls back to its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default TCP port for the WebSocket server
pub const DEFAULT_PORT: u16 = 3010;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Whether `serve` should start the server at all
    pub mcp_server_enabled: bool,
    pub server_port: u16,
    pub bind_address: String,
    /// Vault root; the working directory when unset
    pub vault_path: Option<PathBuf>,

    pub enable_write: bool,
    pub enable_delete: bool,
    pub enable_search: bool,
    pub require_permission_for_reads: bool,
    pub require_permission_for_writes: bool,

    pub log_level: String,
    /// Upper bound on tool calls running at the same time
    pub max_concurrent_requests: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mcp_server_enabled: true,
            server_port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            vault_path: None,
            enable_write: true,
            enable_delete: false,
            enable_search: true,
            require_permission_for_reads: false,
            require_permission_for_writes: false,
            log_level: "info".to_string(),
            max_concurrent_requests: 5,
        }
    }
}

impl Settings {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("vault-mcp");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from `path`, or from the default location
    ///
    /// An explicit path must exist. The default location is optional and
    /// plain defaults are used when it is absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.is_file() => Self::from_file(&default)?,
                _ => {
                    tracing::debug!("No settings file found, using defaults");
                    Self::default()
                }
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("serverPort must be between 1 and 65535".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid("maxConcurrentRequests must be at least 1".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logLevel '{}' is not one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Vault root to serve, falling back to the working directory
    pub fn vault_root(&self) -> std::io::Result<PathBuf> {
        match &self.vault_path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir(),
        }
    }
}
