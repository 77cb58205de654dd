//! Environment-driven configuration, parsed once at startup.

use std::env;
use std::fmt;

/// Which persistence backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Filesystem,
    Sqlite,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Memory => "memory",
            Self::Filesystem => "filesystem",
            Self::Sqlite => "sqlite",
        };
        write!(f, "{s}")
    }
}

/// Error constructing [`Config`] from the process environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid STORAGE_TYPE '{0}': expected memory, filesystem, or sqlite")]
    InvalidStorageType(String),

    #[error("STORAGE_TYPE=filesystem requires LOCAL_STORAGE_PATH to be set")]
    MissingStoragePath,

    #[error("STORAGE_TYPE=sqlite requires DATA_SOURCE_NAME to be set")]
    MissingDataSource,

    #[error("invalid PORT '{0}': {1}")]
    InvalidPort(String, std::num::ParseIntError),
}

/// Process-wide configuration, immutable once constructed.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageKind,
    pub data_source_name: Option<String>,
    pub local_storage_path: Option<String>,
    pub port: u16,
    pub log_level: String,
}

const DEFAULT_PORT: u16 = 3002;
const DEFAULT_LOG_LEVEL: &str = "info";

impl Config {
    /// Parse configuration from environment variables. Invalid values are a
    /// fatal startup error, never a runtime panic — callers should exit
    /// non-zero on `Err`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage = match env::var("STORAGE_TYPE").ok().as_deref() {
            None | Some("memory") => StorageKind::Memory,
            Some("filesystem") => StorageKind::Filesystem,
            Some("sqlite") => StorageKind::Sqlite,
            Some(other) => return Err(ConfigError::InvalidStorageType(other.to_string())),
        };

        let local_storage_path = env::var("LOCAL_STORAGE_PATH").ok();
        if storage == StorageKind::Filesystem && local_storage_path.is_none() {
            return Err(ConfigError::MissingStoragePath);
        }

        let data_source_name = env::var("DATA_SOURCE_NAME").ok();
        if storage == StorageKind::Sqlite && data_source_name.is_none() {
            return Err(ConfigError::MissingDataSource);
        }

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidPort(raw.clone(), e))?,
            Err(_) => DEFAULT_PORT,
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            storage,
            data_source_name,
            local_storage_path,
            port,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory_and_default_port() {
        // SAFETY: single-threaded test, no concurrent env mutation in this process.
        unsafe {
            env::remove_var("STORAGE_TYPE");
            env::remove_var("PORT");
            env::remove_var("LOG_LEVEL");
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.storage, StorageKind::Memory);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn filesystem_without_path_is_rejected() {
        unsafe {
            env::set_var("STORAGE_TYPE", "filesystem");
            env::remove_var("LOCAL_STORAGE_PATH");
        }
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingStoragePath));
        unsafe {
            env::remove_var("STORAGE_TYPE");
        }
    }

    #[test]
    fn rejects_unknown_storage_type() {
        unsafe {
            env::set_var("STORAGE_TYPE", "dynamodb");
        }
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStorageType(_)));
        unsafe {
            env::remove_var("STORAGE_TYPE");
        }
    }
}
