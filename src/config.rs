//! Runtime configuration for the sync layer.
//!
//! Values come from the environment (after `.env` is loaded by the binary):
//! - `CASALINK_API_URL`: document store base URL
//! - `CASALINK_API_TOKEN`: bearer token issued by the hosted auth provider
//! - `CASALINK_DATA_DIR`: where the queue is persisted
//! - `CASALINK_MAX_ATTEMPTS`: failed replays before an operation needs attention
//! - `CASALINK_CLIENT_ID`: device identifier sent with every write

use std::path::PathBuf;

use thiserror::Error;

use crate::sync::queue::DEFAULT_MAX_ATTEMPTS;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No local data directory available; set CASALINK_DATA_DIR")]
    NoDataDir,
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub data_dir: PathBuf,
    pub max_attempts: u32,
    pub client_id: String,
}

impl SyncConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_url = non_empty("CASALINK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let data_dir = match non_empty("CASALINK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let max_attempts = match non_empty("CASALINK_MAX_ATTEMPTS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "CASALINK_MAX_ATTEMPTS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_MAX_ATTEMPTS,
        };

        let client_id = non_empty("CASALINK_CLIENT_ID").unwrap_or_else(default_client_id);

        Ok(Self {
            api_url,
            api_token: non_empty("CASALINK_API_TOKEN"),
            data_dir,
            max_attempts,
            client_id,
        })
    }
}

/// `<local data dir>/casalink`, e.g. `~/.local/share/casalink` on Linux.
fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("casalink"))
        .ok_or(ConfigError::NoDataDir)
}

/// Get the device name from the system hostname.
fn default_client_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "casalink-sync".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_explicit_values() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CASALINK_API_URL", "https://store.casalink.ph"),
            ("CASALINK_API_TOKEN", "tok"),
            ("CASALINK_DATA_DIR", "/tmp/casalink-test"),
            ("CASALINK_MAX_ATTEMPTS", "3"),
            ("CASALINK_CLIENT_ID", "front-desk"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://store.casalink.ph");
        assert_eq!(config.api_token.as_deref(), Some("tok"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/casalink-test"));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.client_id, "front-desk");
    }

    #[test]
    fn test_defaults() {
        let config =
            SyncConfig::from_lookup(lookup(&[("CASALINK_DATA_DIR", "/tmp/casalink-test")]))
                .unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.api_token.is_none());
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(!config.client_id.is_empty());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CASALINK_DATA_DIR", "/tmp/casalink-test"),
            ("CASALINK_API_URL", "  "),
            ("CASALINK_API_TOKEN", ""),
        ]))
        .unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_invalid_max_attempts() {
        for raw in ["zero", "0", "-1"] {
            let err = SyncConfig::from_lookup(lookup(&[
                ("CASALINK_DATA_DIR", "/tmp/casalink-test"),
                ("CASALINK_MAX_ATTEMPTS", raw),
            ]))
            .unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue {
                    var: "CASALINK_MAX_ATTEMPTS",
                    ..
                }
            ));
        }
    }
}
