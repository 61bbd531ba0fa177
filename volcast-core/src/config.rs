//! Runtime settings.
//!
//! Loaded once by the binary and passed into the collaborators that need
//! them (provider, table store, model store). Sources, later wins:
//! built-in defaults, an optional TOML file, then environment variables
//! (after a `.env` file has been read into the environment).

use crate::data::AlphaVantageConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_API_KEY: &str = "ALPHA_API_KEY";
pub const ENV_DATA_DIRECTORY: &str = "DATA_DIRECTORY";
pub const ENV_MODEL_DIRECTORY: &str = "MODEL_DIRECTORY";
pub const ENV_HTTP_TIMEOUT: &str = "HTTP_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{ENV_API_KEY} is not set; it is required to download market data")]
    MissingApiKey,

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Alpha Vantage API key; only needed when fetching fresh data.
    pub alpha_api_key: Option<String>,
    /// Directory holding the Parquet price tables.
    pub data_directory: PathBuf,
    /// Directory holding fitted model artifacts.
    pub model_directory: PathBuf,
    /// HTTP client timeout for the market-data provider.
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alpha_api_key: None,
            data_directory: PathBuf::from("data"),
            model_directory: PathBuf::from("models"),
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Parse settings from a TOML string; omitted keys keep their defaults.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Parse settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Full load: defaults, optional file, `.env`, then process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.alpha_api_key = Some(key);
        }
        if let Some(dir) = lookup(ENV_DATA_DIRECTORY) {
            self.data_directory = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_MODEL_DIRECTORY) {
            self.model_directory = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_HTTP_TIMEOUT) {
            self.http_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_HTTP_TIMEOUT,
                value: raw.clone(),
            })?;
        }
        Ok(self)
    }

    /// Provider settings; fails if no API key is configured.
    pub fn alpha_vantage(&self) -> Result<AlphaVantageConfig, ConfigError> {
        let key = self
            .alpha_api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey)?;
        let mut config = AlphaVantageConfig::new(key);
        config.timeout = Duration::from_secs(self.http_timeout_secs);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_overrides_defaults_partially() {
        let settings = Settings::from_toml(
            r#"
            model_directory = "/var/lib/volcast/models"
            http_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(settings.model_directory, PathBuf::from("/var/lib/volcast/models"));
        assert_eq!(settings.data_directory, PathBuf::from("data"));
        assert_eq!(settings.http_timeout_secs, 5);
        assert!(settings.alpha_api_key.is_none());
    }

    #[test]
    fn environment_wins_over_file() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "secret"),
            (ENV_MODEL_DIRECTORY, "env-models"),
            (ENV_HTTP_TIMEOUT, "12"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_toml(r#"model_directory = "file-models""#)
            .unwrap()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.alpha_api_key.as_deref(), Some("secret"));
        assert_eq!(settings.model_directory, PathBuf::from("env-models"));
        assert_eq!(settings.http_timeout_secs, 12);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = Settings::default()
            .with_overrides(|k| (k == ENV_HTTP_TIMEOUT).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: ENV_HTTP_TIMEOUT, .. }));
    }

    #[test]
    fn provider_config_requires_api_key() {
        assert!(matches!(
            Settings::default().alpha_vantage(),
            Err(ConfigError::MissingApiKey)
        ));

        let settings = Settings {
            alpha_api_key: Some("k".into()),
            http_timeout_secs: 7,
            ..Settings::default()
        };
        let config = settings.alpha_vantage().unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.timeout, Duration::from_secs(7));
    }
}
