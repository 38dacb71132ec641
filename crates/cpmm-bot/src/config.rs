//! Application configuration.

use crate::error::{AppError, AppResult};
use cpmm_drizzle::DrizzleConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "DRIZZLE_CONFIG";

/// Prefix for per-key overrides, e.g. `DRIZZLE__DRIZZLE__MAX_CONCURRENCY=4`.
pub const ENV_PREFIX: &str = "DRIZZLE";

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Market data storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot loaded at startup and rewritten after each cycle.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Skip writing the snapshot back (dry run).
    #[serde(default)]
    pub read_only: bool,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/markets.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            read_only: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub drizzle: DrizzleConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load from the `DRIZZLE_CONFIG` path, or the default path.
    ///
    /// Falls back to built-in defaults (plus env overrides) when no file exists.
    pub fn load() -> AppResult<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Self::build(None)
        }
    }

    /// Load from a specific file, applying env overrides on top.
    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("Config file not found: {path}")));
        }
        Self::build(Some(path))
    }

    fn build(path: Option<&str>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.drizzle.validate()?;
        if self.store.snapshot_path.as_os_str().is_empty() {
            return Err(AppError::Config(
                "store.snapshot_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.drizzle, DrizzleConfig::default());
        assert_eq!(config.store.snapshot_path, PathBuf::from("data/markets.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[drizzle]
max_concurrency = 3
seed = 42

[store]
snapshot_path = "/tmp/snapshot.json"
read_only = true
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.drizzle.max_concurrency, 3);
        assert_eq!(config.drizzle.seed, Some(42));
        assert_eq!(config.drizzle.interval_secs, 420);
        assert_eq!(config.store.snapshot_path, PathBuf::from("/tmp/snapshot.json"));
        assert!(config.store.read_only);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[drizzle]\nmax_concurrency = 0").unwrap();

        let err = AppConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::Drizzle(_)));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AppConfig::from_file("/nonexistent/drizzle.toml").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
