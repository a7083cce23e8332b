//! Runtime configuration
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. Config file: `--config PATH`, `CAULIFLOW_CONFIG_PATH`, or an optional
//!    `cauliflow.{toml,yaml,json}` in the working directory
//! 3. `CAULIFLOW_*` environment variables (a `.env` file is loaded first)
//!
//! Command-line flags are applied on top by the CLI.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "CAULIFLOW";
pub const CONFIG_PATH_ENV: &str = "CAULIFLOW_CONFIG_PATH";
const DEFAULT_CONFIG_NAME: &str = "cauliflow";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing filter, used when `RUST_LOG` is not set
    pub log_level: String,
    /// Log a scope snapshot after every node
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            debug: false,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder().build()
    }

    /// Tracing filter to install: debug mode raises it to `debug`
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    debug: Option<bool>,
    log_level: Option<String>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Override `debug` (the `--debug` flag)
    pub fn debug(mut self, debug: Option<bool>) -> Self {
        self.debug = debug;
        self
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        self.log_level = level;
        self
    }

    /// Ignore `.env` and `CAULIFLOW_*` variables
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn build(self) -> Result<Config, config::ConfigError> {
        if !self.skip_env {
            // A missing .env is not an error
            let _ = dotenvy::dotenv();
        }

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        let config_path = match self.config_path {
            Some(path) => Some(path),
            None if !self.skip_env => std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from),
            None => None,
        };
        builder = match config_path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        if !self.skip_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            );
        }

        if let Some(debug) = self.debug {
            builder = builder.set_override("debug", debug)?;
        }
        if let Some(level) = self.log_level {
            builder = builder.set_override("log_level", level)?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::builder().skip_env().build().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.effective_log_level(), "warn");
    }

    #[test]
    fn test_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cauliflow.toml");
        std::fs::write(&path, "log_level = \"info\"\n").unwrap();

        let config = Config::builder()
            .skip_env()
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        assert_eq!(config.log_level, "info");
        assert!(!config.debug);

        let config = Config::builder()
            .skip_env()
            .config_path(Some(path))
            .debug(Some(true))
            .build()
            .unwrap();
        assert!(config.debug);
        assert_eq!(config.effective_log_level(), "debug");
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::builder()
            .skip_env()
            .config_path(Some(dir.path().join("absent.toml")))
            .build();
        assert!(result.is_err());
    }
}
