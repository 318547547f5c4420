//! Configuration management for the server.
//!
//! This module defines the data structures for the server's configuration.
//! It uses the `config` crate to layer an optional TOML file and
//! `LINELOG_*` environment variables over built-in defaults, and `serde`
//! for the data structures.
//!
//! ## Schema
//!
//! - **`log_level`**: logging verbosity used when `RUST_LOG` is unset.
//! - **`bind_address`** / **`port`**: TCP listen endpoint (default
//!   `0.0.0.0:9000`).
//! - **`backend`**: `"internal"` for the in-process record device,
//!   `"chardev"` for the external character device.
//! - **`data_file`**: mirror file path for the internal backend (default
//!   `/var/tmp/aesdsocketdata`; removed at shutdown).
//! - **`char_device`**: device node path for the chardev backend (default
//!   `/dev/aesdchar`).
//! - **`timestamp_interval_secs`**: period of the timestamp writer
//!   (default 10; `0` disables it).
//!
//! ## Validation
//!
//! `Settings::new` loads and deserializes the configuration, then calls
//! `validate`, which rejects empty endpoint and path values before the
//! server starts. Misconfiguration is caught at startup rather than
//! surfacing as runtime errors. A port of `0` is accepted and binds an
//! ephemeral port, which the tests rely on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Which log the server serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// In-process record device with an on-disk mirror file.
    #[serde(rename = "internal")]
    Internal,
    /// External character device node.
    #[serde(rename = "chardev")]
    CharDevice,
}

/// Validated server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log_level: String,
    pub bind_address: String,
    pub port: u16,
    pub backend: BackendKind,
    pub data_file: PathBuf,
    pub char_device: PathBuf,
    pub timestamp_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 9000,
            backend: BackendKind::Internal,
            data_file: PathBuf::from("/var/tmp/aesdsocketdata"),
            char_device: PathBuf::from("/dev/aesdchar"),
            timestamp_interval_secs: 10,
        }
    }
}

impl Settings {
    /// Loads settings from defaults, an optional configuration file, and the
    /// environment, then validates them.
    ///
    /// With `config_path == None` a `linelog.toml` next to the working
    /// directory is used when present.
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("log_level", defaults.log_level.clone())?
            .set_default("bind_address", defaults.bind_address.clone())?
            .set_default("port", i64::from(defaults.port))?
            .set_default("backend", "internal")?
            .set_default("data_file", "/var/tmp/aesdsocketdata")?
            .set_default("char_device", "/dev/aesdchar")?
            .set_default(
                "timestamp_interval_secs",
                defaults.timestamp_interval_secs as i64,
            )?;

        builder = match config_path {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("linelog").required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("LINELOG"));

        let settings: Settings = builder
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("failed to parse configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.is_empty() {
            anyhow::bail!("bind_address cannot be empty");
        }
        if self.data_file.as_os_str().is_empty() {
            anyhow::bail!("data_file cannot be empty");
        }
        if self.char_device.as_os_str().is_empty() {
            anyhow::bail!("char_device cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wire_contract() {
        let settings = Settings::default();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.backend, BackendKind::Internal);
        assert_eq!(settings.data_file, PathBuf::from("/var/tmp/aesdsocketdata"));
        assert_eq!(settings.timestamp_interval_secs, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("linelog.toml");
        std::fs::write(
            &path,
            "port = 4242\nbackend = \"chardev\"\ntimestamp_interval_secs = 0\n",
        )
        .expect("write config");

        let settings =
            Settings::new(Some(path.to_str().expect("utf8 path"))).expect("load settings");
        assert_eq!(settings.port, 4242);
        assert_eq!(settings.backend, BackendKind::CharDevice);
        assert_eq!(settings.timestamp_interval_secs, 0);
        // Untouched keys keep their defaults.
        assert_eq!(settings.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let settings = Settings {
            data_file: PathBuf::new(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
