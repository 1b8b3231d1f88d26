//! Configuration management for the backup tool.
//!
//! Loads configuration from an optional TOML file. Command line flags and
//! their environment variables are layered on top in `cli`, then the result is
//! validated into [`RunSettings`].

use crate::utils::errors::{BackupError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub influx: InfluxConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// `<ip:port>` of the InfluxDB HTTP API
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Database to dump
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Destination root; holds the watermark file and one directory per run
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_host() -> String {
    "localhost:8086".to_string()
}

fn default_username() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "root".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            username: default_username(),
            password: default_password(),
            database: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Validated settings for one backup run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub database: String,
    pub destination: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BackupError::io_at(path, e))?;
        toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Validate the required values and build the base URL from the host.
    pub fn resolve(&self) -> Result<RunSettings> {
        let base_url = parse_host(&self.influx.host)?;

        let database = self
            .influx
            .database
            .clone()
            .filter(|db| !db.is_empty())
            .ok_or_else(|| BackupError::Config("database required!".to_string()))?;

        let destination = self
            .backup
            .destination
            .clone()
            .filter(|dest| !dest.as_os_str().is_empty())
            .ok_or_else(|| BackupError::Config("destination dir required!".to_string()))?;

        Ok(RunSettings {
            base_url,
            username: self.influx.username.clone(),
            password: self.influx.password.clone(),
            database,
            destination,
        })
    }
}

/// Turn `<ip:port>` into `http://<ip:port>`.
fn parse_host(host: &str) -> Result<Url> {
    let url = Url::parse(&format!("http://{}", host))
        .map_err(|e| BackupError::Config(format!("Unable to parse {}: {}", host, e)))?;

    if url.host_str().map_or(true, str::is_empty) || url.path() != "/" {
        return Err(BackupError::Config(format!("Unable to parse {}", host)));
    }

    Ok(url)
}
