//! Command line parsing.
//!
//! Flags follow the classic single-dash spelling (`-host`, `-database`, ...)
//! which is rewritten to clap's `--host` form before parsing, so both work.

use crate::config::Config;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Long flags that may be spelled with a single dash.
const LEGACY_FLAGS: &[&str] = &["host", "username", "password", "database", "config", "log-level"];

/// Long flags that take a value (`--name value`).
const VALUE_FLAGS: &[&str] = &[
    "host", "username", "password", "database", "output", "config", "log-level",
];

/// Short flags that take a value (`-o value`).
const VALUE_SHORTS: &[&str] = &["o", "c", "l"];

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// <ip:port> of the InfluxDB HTTP API [default: localhost:8086]
    #[arg(long, env = "INFLUX_HOST", value_name = "IP:PORT", allow_hyphen_values = true)]
    pub host: Option<String>,

    /// Username [default: root]
    #[arg(long, env = "INFLUX_USERNAME", allow_hyphen_values = true)]
    pub username: Option<String>,

    /// Password [default: root]
    #[arg(long, env = "INFLUX_PASSWORD", hide_env_values = true, allow_hyphen_values = true)]
    pub password: Option<String>,

    /// Database to dump
    #[arg(long, env = "INFLUX_DATABASE", allow_hyphen_values = true)]
    pub database: Option<String>,

    /// Destination dir
    #[arg(
        short = 'o',
        long = "output",
        env = "INFLUX_BACKUP_DIR",
        value_name = "DIR",
        allow_hyphen_values = true
    )]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", allow_hyphen_values = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, allow_hyphen_values = true)]
    pub log_level: Option<String>,
}

impl Args {
    /// Parse the process arguments, accepting single-dash long flags.
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args_os()))
    }

    /// Layer flag values over `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.influx.host = host.clone();
        }
        if let Some(username) = &self.username {
            config.influx.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.influx.password = password.clone();
        }
        if let Some(database) = &self.database {
            config.influx.database = Some(database.clone());
        }
        if let Some(output) = &self.output {
            config.backup.destination = Some(output.clone());
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

/// Rewrite `-host x` / `-host=x` into `--host x` / `--host=x`.
///
/// Only the names in [`LEGACY_FLAGS`] are touched. The argument following any
/// flag that takes a separate value passes through unchanged, as does
/// everything after a bare `--`.
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut expecting_value = false;
    let mut options_done = false;

    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if expecting_value || options_done {
                expecting_value = false;
                return arg;
            }

            let Some(text) = arg.to_str() else {
                return arg;
            };

            if text == "--" {
                options_done = true;
                return arg;
            }

            if let Some(rest) = text.strip_prefix("--") {
                expecting_value = VALUE_FLAGS.contains(&rest) && !rest.contains('=');
                return arg;
            }

            let Some(rest) = text.strip_prefix('-').filter(|r| !r.is_empty()) else {
                return arg;
            };

            let name = rest.split('=').next().unwrap_or(rest);
            if LEGACY_FLAGS.contains(&name) {
                expecting_value = !rest.contains('=');
                OsString::from(format!("-{}", text))
            } else {
                expecting_value = VALUE_SHORTS.contains(&rest);
                arg
            }
        })
        .collect()
}
