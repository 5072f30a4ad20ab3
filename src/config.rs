//! TOML configuration, read from `~/.config/schemashell/config.toml`.
//!
//! Connection defaults seed a fresh session on connect; the `[extra]`
//! table is the free-form settings bag handed to loaders and renderers.

use crate::options::{InfoLevel, OutputFormat};
use clap::ValueEnum;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for the tracing env filter.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_filter())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub default_info_level: InfoLevel,
    pub default_output_format: OutputFormat,
    pub log_level: LogLevel,
    /// Free-form settings layered under the typed options, seeded into the
    /// session at connect time.
    pub extra: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_info_level: InfoLevel::Standard,
            default_output_format: OutputFormat::Text,
            log_level: LogLevel::Info,
            extra: HashMap::new(),
        }
    }
}

impl Config {
    pub fn config_dir() -> io::Result<PathBuf> {
        let home = home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))?;
        Ok(home.join(".config").join("schemashell"))
    }

    pub fn config_path() -> io::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing or malformed. A bad config file never stops the shell.
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                warn!("cannot determine config path: {e}");
                Config::default()
            }
        }
    }

    fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("malformed config file {}: {e}", path.display());
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}
