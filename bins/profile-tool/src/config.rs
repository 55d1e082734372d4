use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "profile-tool.toml";
const DEFAULT_LOG_FILE: &str = "profile-tool.log";

/// Log level enumeration for configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl LogLevel {
    /// Parse from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(anyhow::anyhow!(
                "Invalid log level: {}. Valid options: error, warn, info, debug, trace",
                s
            )),
        }
    }
}

/// Configuration structure loaded from TOML files
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Enable logging to file (overridden by --log)
    #[serde(default)]
    pub enabled: bool,
    /// Log file path (overridden by --log-file)
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Log level (overridden by --log-level)
    #[serde(default)]
    pub level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file: default_log_file(),
            level: LogLevel::default(),
        }
    }
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

impl Config {
    /// Load configuration: an explicit path must exist; otherwise the
    /// default file is used when present, built-in defaults when not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Config::default());
                }
                default
            }
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }
}

/// Final settings after applying command-line overrides on top of the
/// config file. Command line wins.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub enable_logging: bool,
    pub log_file: PathBuf,
    pub log_level: LogLevel,
}

impl MergedConfig {
    pub fn new(
        config: Config,
        log: bool,
        log_file: Option<PathBuf>,
        log_level: Option<&str>,
    ) -> Result<Self> {
        let log_level = match log_level {
            Some(level) => LogLevel::parse(level)?,
            None => config.log.level,
        };
        Ok(Self {
            enable_logging: log || config.log.enabled,
            log_file: log_file.unwrap_or_else(|| PathBuf::from(&config.log.file)),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config_file() {
        let config: Config = toml::from_str(
            "[log]\nenabled = false\nfile = \"from-config.log\"\nlevel = \"info\"\n",
        )
        .unwrap();
        let merged = MergedConfig::new(
            config,
            true,
            Some(PathBuf::from("from-cli.log")),
            Some("debug"),
        )
        .unwrap();
        assert!(merged.enable_logging);
        assert_eq!(merged.log_file, PathBuf::from("from-cli.log"));
        assert_eq!(merged.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_defaults_without_config_file() {
        let merged = MergedConfig::new(Config::default(), false, None, None).unwrap();
        assert!(!merged.enable_logging);
        assert_eq!(merged.log_level, LogLevel::Warn);
    }
}
