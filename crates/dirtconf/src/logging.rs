//! Logging channel configuration.
//!
//! Channels map to `tracing` targets; each service logs under the channel
//! names (`physics`, `network`, `audio`, ...) and the config file decides
//! what is visible. Load order: `logging-config.local.json` wins over
//! `logging-config.json`; a missing config writes the default file so the
//! operator has something to edit.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

pub const CONFIG_FILE: &str = "logging-config.json";
pub const LOCAL_CONFIG_FILE: &str = "logging-config.local.json";

/// The channels every service may log under.
pub const CHANNELS: &[&str] = &[
    "brain",
    "physics",
    "pressure",
    "network",
    "audio",
    "ui",
    "evolution",
    "scenario",
    "osman",
];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),
}

/// Level strings accepted in the config file. `critical` folds into
/// `error` on the tracing side; `off` silences the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

impl LogLevel {
    pub fn parse(value: &str) -> Result<Self, LoggingError> {
        match value {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "off" => Ok(Self::Off),
            other => Err(LoggingError::UnknownLevel(other.to_string())),
        }
    }

    /// The EnvFilter directive fragment for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
            Self::Off => "off",
        }
    }
}

/// Contents of `logging-config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback level for targets without a channel entry.
    pub default: LogLevel,
    /// Per-channel levels; keys are the channel names.
    pub channels: BTreeMap<String, LogLevel>,
    /// Optional log file appended alongside stderr output.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut channels = BTreeMap::new();
        for channel in CHANNELS {
            channels.insert((*channel).to_string(), LogLevel::Info);
        }
        Self {
            default: LogLevel::Info,
            channels,
            log_file: Some(PathBuf::from("dirtsim.log")),
        }
    }
}

impl LoggingConfig {
    /// Load from `dir`, preferring the `.local` override. When neither
    /// file exists the default config is written to `dir` and returned.
    pub fn load_or_create(dir: &Path) -> Result<Self, LoggingError> {
        let local = dir.join(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_file(&local);
        }
        let main = dir.join(CONFIG_FILE);
        if main.exists() {
            return Self::load_file(&main);
        }

        let config = Self::default();
        let body = serde_json::to_string_pretty(&config).expect("default config serializes");
        // Best effort; a read-only directory still gets a working default.
        let _ = fs::write(&main, body);
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self, LoggingError> {
        let body = fs::read_to_string(path).map_err(|source| LoggingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|source| LoggingError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render the channel map as an EnvFilter directive string, e.g.
    /// `info,physics=debug,network=warn`.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default.as_filter().to_string()];
        for (channel, level) in &self.channels {
            directives.push(format!("{channel}={}", level.as_filter()));
        }
        directives.join(",")
    }
}

/// Install the global subscriber from a loaded config.
///
/// `RUST_LOG` overrides the file when set, so ad-hoc debugging never
/// requires editing config.
pub fn init_logging(config: &LoggingConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| raw.parse::<EnvFilter>().ok())
        .unwrap_or_else(|| {
            EnvFilter::try_new(config.filter_directives())
                .unwrap_or_else(|_| EnvFilter::new("info"))
        });

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = config.log_file.as_ref().and_then(|path| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
            .map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
            })
    });

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);

    // Ignore a second init (tests set up logging repeatedly).
    let _ = registry.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_parsing_covers_all_strings() {
        assert_eq!(LogLevel::parse("trace").unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::parse("critical").unwrap(), LogLevel::Critical);
        assert_eq!(LogLevel::parse("off").unwrap(), LogLevel::Off);
        assert!(LogLevel::parse("loud").is_err());
    }

    #[test]
    fn critical_folds_into_error() {
        assert_eq!(LogLevel::Critical.as_filter(), "error");
    }

    #[test]
    fn default_config_covers_every_channel() {
        let config = LoggingConfig::default();
        for channel in CHANNELS {
            assert!(config.channels.contains_key(*channel), "{channel} missing");
        }
    }

    #[test]
    fn filter_directives_shape() {
        let mut config = LoggingConfig::default();
        config.channels.clear();
        config
            .channels
            .insert("physics".into(), LogLevel::Debug);
        config.channels.insert("network".into(), LogLevel::Off);
        assert_eq!(config.filter_directives(), "info,network=off,physics=debug");
    }

    #[test]
    fn missing_config_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config.default, LogLevel::Info);
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn local_override_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let main = LoggingConfig::default();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            serde_json::to_string(&main).unwrap(),
        )
        .unwrap();

        let mut local = LoggingConfig::default();
        local.default = LogLevel::Trace;
        std::fs::write(
            dir.path().join(LOCAL_CONFIG_FILE),
            serde_json::to_string(&local).unwrap(),
        )
        .unwrap();

        let loaded = LoggingConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded.default, LogLevel::Trace);
    }
}
