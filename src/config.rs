//! Configuration loaded from an optional JSON file and overridden by CLI flags.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::Level;

use crate::debugger::SessionSettings;
use crate::error::ConfigError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid {
                field: "log.format",
                message: format!("unknown format '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Global level: error, warn, info, debug or trace.
    pub level: String,
    pub format: LogFormat,
    /// Append logs here instead of stderr.
    pub file: Option<PathBuf>,
    /// Per-target level overrides, e.g. `"step_debugger::gate": "trace"`.
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::default(),
            file: None,
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    pub fn global(&self) -> Result<Level, ConfigError> {
        parse_level("log.level", &self.level)
    }

    /// Level for `target`, falling back to the global level.
    pub fn level_for(&self, target: &str) -> Result<Level, ConfigError> {
        match self.targets.get(target) {
            Some(level) => parse_level("log.targets", level),
            None => self.global(),
        }
    }
}

fn parse_level(field: &'static str, value: &str) -> Result<Level, ConfigError> {
    Level::from_str(value).map_err(|_| ConfigError::Invalid {
        field,
        message: format!("unknown level '{}'", value),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub log: LogConfig,
    /// Filename given to sources that arrive without one.
    pub unit_name: String,
    pub recursion_limit: usize,
    pub gate_poll_ms: u64,
    pub read_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            unit_name: "main.py".to_string(),
            recursion_limit: 1000,
            gate_poll_ms: 20,
            read_poll_ms: 20,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|err| match err {
            ConfigError::Json { source, .. } => ConfigError::Json {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.global()?;
        for level in self.log.targets.values() {
            parse_level("log.targets", level)?;
        }
        if self.unit_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "unitName",
                message: "must not be empty".to_string(),
            });
        }
        if self.recursion_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "recursionLimit",
                message: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [("gatePollMs", self.gate_poll_ms), ("readPollMs", self.read_poll_ms)] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            recursion_limit: self.recursion_limit,
            gate_poll: Duration::from_millis(self.gate_poll_ms),
            read_poll: Duration::from_millis(self.read_poll_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.unit_name, "main.py");
        assert_eq!(config.session_settings(), SessionSettings::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_json(
            r#"{"recursionLimit": 50, "log": {"level": "debug", "format": "json", "targets": {"step_debugger::gate": "trace"}}}"#,
        )
        .unwrap();
        assert_eq!(config.recursion_limit, 50);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.global().unwrap(), Level::DEBUG);
        assert_eq!(config.log.level_for("step_debugger::gate").unwrap(), Level::TRACE);
        assert_eq!(config.log.level_for("step_debugger::vm").unwrap(), Level::DEBUG);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_json(r#"{"gatePollMs": 0}"#),
            Err(ConfigError::Invalid { field: "gatePollMs", .. })
        ));
        assert!(matches!(
            Config::from_json(r#"{"log": {"level": "loud"}}"#),
            Err(ConfigError::Invalid { field: "log.level", .. })
        ));
        assert!(matches!(Config::from_json("{"), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/step-debugger.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
