//! The in-memory shape a logging-config document is parsed into. Parsing
//! from YAML/JSON is the CLI's job; `init_tracing` (also the CLI's job) wires
//! this into an `EnvFilter` + `fmt` layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration: a default level, per-component (module path)
/// overrides, and a text/json format toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub modules: HashMap<String, LogLevel>,
    #[serde(default = "LogConfig::default_format")]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            modules: HashMap::new(),
            format: Self::default_format(),
        }
    }
}

impl LogConfig {
    fn default_level() -> LogLevel {
        LogLevel::Info
    }

    fn default_format() -> LogFormat {
        LogFormat::Text
    }

    /// Render as an `EnvFilter`-compatible directive string, e.g.
    /// `info,tzindex_datasource=debug`.
    pub fn as_env_filter_directive(&self) -> String {
        let mut directive = self.level.as_str().to_string();
        for (module, level) in &self.modules {
            directive.push(',');
            directive.push_str(module);
            directive.push('=');
            directive.push_str(level.as_str());
        }
        directive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_is_bare_level() {
        let config = LogConfig::default();
        assert_eq!(config.as_env_filter_directive(), "info");
    }

    #[test]
    fn module_overrides_append_to_directive() {
        let mut config = LogConfig::default();
        config.modules.insert("tzindex_datasource".into(), LogLevel::Debug);
        let directive = config.as_env_filter_directive();
        assert!(directive.starts_with("info,"));
        assert!(directive.contains("tzindex_datasource=debug"));
    }
}
