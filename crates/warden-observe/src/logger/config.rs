use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::object::{LoggerFormat, LoggerLevel, LoggerTimeZone};

/// Logger section of the warden configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` expression, e.g. `"info"` or `"warden_core=debug,info"`.
    pub level: LoggerLevel,
    pub tz: LoggerTimeZone,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            tz: LoggerTimeZone::default(),
            with_targets: false,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    /// Color only when enabled and stderr is a terminal.
    ///
    /// The detached controller loop writes into a log file, so this is
    /// evaluated at init time rather than stored.
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stderr().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LoggerConfig::default();

        assert_eq!(config.format, LoggerFormat::Text);
        assert_eq!(config.tz, LoggerTimeZone::Utc);
        assert_eq!(config.level.as_str(), "info");
        assert!(!config.with_targets);
        assert!(config.use_color);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: LoggerConfig = serde_json::from_str(r#"{"level": "warden_core=debug"}"#).unwrap();

        assert_eq!(config.level.as_str(), "warden_core=debug");
        assert_eq!(config.format, LoggerFormat::Text);
        assert_eq!(config.tz, LoggerTimeZone::Utc);
    }

    #[test]
    fn rejects_bad_level_in_file() {
        let res = serde_json::from_str::<LoggerConfig>(r#"{"level": "warden=loud"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn json_format_and_local_time_are_accepted() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{"format": "JSON", "tz": "local", "use_color": false}"#).unwrap();

        assert_eq!(config.format, LoggerFormat::Json);
        assert_eq!(config.tz, LoggerTimeZone::Local);
        assert!(!config.should_use_color());
    }
}
