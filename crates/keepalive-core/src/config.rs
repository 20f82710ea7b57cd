use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, ParseOption};
use serde::Serialize;
use thiserror::Error;

/// Environment variable exposing the monitored interface to recovery commands.
pub const INTERFACE_ENV: &str = "WG_INTERFACE";

pub const DEFAULT_CONFIG_DIR: &str = "/etc/wg-keepalive";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RESTART_COMMAND: &str = "systemctl restart wg-quick@$WG_INTERFACE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: ini::ParseError,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorConfig {
    pub interface: String,
    #[serde(rename = "interval_secs", serialize_with = "as_secs")]
    pub interval: Duration,
    #[serde(rename = "timeout_secs", serialize_with = "as_secs")]
    pub timeout: Duration,
    pub pre_restart_command: Option<String>,
    pub restart_command: String,
    pub post_restart_command: Option<String>,
}

fn as_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

impl MonitorConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            pre_restart_command: None,
            restart_command: DEFAULT_RESTART_COMMAND.to_string(),
            post_restart_command: None,
        }
    }

    /// Resolves the configuration for `interface` from `<config_dir>/<interface>.conf`.
    ///
    /// The file is INI. Only keys outside any `[section]` are read; unknown keys
    /// are ignored. A missing file is not an error: every key falls back to its
    /// default.
    pub fn load(config_dir: &Path, interface: &str) -> Result<Self, ConfigError> {
        let path = config_file_path(config_dir, interface);
        let file = match fs::read_to_string(&path) {
            Ok(text) => ConfigFile::parse(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => ConfigFile::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = file.resolve(interface)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("interface name is empty".to_string()));
        }
        if self.interval.as_secs() < 1 {
            return Err(ConfigError::Invalid(
                "interval must be at least 1 second".to_string(),
            ));
        }
        if self.timeout.as_secs() < 1 {
            return Err(ConfigError::Invalid(
                "timeout must be at least 1 second".to_string(),
            ));
        }
        if self.restart_command.trim().is_empty() {
            return Err(ConfigError::Invalid("restart_command is empty".to_string()));
        }
        Ok(())
    }

    /// Environment handed to every recovery command.
    pub fn command_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(INTERFACE_ENV.to_string(), self.interface.clone())])
    }
}

pub fn config_file_path(config_dir: &Path, interface: &str) -> PathBuf {
    config_dir.join(format!("{interface}.conf"))
}

/// Global-section keys of `<interface>.conf`.
#[derive(Debug, Default)]
struct ConfigFile {
    interval: Option<String>,
    timeout: Option<String>,
    pre_restart_command: Option<String>,
    restart_command: Option<String>,
    post_restart_command: Option<String>,
}

impl ConfigFile {
    fn parse(text: &str) -> Result<Self, ini::ParseError> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options)?;

        let mut file = Self::default();
        for (key, value) in ini.general_section().iter() {
            let value = Some(value.to_string());
            match key.trim().to_ascii_lowercase().as_str() {
                "interval" => file.interval = value,
                "timeout" => file.timeout = value,
                "pre_restart_command" => file.pre_restart_command = value,
                "restart_command" => file.restart_command = value,
                "post_restart_command" => file.post_restart_command = value,
                _ => {}
            }
        }
        Ok(file)
    }

    fn resolve(self, interface: &str) -> Result<MonitorConfig, ConfigError> {
        let defaults = MonitorConfig::new(interface);
        Ok(MonitorConfig {
            interval: seconds("interval", self.interval)?.unwrap_or(defaults.interval),
            timeout: seconds("timeout", self.timeout)?.unwrap_or(defaults.timeout),
            pre_restart_command: non_empty(self.pre_restart_command),
            restart_command: self.restart_command.unwrap_or(defaults.restart_command),
            post_restart_command: non_empty(self.post_restart_command),
            interface: defaults.interface,
        })
    }
}

fn seconds(key: &str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| ConfigError::Invalid(format!("{key} is not a whole number of seconds: {value:?}")))
}

fn non_empty(command: Option<String>) -> Option<String> {
    command.filter(|c| !c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_resolves_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");

        let config = MonitorConfig::load(dir.path(), "wg0").expect("load");

        assert_eq!(config, MonitorConfig::new("wg0"));
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.restart_command, "systemctl restart wg-quick@$WG_INTERFACE");
        assert!(config.pre_restart_command.is_none());
        assert!(config.post_restart_command.is_none());
    }

    #[test]
    fn unquoted_ini_values_are_read_verbatim() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join("wg0.conf"),
            "interval=30\ntimeout=120\nrestart_command=systemctl restart wg-quick@$WG_INTERFACE\n",
        )
        .expect("write config");

        let config = MonitorConfig::load(dir.path(), "wg0").expect("load");

        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.restart_command, "systemctl restart wg-quick@$WG_INTERFACE");
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join("wg1.conf"),
            r#"
; keepalive for the office tunnel
interval = 10
timeout = 45
pre_restart_command = logger stalled $WG_INTERFACE
post_restart_command =
"#,
        )
        .expect("write config");

        let config = MonitorConfig::load(dir.path(), "wg1").expect("load");

        assert_eq!(config.interface, "wg1");
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(
            config.pre_restart_command.as_deref(),
            Some("logger stalled $WG_INTERFACE")
        );
        assert_eq!(config.restart_command, DEFAULT_RESTART_COMMAND);
        assert!(config.post_restart_command.is_none(), "empty hook is treated as absent");
    }

    #[test]
    fn unknown_keys_and_sections_are_ignored() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join("wg0.conf"),
            "intervall = 10\ntimeout = 90\n\n[extra]\ninterval = 5\n",
        )
        .expect("write config");

        let config = MonitorConfig::load(dir.path(), "wg0").expect("load");

        assert_eq!(config.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));
        assert_eq!(config.timeout, Duration::from_secs(90));
    }

    #[test]
    fn non_numeric_interval_is_invalid() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("wg0.conf"), "interval = soon\n").expect("write config");

        let err = MonitorConfig::load(dir.path(), "wg0").expect_err("not a number");

        assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn zero_interval_is_invalid() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("wg0.conf"), "interval = 0\n").expect("write config");

        let err = MonitorConfig::load(dir.path(), "wg0").expect_err("zero interval");

        assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn validate_rejects_empty_fields() {
        let mut config = MonitorConfig::new("");
        assert!(config.validate().is_err());

        config.interface = "wg0".to_string();
        config.restart_command = "  ".to_string();
        assert!(config.validate().is_err());

        config.restart_command = DEFAULT_RESTART_COMMAND.to_string();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.timeout = Duration::from_secs(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn command_env_exposes_interface() {
        let env = MonitorConfig::new("wg-office").command_env();

        assert_eq!(env.get(INTERFACE_ENV).map(String::as_str), Some("wg-office"));
        assert_eq!(env.len(), 1);
    }
}
