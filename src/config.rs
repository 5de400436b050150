//! Configuration module for scriptbridge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{BridgeError, Result};

/// Default configuration written when no config file exists.
pub const DEFAULT_CONFIG: &str = r#"# scriptbridge configuration

[scripts]
# The relative path of the scripts directory.
directory = "scripts"
# The name of the initial script, loaded before all others.
init_script = "init.lua"
# How often script files are polled for changes, in seconds.
poll_interval_secs = 1

[host]
# Owner recorded on commands registered by scripts.
owner = "scriptbridge"
# Event types scripts may listen to.
event_types = ["server_started", "chat", "shutdown"]

[logging]
# Log level (trace, debug, info, warn, error).
level = "info"
# Path to the log file.
file = "logs/scriptbridge.log"
"#;

/// Script environment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptsConfig {
    /// Directory scanned for `.lua` files.
    #[serde(default = "default_scripts_dir")]
    pub directory: String,
    /// Script loaded before all others.
    #[serde(default = "default_init_script")]
    pub init_script: String,
    /// Seconds between directory scans.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_init_script() -> String {
    "init.lua".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            directory: default_scripts_dir(),
            init_script: default_init_script(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl ScriptsConfig {
    /// Script directory as a path.
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

/// Host configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Owner recorded on command registrations.
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Event types the event bus delivers.
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,
}

fn default_owner() -> String {
    "scriptbridge".to_string()
}

fn default_event_types() -> Vec<String> {
    vec![
        "server_started".to_string(),
        "chat".to_string(),
        "shutdown".to_string(),
    ]
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            event_types: default_event_types(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/scriptbridge.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Script environment configuration.
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Host configuration.
    #[serde(default)]
    pub host: HostConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BridgeError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration, writing [`DEFAULT_CONFIG`] first if the file is missing.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            Self::write_default(path)?;
        }
        Self::load_with_env(path)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Config(format!("config parse error: {e}")))
    }

    /// Write the commented default configuration to `path`.
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `SCRIPTBRIDGE_SCRIPTS_DIR`: Override the script directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SCRIPTBRIDGE_SCRIPTS_DIR") {
            if !dir.is_empty() {
                self.scripts.directory = dir;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - The poll interval is zero
    /// - The init script is empty or not a `.lua` file
    pub fn validate(&self) -> Result<()> {
        if self.scripts.poll_interval_secs == 0 {
            return Err(BridgeError::Config(
                "scripts.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.scripts.init_script.trim().is_empty() {
            return Err(BridgeError::Config(
                "scripts.init_script must not be empty".to_string(),
            ));
        }
        if !self.scripts.init_script.ends_with(".lua") {
            return Err(BridgeError::Config(format!(
                "scripts.init_script '{}' is not a .lua file",
                self.scripts.init_script
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.scripts.directory, "scripts");
        assert_eq!(config.scripts.init_script, "init.lua");
        assert_eq!(config.scripts.poll_interval_secs, 1);
        assert_eq!(config.host.owner, "scriptbridge");
        assert_eq!(config.host.event_types, vec!["server_started", "chat", "shutdown"]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_file_matches_defaults() {
        let parsed = Config::parse(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.scripts.directory, defaults.scripts.directory);
        assert_eq!(parsed.scripts.init_script, defaults.scripts.init_script);
        assert_eq!(parsed.scripts.poll_interval_secs, defaults.scripts.poll_interval_secs);
        assert_eq!(parsed.host.event_types, defaults.host.event_types);
        assert_eq!(parsed.logging.file, defaults.logging.file);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[scripts]
directory = "plugins"
init_script = "main.lua"
poll_interval_secs = 5

[host]
owner = "demo"
event_types = ["join", "quit"]

[logging]
level = "debug"
file = "demo.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.scripts.directory, "plugins");
        assert_eq!(config.scripts.init_script, "main.lua");
        assert_eq!(config.scripts.poll_interval(), std::time::Duration::from_secs(5));
        assert_eq!(config.host.owner, "demo");
        assert_eq!(config.host.event_types, vec!["join", "quit"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "demo.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[scripts]
directory = "custom"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.scripts.directory, "custom");
        // Defaults for the rest
        assert_eq!(config.scripts.init_script, "init.lua");
        assert_eq!(config.host.owner, "scriptbridge");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.scripts.directory_path(), PathBuf::from("scripts"));
        assert_eq!(config.logging.file, "logs/scriptbridge.log");
    }

    #[test]
    fn test_parse_invalid_config() {
        let toml = "this is not valid toml [[[";
        let result = Config::parse(toml);

        assert!(result.is_err());
        if let Err(BridgeError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");

        assert!(result.is_err());
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let config = Config::load_or_create(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.scripts.init_script, "init.lua");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("How often script files are polled"));
    }

    #[test]
    fn test_load_or_create_keeps_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[host]\nowner = \"kept\"\n").unwrap();

        let config = Config::load_or_create(&path).unwrap();

        assert_eq!(config.host.owner, "kept");
    }

    #[test]
    fn test_apply_env_overrides_scripts_dir() {
        // Save original value if exists
        let original = std::env::var("SCRIPTBRIDGE_SCRIPTS_DIR").ok();

        std::env::set_var("SCRIPTBRIDGE_SCRIPTS_DIR", "/tmp/env-scripts");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.scripts.directory, "/tmp/env-scripts");

        // Empty values are ignored
        std::env::set_var("SCRIPTBRIDGE_SCRIPTS_DIR", "");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.scripts.directory, "scripts");

        // Restore original
        if let Some(val) = original {
            std::env::set_var("SCRIPTBRIDGE_SCRIPTS_DIR", val);
        } else {
            std::env::remove_var("SCRIPTBRIDGE_SCRIPTS_DIR");
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.scripts.poll_interval_secs = 0;

        let result = config.validate();
        assert!(matches!(result, Err(BridgeError::Config(ref msg)) if msg.contains("poll_interval")));
    }

    #[test]
    fn test_validate_init_script() {
        let mut config = Config::default();
        config.scripts.init_script = "  ".to_string();
        assert!(config.validate().is_err());

        config.scripts.init_script = "init.js".to_string();
        assert!(config.validate().is_err());
    }
}
