//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides; command
//! line flags in the binary override both.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::websocket::ConnectionSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory of static frontend files served at `/`
    pub static_dir: Option<String>,

    /// JSON file mapping auth tokens to users
    pub users_file: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: None,
            users_file: None,
        }
    }
}

/// Push channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_write_timeout() -> u64 {
    10
}

fn default_pong_wait() -> u64 {
    60
}

fn default_ping_period() -> u64 {
    54 // 9/10 of pong wait
}

fn default_max_message_size() -> usize {
    512
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            write_timeout_secs: default_write_timeout(),
            pong_wait_secs: default_pong_wait(),
            ping_period_secs: default_ping_period(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl WebSocketConfig {
    /// Per-connection settings derived from this section
    pub fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            mailbox_capacity: self.mailbox_capacity,
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            ping_period: Duration::from_secs(self.ping_period_secs),
            max_message_size: self.max_message_size,
        }
    }
}

/// Item store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file loaded at startup and written on shutdown
    pub snapshot_path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// First existing config file among the default locations
    pub fn default_path() -> Option<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("listshare").join("config.toml")),
            Some(PathBuf::from("/etc/listshare/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .find(|path| path.exists())
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `LISTSHARE_*` overrides read through `lookup`. A numeric
    /// override that does not parse is an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("LISTSHARE_BIND") {
            self.server.bind = bind;
        }
        if let Some(dir) = lookup("LISTSHARE_STATIC_DIR") {
            self.server.static_dir = Some(dir);
        }
        if let Some(path) = lookup("LISTSHARE_USERS_FILE") {
            self.server.users_file = Some(path);
        }

        let ws = &mut self.websocket;
        override_parsed(&lookup, "LISTSHARE_MAILBOX_CAPACITY", &mut ws.mailbox_capacity)?;
        override_parsed(&lookup, "LISTSHARE_WRITE_TIMEOUT_SECS", &mut ws.write_timeout_secs)?;
        override_parsed(&lookup, "LISTSHARE_PONG_WAIT_SECS", &mut ws.pong_wait_secs)?;
        override_parsed(&lookup, "LISTSHARE_PING_PERIOD_SECS", &mut ws.ping_period_secs)?;
        override_parsed(&lookup, "LISTSHARE_MAX_MESSAGE_SIZE", &mut ws.max_message_size)?;

        if let Some(path) = lookup("LISTSHARE_SNAPSHOT_PATH") {
            self.store.snapshot_path = Some(path);
        }

        if let Some(level) = lookup("LISTSHARE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LISTSHARE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = &self.websocket;

        if ws.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "websocket.mailbox_capacity must be greater than 0".to_string(),
            ));
        }
        if ws.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "websocket.max_message_size must be greater than 0".to_string(),
            ));
        }
        if ws.write_timeout_secs == 0 || ws.ping_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "websocket timeouts must be greater than 0".to_string(),
            ));
        }
        if ws.ping_period_secs >= ws.pong_wait_secs {
            return Err(ConfigError::Invalid(format!(
                "websocket.ping_period_secs ({}) must be less than pong_wait_secs ({})",
                ws.ping_period_secs, ws.pong_wait_secs
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(());
    };
    *target = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{}={:?}: {}", name, raw, e)))?;
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Listshare Configuration
#
# Environment variables override these settings:
# - LISTSHARE_BIND
# - LISTSHARE_STATIC_DIR
# - LISTSHARE_USERS_FILE
# - LISTSHARE_MAILBOX_CAPACITY
# - LISTSHARE_WRITE_TIMEOUT_SECS
# - LISTSHARE_PONG_WAIT_SECS
# - LISTSHARE_PING_PERIOD_SECS
# - LISTSHARE_MAX_MESSAGE_SIZE
# - LISTSHARE_SNAPSHOT_PATH
# - LISTSHARE_LOG_LEVEL
# - LISTSHARE_LOG_FORMAT

[server]
# Listen address
bind = "0.0.0.0:8080"

# Directory with the frontend, served at /
# static_dir = "./static"

# JSON file mapping auth tokens to users: {"<token>": {"username": "..."}}
# Without it only the token "admin" is accepted.
# users_file = "./users.json"

[websocket]
# Envelopes queued per connection before it counts as a slow consumer
mailbox_capacity = 256

# Deadline for every write to a client (seconds)
write_timeout_secs = 10

# Close a connection after this long without hearing from it (seconds)
pong_wait_secs = 60

# Ping interval; must be less than pong_wait_secs (seconds)
ping_period_secs = 54

# Largest message accepted from a client (bytes)
max_message_size = 512

[store]
# Snapshot file loaded at startup and written on graceful shutdown
# snapshot_path = "./items.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.websocket.mailbox_capacity, 256);
        assert_eq!(config.websocket.ping_period_secs, 54);
        assert_eq!(config.logging.level, "info");
        assert!(config.store.snapshot_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let config = Config::parse(&generate_default_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.server.bind, defaults.server.bind);
        assert_eq!(config.websocket.settings(), defaults.websocket.settings());
        assert_eq!(config.logging.format, defaults.logging.format);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::parse(
            r#"
            [websocket]
            mailbox_capacity = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.websocket.mailbox_capacity, 16);
        assert_eq!(config.websocket.pong_wait_secs, 60);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_settings_conversion() {
        let settings = WebSocketConfig::default().settings();
        assert_eq!(settings, ConnectionSettings::default());
    }

    #[test]
    fn test_ping_period_must_be_shorter_than_pong_wait() {
        let result = Config::parse(
            r#"
            [websocket]
            pong_wait_secs = 30
            ping_period_secs = 30
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_mailbox_rejected() {
        let result = Config::parse("[websocket]\nmailbox_capacity = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let result = Config::parse("[logging]\nformat = \"xml\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overrides_cover_websocket_settings() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LISTSHARE_BIND", "127.0.0.1:9000"),
            ("LISTSHARE_MAILBOX_CAPACITY", "32"),
            ("LISTSHARE_WRITE_TIMEOUT_SECS", "5"),
            ("LISTSHARE_PONG_WAIT_SECS", "30"),
            ("LISTSHARE_PING_PERIOD_SECS", "27"),
            ("LISTSHARE_MAX_MESSAGE_SIZE", "1024"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.websocket.mailbox_capacity, 32);
        assert_eq!(config.websocket.write_timeout_secs, 5);
        assert_eq!(config.websocket.pong_wait_secs, 30);
        assert_eq!(config.websocket.ping_period_secs, 27);
        assert_eq!(config.websocket.max_message_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_override_is_rejected() {
        for (name, value) in [
            ("LISTSHARE_MAILBOX_CAPACITY", "lots"),
            ("LISTSHARE_PONG_WAIT_SECS", "-1"),
        ] {
            let mut config = Config::default();
            let result = config.apply_overrides(|var| (var == name).then(|| value.to_string()));
            match result {
                Err(ConfigError::Invalid(message)) => assert!(message.contains(name)),
                other => panic!("expected invalid override, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_broken_file_is_not_replaced_by_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[websocket]\nmailbox_capacity = \"many\"\n").unwrap();

        assert!(matches!(
            Config::load_with_env(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nbind = 1").unwrap();

        match Config::load(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {:?}", other),
        }

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));
    }
}
