//! Core configuration types and loading.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and addressing.
    pub server: ServerConfig,
    /// Event dispatcher scheduling.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Chat session lifecycle.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Transcript and persona storage.
    #[serde(default)]
    pub store: StoreConfig,
    /// Alias resolution.
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "im.example.com").
    pub name: String,
    /// Domains whose addresses are served by this process.
    /// Empty means every non-room address is local.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Resource personas use when they originate stanzas.
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Subdomain hosting multi-user rooms (`<thread>@<muc_subdomain>.<domain>`).
    #[serde(default = "default_muc_subdomain")]
    pub muc_subdomain: String,
    /// Prometheus metrics HTTP port. Unset or 0 disables the endpoint.
    pub metrics_port: Option<u16>,
}

/// How the dispatcher schedules events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchModeConfig {
    /// One ordered worker for every persona.
    #[default]
    Serial,
    /// Per-address shards, each an ordered worker.
    Sharded,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchModeConfig,
    /// Number of shards in sharded mode.
    #[serde(default = "default_dispatch_workers")]
    pub workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchModeConfig::default(),
            workers: default_dispatch_workers(),
        }
    }
}

/// Chat session lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Idle seconds after the last logged message before the transcript is saved.
    #[serde(default = "default_save_timeout")]
    pub save_timeout_secs: u64,
    /// Idle seconds after a save before the chat is closed.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,
    /// Sequence number offset for new chats.
    #[serde(default)]
    pub first_seq: u64,
    /// When false, flushes are acknowledged without writing transcripts.
    #[serde(default = "default_true")]
    pub log_chats: bool,
}

impl ChatConfig {
    /// Save delay, never shorter than one second.
    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_secs.max(MIN_SAVE_TIMEOUT_SECS))
    }

    /// Close delay, never shorter than one minute.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs.max(MIN_CLOSE_TIMEOUT_SECS))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            save_timeout_secs: default_save_timeout(),
            close_timeout_secs: default_close_timeout(),
            first_seq: 0,
            log_chats: true,
        }
    }
}

/// Storage back end selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process maps, lost on restart.
    #[default]
    Memory,
    /// Embedded redb database.
    Redb,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file for the redb back end.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// Directory configuration: alias → canonical address.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
[server]
name = "im.example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.server.resource, "parley");
        assert_eq!(config.server.muc_subdomain, "conference");
        assert_eq!(config.dispatch.mode, DispatchModeConfig::Serial);
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(config.chat.save_timeout(), Duration::from_secs(300));
        assert_eq!(config.chat.close_timeout(), Duration::from_secs(3600));
        assert!(config.chat.log_chats);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn chat_timeouts_are_clamped() {
        let config = Config::parse(
            r#"
[server]
name = "im.example.com"

[chat]
save_timeout_secs = 0
close_timeout_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(config.chat.save_timeout(), Duration::from_secs(1));
        assert_eq!(config.chat.close_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn parses_sharded_redb_config() {
        let config = Config::parse(
            r#"
[server]
name = "im.example.com"
domains = ["example.com"]

[dispatch]
mode = "sharded"
workers = 8

[store]
backend = "redb"
path = "/var/lib/parley/parley.db"

[directory]
aliases = { "al@example.com" = "alice@example.com" }
"#,
        )
        .unwrap();
        assert_eq!(config.dispatch.mode, DispatchModeConfig::Sharded);
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.store.backend, StoreBackend::Redb);
        assert_eq!(
            config.directory.aliases.get("al@example.com").map(String::as_str),
            Some("alice@example.com")
        );
    }

    #[test]
    fn unknown_dispatch_mode_is_a_parse_error() {
        let err = Config::parse(
            r#"
[server]
name = "im.example.com"

[dispatch]
mode = "parallel"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
