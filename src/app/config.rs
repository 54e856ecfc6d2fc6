use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Journal tailing
    #[serde(default)]
    pub journal: JournalConfig,
    /// Notification requests
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Online user tracking (privileged mode only)
    #[serde(default)]
    pub session: SessionConfig,
}

/// Journal tailing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Program used to follow the journal
    #[serde(default = "default_journal_command")]
    pub command: PathBuf,
    /// Records before the tail replayed at startup
    #[serde(default = "default_replay_records")]
    pub replay_records: usize,
    /// Bounded wait for new records, in milliseconds
    #[serde(default = "default_wait_interval")]
    pub wait_interval_ms: u64,
    /// Messages must be longer than this many bytes to be forwarded
    #[serde(default)]
    pub min_message_len: usize,
    /// Maximum identifier length in bytes
    #[serde(default = "default_identifier_capacity")]
    pub identifier_capacity: usize,
    /// Priority used when a record has none (5 = notice)
    #[serde(default = "default_priority")]
    pub default_priority: u8,
    /// Skip records written by this process
    #[serde(default = "default_skip_own_entries")]
    pub skip_own_entries: bool,
}

fn default_journal_command() -> PathBuf {
    PathBuf::from("journalctl")
}

fn default_replay_records() -> usize {
    2
}

fn default_wait_interval() -> u64 {
    100
}

fn default_identifier_capacity() -> usize {
    255
}

fn default_priority() -> u8 {
    5
}

fn default_skip_own_entries() -> bool {
    true
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            command: default_journal_command(),
            replay_records: default_replay_records(),
            wait_interval_ms: default_wait_interval(),
            min_message_len: 0,
            identifier_capacity: default_identifier_capacity(),
            default_priority: default_priority(),
            skip_own_entries: default_skip_own_entries(),
        }
    }
}

impl JournalConfig {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

/// Notification request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Application name sent with every notification
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Icon name sent with every notification
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Round-trip timeout for one `Notify` call, in milliseconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    /// Maximum escaped body length in bytes
    #[serde(default = "default_body_capacity")]
    pub body_capacity: usize,
}

fn default_app_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_icon() -> String {
    "dialog-information".to_string()
}

fn default_send_timeout() -> u64 {
    1000
}

fn default_body_capacity() -> usize {
    4096
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            icon: default_icon(),
            send_timeout_ms: default_send_timeout(),
            body_capacity: default_body_capacity(),
        }
    }
}

/// Online user tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Parent of the per-user runtime directories
    #[serde(default = "default_runtime_root")]
    pub runtime_root: PathBuf,
    /// Wait for membership events after each log cycle, in milliseconds
    #[serde(default)]
    pub poll_timeout_ms: u64,
    /// Timeout for opening a user's private bus, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Timeout for listing logged-in users, in milliseconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

fn default_runtime_root() -> PathBuf {
    PathBuf::from("/run/user")
}

fn default_connect_timeout() -> u64 {
    1000
}

fn default_query_timeout() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            runtime_root: default_runtime_root(),
            poll_timeout_ms: 0,
            connect_timeout_ms: default_connect_timeout(),
            query_timeout_ms: default_query_timeout(),
        }
    }
}

impl SessionConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present and built-in defaults otherwise. Nothing is written.
    pub fn load(path: Option<&Path>, privileged: bool) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::config_path(privileged) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Default configuration file location
    ///
    /// Root reads `/etc/journal-notify/config.toml`, other users read
    /// `~/.config/journal-notify/config.toml`.
    pub fn config_path(privileged: bool) -> Option<PathBuf> {
        if privileged {
            return Some(PathBuf::from("/etc").join(env!("CARGO_PKG_NAME")).join("config.toml"));
        }
        directories::ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
            .map(|d| d.config_dir().join("config.toml"))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}
