//! LinkTracker configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LinkTrackerError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkTrackerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub stackoverflow: StackOverflowConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl LinkTrackerConfig {
    /// Load config from the default path (~/.linktracker/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LinkTrackerError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LinkTrackerError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LinkTrackerError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Secrets may come from the environment instead of the file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("LINKTRACKER_TELEGRAM_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Ok(key) = std::env::var("STACKOVERFLOW_KEY") {
            self.stackoverflow.key = Some(key);
        }
        self
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.scheduler.interval_secs == 0, "scheduler.interval_secs"),
            (self.scheduler.page_size == 0, "scheduler.page_size"),
            (self.scheduler.check_concurrency == 0, "scheduler.check_concurrency"),
            (self.scheduler.event_queue_capacity == 0, "scheduler.event_queue_capacity"),
            (self.dispatcher.workers == 0, "dispatcher.workers"),
            (self.dispatcher.queue_capacity == 0, "dispatcher.queue_capacity"),
        ];
        for (bad, field) in checks {
            if bad {
                return Err(LinkTrackerError::Config(format!("{field} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the LinkTracker home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".linktracker")
    }
}

/// Scan scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period between scan cycles; also the deadline of one cycle.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Concurrent source checks within one page.
    #[serde(default = "default_check_concurrency")]
    pub check_concurrency: usize,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

fn default_interval_secs() -> u64 { 60 }
fn default_page_size() -> usize { 100 }
fn default_check_concurrency() -> usize { 1 }
fn default_event_queue_capacity() -> usize { 256 }

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            page_size: default_page_size(),
            check_concurrency: default_check_concurrency(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

/// Conversation dispatcher sharding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bound of each worker's queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize { 8 }
fn default_queue_capacity() -> usize { 64 }

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Telegram Bot API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }
fn default_poll_timeout() -> u64 { 30 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_github_api() -> String { "https://api.github.com".into() }

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackOverflowConfig {
    #[serde(default = "default_stackoverflow_api")]
    pub api_base: String,
    #[serde(default)]
    pub key: Option<String>,
}

fn default_stackoverflow_api() -> String { "https://api.stackexchange.com/2.3".into() }

impl Default for StackOverflowConfig {
    fn default() -> Self {
        Self {
            api_base: default_stackoverflow_api(),
            key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.linktracker/linktracker.db".into() }

impl DatabaseConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = LinkTrackerConfig::parse("").unwrap();
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.page_size, 100);
        assert_eq!(config.scheduler.check_concurrency, 1);
        assert_eq!(config.dispatcher.workers, 8);
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = LinkTrackerConfig::parse(
            r#"
            [scheduler]
            page_size = 2
            check_concurrency = 4

            [telegram]
            bot_token = "123:abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.page_size, 2);
        assert_eq!(config.scheduler.check_concurrency, 4);
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = LinkTrackerConfig::default();
        config.dispatcher.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dispatcher.workers"));
    }

    #[test]
    fn test_toml_round_trip_keeps_values() {
        let mut config = LinkTrackerConfig::default();
        config.scheduler.interval_secs = 15;
        let text = config.to_toml().unwrap();
        let parsed = LinkTrackerConfig::parse(&text).unwrap();
        assert_eq!(parsed.scheduler.interval_secs, 15);
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let err = LinkTrackerConfig::parse("scheduler = 3").unwrap_err();
        assert!(matches!(err, LinkTrackerError::Config(_)));
    }
}
