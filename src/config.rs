//! Configuration loading and management
//!
//! Handles parsing of `sprintbot.toml` configuration files plus the
//! environment overrides used in deployment (`TELEGRAM_TOKEN`,
//! `SPREADSHEET_ID`, `REFERENCE_BOOK_GID`, `SHEETS_TOKEN`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Telegram transport configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// External store (spreadsheet) configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Retry policy for transient store errors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Sprint partition naming
    #[serde(default)]
    pub sprints: SprintConfig,

    /// Keyboard layout
    #[serde(default)]
    pub ui: UiConfig,

    /// Attribute values written for a freshly created task
    #[serde(default)]
    pub defaults: TaskDefaults,

    /// Path to the persisted user directory (users.json)
    #[serde(default)]
    pub users_file: Option<PathBuf>,

    /// Event destination: "-" for stdout, otherwise a file path
    #[serde(default)]
    pub events: Option<String>,
}

/// Telegram transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token; env `TELEGRAM_TOKEN` overrides
    #[serde(default)]
    pub token: String,

    /// Long-poll timeout for getUpdates, in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// External store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Spreadsheet id; env `SPREADSHEET_ID` overrides
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Partition (sheet gid) holding the reference lists and identities;
    /// env `REFERENCE_BOOK_GID` overrides
    #[serde(default)]
    pub reference_gid: i64,

    /// OAuth bearer token for the Sheets API; env `SHEETS_TOKEN` overrides
    #[serde(default)]
    pub token: String,

    /// How often to re-read the reference lists, in minutes; 0 disables
    /// periodic refresh
    #[serde(default = "default_refbook_refresh_minutes")]
    pub refbook_refresh_minutes: u64,
}

fn default_refbook_refresh_minutes() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            reference_gid: 0,
            token: String::new(),
            refbook_refresh_minutes: default_refbook_refresh_minutes(),
        }
    }
}

/// Retry policy for transient store errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; attempt k waits base * 2^k
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Sprint partition naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintConfig {
    /// Word preceding the week number in partition titles.
    /// A partition matches week N iff its title contains "<marker> <N> ".
    #[serde(default = "default_title_marker")]
    pub title_marker: String,
}

fn default_title_marker() -> String {
    "спринт".to_string()
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            title_marker: default_title_marker(),
        }
    }
}

/// Keyboard layout
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UiConfig {
    /// Buttons per row in attribute option keyboards
    #[serde(default = "default_buttons_per_row")]
    pub buttons_per_row: usize,
}

fn default_buttons_per_row() -> usize {
    4
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            buttons_per_row: default_buttons_per_row(),
        }
    }
}

/// Attribute values written for a freshly created task.
/// The responsible defaults to the author's department at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefaults {
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_priority")]
    pub priority: String,

    #[serde(default = "default_status")]
    pub status: String,
}

fn default_source() -> String {
    "Вне плана".to_string()
}

fn default_priority() -> String {
    "⏳".to_string()
}

fn default_status() -> String {
    "Требует внимания ⚠️".to_string()
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            source: default_source(),
            priority: default_priority(),
            status: default_status(),
        }
    }
}

impl Config {
    /// Load configuration: optional TOML file, then environment overrides.
    ///
    /// A missing file is not an error (defaults apply); a present but
    /// malformed file is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            Some(path) => {
                return Err(Error::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )))
            }
            None => {
                let default_path = Path::new("sprintbot.toml");
                if default_path.exists() {
                    let raw = std::fs::read_to_string(default_path)?;
                    toml::from_str(&raw)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides for the deployment secrets.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            self.telegram.token = token;
        }
        if let Ok(id) = std::env::var("SPREADSHEET_ID") {
            self.store.spreadsheet_id = id;
        }
        if let Ok(gid) = std::env::var("REFERENCE_BOOK_GID") {
            if let Ok(gid) = gid.trim().parse() {
                self.store.reference_gid = gid;
            }
        }
        if let Ok(token) = std::env::var("SHEETS_TOKEN") {
            self.store.token = token;
        }
        if let Ok(path) = std::env::var("SPRINTBOT_USERS_FILE") {
            self.users_file = Some(PathBuf::from(path));
        }
        if let Ok(events) = std::env::var("SPRINTBOT_EVENTS") {
            self.events = Some(events);
        }
    }

    /// Validate that the deployment secrets are present.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.is_empty() {
            return Err(Error::MissingConfig("TELEGRAM_TOKEN"));
        }
        if self.store.spreadsheet_id.is_empty() {
            return Err(Error::MissingConfig("SPREADSHEET_ID"));
        }
        if self.store.token.is_empty() {
            return Err(Error::MissingConfig("SHEETS_TOKEN"));
        }
        if self.ui.buttons_per_row == 0 {
            return Err(Error::InvalidConfig(
                "ui.buttons_per_row must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the users-file path: configured, or the platform data dir,
    /// or ./users.json as a last resort.
    pub fn users_file_path(&self) -> PathBuf {
        if let Some(path) = &self.users_file {
            return path.clone();
        }
        if let Some(dirs) = directories::ProjectDirs::from("", "", "sprintbot") {
            return dirs.data_dir().join("users.json");
        }
        PathBuf::from("users.json")
    }
}
