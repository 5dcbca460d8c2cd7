//! Error types for sprintbot
//!
//! Failure taxonomy:
//! - Lookup failures (partition/row/option/pending text) — surfaced to the
//!   user as a no-op or an apologetic message, never fatal
//! - Protocol decode failures — malformed or unknown callback tokens
//! - Store failures — transient (retried with backoff) vs permanent
//! - Gateway failures — chat transport call failed
//! - Ambient failures — IO, serialization, config, locking

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sprintbot operations
#[derive(Error, Debug)]
pub enum Error {
    // Lookup failures
    #[error("No sprint partition matching \"{0}\"")]
    PartitionNotFound(String),

    #[error("Ambiguous sprint partitions matching \"{needle}\": {titles:?}")]
    AmbiguousPartition { needle: String, titles: Vec<String> },

    #[error("No row in \"{partition}\" with key suffix \"{suffix}\"")]
    RowNotFound { partition: String, suffix: String },

    #[error("No pending task text cached for chat {chat_id}, message {message_id}")]
    PendingTaskMissing { chat_id: i64, message_id: i64 },

    #[error("No identity on record for chat {0}")]
    UnknownIdentity(i64),

    #[error("Option index {index} out of range for {attribute} ({len} options)")]
    OptionOutOfRange {
        attribute: String,
        index: usize,
        len: usize,
    },

    #[error("Reference list for {attribute} changed (keyboard generation {encoded}, active {active})")]
    StaleOptions {
        attribute: String,
        encoded: u64,
        active: u64,
    },

    // Protocol decode failures
    #[error("Malformed callback token: {0}")]
    MalformedToken(String),

    #[error("Unknown callback action: {0}")]
    UnknownAction(String),

    // Store failures
    #[error("Transient store error: {0}")]
    StoreTransient(String),

    #[error("Permanent store error: {0}")]
    StorePermanent(String),

    #[error("Store retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    // Gateway failures
    #[error("Chat gateway error: {0}")]
    Gateway(String),

    // Ambient failures
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    /// Whether the store retry wrapper should retry this error.
    ///
    /// Only rate-limit/unavailability classes qualify; everything else
    /// propagates immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::StoreTransient(_) => true,
            Error::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias for sprintbot operations
pub type Result<T> = std::result::Result<T, Error>;
