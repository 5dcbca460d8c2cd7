//! Persisted user directory.
//!
//! Maps a chat id to the identity resolved from the reference partition
//! (department, phone, email). Loaded wholesale at startup and written
//! back synchronously on every successful contact resolution, so a
//! restart never forgets a known user. Access gates every free-text
//! message: unknown chat ids are asked to share their contact first.
//!
//! The on-disk format is the original bot's users.json: an object keyed
//! by chat id with `department`/`number`/`email`/`chatId` fields.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

/// One resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub department: String,
    #[serde(rename = "number")]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "chatId")]
    pub chat_id: i64,
}

pub struct UserDirectory {
    path: PathBuf,
    inner: Mutex<HashMap<i64, Identity>>,
}

impl UserDirectory {
    /// Load the directory from disk. A missing file is an empty
    /// directory; a present but unreadable file is an error (an empty
    /// directory would silently lock every known user out).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let by_key: HashMap<String, Identity> = serde_json::from_str(&raw)?;
            by_key
                .into_values()
                .map(|identity| (identity.chat_id, identity))
                .collect()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, chat_id: i64) -> Option<Identity> {
        self.inner
            .lock()
            .expect("user directory lock poisoned")
            .get(&chat_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("user directory lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a resolved identity and persist the whole directory
    /// atomically before returning.
    pub fn insert(&self, identity: Identity) -> Result<()> {
        let serialized = {
            let mut map = self.inner.lock().expect("user directory lock poisoned");
            map.insert(identity.chat_id, identity);
            let by_key: HashMap<String, &Identity> = map
                .iter()
                .map(|(chat_id, identity)| (chat_id.to_string(), identity))
                .collect();
            serde_json::to_vec_pretty(&by_key)?
        };
        lock::write_atomic_locked(&self.path, &serialized, DEFAULT_LOCK_TIMEOUT_MS)
    }
}
