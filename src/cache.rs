//! Pending-task cache.
//!
//! When a known user sends free text, the bot replies with a proposal
//! message and remembers the text under (chat id, proposal message id)
//! until a createTask callback commits it to the store. Entries live in
//! process memory only: a restart between proposal and commit loses the
//! text and the create action fails with a logged error.
//!
//! The map is guarded by a plain mutex; the lock is held only for the
//! map operation itself, never across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct TaskCache {
    inner: Mutex<HashMap<(i64, i64), String>>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the proposed text for a (chat, message) pair.
    pub fn insert(&self, chat_id: i64, message_id: i64, text: impl Into<String>) {
        self.inner
            .lock()
            .expect("task cache lock poisoned")
            .insert((chat_id, message_id), text.into());
    }

    /// Read the proposed text. Reading does not consume the entry: the
    /// committed task's render paths re-read it after creation.
    pub fn get(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.inner
            .lock()
            .expect("task cache lock poisoned")
            .get(&(chat_id, message_id))
            .cloned()
    }

    /// Drop an entry, returning the text it held.
    pub fn remove(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.inner
            .lock()
            .expect("task cache lock poisoned")
            .remove(&(chat_id, message_id))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("task cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
