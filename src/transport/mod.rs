//! Thin HTTP implementations of the collaborator contracts:
//! the Telegram Bot API chat gateway and the Google Sheets v4 store.
//!
//! Nothing here contains task logic — only request construction,
//! response mapping, and error classification.

pub mod sheets;
pub mod telegram;
