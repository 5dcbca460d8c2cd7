//! Chat gateway contract.
//!
//! The conversational transport is a collaborator, not part of the core:
//! the controller only needs message send/edit/delete, keyboard
//! replacement, a contact request, and a stream of inbound events.
//! `transport::telegram` implements both traits against the Bot API;
//! tests substitute recording fakes.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// One inline button; `callback_data` carries a protocol token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Inline keyboard as rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// Inbound chat events, already stripped down to what the controller
/// consumes (bot-authored and service messages are filtered out by the
/// transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Free text from a user
    Text {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    /// A slash command, without the leading slash ("start")
    Command { chat_id: i64, command: String },
    /// A shared contact
    Contact { chat_id: i64, phone: String },
    /// An inline-button press
    Callback { callback_id: String, data: String },
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a message; returns the new message's id.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64>;

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;

    async fn edit_message_keyboard(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: &InlineKeyboard,
    ) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    /// Send a message with a one-time reply keyboard requesting the
    /// user's contact.
    async fn request_contact(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Acknowledge a callback so the client stops the button spinner.
    async fn ack_callback(&self, callback_id: &str) -> Result<()>;
}

/// Inbound side of the chat transport.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next batch of inbound events (long poll).
    async fn next_events(&self) -> Result<Vec<InboundEvent>>;
}
