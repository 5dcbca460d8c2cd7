//! Telegram Bot API transport.
//!
//! One struct serves both directions: [`EventSource`] long-polls
//! `getUpdates` and maps the wire types onto [`InboundEvent`], and
//! [`ChatGateway`] issues the outbound methods the controller needs.
//! Messages authored by bots and updates without usable payloads are
//! dropped here so the controller never sees them.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gateway::{ChatGateway, EventSource, InboundEvent, InlineKeyboard};

pub struct TelegramGateway {
    http: reqwest::Client,
    base_url: String,
    poll_timeout_secs: u64,
    /// Next update id to request; advanced past every update we consume.
    offset: AtomicI64,
}

impl TelegramGateway {
    pub fn new(token: &str, poll_timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
            poll_timeout_secs,
            offset: AtomicI64::new(0),
        }
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{method}", self.base_url);
        let mut request = self.http.post(&url).json(&payload);
        if method == "getUpdates" {
            // The HTTP timeout must outlive the long-poll window.
            request = request.timeout(Duration::from_secs(self.poll_timeout_secs + 10));
        }
        let resp = request.send().await?;
        let body: ApiResponse = resp.json().await?;
        if !body.ok {
            return Err(Error::Gateway(format!(
                "{method}: {}",
                body.description.unwrap_or_else(|| "no description".to_string())
            )));
        }
        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    contact: Option<Contact>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct User {
    #[serde(default)]
    is_bot: bool,
}

#[derive(Deserialize)]
struct Contact {
    phone_number: String,
}

#[derive(Deserialize)]
struct CallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
}

/// Map one update onto the controller's event model; None drops it.
fn classify_update(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let data = query.data?;
        return Some(InboundEvent::Callback {
            callback_id: query.id,
            data,
        });
    }
    let message = update.message?;
    if message.from.as_ref().map(|from| from.is_bot).unwrap_or(false) {
        return None;
    }
    let chat_id = message.chat.id;
    if let Some(contact) = message.contact {
        return Some(InboundEvent::Contact {
            chat_id,
            phone: contact.phone_number,
        });
    }
    let text = message.text?;
    if let Some(command) = text.strip_prefix('/') {
        let command = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string();
        if command.is_empty() {
            return None;
        }
        return Some(InboundEvent::Command { chat_id, command });
    }
    Some(InboundEvent::Text {
        chat_id,
        message_id: message.message_id,
        text,
    })
}

#[async_trait]
impl EventSource for TelegramGateway {
    async fn next_events(&self) -> Result<Vec<InboundEvent>> {
        let offset = self.offset.load(Ordering::SeqCst);
        let result = self
            .call(
                "getUpdates",
                json!({ "offset": offset, "timeout": self.poll_timeout_secs }),
            )
            .await?;
        let updates: Vec<Update> = serde_json::from_value(result)?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            self.offset.fetch_max(update.update_id + 1, Ordering::SeqCst);
            match classify_update(update) {
                Some(event) => events.push(event),
                None => debug!("dropping update without usable payload"),
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let result = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" }),
            )
            .await?;
        result["message_id"]
            .as_i64()
            .ok_or_else(|| Error::Gateway("sendMessage returned no message_id".to_string()))
    }

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.call(
            "editMessageText",
            json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await?;
        Ok(())
    }

    async fn edit_message_keyboard(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: &InlineKeyboard,
    ) -> Result<()> {
        self.call(
            "editMessageReplyMarkup",
            json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "reply_markup": { "inline_keyboard": &keyboard.rows },
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.call(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn request_contact(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "reply_markup": {
                    "one_time_keyboard": true,
                    "keyboard": [[{ "text": "Нажми на меня 📞", "request_contact": true }]],
                },
            }),
        )
        .await?;
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }
}
