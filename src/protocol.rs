//! Callback-token wire protocol.
//!
//! Every inline button carries an `@`-delimited token:
//!
//! ```text
//! <action>@<chatId>@<messageId>@<param1>@<param2>@<param3>@<param4>
//! ```
//!
//! Fields 1 and 2 are always the conversation and message ids; trailing
//! params are action-specific (two to five fields total after the tag)
//! and may be omitted. Field values never contain `@`.

use crate::error::{Error, Result};
use crate::refbook::Attribute;
use crate::sprint::SprintTarget;

/// Navigation marker telling showTask to redraw the message it came from.
pub const THIS_MESSAGE: &str = "thisMsg";

const TAG_CREATE: &str = "createTask";
const TAG_CANCEL: &str = "cancelCreation";
const TAG_SHOW_TASK: &str = "showTask";
const TAG_DELETE: &str = "deleteTask";

/// A decoded callback instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Create {
        chat_id: i64,
        message_id: i64,
        target: SprintTarget,
    },
    Cancel {
        chat_id: i64,
        message_id: i64,
    },
    ShowPicker {
        chat_id: i64,
        message_id: i64,
        attribute: Attribute,
        partition_id: i64,
        task_id: String,
    },
    ChangeAttribute {
        chat_id: i64,
        message_id: i64,
        attribute: Attribute,
        partition_id: i64,
        task_id: String,
        index: usize,
        generation: u64,
    },
    ShowTask {
        chat_id: i64,
        message_id: i64,
        partition_id: i64,
        task_id: String,
        this_message: bool,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
        partition_id: i64,
        task_id: String,
    },
}

fn show_tag(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::Responsible => "showResp",
        Attribute::Source => "showSrc",
        Attribute::Priority => "showPriority",
        Attribute::Status => "showStatus",
    }
}

fn change_tag(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::Responsible => "changeResp",
        Attribute::Source => "changeSrc",
        Attribute::Priority => "changePriority",
        Attribute::Status => "changeStatus",
    }
}

fn attribute_for_show(tag: &str) -> Option<Attribute> {
    Attribute::ALL.into_iter().find(|a| show_tag(*a) == tag)
}

fn attribute_for_change(tag: &str) -> Option<Attribute> {
    Attribute::ALL.into_iter().find(|a| change_tag(*a) == tag)
}

pub fn encode_create(chat_id: i64, message_id: i64, target: SprintTarget) -> String {
    format!("{TAG_CREATE}@{chat_id}@{message_id}@{}", target.as_param())
}

pub fn encode_cancel(chat_id: i64, message_id: i64) -> String {
    format!("{TAG_CANCEL}@{chat_id}@{message_id}")
}

pub fn encode_show_picker(
    attribute: Attribute,
    chat_id: i64,
    message_id: i64,
    partition_id: i64,
    task_id: &str,
) -> String {
    format!(
        "{}@{chat_id}@{message_id}@{partition_id}@{task_id}",
        show_tag(attribute)
    )
}

pub fn encode_change(
    attribute: Attribute,
    chat_id: i64,
    message_id: i64,
    partition_id: i64,
    task_id: &str,
    index: usize,
    generation: u64,
) -> String {
    format!(
        "{}@{chat_id}@{message_id}@{partition_id}@{task_id}@{index}@{generation}",
        change_tag(attribute)
    )
}

pub fn encode_show_task(
    chat_id: i64,
    message_id: i64,
    partition_id: i64,
    task_id: &str,
    this_message: bool,
) -> String {
    let mut token = format!("{TAG_SHOW_TASK}@{chat_id}@{message_id}@{partition_id}@{task_id}");
    if this_message {
        token.push('@');
        token.push_str(THIS_MESSAGE);
    }
    token
}

pub fn encode_delete(chat_id: i64, message_id: i64, partition_id: i64, task_id: &str) -> String {
    format!("{TAG_DELETE}@{chat_id}@{message_id}@{partition_id}@{task_id}")
}

/// Decode a callback token.
///
/// Trailing params beyond what the action consumes are ignored; missing
/// required params and non-numeric ids are [`Error::MalformedToken`];
/// an unrecognized action tag is [`Error::UnknownAction`] (the dispatcher
/// drops those silently).
pub fn decode(data: &str) -> Result<Callback> {
    let fields: Vec<&str> = data.split('@').collect();
    if fields.len() < 3 {
        return Err(Error::MalformedToken(data.to_string()));
    }
    let tag = fields[0];
    let chat_id = parse_id(data, fields[1])?;
    let message_id = parse_id(data, fields[2])?;
    let params = &fields[3..];

    if tag == TAG_CREATE {
        let target = SprintTarget::parse(required(data, params, 0)?)
            .ok_or_else(|| Error::MalformedToken(data.to_string()))?;
        return Ok(Callback::Create {
            chat_id,
            message_id,
            target,
        });
    }
    if tag == TAG_CANCEL {
        return Ok(Callback::Cancel {
            chat_id,
            message_id,
        });
    }
    if let Some(attribute) = attribute_for_show(tag) {
        return Ok(Callback::ShowPicker {
            chat_id,
            message_id,
            attribute,
            partition_id: parse_id(data, required(data, params, 0)?)?,
            task_id: required(data, params, 1)?.to_string(),
        });
    }
    if let Some(attribute) = attribute_for_change(tag) {
        return Ok(Callback::ChangeAttribute {
            chat_id,
            message_id,
            attribute,
            partition_id: parse_id(data, required(data, params, 0)?)?,
            task_id: required(data, params, 1)?.to_string(),
            index: required(data, params, 2)?
                .parse()
                .map_err(|_| Error::MalformedToken(data.to_string()))?,
            // Keyboards rendered before generations were encoded carry no
            // fifth param; 0 never matches a live snapshot, so such a
            // press degrades to a reported stale-options failure.
            generation: match params.get(3) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| Error::MalformedToken(data.to_string()))?,
                None => 0,
            },
        });
    }
    if tag == TAG_SHOW_TASK {
        return Ok(Callback::ShowTask {
            chat_id,
            message_id,
            partition_id: parse_id(data, required(data, params, 0)?)?,
            task_id: required(data, params, 1)?.to_string(),
            this_message: params.get(2).copied() == Some(THIS_MESSAGE),
        });
    }
    if tag == TAG_DELETE {
        return Ok(Callback::Delete {
            chat_id,
            message_id,
            partition_id: parse_id(data, required(data, params, 0)?)?,
            task_id: required(data, params, 1)?.to_string(),
        });
    }
    Err(Error::UnknownAction(tag.to_string()))
}

fn parse_id(token: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| Error::MalformedToken(token.to_string()))
}

fn required<'a>(token: &str, params: &[&'a str], index: usize) -> Result<&'a str> {
    params
        .get(index)
        .copied()
        .ok_or_else(|| Error::MalformedToken(token.to_string()))
}
