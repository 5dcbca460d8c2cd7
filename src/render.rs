//! Outbound message texts and keyboard layouts.
//!
//! All user-visible strings live here, in the wording of the original
//! bot (HTML parse mode). The controller decides *when* to speak; this
//! module decides *what* the message and its keyboard look like.

use crate::gateway::{InlineButton, InlineKeyboard};
use crate::protocol;
use crate::refbook::Attribute;
use crate::sprint::SprintTarget;
use crate::task::TaskRow;

/// Text of the proposal message echoed back when a known user sends a
/// task candidate.
pub fn proposal_text(task_text: &str) -> String {
    format!("🧐 Постановка задачи:\n{task_text}")
}

/// Keyboard attached to a proposal: target-sprint choice plus cancel.
pub fn proposal_keyboard(chat_id: i64, message_id: i64) -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![
            InlineButton::new(
                "🎯 В этот спринт",
                protocol::encode_create(chat_id, message_id, SprintTarget::Current),
            ),
            InlineButton::new(
                "↩️ В следующий спринт",
                protocol::encode_create(chat_id, message_id, SprintTarget::Next),
            ),
        ])
        .row(vec![InlineButton::new(
            "✖️ Отмена",
            protocol::encode_cancel(chat_id, message_id),
        )])
}

/// HTML link to a task's current row in the spreadsheet.
pub fn task_link(spreadsheet_id: &str, partition_id: i64, partition_title: &str, row: u32) -> String {
    format!(
        "<a href=\"https://docs.google.com/spreadsheets/d/{spreadsheet_id}/edit#gid={partition_id}&range=B{row}\">{partition_title}, строка {row}</a>"
    )
}

fn keyboard_hint() -> &'static str {
    "<i>Используйте клавиатуру, чтобы изменить:\nИсполнителя / Источник,\nСрочность / Статус задачи</i>"
}

/// Confirmation shown in place of the proposal once the row is written.
pub fn created_text(task_text: &str, link: &str) -> String {
    format!("✅ Задача поставлена:\n\n<b>{task_text}</b>\n\n{link}\n\n{}", keyboard_hint())
}

/// Committed-task view used by showTask and after an attribute change.
pub fn task_view_text(task_text: &str, link: &str) -> String {
    format!("👀 Задача:\n\n<b>{task_text}</b>\n\n{link}\n\n{}", keyboard_hint())
}

/// The 2×2 attribute keyboard plus the delete row, shown under a
/// committed task. Button captions mirror the task's current values.
pub fn task_keyboard(
    chat_id: i64,
    message_id: i64,
    partition_id: i64,
    task: &TaskRow,
) -> InlineKeyboard {
    let task_id = task.task_id.as_str();
    InlineKeyboard::new()
        .row(vec![
            InlineButton::new(
                task.responsible.as_str(),
                protocol::encode_show_picker(
                    Attribute::Responsible,
                    chat_id,
                    message_id,
                    partition_id,
                    task_id,
                ),
            ),
            InlineButton::new(
                task.source.as_str(),
                protocol::encode_show_picker(
                    Attribute::Source,
                    chat_id,
                    message_id,
                    partition_id,
                    task_id,
                ),
            ),
        ])
        .row(vec![
            InlineButton::new(
                task.priority.as_str(),
                protocol::encode_show_picker(
                    Attribute::Priority,
                    chat_id,
                    message_id,
                    partition_id,
                    task_id,
                ),
            ),
            InlineButton::new(
                task.status.as_str(),
                protocol::encode_show_picker(
                    Attribute::Status,
                    chat_id,
                    message_id,
                    partition_id,
                    task_id,
                ),
            ),
        ])
        .row(vec![InlineButton::new(
            "❌ Удалить задачу",
            protocol::encode_delete(chat_id, message_id, partition_id, task_id),
        )])
}

/// Prompt shown while an attribute picker is open.
pub fn picker_text(attribute: Attribute, task_text: &str, link: &str) -> String {
    format!(
        "✍️ Выбор нового {} задачи:\n\n<b>{task_text}</b>\n\n{link}\n\n<i>Используйте клавиатуру, чтобы изменить:\n{}</i>",
        attribute.label(),
        attribute.label()
    )
}

/// Option grid for an attribute: `buttons_per_row` options per row,
/// index-keyed callback tokens, and a Back row navigating to this
/// message's committed view.
pub fn picker_keyboard(
    attribute: Attribute,
    options: &[String],
    generation: u64,
    buttons_per_row: usize,
    chat_id: i64,
    message_id: i64,
    partition_id: i64,
    task_id: &str,
) -> InlineKeyboard {
    let mut keyboard = InlineKeyboard::new();
    for (row_start, chunk) in options.chunks(buttons_per_row.max(1)).enumerate() {
        let row = chunk
            .iter()
            .enumerate()
            .map(|(offset, option)| {
                let index = row_start * buttons_per_row.max(1) + offset;
                InlineButton::new(
                    option.as_str(),
                    protocol::encode_change(
                        attribute,
                        chat_id,
                        message_id,
                        partition_id,
                        task_id,
                        index,
                        generation,
                    ),
                )
            })
            .collect();
        keyboard = keyboard.row(row);
    }
    keyboard.row(vec![InlineButton::new(
        "Назад",
        protocol::encode_show_task(chat_id, message_id, partition_id, task_id, true),
    )])
}

/// Standalone confirmation sent after a row is deleted, echoing the
/// pre-delete snapshot.
pub fn deleted_text(task: &TaskRow, partition_title: &str) -> String {
    format!(
        "❌ Задача удалена:\n\n<b>{}</b>\n\nОтветственный: {}\nИсточник: {}\nПриоритет: {}\nКомментарий: {}\nСтатус: {}\n\n{partition_title}",
        task.text, task.responsible, task.source, task.priority, task.comment, task.status
    )
}

/// Greeting for a user whose identity is on record.
pub fn greeting(department: &str, phone: &str, email: Option<&str>) -> String {
    format!(
        "👋 Привет!\n\nТы из подразделения: <b>{department}</b>\n📞 Номер: <b>{phone}</b>\n📧 Email: <b>{}</b>\n\nЧтобы поставить задачу просто напиши её боту",
        email.unwrap_or("не указан")
    )
}

pub fn ask_contact_text() -> &'static str {
    "Чтобы актуализировать данные из гугл-таблицы нажмите 📞 в клавиатуре бота"
}

pub fn unknown_user_text() -> &'static str {
    "Пожалуйста, поделись своим номером через /start"
}

pub fn contact_not_found_text() -> &'static str {
    "😕 Не удалось найти тебя в списке. Обратись к администратору таблицы"
}

pub fn contact_error_text() -> &'static str {
    "🚨 Произошла ошибка при проверке номера. Попробуй позже."
}
