//! Task row model for sprint partitions.
//!
//! One task is one row, columns A..I:
//! `A`=taskId, `B`=isCompleted, `C`=text, `D`=responsible, `E`=source,
//! `F`=priority, `G`=externalLink, `H`=comment, `I`=status.
//!
//! Identity is the taskId in column A; the row index is a transient
//! physical address. The taskId suffix-encodes the originating chat
//! message id, so a task can always be re-located from the message alone.

use chrono::{DateTime, Utc};

use crate::refbook::Attribute;

/// Column scanned for free-row allocation. Task text is the one field
/// every row has, so an empty C cell marks a free row.
pub const ALLOCATION_COLUMNS: &str = "C:C";

/// Key column for suffix lookups.
pub const KEY_COLUMN: char = 'A';

/// One task row, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub task_id: String,
    pub is_completed: bool,
    pub text: String,
    pub responsible: String,
    pub source: String,
    pub priority: String,
    pub external_link: String,
    pub comment: String,
    pub status: String,
}

impl TaskRow {
    /// Cell values in column order A..I, as written to the store.
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.task_id.clone(),
            if self.is_completed { "TRUE" } else { "FALSE" }.to_string(),
            self.text.clone(),
            self.responsible.clone(),
            self.source.clone(),
            self.priority.clone(),
            self.external_link.clone(),
            self.comment.clone(),
            self.status.clone(),
        ]
    }

    pub fn attribute_value(&self, attribute: Attribute) -> &str {
        match attribute {
            Attribute::Responsible => &self.responsible,
            Attribute::Source => &self.source,
            Attribute::Priority => &self.priority,
            Attribute::Status => &self.status,
        }
    }

    pub fn set_attribute(&mut self, attribute: Attribute, value: String) {
        match attribute {
            Attribute::Responsible => self.responsible = value,
            Attribute::Source => self.source = value,
            Attribute::Priority => self.priority = value,
            Attribute::Status => self.status = value,
        }
    }

    /// Rebuild from cell values; short rows (trailing empty cells absent
    /// from the store response) fill with empty strings.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |index: usize| cells.get(index).cloned().unwrap_or_default();
        Self {
            task_id: cell(0),
            is_completed: cell(1).eq_ignore_ascii_case("true"),
            text: cell(2),
            responsible: cell(3),
            source: cell(4),
            priority: cell(5),
            external_link: cell(6),
            comment: cell(7),
            status: cell(8),
        }
    }
}

/// Compose a task id from the creation instant and the originating
/// message id: `"dd.mm HH:MM#<messageId>"`.
///
/// The `#` delimiter keeps the suffix stable: looking up message 222 can
/// never match a task created from message 1222, and the id stays legal
/// inside an `@`-delimited callback token.
pub fn compose_task_id(created_at: DateTime<Utc>, message_id: i64) -> String {
    format!("{}{}", created_at.format("%d.%m %H:%M"), suffix(message_id))
}

/// The correlation suffix for a message id, as matched against column A.
pub fn suffix(message_id: i64) -> String {
    format!("#{message_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row() -> TaskRow {
        TaskRow {
            task_id: "07.08 10:15#222".to_string(),
            is_completed: false,
            text: "Fix login bug".to_string(),
            responsible: "ИТ🤖".to_string(),
            source: "Вне плана".to_string(),
            priority: "⏳".to_string(),
            external_link: String::new(),
            comment: String::new(),
            status: "Требует внимания ⚠️".to_string(),
        }
    }

    #[test]
    fn cells_round_trip() {
        let original = row();
        let rebuilt = TaskRow::from_cells(&original.to_cells());
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn short_row_fills_missing_cells() {
        let cells = vec!["07.08 10:15#222".to_string(), "FALSE".to_string()];
        let task = TaskRow::from_cells(&cells);
        assert_eq!(task.task_id, "07.08 10:15#222");
        assert!(task.status.is_empty());
        assert!(!task.is_completed);
    }

    #[test]
    fn task_id_ends_with_message_suffix() {
        let created = Utc.with_ymd_and_hms(2025, 8, 7, 10, 15, 42).unwrap();
        let id = compose_task_id(created, 222);
        assert_eq!(id, "07.08 10:15#222");
        assert!(id.ends_with(&suffix(222)));
        // A shorter message id never suffix-matches a longer one.
        assert!(!compose_task_id(created, 1222).ends_with(&suffix(222)));
        assert!(!id.contains('@'));
    }
}
