use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use sprintbot::config::Config;
use sprintbot::controller::TaskController;
use sprintbot::directory::{Identity, UserDirectory};
use sprintbot::error::{Error, Result};
use sprintbot::gateway::{ChatGateway, InboundEvent, InlineKeyboard};
use sprintbot::refbook::ReferenceBook;
use sprintbot::store::{Partition, RetryPolicy, SheetApi, StoreClient};

pub const REFERENCE_GID: i64 = 0;

/// In-memory spreadsheet: one growable grid per partition, addressed by
/// the same A1 ranges the production client sends.
#[derive(Default)]
pub struct FakeSheet {
    sheets: Mutex<BTreeMap<i64, Sheet>>,
}

struct Sheet {
    title: String,
    rows: Vec<Vec<String>>,
}

fn col_index(col: char) -> usize {
    col as usize - 'A' as usize
}

/// Parse one endpoint of an A1 range ("C", "A2", "D7") into a
/// 0-based column and an optional 1-based row.
fn parse_ref(part: &str) -> (usize, Option<usize>) {
    let digits_at = part
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(part.len());
    let col = part[..digits_at]
        .chars()
        .next()
        .map(col_index)
        .unwrap_or(0);
    let row = part[digits_at..].parse().ok();
    (col, row)
}

fn parse_range(range: &str) -> ((usize, Option<usize>), (usize, Option<usize>)) {
    match range.split_once(':') {
        Some((start, end)) => (parse_ref(start), parse_ref(end)),
        None => {
            let single = parse_ref(range);
            (single, single)
        }
    }
}

impl FakeSheet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_partition(&self, id: i64, title: &str) {
        self.sheets.lock().unwrap().insert(
            id,
            Sheet {
                title: title.to_string(),
                rows: Vec::new(),
            },
        );
    }

    /// Overwrite one 1-based row of a partition.
    pub fn seed_row(&self, id: i64, row: usize, cells: &[&str]) {
        let mut sheets = self.sheets.lock().unwrap();
        let sheet = sheets.get_mut(&id).expect("unknown partition");
        if sheet.rows.len() < row {
            sheet.rows.resize_with(row, Vec::new);
        }
        sheet.rows[row - 1] = cells.iter().map(|cell| cell.to_string()).collect();
    }

    pub fn row_count(&self, id: i64) -> usize {
        self.sheets.lock().unwrap()[&id].rows.len()
    }

    pub fn cell(&self, id: i64, col: char, row: usize) -> String {
        self.sheets.lock().unwrap()[&id]
            .rows
            .get(row - 1)
            .and_then(|cells| cells.get(col_index(col)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn column(&self, id: i64, col: char) -> Vec<String> {
        let sheets = self.sheets.lock().unwrap();
        sheets[&id]
            .rows
            .iter()
            .map(|cells| cells.get(col_index(col)).cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl SheetApi for FakeSheet {
    async fn list_partitions(&self) -> Result<Vec<Partition>> {
        Ok(self
            .sheets
            .lock()
            .unwrap()
            .iter()
            .map(|(id, sheet)| Partition {
                id: *id,
                title: sheet.title.clone(),
            })
            .collect())
    }

    async fn read_range(&self, partition_title: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let sheets = self.sheets.lock().unwrap();
        let sheet = sheets
            .values()
            .find(|sheet| sheet.title == partition_title)
            .ok_or_else(|| Error::StorePermanent(format!("unknown sheet {partition_title}")))?;

        let ((start_col, start_row), (end_col, end_row)) = parse_range(range);
        let start_row = start_row.unwrap_or(1);
        let end_row = end_row.unwrap_or(sheet.rows.len()).min(sheet.rows.len());

        let mut result: Vec<Vec<String>> = Vec::new();
        for row in start_row..=end_row.max(start_row) {
            let Some(cells) = sheet.rows.get(row - 1) else {
                break;
            };
            let mut out = Vec::new();
            for col in start_col..=end_col {
                out.push(cells.get(col).cloned().unwrap_or_default());
            }
            // The real API omits trailing empty cells...
            while out.last().map(|cell| cell.is_empty()).unwrap_or(false) {
                out.pop();
            }
            result.push(out);
        }
        // ...and trailing all-empty rows.
        while result.last().map(|row| row.is_empty()).unwrap_or(false) {
            result.pop();
        }
        Ok(result)
    }

    async fn write_range(
        &self,
        partition_title: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let mut sheets = self.sheets.lock().unwrap();
        let sheet = sheets
            .values_mut()
            .find(|sheet| sheet.title == partition_title)
            .ok_or_else(|| Error::StorePermanent(format!("unknown sheet {partition_title}")))?;

        let ((start_col, start_row), _) = parse_range(range);
        let start_row = start_row.unwrap_or(1);
        for (offset, values) in rows.into_iter().enumerate() {
            let row = start_row - 1 + offset;
            if sheet.rows.len() <= row {
                sheet.rows.resize_with(row + 1, Vec::new);
            }
            let cells = &mut sheet.rows[row];
            for (col_offset, value) in values.into_iter().enumerate() {
                let col = start_col + col_offset;
                if cells.len() <= col {
                    cells.resize_with(col + 1, String::new);
                }
                cells[col] = value;
            }
        }
        Ok(())
    }

    async fn delete_row(&self, partition_id: i64, row: u32) -> Result<()> {
        let mut sheets = self.sheets.lock().unwrap();
        let sheet = sheets
            .get_mut(&partition_id)
            .ok_or_else(|| Error::StorePermanent(format!("unknown gid {partition_id}")))?;
        let index = row as usize - 1;
        if index < sheet.rows.len() {
            sheet.rows.remove(index);
        }
        Ok(())
    }
}

/// Gateway fake that records every outbound call and hands out message
/// ids for sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Send {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    EditText {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    EditKeyboard {
        chat_id: i64,
        message_id: i64,
        keyboard: InlineKeyboard,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    RequestContact {
        chat_id: i64,
        text: String,
    },
    Ack {
        callback_id: String,
    },
}

pub struct RecordingGateway {
    next_message_id: AtomicI64,
    calls: Mutex<Vec<GatewayCall>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_message_id: AtomicI64::new(1000),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_sent_text(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|call| match call {
            GatewayCall::Send { text, .. } => Some(text),
            _ => None,
        })
    }

    pub fn last_edit_text(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|call| match call {
            GatewayCall::EditText { text, .. } => Some(text),
            _ => None,
        })
    }

    pub fn last_keyboard(&self) -> Option<InlineKeyboard> {
        self.calls().into_iter().rev().find_map(|call| match call {
            GatewayCall::EditKeyboard { keyboard, .. } => Some(keyboard),
            _ => None,
        })
    }

    pub fn deleted_messages(&self) -> Vec<(i64, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Delete {
                    chat_id,
                    message_id,
                } => Some((chat_id, message_id)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.record(GatewayCall::Send {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(message_id)
    }

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.record(GatewayCall::EditText {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_message_keyboard(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: &InlineKeyboard,
    ) -> Result<()> {
        self.record(GatewayCall::EditKeyboard {
            chat_id,
            message_id,
            keyboard: keyboard.clone(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.record(GatewayCall::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn request_contact(&self, chat_id: i64, text: &str) -> Result<()> {
        self.record(GatewayCall::RequestContact {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str) -> Result<()> {
        self.record(GatewayCall::Ack {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

/// A bot wired to the fakes, with the reference sheet pre-seeded.
pub struct TestBot {
    pub controller: Arc<TaskController>,
    pub gateway: Arc<RecordingGateway>,
    pub sheet: Arc<FakeSheet>,
    pub users_file: std::path::PathBuf,
    _tmp: TempDir,
}

/// Reference sheet layout: identities in A..C (header row first),
/// chat-id write-back in D, option lists in F..I.
pub fn seed_reference(sheet: &FakeSheet) {
    sheet.add_partition(REFERENCE_GID, "справочник");
    sheet.seed_row(
        REFERENCE_GID,
        1,
        &["Подразделение", "Телефон", "Email", "chatId"],
    );
    sheet.seed_row(
        REFERENCE_GID,
        2,
        &[
            "ИТ🤖",
            "+7 (978) 566-71-99",
            "dev@example.com",
            "",
            "",
            "ИТ🤖",
            "Вне плана",
            "⏳",
            "Требует внимания ⚠️",
        ],
    );
    sheet.seed_row(
        REFERENCE_GID,
        3,
        &[
            "Маркетинг",
            "79780000001",
            "",
            "",
            "",
            "Маркетинг",
            "Спринт",
            "🔥",
            "В работе",
        ],
    );
    sheet.seed_row(
        REFERENCE_GID,
        4,
        &["", "", "", "", "", "Офис", "", "", "Готово"],
    );
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.spreadsheet_id = "SHEET".to_string();
    config.store.reference_gid = REFERENCE_GID;
    config.retry.base_delay_ms = 0;
    config.retry.max_attempts = 3;
    config
}

pub async fn bot() -> TestBot {
    bot_with(FakeSheet::new(), test_config()).await
}

pub async fn bot_with(sheet: Arc<FakeSheet>, config: Config) -> TestBot {
    if sheet.list_partitions().await.unwrap().is_empty() {
        seed_reference(&sheet);
    }
    let tmp = TempDir::new().expect("tempdir");
    let users_file = tmp.path().join("users.json");

    let store = StoreClient::new(
        sheet.clone() as Arc<dyn SheetApi>,
        RetryPolicy::from(config.retry),
    );
    let refbook = ReferenceBook::load(&store, config.store.reference_gid)
        .await
        .expect("load refbook");
    let directory = UserDirectory::load(&users_file).expect("load directory");
    let gateway = RecordingGateway::new();

    let controller = TaskController::new(gateway.clone(), store, directory, refbook, config, None);

    TestBot {
        controller,
        gateway,
        sheet,
        users_file,
        _tmp: tmp,
    }
}

impl TestBot {
    /// Register a known identity for a chat.
    pub fn known_user(&self, chat_id: i64, department: &str) {
        self.controller
            .directory()
            .insert(Identity {
                department: department.to_string(),
                phone: "79785667199".to_string(),
                email: Some("dev@example.com".to_string()),
                chat_id,
            })
            .expect("insert identity");
    }

    /// Deliver free text; returns the proposal message id the bot sent.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> i64 {
        self.handle(InboundEvent::Text {
            chat_id,
            message_id: 1,
            text: text.to_string(),
        })
        .await;
        self.gateway
            .calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                GatewayCall::Send { message_id, .. } => Some(message_id),
                _ => None,
            })
            .expect("no proposal message sent")
    }

    pub async fn callback(&self, data: &str) {
        self.handle(InboundEvent::Callback {
            callback_id: "cb".to_string(),
            data: data.to_string(),
        })
        .await;
    }

    pub async fn handle(&self, event: InboundEvent) {
        Arc::clone(&self.controller).handle_event(event).await;
    }
}
