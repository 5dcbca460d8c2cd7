//! Task lifecycle controller and event dispatch.
//!
//! Decodes inbound chat events, drives the task state machine
//! (Proposed → Committed → AttributePicker → Committed → Deleted, plus
//! Cancelled from Proposed), and orchestrates the sprint resolver, store
//! client, caches and renderer into gateway instructions.
//!
//! Every handler is a failure boundary: an error is logged and the
//! user-visible message is left unchanged; nothing ever crashes the
//! dispatch loop. Handlers that read-modify-write a task row take the
//! per-task lock first, so a concurrent change and delete against the
//! same row serialize within this process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::cache::TaskCache;
use crate::config::Config;
use crate::directory::{Identity, UserDirectory};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::gateway::{ChatGateway, EventSource, InboundEvent};
use crate::lock::KeyedLocks;
use crate::protocol::{self, Callback};
use crate::refbook::{Attribute, ReferenceBook};
use crate::render;
use crate::sprint::{self, SprintTarget};
use crate::store::{StoreClient, ROW_FIRST_COLUMN, ROW_LAST_COLUMN};
use crate::task::{self, TaskRow, ALLOCATION_COLUMNS, KEY_COLUMN};

/// Identity rows in the reference partition: A=department, B=phone,
/// C=email, starting under a header row. Column D receives the chat id
/// on successful resolution.
const IDENTITY_RANGE: &str = "A2:C";
const IDENTITY_CHAT_COLUMN: char = 'D';
const IDENTITY_FIRST_ROW: u32 = 2;

pub struct TaskController {
    gateway: Arc<dyn ChatGateway>,
    store: StoreClient,
    cache: TaskCache,
    directory: UserDirectory,
    refbook: ReferenceBook,
    locks: KeyedLocks,
    config: Config,
    events: Option<Mutex<EventSink>>,
}

impl TaskController {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        store: StoreClient,
        directory: UserDirectory,
        refbook: ReferenceBook,
        config: Config,
        events: Option<EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            store,
            cache: TaskCache::new(),
            directory,
            refbook,
            locks: KeyedLocks::new(),
            config,
            events: events.map(Mutex::new),
        })
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn refbook(&self) -> &ReferenceBook {
        &self.refbook
    }

    /// Handle one inbound event to completion. This is the failure
    /// boundary: errors are logged, never propagated.
    pub async fn handle_event(self: Arc<Self>, event: InboundEvent) {
        let handler = match &event {
            InboundEvent::Text { .. } => "message",
            InboundEvent::Command { .. } => "command",
            InboundEvent::Contact { .. } => "contact",
            InboundEvent::Callback { .. } => "callback",
        };
        let result = match event {
            InboundEvent::Text { chat_id, text, .. } => self.on_text(chat_id, text).await,
            InboundEvent::Command { chat_id, command } => self.on_command(chat_id, &command).await,
            InboundEvent::Contact { chat_id, phone } => self.on_contact(chat_id, &phone).await,
            InboundEvent::Callback { callback_id, data } => {
                self.on_callback(&callback_id, &data).await
            }
        };
        if let Err(err) = result {
            error!(handler, error = %err, "handler failed; leaving the chat unchanged");
        }
    }

    /// Re-read the reference lists; called from the periodic refresh task.
    pub async fn refresh_refbook(&self) -> Result<()> {
        self.refbook.reload(&self.store).await?;
        info!(
            generation = self.refbook.current().generation,
            "reference lists reloaded"
        );
        Ok(())
    }

    // =========================================================================
    // Inbound message flows
    // =========================================================================

    /// Free text from a known user becomes a task proposal; the proposed
    /// text is cached under the proposal message's id, which every later
    /// callback carries.
    async fn on_text(&self, chat_id: i64, text: String) -> Result<()> {
        if self.directory.get(chat_id).is_none() {
            self.gateway
                .send_message(chat_id, render::unknown_user_text())
                .await?;
            return Ok(());
        }

        let proposal_id = self
            .gateway
            .send_message(chat_id, &render::proposal_text(&text))
            .await?;
        self.cache.insert(chat_id, proposal_id, text);
        self.gateway
            .edit_message_keyboard(
                chat_id,
                proposal_id,
                &render::proposal_keyboard(chat_id, proposal_id),
            )
            .await?;
        self.emit(EventKind::TaskProposed, chat_id, json!({ "message_id": proposal_id }));
        Ok(())
    }

    async fn on_command(&self, chat_id: i64, command: &str) -> Result<()> {
        match command {
            "start" => self.on_start(chat_id).await,
            other => {
                debug!(command = other, "ignoring unsupported command");
                Ok(())
            }
        }
    }

    async fn on_start(&self, chat_id: i64) -> Result<()> {
        if let Some(identity) = self.directory.get(chat_id) {
            self.gateway
                .send_message(
                    chat_id,
                    &render::greeting(
                        &identity.department,
                        &identity.phone,
                        identity.email.as_deref(),
                    ),
                )
                .await?;
        }
        self.gateway
            .request_contact(chat_id, render::ask_contact_text())
            .await?;
        Ok(())
    }

    /// Contact-share resolution. Store failures degrade to an apologetic
    /// message instead of silence, matching the original bot.
    async fn on_contact(&self, chat_id: i64, phone: &str) -> Result<()> {
        match self.resolve_contact(chat_id, phone).await {
            Ok(Some(identity)) => {
                self.gateway
                    .send_message(
                        chat_id,
                        &render::greeting(
                            &identity.department,
                            &identity.phone,
                            identity.email.as_deref(),
                        ),
                    )
                    .await?;
                self.emit(
                    EventKind::IdentityResolved,
                    chat_id,
                    json!({ "department": identity.department }),
                );
            }
            Ok(None) => {
                self.gateway
                    .send_message(chat_id, render::contact_not_found_text())
                    .await?;
            }
            Err(err) => {
                error!(chat_id, error = %err, "contact resolution failed");
                self.gateway
                    .send_message(chat_id, render::contact_error_text())
                    .await?;
            }
        }
        Ok(())
    }

    async fn resolve_contact(&self, chat_id: i64, phone_raw: &str) -> Result<Option<Identity>> {
        let phone = digits(phone_raw);
        let title = self
            .store
            .resolve_partition_title(self.config.store.reference_gid)
            .await?;
        let rows = self.store.read_range(&title, IDENTITY_RANGE).await?;
        let hit = rows.iter().position(|row| {
            row.get(1)
                .map(|candidate| digits(candidate) == phone)
                .unwrap_or(false)
        });
        let index = match hit {
            Some(index) => index,
            None => return Ok(None),
        };
        let row = &rows[index];
        let identity = Identity {
            department: row.first().cloned().unwrap_or_default(),
            phone,
            email: row
                .get(2)
                .map(|email| email.trim())
                .filter(|email| !email.is_empty())
                .map(String::from),
            chat_id,
        };
        self.store
            .write_cell(
                &title,
                IDENTITY_CHAT_COLUMN,
                index as u32 + IDENTITY_FIRST_ROW,
                &chat_id.to_string(),
            )
            .await?;
        self.directory.insert(identity.clone())?;
        info!(chat_id, department = %identity.department, "identity resolved");
        Ok(Some(identity))
    }

    // =========================================================================
    // Callback flows
    // =========================================================================

    async fn on_callback(&self, callback_id: &str, data: &str) -> Result<()> {
        self.gateway.ack_callback(callback_id).await?;
        let callback = match protocol::decode(data) {
            Ok(callback) => callback,
            Err(Error::UnknownAction(tag)) => {
                debug!(tag = %tag, "ignoring unknown callback action");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        match callback {
            Callback::Create {
                chat_id,
                message_id,
                target,
            } => self.create_task(chat_id, message_id, target).await,
            Callback::Cancel {
                chat_id,
                message_id,
            } => self.cancel_creation(chat_id, message_id).await,
            Callback::ShowPicker {
                chat_id,
                message_id,
                attribute,
                partition_id,
                task_id,
            } => {
                self.show_picker(chat_id, message_id, attribute, partition_id, &task_id)
                    .await
            }
            Callback::ChangeAttribute {
                chat_id,
                message_id,
                attribute,
                partition_id,
                task_id,
                index,
                generation,
            } => {
                self.change_attribute(
                    chat_id,
                    message_id,
                    attribute,
                    partition_id,
                    &task_id,
                    index,
                    generation,
                )
                .await
            }
            Callback::ShowTask {
                chat_id,
                message_id,
                partition_id,
                task_id,
                this_message,
            } => {
                self.show_task(chat_id, message_id, partition_id, &task_id, this_message)
                    .await
            }
            Callback::Delete {
                chat_id,
                message_id,
                partition_id,
                task_id,
            } => {
                self.delete_task(chat_id, message_id, partition_id, &task_id)
                    .await
            }
        }
    }

    /// Commit a proposed task into the chosen sprint partition.
    async fn create_task(
        &self,
        chat_id: i64,
        message_id: i64,
        target: SprintTarget,
    ) -> Result<()> {
        let text = self
            .cache
            .get(chat_id, message_id)
            .ok_or(Error::PendingTaskMissing {
                chat_id,
                message_id,
            })?;
        let identity = self
            .directory
            .get(chat_id)
            .ok_or(Error::UnknownIdentity(chat_id))?;

        let week = target.week(Utc::now().date_naive());
        let partitions = self.store.list_partitions().await?;
        let sprint =
            sprint::find_partition(&partitions, &self.config.sprints.title_marker, week)?.clone();
        let row_index = self
            .store
            .find_first_empty_row(&sprint.title, ALLOCATION_COLUMNS)
            .await?;

        let task_id = task::compose_task_id(Utc::now(), message_id);
        let row = TaskRow {
            task_id: task_id.clone(),
            is_completed: false,
            text: text.clone(),
            responsible: identity.department,
            source: self.config.defaults.source.clone(),
            priority: self.config.defaults.priority.clone(),
            external_link: String::new(),
            comment: String::new(),
            status: self.config.defaults.status.clone(),
        };
        let span = format!("{ROW_FIRST_COLUMN}{row_index}:{ROW_LAST_COLUMN}{row_index}");
        self.store
            .write_range(&sprint.title, &span, vec![row.to_cells()])
            .await?;

        let link = render::task_link(
            &self.config.store.spreadsheet_id,
            sprint.id,
            &sprint.title,
            row_index,
        );
        self.gateway
            .edit_message_text(chat_id, message_id, &render::created_text(&text, &link))
            .await?;
        self.gateway
            .edit_message_keyboard(
                chat_id,
                message_id,
                &render::task_keyboard(chat_id, message_id, sprint.id, &row),
            )
            .await?;

        info!(chat_id, task_id = %task_id, sprint = %sprint.title, row = row_index, "task created");
        self.emit(
            EventKind::TaskCreated,
            chat_id,
            json!({ "task_id": task_id, "sprint": sprint.title, "row": row_index }),
        );
        Ok(())
    }

    /// Show the option grid for one attribute of a committed task.
    async fn show_picker(
        &self,
        chat_id: i64,
        message_id: i64,
        attribute: Attribute,
        partition_id: i64,
        task_id: &str,
    ) -> Result<()> {
        let (title, found) = self.locate_task(partition_id, task_id).await?;
        let current = TaskRow::from_cells(&found.cells);
        let text = self
            .cache
            .get(chat_id, message_id)
            .unwrap_or_else(|| current.text.clone());
        let link = render::task_link(
            &self.config.store.spreadsheet_id,
            partition_id,
            &title,
            found.row,
        );
        self.gateway
            .edit_message_text(chat_id, message_id, &render::picker_text(attribute, &text, &link))
            .await?;

        let lists = self.refbook.current();
        let keyboard = render::picker_keyboard(
            attribute,
            lists.options(attribute),
            lists.generation,
            self.config.ui.buttons_per_row,
            chat_id,
            message_id,
            partition_id,
            task_id,
        );
        self.gateway
            .edit_message_keyboard(chat_id, message_id, &keyboard)
            .await?;
        Ok(())
    }

    /// Resolve the chosen option and write it at the attribute's column
    /// for the suffix-matched row, then redraw the committed view.
    #[allow(clippy::too_many_arguments)]
    async fn change_attribute(
        &self,
        chat_id: i64,
        message_id: i64,
        attribute: Attribute,
        partition_id: i64,
        task_id: &str,
        index: usize,
        generation: u64,
    ) -> Result<()> {
        let _guard = self.locks.lock(task_id).await;

        let lists = self.refbook.current();
        let value = lists.resolve(attribute, index, generation)?.to_string();

        let (title, found) = self.locate_task(partition_id, task_id).await?;
        self.store
            .write_cell(&title, attribute.column(), found.row, &value)
            .await?;

        let mut task = TaskRow::from_cells(&found.cells);
        task.set_attribute(attribute, value.clone());
        self.redraw_task(chat_id, message_id, partition_id, &title, found.row, &task)
            .await?;

        info!(chat_id, task_id, attribute = attribute.name(), value = %value, "attribute changed");
        self.emit(
            EventKind::AttributeChanged,
            chat_id,
            json!({ "task_id": task_id, "attribute": attribute.name(), "value": value }),
        );
        Ok(())
    }

    /// Back-navigation: redraw the committed view, but only when the
    /// token explicitly targets the message it came from.
    async fn show_task(
        &self,
        chat_id: i64,
        message_id: i64,
        partition_id: i64,
        task_id: &str,
        this_message: bool,
    ) -> Result<()> {
        if !this_message {
            debug!(task_id, "showTask without thisMsg marker; nothing to redraw");
            return Ok(());
        }
        let (title, found) = self.locate_task(partition_id, task_id).await?;
        let task = TaskRow::from_cells(&found.cells);
        self.redraw_task(chat_id, message_id, partition_id, &title, found.row, &task)
            .await
    }

    /// Delete the suffix-matched row, the chat message, and confirm with
    /// the pre-delete snapshot.
    async fn delete_task(
        &self,
        chat_id: i64,
        message_id: i64,
        partition_id: i64,
        task_id: &str,
    ) -> Result<()> {
        let _guard = self.locks.lock(task_id).await;

        let deleted = self
            .store
            .delete_row_by_suffix(partition_id, KEY_COLUMN, task_id)
            .await?
            .ok_or_else(|| Error::RowNotFound {
                partition: format!("gid {partition_id}"),
                suffix: task_id.to_string(),
            })?;

        self.gateway.delete_message(chat_id, message_id).await?;
        let snapshot = TaskRow::from_cells(&deleted.cells);
        self.gateway
            .send_message(
                chat_id,
                &render::deleted_text(&snapshot, &deleted.partition_title),
            )
            .await?;

        info!(chat_id, task_id, partition = %deleted.partition_title, "task deleted");
        self.emit(
            EventKind::TaskDeleted,
            chat_id,
            json!({ "task_id": task_id, "partition": deleted.partition_title }),
        );
        Ok(())
    }

    /// Abort a proposal: drop the chat message, no store mutation.
    async fn cancel_creation(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.gateway.delete_message(chat_id, message_id).await?;
        self.cache.remove(chat_id, message_id);
        self.emit(EventKind::CreationCancelled, chat_id, json!({ "message_id": message_id }));
        Ok(())
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    /// Re-resolve the partition title and the task's current row.
    async fn locate_task(
        &self,
        partition_id: i64,
        task_id: &str,
    ) -> Result<(String, crate::store::FoundRow)> {
        let title = self.store.resolve_partition_title(partition_id).await?;
        let found = self
            .store
            .find_row_by_suffix(&title, KEY_COLUMN, task_id)
            .await?
            .ok_or_else(|| Error::RowNotFound {
                partition: title.clone(),
                suffix: task_id.to_string(),
            })?;
        Ok((title, found))
    }

    /// Redraw the committed-task view and its attribute keyboard.
    async fn redraw_task(
        &self,
        chat_id: i64,
        message_id: i64,
        partition_id: i64,
        partition_title: &str,
        row: u32,
        task: &TaskRow,
    ) -> Result<()> {
        let text = self
            .cache
            .get(chat_id, message_id)
            .unwrap_or_else(|| task.text.clone());
        let link = render::task_link(
            &self.config.store.spreadsheet_id,
            partition_id,
            partition_title,
            row,
        );
        self.gateway
            .edit_message_text(chat_id, message_id, &render::task_view_text(&text, &link))
            .await?;
        self.gateway
            .edit_message_keyboard(
                chat_id,
                message_id,
                &render::task_keyboard(chat_id, message_id, partition_id, task),
            )
            .await?;
        Ok(())
    }

    fn emit(&self, kind: EventKind, chat_id: i64, data: serde_json::Value) {
        let Some(sink) = &self.events else {
            return;
        };
        let event = match Event::new(kind, Some(chat_id)).with_data(data) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "failed to build event payload");
                return;
            }
        };
        if let Err(err) = sink.lock().expect("event sink poisoned").emit(&event) {
            warn!(error = %err, "failed to emit event");
        }
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Poll the event source forever, spawning one task per inbound event.
///
/// A poll failure logs and backs off briefly; it never terminates the
/// loop.
pub async fn run(controller: Arc<TaskController>, source: Arc<dyn EventSource>) {
    info!("dispatch loop started");
    loop {
        match source.next_events().await {
            Ok(events) => {
                for event in events {
                    let controller = Arc::clone(&controller);
                    tokio::spawn(controller.handle_event(event));
                }
            }
            Err(err) => {
                error!(error = %err, "failed to poll inbound events");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Periodically reload the reference lists; disabled when the interval
/// is zero.
pub async fn run_refbook_refresh(controller: Arc<TaskController>, interval_minutes: u64) {
    if interval_minutes == 0 {
        return;
    }
    let interval = Duration::from_secs(interval_minutes * 60);
    loop {
        tokio::time::sleep(interval).await;
        if let Err(err) = controller.refresh_refbook().await {
            warn!(error = %err, "reference list refresh failed");
        }
    }
}
