//! sprintbot - Telegram sprint task bot
//!
//! Bootstraps the Sheets store, reference lists and user directory,
//! then long-polls Telegram and dispatches every inbound event.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sprintbot::config::Config;
use sprintbot::controller::{self, TaskController};
use sprintbot::directory::UserDirectory;
use sprintbot::events::EventDestination;
use sprintbot::refbook::ReferenceBook;
use sprintbot::store::StoreClient;
use sprintbot::transport::sheets::SheetsClient;
use sprintbot::transport::telegram::TelegramGateway;

/// sprintbot - sprint task bot
///
/// Persists chat-proposed tasks into the sprint sheets of a shared
/// Google spreadsheet. Deployment secrets come from the environment
/// (TELEGRAM_TOKEN, SPREADSHEET_ID, REFERENCE_BOOK_GID, SHEETS_TOKEN).
#[derive(Parser, Debug)]
#[command(name = "sprintbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (sprintbot.toml next to the
    /// binary is picked up automatically)
    #[arg(long, env = "SPRINTBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the users.json location
    #[arg(long)]
    users_file: Option<PathBuf>,

    /// Emit JSONL events to "-" (stdout) or a file path
    #[arg(long)]
    events: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is configured via RUST_LOG.
    // Keep startup robust in CI/robot envs: ignore invalid/huge filters.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(path) = cli.users_file {
        config.users_file = Some(path);
    }
    if let Some(events) = cli.events {
        config.events = Some(events);
    }
    config.validate().context("validating configuration")?;

    let sheets = Arc::new(SheetsClient::new(
        &config.store.spreadsheet_id,
        &config.store.token,
    ));
    let store = StoreClient::new(sheets, config.retry.into());

    let partitions = store
        .list_partitions()
        .await
        .context("listing spreadsheet partitions")?;
    for partition in &partitions {
        info!(gid = partition.id, title = %partition.title, "partition");
    }

    let refbook = ReferenceBook::load(&store, config.store.reference_gid)
        .await
        .context("loading reference lists")?;
    let lists = refbook.current();
    info!(
        responsibles = lists.responsibles.len(),
        sources = lists.sources.len(),
        priorities = lists.priorities.len(),
        statuses = lists.statuses.len(),
        "reference lists loaded"
    );

    let users_file = config.users_file_path();
    let directory = UserDirectory::load(&users_file)
        .with_context(|| format!("loading user directory from {}", users_file.display()))?;
    info!(users = directory.len(), path = %users_file.display(), "user directory loaded");

    let events = EventDestination::parse(config.events.as_deref())
        .map(|destination| destination.open())
        .transpose()
        .context("opening event sink")?;

    let gateway = Arc::new(TelegramGateway::new(
        &config.telegram.token,
        config.telegram.poll_timeout_secs,
    ));
    let refresh_minutes = config.store.refbook_refresh_minutes;
    let controller = TaskController::new(
        gateway.clone(),
        store,
        directory,
        refbook,
        config,
        events,
    );

    tokio::spawn(controller::run_refbook_refresh(
        Arc::clone(&controller),
        refresh_minutes,
    ));

    info!("sprintbot ready");
    controller::run(controller, gateway).await;
    Ok(())
}
