use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use teloxide::prelude::*;

use safeguard::admin::update as batch;
use safeguard::cli::{Cli, Commands};
use safeguard::core::{config, logging};
use safeguard::session;
use safeguard::storage::db::{self, create_pool};
use safeguard::telegram::bot::{create_bot, setup_bot_commands};
use safeguard::telegram::{schema, HandlerDeps};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Catch panics from the dispatcher so they are logged instead of
    // silently killing a worker.
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!(
                "Panic at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
    }));

    let _ = dotenv();
    logging::init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Run) | None => {
            log::info!("Running bot in normal mode");
            run_bot().await
        }
        Some(Commands::RunStaging) => {
            log::info!("Running bot in staging mode");
            if let Err(e) = dotenvy::from_filename(".env.staging") {
                log::warn!("Failed to load .env.staging: {}", e);
            }
            run_bot().await
        }
        Some(Commands::UpdateStatuses {
            upvotes,
            downvotes,
            days,
        }) => run_status_update(upvotes, downvotes, days).await,
    }
}

async fn run_bot() -> Result<()> {
    let bot = create_bot()?;
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    let deps = HandlerDeps::new(Arc::clone(&db_pool));

    session::spawn_sweep_task(Arc::clone(&deps.vouch_sessions), bot.clone());
    session::spawn_sweep_task(Arc::clone(&deps.veto_sessions), bot.clone());
    batch::spawn_worker(Arc::clone(&deps.update_queue), bot.clone(), db_pool);

    log::info!("Bot started");
    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn run_status_update(
    upvotes: Option<i64>,
    downvotes: Option<i64>,
    days: i64,
) -> Result<()> {
    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    let conn = db::get_connection(&db_pool)?;

    let mut thresholds = db::current_thresholds(&conn)?;
    if let Some(up) = upvotes {
        thresholds.required_upvotes = up;
    }
    if let Some(down) = downvotes {
        thresholds.required_downvotes = down;
    }
    if upvotes.is_some() || downvotes.is_some() {
        db::create_settings(&conn, &thresholds)?;
    }

    let report = batch::refresh_statuses(&conn, &thresholds, days)?;
    log::info!(
        "Status refresh done: {} of {} records changed",
        report.changes.len(),
        report.scanned
    );
    for change in &report.changes {
        log::info!("  {:?} {}", change.kind, change.subject);
    }
    Ok(())
}
