//! Telegram Card Prediction Bot
//!
//! Watches a statistics channel for card results, broadcasts predictions to
//! a display channel and keeps their status glyphs current. Run with a YAML
//! config file; secrets come from the environment (TELEGRAM_BOT_TOKEN,
//! ADMIN_ID).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use card_prediction_bot::app::App;
use card_prediction_bot::config::BotConfig;
use card_prediction_bot::scheduler::Scheduler;
use card_prediction_bot::server::{self, SharedStatus};
use card_prediction_bot::storage::Storage;
use card_prediction_bot::telegram::{self, TelegramClient};

/// Telegram card prediction bot
#[derive(Parser, Debug)]
#[command(name = "prediction-bot")]
#[command(about = "Watch card results and broadcast verified predictions")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config/bot_config.yaml")]
    config: PathBuf,

    /// Regenerate the daily schedule table and exit
    #[arg(long)]
    regenerate_schedule: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = if args.config.exists() {
        BotConfig::load_with_env(&args.config)?
    } else {
        let mut config = BotConfig::default();
        config.apply_env();
        config
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&log_filter))
        .with_target(true)
        .init();

    if !args.config.exists() {
        warn!(path = %args.config.display(), "config file not found, using defaults");
    }

    let storage = Storage::new(&config.storage.data_dir)?;

    if args.regenerate_schedule {
        let mut scheduler = Scheduler::new(Vec::new());
        scheduler.regenerate(&config.schedule);
        storage.save_schedule(scheduler.slots());
        info!(slots = scheduler.slots().len(), "schedule written, exiting");
        return Ok(());
    }

    let token = std::env::var("TELEGRAM_BOT_TOKEN")
        .context("TELEGRAM_BOT_TOKEN not set - required to reach the Bot API")?;
    let client = TelegramClient::new(&token, config.telegram.request_timeout_ms)?;

    match client.get_me().await {
        Ok(me) => info!(
            username = me.username.as_deref().unwrap_or("unknown"),
            "bot connected"
        ),
        Err(e) => warn!(error = %e, "getMe failed, continuing anyway"),
    }
    if config.telegram.admin_id == 0 {
        warn!("ADMIN_ID not set - admin commands disabled");
    }

    let status: SharedStatus = SharedStatus::default();
    let port = config.server.port;
    let server_status = status.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(server_status, port).await {
            error!(error = %e, "monitoring server failed");
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    let shutdown_flag = running.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
        shutdown_flag.store(false, Ordering::SeqCst);
    });

    let (tx, rx) = mpsc::channel(100);
    let poll_timeout = config.telegram.poll_timeout_secs;
    tokio::spawn(telegram::run_update_poller(
        client.clone(),
        tx,
        running.clone(),
        poll_timeout,
    ));

    let app = App::new(config, client, storage, status);
    app.run(rx, running).await;

    info!("bot stopped");
    Ok(())
}
