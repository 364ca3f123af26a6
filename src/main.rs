mod config;
mod conversation;
mod error;
mod evaluator;
mod model;
mod prices;
mod storage;
#[cfg(test)]
mod testutil;
mod transport;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use conversation::Engine;
use prices::PriceSource;
use prices::coingecko::CoinGeckoSource;
use storage::AlertStore;
use storage::sqlite::SqliteStorage;
use transport::telegram::TelegramTransport;
use transport::{ChatTransport, InboundMessage};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("price source error")]
    Prices,
    #[display("chat transport error")]
    Transport,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "coin-limits-bot", about = "Telegram crypto price-alert bot")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Storage ───────────────────────────────────────────────────────────────
    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/coin-limits.db");
    let store: Arc<dyn AlertStore> = Arc::new(
        SqliteStorage::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    // ── Price source ──────────────────────────────────────────────────────────
    let prices: Arc<dyn PriceSource> =
        Arc::new(CoinGeckoSource::new(&config.prices).change_context(AppError::Prices)?);

    // ── Chat transport ────────────────────────────────────────────────────────
    let token = config
        .telegram
        .resolve_token()
        .change_context(AppError::Config)?;
    let telegram =
        Arc::new(TelegramTransport::new(&token).change_context(AppError::Transport)?);
    let transport: Arc<dyn ChatTransport> = telegram.clone();

    // ── Background tasks ──────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(1024);

    let mut task_handles = Vec::new();

    task_handles.push(tokio::spawn(evaluator::run(
        Arc::clone(&store),
        Arc::clone(&prices),
        Arc::clone(&transport),
        Duration::from_secs(config.evaluator.tick_interval_secs),
        cancel.clone(),
    )));

    {
        let telegram = Arc::clone(&telegram);
        let cancel = cancel.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = telegram.poll_updates(inbound_tx, cancel).await {
                tracing::error!(error = ?e, "telegram update loop failed");
            }
        }));
    }

    let engine = Engine::new(store, prices, transport, config.prices.top_coins);
    task_handles.push(tokio::spawn(engine.run(inbound_rx, cancel.clone())));

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();

    for handle in task_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
