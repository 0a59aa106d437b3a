use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use uidwatch::bot::{CommandDispatcher, TelegramPoller};
use uidwatch::checker::GraphProbe;
use uidwatch::commands::WatchService;
use uidwatch::db::FileStore;
use uidwatch::monitor::{WatchContext, WatchRegistry};
use uidwatch::notifications::TelegramSender;
use uidwatch::server::config::WatcherConfig;
use uidwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "uidwatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("uidwatch version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    // Logging needs the configured directory, so configuration errors go to stderr.
    let config = match WatcherConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting uidwatch, version: {}", VERSION);
    info!(
        data_file = ?config.data_file,
        min_interval_seconds = config.min_interval_seconds,
        default_interval_seconds = config.default_interval_seconds,
        notify_policy = ?config.notify_policy,
        empty_owner_policy = ?config.empty_owner_policy,
        "Configuration loaded."
    );

    let store = Arc::new(FileStore::new(
        config.data_file.clone(),
        config.min_interval_seconds,
    ));
    let probe = Arc::new(GraphProbe::new(
        config.probe_base_url.clone(),
        Duration::from_secs(config.probe_timeout_seconds),
    )?);
    let notifier = Arc::new(TelegramSender::new(
        config.telegram_api_url.clone(),
        config.tg_bot_token.clone(),
    )?);

    let registry = Arc::new(WatchRegistry::new(WatchContext {
        store: store.clone(),
        probe,
        notifier: notifier.clone(),
        notify_policy: config.notify_policy,
        min_interval_seconds: config.min_interval_seconds,
    }));
    let service = Arc::new(WatchService::new(
        store,
        registry.clone(),
        config.min_interval_seconds,
        config.default_interval_seconds,
        config.empty_owner_policy,
    ));

    match registry.restore_on_start().await {
        Ok(count) => info!(count, "Watches restored."),
        Err(e) => {
            error!(error = %e, "Failed to restore watches from store.");
            return Err(e.into());
        }
    }

    let poller = Arc::new(TelegramPoller::new(
        config.telegram_api_url.clone(),
        config.tg_bot_token.clone(),
        config.poll_timeout_seconds,
        Arc::new(CommandDispatcher::new(service)),
        notifier,
    )?);
    let (poller_shutdown_tx, poller_shutdown_rx) = oneshot::channel();
    let poller_handle = tokio::spawn(poller.run(poller_shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let _ = poller_shutdown_tx.send(());
    if let Err(e) = poller_handle.await {
        error!(error = %e, "Telegram poller ended abnormally.");
    }
    registry.shutdown().await;
    info!("uidwatch stopped.");
    Ok(())
}
