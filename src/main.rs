use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zignal::application::channels::{ChannelControl, ChannelDirectory};
use zignal::application::engine::TradingEngine;
use zignal::application::events::EventBus;
use zignal::application::executor::OrderExecutor;
use zignal::application::registry::GatewayRegistry;
use zignal::application::settings::{RuntimeSettings, TradingSettings};
use zignal::application::tracker::OrderTracker;
use zignal::config::{Config, LoggingConfig};
use zignal::domain::entities::message::InboundMessage;
use zignal::domain::services::extractor::SignalExtractor;
use zignal::infrastructure::binance::user_stream;
use zignal::persistence::{self, repository::Repository, writer};
use zignal::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;
    init_tracing(&config.logging);

    info!(config = %config_path, "starting zignal trading bridge");

    let pool = persistence::init_database(&config.database.dsn).await?;
    let repo = Repository::new(pool);

    // Store rows overlay the file's trading section.
    let boot = TradingSettings::from_config(&config.trading);
    let settings = RuntimeSettings::load(repo.clone(), boot).await?;
    let snapshot = settings.snapshot();

    let extractor = if snapshot.signal_pattern.is_empty() {
        // Trading stays disabled until a pattern is configured.
        Arc::new(SignalExtractor::new(r"$^")?)
    } else {
        Arc::new(SignalExtractor::new(&snapshot.signal_pattern)?)
    };

    let bus = EventBus::new(100);
    let (writer_handle, _writer_task) = writer::spawn(repo.clone(), 1000);

    let tracker = Arc::new(OrderTracker::new(
        repo.clone(),
        writer_handle.clone(),
        bus.clone(),
    ));
    tracker.spawn_sweeper();
    tracker.spawn_reaper();

    let registry = GatewayRegistry::new(&config.binance);
    let executor = Arc::new(OrderExecutor::new(
        tracker.clone(),
        repo.clone(),
        writer_handle.clone(),
        bus.clone(),
    ));
    let engine = TradingEngine::new(
        repo.clone(),
        settings.clone(),
        extractor.clone(),
        executor,
        registry.clone(),
        writer_handle.clone(),
        bus.clone(),
    );

    let channels: Arc<dyn ChannelControl> = Arc::new(ChannelDirectory::new(repo.clone()));
    for identifier in &config.channels {
        if let Err(e) = channels.subscribe(identifier).await {
            error!(%identifier, "failed to register channel: {e}");
        }
    }

    // One user-data reader and keep-alive per active account.
    match repo.list_active_accounts().await {
        Ok(accounts) if accounts.is_empty() => {
            warn!("no active exchange accounts configured; add one via the dashboard")
        }
        Ok(accounts) => {
            for account in accounts {
                match registry.gateway_for(&account) {
                    Ok(client) => {
                        let (tx, rx) = mpsc::channel(256);
                        user_stream::spawn(client, account.id, tx);
                        tracker.spawn_processor(rx);
                        info!(
                            account = %account.name,
                            account_id = account.id,
                            testnet = account.is_testnet,
                            "exchange client ready"
                        );
                    }
                    Err(e) => error!(account_id = account.id, "failed to build exchange client: {e}"),
                }
            }
        }
        Err(e) => error!("failed to load accounts: {e}"),
    }

    // The messaging-network wrapper owns the sending half of the feed.
    let (feed_tx, feed_rx) = mpsc::channel::<InboundMessage>(1024);
    engine.spawn_intake(feed_rx);
    let _feed_tx = feed_tx;

    if config.webapi.enabled {
        let state = AppState {
            repo,
            settings,
            extractor,
            registry,
            channels,
            bus,
        };
        web::serve(state, config.webapi.clone(), shutdown_signal()).await?;
    } else {
        shutdown_signal().await;
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));
    if cfg.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c"),
            Err(e) => error!("failed to install ctrl-c handler: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
