//! Signal intake.
//!
//! Consumes the messaging-network feed, archives every message, extracts
//! signals and routes them through the executor. The intake loop spawns a
//! task per message so the feed is drained promptly; heavy work happens on
//! the executor's own suspension points.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::events::{Event, EventBus, SignalErrorNotice};
use crate::application::executor::{ExecutionOutcome, OrderExecutor};
use crate::application::registry::GatewayRegistry;
use crate::application::settings::{RuntimeSettings, TradingSettings};
use crate::domain::entities::message::InboundMessage;
use crate::domain::errors::TradeError;
use crate::domain::repositories::gateway::FuturesGateway;
use crate::domain::services::extractor::SignalExtractor;
use crate::persistence::models::{NewMessage, Signal, SIGNAL_FAILED, SIGNAL_PROCESSED};
use crate::persistence::repository::Repository;
use crate::persistence::writer::{WriteCommand, WriterHandle};

pub struct TradingEngine {
    repo: Repository,
    settings: Arc<RuntimeSettings>,
    extractor: Arc<SignalExtractor>,
    executor: Arc<OrderExecutor>,
    registry: Arc<GatewayRegistry>,
    writer: WriterHandle,
    bus: EventBus,
}

impl TradingEngine {
    pub fn new(
        repo: Repository,
        settings: Arc<RuntimeSettings>,
        extractor: Arc<SignalExtractor>,
        executor: Arc<OrderExecutor>,
        registry: Arc<GatewayRegistry>,
        writer: WriterHandle,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            settings,
            extractor,
            executor,
            registry,
            writer,
            bus,
        })
    }

    /// Drain the message feed for the lifetime of the process.
    pub fn spawn_intake(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<InboundMessage>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.handle_message(msg).await;
                });
            }
            info!("message feed closed, intake stopped");
        })
    }

    pub async fn handle_message(&self, msg: InboundMessage) {
        // Archival goes through the async writer and never blocks trading.
        self.writer.enqueue(WriteCommand::Message(archive_row(&msg)));

        let settings = self.settings.snapshot();
        if !settings.enabled {
            return;
        }

        let Some(symbol) = self.extractor.parse(&msg.text, &settings.ignored_symbols) else {
            return;
        };
        if !symbol.is_valid() {
            warn!(symbol = %symbol, "extracted symbol has invalid shape, dropping");
            return;
        }

        info!(
            symbol = %symbol,
            channel_id = msg.channel_id,
            message_id = msg.message_id,
            "trading signal detected"
        );

        let signal = match self
            .repo
            .create_signal(msg.message_id, msg.channel_id, symbol.as_str(), &msg.text)
            .await
        {
            Ok(signal) => signal,
            Err(e) => {
                error!("failed to persist signal: {e}");
                return;
            }
        };

        match self.process_signal(&signal, &settings).await {
            Ok(outcome) => {
                if let ExecutionOutcome::Executed { position_id } = outcome {
                    info!(position_id, symbol = %signal.symbol, "signal processed");
                }
                if let Err(e) = self
                    .repo
                    .update_signal_status(signal.id, SIGNAL_PROCESSED, None)
                    .await
                {
                    error!("failed to update signal status: {e}");
                }
            }
            Err(err) => {
                error!(symbol = %signal.symbol, "failed to execute signal: {err}");
                if let Err(e) = self
                    .repo
                    .update_signal_status(signal.id, SIGNAL_FAILED, Some(&err.to_string()))
                    .await
                {
                    error!("failed to update signal status: {e}");
                }
                self.bus.publish(Event::SignalError(SignalErrorNotice {
                    symbol: signal.symbol.clone(),
                    error: err.to_string(),
                }));
            }
        }
    }

    async fn process_signal(
        &self,
        signal: &Signal,
        settings: &TradingSettings,
    ) -> Result<ExecutionOutcome, TradeError> {
        let account = self
            .repo
            .get_default_account()
            .await
            .map_err(|e| TradeError::Store(e.to_string()))?
            .ok_or(TradeError::NoDefaultAccount)?;

        let gateway: Arc<dyn FuturesGateway> = self.registry.gateway_for(&account)?;
        self.executor
            .execute(signal, &account, gateway, settings)
            .await
    }
}

fn archive_row(msg: &InboundMessage) -> NewMessage {
    NewMessage {
        message_id: msg.message_id,
        channel_id: msg.channel_id,
        channel_name: msg.channel_name.clone(),
        sender_id: msg.sender_id,
        sender_name: msg.sender_name.clone(),
        text: msg.text.clone(),
        media_type: msg.media_type.clone(),
        is_forwarded: msg.is_forwarded,
        timestamp: msg.timestamp,
    }
}
