//! Position/order tracker.
//!
//! Owns the in-memory maps of the trading pipeline: protective orders
//! pending timeout, recently executed symbols for deduplication and the
//! symbols already force-closed in this process's lifetime. A 10-second
//! sweeper cancels timed-out protective orders and flattens the position; an
//! hourly reaper ages the dedup map; a per-account processor drains the
//! user-data stream.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::events::{Event, EventBus, OrderNotice, PositionFrame, SignalErrorNotice};
use crate::domain::entities::order::{OrderDraft, OrderPurpose, OrderStatus};
use crate::domain::entities::stream::{AccountUpdateEvent, OrderUpdateEvent, StreamEvent};
use crate::domain::errors::TradeError;
use crate::domain::repositories::gateway::FuturesGateway;
use crate::persistence::repository::Repository;
use crate::persistence::writer::{WriteCommand, WriterHandle};

/// Re-signals for a symbol are suppressed within this window.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(48 * 60 * 60);

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const REAP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// One live TP or SL order tracked for timeout. Carries the owning
/// account's gateway so the sweeper cancels and flattens on the right
/// account.
pub struct PendingOrder {
    pub symbol: String,
    pub purpose: OrderPurpose,
    pub quantity: f64,
    pub position_id: i64,
    pub created_at: Instant,
    pub timeout: Duration,
    pub gateway: Arc<dyn FuturesGateway>,
}

pub struct OrderTracker {
    pending: Mutex<HashMap<i64, PendingOrder>>,
    recent: Mutex<HashMap<String, Instant>>,
    closed: Mutex<HashSet<String>>,
    repo: Repository,
    writer: WriterHandle,
    bus: EventBus,
}

impl OrderTracker {
    pub fn new(repo: Repository, writer: WriterHandle, bus: EventBus) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            recent: Mutex::new(HashMap::new()),
            closed: Mutex::new(HashSet::new()),
            repo,
            writer,
            bus,
        }
    }

    // ---- registration ----

    pub fn register(&self, order_id: i64, order: PendingOrder) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(order_id, order);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    // ---- deduplication ----

    pub fn recently_executed(&self, symbol: &str) -> bool {
        self.recent
            .lock()
            .expect("recent lock poisoned")
            .get(symbol)
            .is_some_and(|at| at.elapsed() < DEDUP_WINDOW)
    }

    pub fn mark_executed(&self, symbol: &str) {
        self.recent
            .lock()
            .expect("recent lock poisoned")
            .insert(symbol.to_string(), Instant::now());
    }

    /// Hourly reaper body: evict dedup entries older than the window.
    pub fn evict_stale(&self, now: Instant) {
        let mut recent = self.recent.lock().expect("recent lock poisoned");
        let before = recent.len();
        recent.retain(|_, at| now.saturating_duration_since(*at) < DEDUP_WINDOW);
        let evicted = before - recent.len();
        if evicted > 0 {
            info!(evicted, "evicted stale dedup entries");
        }
    }

    // ---- user-data stream ingest ----

    pub async fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Order(update) => self.handle_order_update(update).await,
            StreamEvent::Account(update) => self.handle_account_update(update),
        }
    }

    async fn handle_order_update(&self, update: OrderUpdateEvent) {
        let removed = if update.status.is_terminal() {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&update.order_id)
        } else {
            None
        };

        self.writer.enqueue(WriteCommand::OrderStatus {
            exchange_order_id: update.order_id,
            status: update.status.to_string(),
            executed_qty: update.filled_qty,
        });

        self.bus.publish(Event::OrderUpdate(OrderNotice {
            exchange_order_id: update.order_id,
            symbol: update.symbol.clone(),
            status: update.status.to_string(),
            purpose: removed.as_ref().map(|p| p.purpose.to_string()),
            executed_qty: update.filled_qty,
            avg_price: update.avg_price,
        }));

        // A filled protective order realizes the exit.
        if let Some(pending) = removed {
            if update.status == OrderStatus::Filled {
                match self.repo.close_position(pending.position_id, update.avg_price).await {
                    Ok(closed) => {
                        info!(
                            position_id = closed.id,
                            symbol = %closed.symbol,
                            exit_price = update.avg_price,
                            pnl = closed.pnl,
                            "position closed"
                        );
                        self.bus
                            .publish(Event::PositionUpdate(PositionFrame::Row(closed)));
                    }
                    Err(e) => error!(
                        position_id = pending.position_id,
                        "failed to close position after fill: {e}"
                    ),
                }
            }
        }
    }

    fn handle_account_update(&self, update: AccountUpdateEvent) {
        for position in update.positions {
            self.bus
                .publish(Event::PositionUpdate(PositionFrame::State(position)));
        }
    }

    // ---- timeout sweeping ----

    /// Sweep pending protective orders whose timeout elapsed: cancel them,
    /// then flatten the position unless this symbol was already force-closed
    /// in this process's lifetime.
    pub async fn sweep_expired(&self, now: Instant) {
        let expired: Vec<(i64, PendingOrder)> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            let ids: Vec<i64> = pending
                .iter()
                .filter(|(_, order)| {
                    now.saturating_duration_since(order.created_at) > order.timeout
                })
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|order| (id, order)))
                .collect()
        };

        for (order_id, order) in expired {
            info!(
                order_id,
                symbol = %order.symbol,
                purpose = %order.purpose,
                timeout_secs = order.timeout.as_secs(),
                "protective order timed out, cancelling"
            );

            match order.gateway.cancel_order(&order.symbol, order_id).await {
                Ok(ack) => self.writer.enqueue(WriteCommand::OrderStatus {
                    exchange_order_id: order_id,
                    status: OrderStatus::Canceled.to_string(),
                    executed_qty: ack.executed_qty,
                }),
                Err(e) => {
                    let err = TradeError::CancelFailed {
                        symbol: order.symbol.clone(),
                        order_id,
                        reason: e.to_string(),
                    };
                    error!("{err}");
                    self.bus.publish(Event::SignalError(SignalErrorNotice {
                        symbol: order.symbol.clone(),
                        error: err.to_string(),
                    }));
                }
            }

            let already_closed = self
                .closed
                .lock()
                .expect("closed lock poisoned")
                .contains(&order.symbol);
            if already_closed {
                continue;
            }

            self.force_close(&order).await;
        }
    }

    async fn force_close(&self, order: &PendingOrder) {
        let draft = OrderDraft::market_close(&order.symbol, order.quantity);
        match order.gateway.place_order(&draft).await {
            Ok(ack) => {
                self.closed
                    .lock()
                    .expect("closed lock poisoned")
                    .insert(order.symbol.clone());
                warn!(
                    symbol = %order.symbol,
                    quantity = order.quantity,
                    "force-closed position after protective order timeout"
                );

                // Market acks may not carry a fill price yet; fall back to
                // the ticker for PnL accounting.
                let exit_price = if ack.avg_price > 0.0 {
                    ack.avg_price
                } else {
                    order
                        .gateway
                        .symbol_price(&order.symbol)
                        .await
                        .unwrap_or(0.0)
                };
                if exit_price > 0.0 {
                    match self.repo.close_position(order.position_id, exit_price).await {
                        Ok(closed) => self
                            .bus
                            .publish(Event::PositionUpdate(PositionFrame::Row(closed))),
                        Err(e) => error!(
                            position_id = order.position_id,
                            "failed to record forced close: {e}"
                        ),
                    }
                }
            }
            Err(e) => {
                let err = TradeError::CloseFailed {
                    symbol: order.symbol.clone(),
                    reason: e.to_string(),
                };
                error!("{err}");
                self.bus.publish(Event::SignalError(SignalErrorNotice {
                    symbol: order.symbol.clone(),
                    error: err.to_string(),
                }));
            }
        }
    }

    // ---- long-lived tasks ----

    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                tracker.sweep_expired(Instant::now()).await;
            }
        })
    }

    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                ticker.tick().await;
                tracker.evict_stale(Instant::now());
            }
        })
    }

    /// One serial processor per account so the WebSocket read loop never
    /// blocks on downstream work.
    pub fn spawn_processor(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<StreamEvent>,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracker.handle_event(event).await;
            }
        })
    }
}
