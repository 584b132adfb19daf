//! Asynchronous row writer.
//!
//! Order rows and message archival go through a bounded queue drained by a
//! single task, so the dispatch path and the intake callback never block on
//! persistence. When the queue is full the write is dropped and logged;
//! trading state on the exchange is unaffected.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::models::{NewMessage, NewOrder};
use super::repository::Repository;

#[derive(Debug)]
pub enum WriteCommand {
    Order(NewOrder),
    OrderStatus {
        exchange_order_id: i64,
        status: String,
        executed_qty: f64,
    },
    Message(NewMessage),
}

#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    /// Enqueue without blocking; drops on overflow.
    pub fn enqueue(&self, cmd: WriteCommand) {
        if let Err(e) = self.tx.try_send(cmd) {
            warn!("row writer queue rejected write: {e}");
        }
    }
}

/// Spawn the single writer task. Dropping every [`WriterHandle`] closes the
/// queue; the task drains in-flight writes and exits.
pub fn spawn(repo: Repository, capacity: usize) -> (WriterHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let result = match cmd {
                WriteCommand::Order(order) => repo.insert_order(order).await,
                WriteCommand::OrderStatus {
                    exchange_order_id,
                    status,
                    executed_qty,
                } => {
                    repo.update_order_status(exchange_order_id, &status, executed_qty)
                        .await
                }
                WriteCommand::Message(msg) => repo.archive_message(msg).await,
            };
            if let Err(e) = result {
                error!("async row write failed: {e}");
            }
        }
    });
    (WriterHandle { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::models::{AccountDraft, NewPosition};
    use crate::persistence::test_pool;

    #[tokio::test]
    async fn drains_queued_order_rows() {
        let repo = Repository::new(test_pool().await);
        let account = repo
            .create_account(AccountDraft {
                name: "main".into(),
                api_key: "k".into(),
                api_secret: "s".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let position = repo
            .create_position(NewPosition {
                signal_id: None,
                account_id: account.id,
                symbol: "BTCUSDT".into(),
                entry_price: 50_000.0,
                quantity: 0.002,
                leverage: 10,
                take_profit_price: 50_100.0,
                stop_loss_price: 49_950.0,
            })
            .await
            .unwrap();

        let (handle, task) = spawn(repo.clone(), 16);
        handle.enqueue(WriteCommand::Order(NewOrder {
            position_id: position.id,
            exchange_order_id: 1001,
            symbol: "BTCUSDT".into(),
            side: "BUY".into(),
            order_type: "MARKET".into(),
            orig_qty: 0.002,
            executed_qty: 0.002,
            price: 50_000.0,
            stop_price: None,
            status: "FILLED".into(),
            time_in_force: "GTC".into(),
            purpose: "entry".into(),
        }));
        drop(handle);
        task.await.unwrap();

        let orders = repo.orders_by_position(position.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].exchange_order_id, 1001);
    }
}
