//! End-to-end bracket execution against a mock gateway: dispatch, rollback,
//! deduplication, timeout sweeping and forced closes.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use zignal::application::events::{Event, EventBus};
use zignal::application::executor::{ExecutionOutcome, OrderExecutor};
use zignal::application::settings::TradingSettings;
use zignal::application::tracker::OrderTracker;
use zignal::domain::entities::exchange::{ExchangeInfo, MarginType, SymbolFilter, SymbolInfo};
use zignal::domain::entities::order::{OrderAck, OrderDraft, OrderSide, OrderStatus, OrderType};
use zignal::domain::errors::TradeError;
use zignal::domain::repositories::gateway::{FuturesGateway, GatewayError, GatewayResult};
use zignal::persistence::models::{Account, AccountDraft, Signal};
use zignal::persistence::repository::Repository;
use zignal::persistence::{init_database, writer};

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn test_repo() -> Repository {
    let path = std::env::temp_dir().join(format!(
        "zignal-e2e-{}-{}.db",
        std::process::id(),
        DB_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&path);
    let pool = init_database(&format!("sqlite://{}", path.display()))
        .await
        .expect("test database");
    Repository::new(pool)
}

/// Gateway double for BTCUSDT with the filters from the exchange:
/// stepSize 0.001, tickSize 0.10, minQty 0.001, minNotional 5.
struct MockGateway {
    price: f64,
    fail_entry: AtomicBool,
    fail_take_profit: AtomicBool,
    placed: Mutex<Vec<OrderDraft>>,
    cancelled: Mutex<Vec<i64>>,
    next_order_id: AtomicI64,
}

impl MockGateway {
    fn new(price: f64) -> Arc<Self> {
        Arc::new(Self {
            price,
            fail_entry: AtomicBool::new(false),
            fail_take_profit: AtomicBool::new(false),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            next_order_id: AtomicI64::new(1000),
        })
    }

    fn placed(&self) -> Vec<OrderDraft> {
        self.placed.lock().unwrap().clone()
    }

    fn cancelled(&self) -> Vec<i64> {
        self.cancelled.lock().unwrap().clone()
    }

    fn entries(&self) -> Vec<OrderDraft> {
        self.placed()
            .into_iter()
            .filter(|d| d.order_type == OrderType::Market && !d.reduce_only)
            .collect()
    }

    fn force_closes(&self) -> Vec<OrderDraft> {
        self.placed()
            .into_iter()
            .filter(|d| d.order_type == OrderType::Market && d.reduce_only)
            .collect()
    }

    fn ack_for(&self, draft: &OrderDraft) -> OrderAck {
        let market = draft.order_type == OrderType::Market;
        OrderAck {
            order_id: self.next_order_id.fetch_add(1, Ordering::SeqCst),
            client_order_id: String::new(),
            symbol: draft.symbol.clone(),
            status: if market {
                OrderStatus::Filled
            } else {
                OrderStatus::New
            },
            side: draft.side,
            order_type: draft.order_type.to_string(),
            price: 0.0,
            avg_price: if market { self.price } else { 0.0 },
            orig_qty: draft.quantity,
            executed_qty: if market { draft.quantity } else { 0.0 },
            stop_price: draft.stop_price,
            time_in_force: "GTC".into(),
            reduce_only: draft.reduce_only,
        }
    }
}

#[async_trait]
impl FuturesGateway for MockGateway {
    async fn symbol_price(&self, _symbol: &str) -> GatewayResult<f64> {
        Ok(self.price)
    }

    async fn exchange_info(&self) -> GatewayResult<ExchangeInfo> {
        Ok(ExchangeInfo {
            symbols: vec![SymbolInfo {
                symbol: "BTCUSDT".into(),
                status: "TRADING".into(),
                price_precision: 2,
                quantity_precision: 3,
                filters: vec![
                    SymbolFilter::LotSize {
                        step_size: 0.001,
                        min_qty: 0.001,
                        max_qty: 1000.0,
                    },
                    SymbolFilter::Price {
                        tick_size: 0.10,
                        min_price: 0.10,
                        max_price: 1_000_000.0,
                    },
                    SymbolFilter::MinNotional { notional: 5.0 },
                ],
            }],
        })
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> GatewayResult<()> {
        Ok(())
    }

    async fn set_margin_type(&self, _symbol: &str, _margin: MarginType) -> GatewayResult<()> {
        Ok(())
    }

    async fn place_order(&self, draft: &OrderDraft) -> GatewayResult<OrderAck> {
        self.placed.lock().unwrap().push(draft.clone());

        let entry = draft.order_type == OrderType::Market && !draft.reduce_only;
        if entry && self.fail_entry.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                code: -2019,
                msg: "Margin is insufficient.".into(),
            });
        }
        if draft.order_type == OrderType::TakeProfitMarket
            && self.fail_take_profit.load(Ordering::SeqCst)
        {
            return Err(GatewayError::Api {
                code: -2021,
                msg: "Order would immediately trigger.".into(),
            });
        }

        Ok(self.ack_for(draft))
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> GatewayResult<OrderAck> {
        self.cancelled.lock().unwrap().push(order_id);
        Ok(OrderAck {
            order_id,
            client_order_id: String::new(),
            symbol: symbol.to_string(),
            status: OrderStatus::Canceled,
            side: OrderSide::Sell,
            order_type: "STOP_MARKET".into(),
            price: 0.0,
            avg_price: 0.0,
            orig_qty: 0.0,
            executed_qty: 0.0,
            stop_price: None,
            time_in_force: "GTC".into(),
            reduce_only: true,
        })
    }

    async fn query_order(&self, symbol: &str, order_id: i64) -> GatewayResult<OrderAck> {
        self.cancel_order(symbol, order_id).await
    }
}

struct Harness {
    repo: Repository,
    tracker: Arc<OrderTracker>,
    executor: OrderExecutor,
    bus: EventBus,
    account: Account,
}

impl Harness {
    async fn new() -> Self {
        let repo = test_repo().await;
        let bus = EventBus::new(64);
        let (writer_handle, _task) = writer::spawn(repo.clone(), 256);
        let tracker = Arc::new(OrderTracker::new(
            repo.clone(),
            writer_handle.clone(),
            bus.clone(),
        ));
        let executor = OrderExecutor::new(
            tracker.clone(),
            repo.clone(),
            writer_handle,
            bus.clone(),
        );
        let account = repo
            .create_account(AccountDraft {
                name: "main".into(),
                api_key: "key-123456789".into(),
                api_secret: "secret-123456789".into(),
                is_default: true,
                ..Default::default()
            })
            .await
            .unwrap();
        Self {
            repo,
            tracker,
            executor,
            bus,
            account,
        }
    }

    async fn signal(&self, symbol: &str) -> Signal {
        self.repo
            .create_signal(1, 42, symbol, &format!("${}", symbol.trim_end_matches("USDT")))
            .await
            .unwrap()
    }

    fn settings(&self) -> TradingSettings {
        TradingSettings {
            enabled: true,
            leverage: 10,
            order_amount: 100.0,
            target_percent: 0.02,
            stoploss_percent: 0.01,
            order_timeout: 600,
            max_positions: 0,
            dry_run: false,
            signal_pattern: r"(?i)\$([A-Z]{2,10})\b".into(),
            ignored_symbols: Vec::new(),
        }
    }

    async fn wait_for_order_rows(&self, position_id: i64, n: usize) {
        for _ in 0..200 {
            let rows = self.repo.orders_by_position(position_id).await.unwrap();
            if rows.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("order rows never reached {n} for position {position_id}");
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn happy_path_dispatches_full_bracket() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    let signal = harness.signal("BTCUSDT").await;

    let outcome = harness
        .executor
        .execute(&signal, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap();

    let position_id = match outcome {
        ExecutionOutcome::Executed { position_id } => position_id,
        other => panic!("expected execution, got {other:?}"),
    };

    // three orders, dispatched concurrently
    let placed = gateway.placed();
    assert_eq!(placed.len(), 3);

    let entry = &gateway.entries()[0];
    assert_eq!(entry.side, OrderSide::Buy);
    assert!(approx(entry.quantity, 0.002));
    assert!(!entry.reduce_only);

    let tp = placed
        .iter()
        .find(|d| d.order_type == OrderType::TakeProfitMarket)
        .expect("take profit dispatched");
    assert_eq!(tp.side, OrderSide::Sell);
    assert!(tp.reduce_only);
    assert!(approx(tp.stop_price.unwrap(), 50_100.0));
    assert!(approx(tp.quantity, 0.002));

    let sl = placed
        .iter()
        .find(|d| d.order_type == OrderType::StopMarket)
        .expect("stop loss dispatched");
    assert!(approx(sl.stop_price.unwrap(), 49_950.0));

    // one position row, open, with the computed bracket
    let position = harness.repo.get_position(position_id).await.unwrap().unwrap();
    assert_eq!(position.status, "open");
    assert_eq!(position.side, "LONG");
    assert!(approx(position.entry_price, 50_000.0));
    assert!(approx(position.take_profit_price, 50_100.0));
    assert!(approx(position.stop_loss_price, 49_950.0));

    // three order rows through the async writer
    harness.wait_for_order_rows(position_id, 3).await;
    let rows = harness.repo.orders_by_position(position_id).await.unwrap();
    let purposes: Vec<&str> = rows.iter().map(|r| r.purpose.as_str()).collect();
    assert!(purposes.contains(&"entry"));
    assert!(purposes.contains(&"take_profit"));
    assert!(purposes.contains(&"stop_loss"));

    // both protective orders tracked for timeout
    assert_eq!(harness.tracker.pending_count(), 2);
}

#[tokio::test]
async fn small_order_bumps_quantity_to_notional_floor() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    let signal = harness.signal("BTCUSDT").await;

    let mut account = harness.account.clone();
    account.order_amount_usdt = 3.0;

    harness
        .executor
        .execute(&signal, &account, gateway.clone(), &harness.settings())
        .await
        .unwrap();

    let entry = &gateway.entries()[0];
    assert!(approx(entry.quantity, 0.001));
    assert!(entry.quantity * 50_000.0 >= 5.0);
}

#[tokio::test]
async fn duplicate_signal_is_suppressed_within_window() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);

    let first = harness.signal("BTCUSDT").await;
    let outcome = harness
        .executor
        .execute(&first, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Executed { .. }));

    let second = harness.signal("BTCUSDT").await;
    let outcome = harness
        .executor
        .execute(&second, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Deduplicated);

    // no additional orders, no second position
    assert_eq!(gateway.placed().len(), 3);
    assert_eq!(harness.repo.open_positions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_entry_rolls_back_protective_orders() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    gateway.fail_entry.store(true, Ordering::SeqCst);

    let signal = harness.signal("BTCUSDT").await;
    let err = harness
        .executor
        .execute(&signal, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::EntryFailed { .. }));

    // both accepted protective orders were cancelled
    assert_eq!(gateway.cancelled().len(), 2);
    // no position row was written
    assert!(harness.repo.open_positions().await.unwrap().is_empty());
    // dedup was not recorded: a retry dispatches again
    assert!(!harness.tracker.recently_executed("BTCUSDT"));

    gateway.fail_entry.store(false, Ordering::SeqCst);
    let retry = harness.signal("BTCUSDT").await;
    let outcome = harness
        .executor
        .execute(&retry, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Executed { .. }));
}

#[tokio::test]
async fn rejected_protective_order_keeps_entry() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    gateway.fail_take_profit.store(true, Ordering::SeqCst);

    let mut errors = harness.bus.subscribe();
    let signal = harness.signal("BTCUSDT").await;
    let outcome = harness
        .executor
        .execute(&signal, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Executed { .. }));

    // entry stands, nothing was cancelled, only the stop loss is tracked
    assert!(gateway.cancelled().is_empty());
    assert_eq!(harness.tracker.pending_count(), 1);
    assert_eq!(harness.repo.open_positions().await.unwrap().len(), 1);

    // the failure was broadcast for the dashboard
    let mut saw_error = false;
    while let Ok(event) = errors.try_recv() {
        if matches!(event, Event::SignalError(_)) {
            saw_error = true;
        }
    }
    assert!(saw_error, "expected a signal_error broadcast");
}

#[tokio::test]
async fn timeout_sweep_cancels_and_force_closes_once() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    let signal = harness.signal("BTCUSDT").await;

    let outcome = harness
        .executor
        .execute(&signal, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap();
    let position_id = match outcome {
        ExecutionOutcome::Executed { position_id } => position_id,
        other => panic!("expected execution, got {other:?}"),
    };
    assert_eq!(harness.tracker.pending_count(), 2);

    // both TP and SL blow past the 600 s account timeout in the same sweep
    let later = Instant::now() + Duration::from_secs(601);
    harness.tracker.sweep_expired(later).await;

    assert_eq!(harness.tracker.pending_count(), 0);
    assert_eq!(gateway.cancelled().len(), 2);
    // exactly one forced close despite two expired protective orders
    assert_eq!(gateway.force_closes().len(), 1);
    let close = &gateway.force_closes()[0];
    assert!(close.reduce_only);
    assert_eq!(close.side, OrderSide::Sell);
    assert!(approx(close.quantity, 0.002));

    // the position row was closed at the mock fill price
    let position = harness.repo.get_position(position_id).await.unwrap().unwrap();
    assert_eq!(position.status, "closed");
    assert!(approx(position.exit_price.unwrap(), 50_000.0));

    // a second sweep finds nothing to do
    harness.tracker.sweep_expired(later).await;
    assert_eq!(gateway.force_closes().len(), 1);
}

#[tokio::test]
async fn unknown_symbol_is_rejected_before_dispatch() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(1.0);
    let signal = harness.signal("DOGEUSDT").await;

    let err = harness
        .executor
        .execute(&signal, &harness.account, gateway.clone(), &harness.settings())
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::SymbolUnknown(_)));
    assert!(gateway.placed().is_empty());
}

#[tokio::test]
async fn misconfigured_account_is_rejected_before_any_exchange_call() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    let signal = harness.signal("BTCUSDT").await;

    for (leverage, amount) in [(0_i64, 100.0), (126, 100.0), (10, 0.0)] {
        let mut account = harness.account.clone();
        account.leverage = leverage;
        account.order_amount_usdt = amount;
        let err = harness
            .executor
            .execute(&signal, &account, gateway.clone(), &harness.settings())
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::AccountMisconfigured { .. }));
    }
    assert!(gateway.placed().is_empty());
}

#[tokio::test]
async fn dry_run_sizes_but_never_dispatches_or_writes() {
    let harness = Harness::new().await;
    let gateway = MockGateway::new(50_000.0);
    let signal = harness.signal("BTCUSDT").await;

    let mut settings = harness.settings();
    settings.dry_run = true;

    let outcome = harness
        .executor
        .execute(&signal, &harness.account, gateway.clone(), &settings)
        .await
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::DryRun);
    assert!(gateway.placed().is_empty());
    assert!(harness.repo.open_positions().await.unwrap().is_empty());
    // dry run does not arm the dedup gate
    assert!(!harness.tracker.recently_executed("BTCUSDT"));
}
