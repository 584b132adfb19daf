//! Account store invariants: default uniqueness, idempotent set-default and
//! deletion protection for accounts with open positions.

use std::sync::atomic::{AtomicU64, Ordering};

use zignal::persistence::models::{AccountDraft, NewPosition};
use zignal::persistence::repository::Repository;
use zignal::persistence::{init_database, StoreError};

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn test_repo() -> Repository {
    let path = std::env::temp_dir().join(format!(
        "zignal-accounts-{}-{}.db",
        std::process::id(),
        DB_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&path);
    let pool = init_database(&format!("sqlite://{}", path.display()))
        .await
        .expect("test database");
    Repository::new(pool)
}

fn draft(name: &str, is_default: bool) -> AccountDraft {
    AccountDraft {
        name: name.into(),
        api_key: format!("{name}-key"),
        api_secret: format!("{name}-secret"),
        is_default,
        ..Default::default()
    }
}

async fn default_count(repo: &Repository) -> usize {
    repo.list_accounts()
        .await
        .unwrap()
        .iter()
        .filter(|a| a.is_default && a.is_active)
        .count()
}

#[tokio::test]
async fn at_most_one_active_default_across_writes() {
    let repo = test_repo().await;

    let first = repo.create_account(draft("first", true)).await.unwrap();
    assert!(first.is_default);
    assert_eq!(default_count(&repo).await, 1);

    // creating a second default atomically clears the first
    let second = repo.create_account(draft("second", true)).await.unwrap();
    assert!(second.is_default);
    assert_eq!(default_count(&repo).await, 1);
    assert!(!repo.get_account(first.id).await.unwrap().unwrap().is_default);

    // an update that sets the flag moves it
    let mut update = draft("first", true);
    update.leverage = 20;
    repo.update_account(first.id, update).await.unwrap();
    assert_eq!(default_count(&repo).await, 1);
    assert!(repo.get_account(first.id).await.unwrap().unwrap().is_default);
}

#[tokio::test]
async fn set_default_is_idempotent() {
    let repo = test_repo().await;
    let a = repo.create_account(draft("a", true)).await.unwrap();
    let b = repo.create_account(draft("b", false)).await.unwrap();

    repo.set_default_account(b.id).await.unwrap();
    repo.set_default_account(b.id).await.unwrap();

    assert_eq!(default_count(&repo).await, 1);
    let default = repo.get_default_account().await.unwrap().unwrap();
    assert_eq!(default.id, b.id);
    assert!(!repo.get_account(a.id).await.unwrap().unwrap().is_default);
}

#[tokio::test]
async fn default_requires_active() {
    let repo = test_repo().await;
    let account = repo.create_account(draft("solo", true)).await.unwrap();
    assert!(repo.get_default_account().await.unwrap().is_some());

    let mut update = draft("solo", true);
    update.is_active = false;
    repo.update_account(account.id, update).await.unwrap();
    assert!(repo.get_default_account().await.unwrap().is_none());
}

#[tokio::test]
async fn delete_with_open_position_fails_and_leaves_store_unchanged() {
    let repo = test_repo().await;
    let account = repo.create_account(draft("trading", true)).await.unwrap();
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

    let err = repo.delete_account(account.id).await.unwrap_err();
    assert!(matches!(err, StoreError::AccountInUse));
    assert!(repo.get_account(account.id).await.unwrap().is_some());

    // closing the position unblocks deletion
    repo.close_position(position.id, 50_100.0).await.unwrap();
    repo.delete_account(account.id).await.unwrap();
    assert!(repo.get_account(account.id).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_account_operations_report_not_found() {
    let repo = test_repo().await;
    assert!(matches!(
        repo.set_default_account(999).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(matches!(
        repo.delete_account(999).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(repo.get_account(999).await.unwrap().is_none());
}
