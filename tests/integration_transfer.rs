//! Integration tests for the transfer engine
//!
//! Require a PostgreSQL database at DATABASE_URL.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use ledger_core::domain::{ListEntriesParams, ListTransfersParams};
use ledger_core::store::TransferStage;
use ledger_core::{Amount, Store, TransferRequest, TxContext};
use tokio_util::sync::CancellationToken;

mod common;

fn request(from: i64, to: i64, amount: i64) -> TransferRequest {
    TransferRequest::new(from, to, Amount::new(amount).unwrap())
}

#[tokio::test]
async fn test_transfer_moves_balance_and_records_rows() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account_a = common::create_account(&store, 100).await;
    let account_b = common::create_account(&store, 50).await;

    let result = store
        .transfer(&TxContext::new(), request(account_a.id, account_b.id, 30))
        .await
        .unwrap();

    // Transfer
    assert_ne!(result.transfer.id, 0);
    assert_eq!(result.transfer.from_account_id, account_a.id);
    assert_eq!(result.transfer.to_account_id, account_b.id);
    assert_eq!(result.transfer.amount, 30);
    assert_eq!(store.get_transfer(result.transfer.id).await.unwrap(), result.transfer);

    // Entries
    assert_eq!(result.from_entry.account_id, account_a.id);
    assert_eq!(result.from_entry.amount, -30);
    assert_eq!(result.to_entry.account_id, account_b.id);
    assert_eq!(result.to_entry.amount, 30);
    assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
    assert_eq!(store.get_entry(result.from_entry.id).await.unwrap(), result.from_entry);
    assert_eq!(store.get_entry(result.to_entry.id).await.unwrap(), result.to_entry);

    // Accounts
    assert_eq!(result.from_account.id, account_a.id);
    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.id, account_b.id);
    assert_eq!(result.to_account.balance, 80);

    assert_eq!(store.get_account(account_a.id).await.unwrap().balance, 70);
    assert_eq!(store.get_account(account_b.id).await.unwrap().balance, 80);
}

#[tokio::test]
async fn test_concurrent_transfers_have_no_lost_updates() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account1 = common::create_account(&store, 100).await;
    let account2 = common::create_account(&store, 50).await;

    let n = 3i64;
    let amount = 10i64;

    let mut handles = Vec::new();
    for i in 0..n {
        let store = store.clone();
        let req = request(account1.id, account2.id, amount);
        handles.push(tokio::spawn(async move {
            let ctx = TxContext::new().with_label(format!("tx {}", i + 1));
            store.transfer(&ctx, req).await
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();

        assert_eq!(result.from_account.id, account1.id);
        assert_eq!(result.to_account.id, account2.id);

        let diff1 = account1.balance - result.from_account.balance;
        let diff2 = result.to_account.balance - account2.balance;
        assert_eq!(diff1, diff2);
        assert!(diff1 > 0);
        assert_eq!(diff1 % amount, 0);

        let k = diff1 / amount;
        assert!((1..=n).contains(&k), "unexpected multiple {k}");
        assert!(seen.insert(k), "two transactions observed multiple {k}");
    }
    assert_eq!(seen.len(), n as usize);

    let updated1 = store.get_account(account1.id).await.unwrap();
    let updated2 = store.get_account(account2.id).await.unwrap();
    assert_eq!(updated1.balance, account1.balance - n * amount);
    assert_eq!(updated2.balance, account2.balance + n * amount);
}

#[tokio::test]
async fn test_alternating_transfers_do_not_deadlock() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account1 = common::create_account(&store, 500).await;
    let account2 = common::create_account(&store, 500).await;

    let n = 10;
    let amount = 10;

    let mut handles = Vec::new();
    for i in 0..n {
        let (from, to) = if i % 2 == 1 {
            (account2.id, account1.id)
        } else {
            (account1.id, account2.id)
        };
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let ctx = TxContext::new().with_label(format!("tx {}", i + 1));
            store.transfer(&ctx, request(from, to, amount)).await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_ok(), "transfer failed: {:?}", result.err());
    }

    let updated1 = store.get_account(account1.id).await.unwrap();
    let updated2 = store.get_account(account2.id).await.unwrap();
    assert_eq!(updated1.balance, account1.balance);
    assert_eq!(updated2.balance, account2.balance);
}

#[tokio::test]
async fn test_roles_follow_request_when_source_id_is_higher() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let lower = common::create_account(&store, 100).await;
    let higher = common::create_account(&store, 100).await;
    assert!(lower.id < higher.id);

    let result = store
        .transfer(&TxContext::new(), request(higher.id, lower.id, 40))
        .await
        .unwrap();

    assert_eq!(result.from_account.id, higher.id);
    assert_eq!(result.from_account.balance, 60);
    assert_eq!(result.to_account.id, lower.id);
    assert_eq!(result.to_account.balance, 140);
    assert_eq!(result.from_entry.account_id, higher.id);
    assert_eq!(result.to_entry.account_id, lower.id);
}

#[tokio::test]
async fn test_unknown_destination_leaves_nothing_behind() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account = common::create_account(&store, 100).await;

    let err = store
        .transfer(&TxContext::new(), request(account.id, i64::MAX, 30))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(TransferStage::CreateTransfer));
    assert!(err.is_constraint_violation());
    assert!(!err.is_retryable());

    assert_eq!(store.get_account(account.id).await.unwrap().balance, 100);

    let entries = store
        .list_entries(ListEntriesParams { account_id: account.id, limit: 10, offset: 0 })
        .await
        .unwrap();
    assert!(entries.is_empty());

    let transfers = store
        .list_transfers(ListTransfersParams {
            from_account_id: account.id,
            to_account_id: i64::MAX,
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn test_self_transfer_nets_to_zero() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account = common::create_account(&store, 100).await;

    let result = store
        .transfer(&TxContext::new(), request(account.id, account.id, 25))
        .await
        .unwrap();

    assert_eq!(result.transfer.from_account_id, account.id);
    assert_eq!(result.transfer.to_account_id, account.id);
    assert_eq!(result.from_entry.amount, -25);
    assert_eq!(result.to_entry.amount, 25);
    assert_eq!(result.from_account.balance, 100);
    assert_eq!(result.from_account, result.to_account);

    assert_eq!(store.get_account(account.id).await.unwrap().balance, 100);

    let entries = store
        .list_entries(ListEntriesParams { account_id: account.id, limit: 10, offset: 0 })
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_cancelled_transfer_is_not_applied() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account1 = common::create_account(&store, 100).await;
    let account2 = common::create_account(&store, 100).await;

    let token = CancellationToken::new();
    token.cancel();
    let ctx = TxContext::new().with_cancellation(token);

    let err = store
        .transfer(&ctx, request(account1.id, account2.id, 10))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(store.get_account(account1.id).await.unwrap().balance, 100);
    assert_eq!(store.get_account(account2.id).await.unwrap().balance, 100);

    let transfers = store
        .list_transfers(ListTransfersParams {
            from_account_id: account1.id,
            to_account_id: account2.id,
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn test_cancel_aborts_transfer_waiting_on_row_lock() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool.clone());

    let account1 = common::create_account(&store, 100).await;
    let account2 = common::create_account(&store, 100).await;

    // Another transaction holds account1 until this test releases it
    let mut blocker = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(account1.id)
        .execute(&mut *blocker)
        .await
        .unwrap();

    let token = CancellationToken::new();
    let ctx = TxContext::new()
        .with_label("blocked")
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        store.transfer(&ctx, request(account1.id, account2.id, 10)),
    )
    .await
    .expect("transfer stayed blocked after cancellation");
    let elapsed = started.elapsed();

    canceller.await.unwrap();
    blocker.rollback().await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "unexpected error: {err}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");

    assert_eq!(store.get_account(account1.id).await.unwrap().balance, 100);
    assert_eq!(store.get_account(account2.id).await.unwrap().balance, 100);

    let transfers = store
        .list_transfers(ListTransfersParams {
            from_account_id: account1.id,
            to_account_id: account2.id,
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn test_balance_failure_rolls_back_earlier_writes() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let sender = common::create_account(&store, 100).await;
    let receiver = common::create_account(&store, i64::MAX - 5).await;

    // The credit overflows BIGINT after the transfer row and both entries
    // have been inserted
    let err = store
        .transfer(&TxContext::new(), request(sender.id, receiver.id, 10))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(TransferStage::UpdateBalance));
    assert!(!err.is_constraint_violation());

    assert_eq!(store.get_account(sender.id).await.unwrap().balance, 100);
    assert_eq!(store.get_account(receiver.id).await.unwrap().balance, i64::MAX - 5);

    for account_id in [sender.id, receiver.id] {
        let entries = store
            .list_entries(ListEntriesParams { account_id, limit: 10, offset: 0 })
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    let transfers = store
        .list_transfers(ListTransfersParams {
            from_account_id: sender.id,
            to_account_id: receiver.id,
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn test_list_transfers_matches_direction() {
    let pool = common::setup_test_db().await;
    let store = Store::new(pool);

    let account_a = common::create_account(&store, 100).await;
    let account_b = common::create_account(&store, 100).await;
    let account_c = common::create_account(&store, 100).await;

    let ctx = TxContext::new();
    let a_to_b = store.transfer(&ctx, request(account_a.id, account_b.id, 10)).await.unwrap();
    store.transfer(&ctx, request(account_a.id, account_c.id, 20)).await.unwrap();
    store.transfer(&ctx, request(account_b.id, account_a.id, 30)).await.unwrap();
    store.transfer(&ctx, request(account_c.id, account_b.id, 40)).await.unwrap();

    let transfers = store
        .list_transfers(ListTransfersParams {
            from_account_id: account_a.id,
            to_account_id: account_b.id,
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();

    assert_eq!(transfers, vec![a_to_b.transfer]);
}
