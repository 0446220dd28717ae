mod support;

use chrono::{Duration, Utc};
use recon_engine::{
    db_types::{EntryId, EntryKind, MatchState, OrderId, OrderStatusType},
    events::EventProducers,
    traits::{OrderStore, TransferStore},
    LedgerPoller,
    MatchResult,
    Matcher,
    Reconciler,
};
use support::*;

#[tokio::test]
async fn a_transfer_matches_the_order_it_pays_for() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(10);
    let order = create_order(&db, "ORDER123456", "88.02", t0).await;
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.expire_at, t0 + Duration::minutes(60));

    let source = StaticLedgerSource::new(vec![
        record("E1", "88.02", "USDT", "1", t0 + Duration::minutes(5)),
        record("E2", "88.02", "USDT", "2", t0 + Duration::minutes(5)),
    ]);
    let poller = LedgerPoller::new(source, db.clone());
    let matcher = Matcher::new(db.clone(), EventProducers::default());
    let reconciler = Reconciler::new(poller, matcher);
    let report = reconciler.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.ingested, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.backlog_matched, 0);

    let order = db.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Matched);
    assert_eq!(order.matched_entry_id, Some(EntryId::from("E1")));
    let entry = db.fetch_entry(&EntryId::from("E1")).await.unwrap().unwrap();
    assert_eq!(entry.match_state, MatchState::Matched);
    assert_eq!(entry.matched_order_id, Some(OrderId::from("ORDER123456")));
    assert_eq!(entry.matched_at, order.matched_at);
    let trade = db.fetch_entry(&EntryId::from("E2")).await.unwrap().unwrap();
    assert_eq!(trade.match_state, MatchState::Unmatched);

    // A second cycle sees nothing new.
    let report = reconciler.run_cycle().await.unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(report.matched, 0);
}

#[tokio::test]
async fn the_oldest_candidate_wins() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(30);
    create_order(&db, "newer", "10", t0 + Duration::minutes(2)).await;
    create_order(&db, "older", "10", t0).await;
    let matcher = Matcher::new(db.clone(), EventProducers::default());

    let first = store_entry(&db, transfer("E1", "10", "USDT", t0 + Duration::minutes(5))).await;
    assert_eq!(matcher.try_match(&first).await.unwrap(), MatchResult::Matched(OrderId::from("older")));
    let second = store_entry(&db, transfer("E2", "10", "USDT", t0 + Duration::minutes(6))).await;
    assert_eq!(matcher.try_match(&second).await.unwrap(), MatchResult::Matched(OrderId::from("newer")));
    let third = store_entry(&db, transfer("E3", "10", "USDT", t0 + Duration::minutes(7))).await;
    assert_eq!(matcher.try_match(&third).await.unwrap(), MatchResult::Unmatched);
}

#[tokio::test]
async fn entries_that_cannot_pay_are_left_unmatched() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(30);
    create_order(&db, "O1", "10", t0).await;
    let matcher = Matcher::new(db.clone(), EventProducers::default());

    let before_order = store_entry(&db, transfer("early", "10", "USDT", t0 - Duration::minutes(1))).await;
    let wrong_currency = store_entry(&db, transfer("btc", "10", "BTC", t0 + Duration::minutes(1))).await;
    let wrong_amount = store_entry(&db, transfer("short", "9.99999999", "USDT", t0 + Duration::minutes(1))).await;
    let outgoing = store_entry(&db, transfer("out", "-10", "USDT", t0 + Duration::minutes(1))).await;
    let fee = store_entry(&db, transfer("fee", "10", "USDT", t0 + Duration::minutes(1)).with_kind(EntryKind::Fee)).await;
    for entry in [before_order, wrong_currency, wrong_amount, outgoing, fee] {
        assert_eq!(matcher.try_match(&entry).await.unwrap(), MatchResult::Unmatched, "{}", entry.entry_id);
    }
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn tolerance_widens_the_amount_window() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(30);
    create_order(&db, "O1", "88.02", t0).await;
    let entry = store_entry(&db, transfer("E1", "88.0249", "USDT", t0 + Duration::minutes(1))).await;

    let exact = Matcher::new(db.clone(), EventProducers::default());
    assert_eq!(exact.try_match(&entry).await.unwrap(), MatchResult::Unmatched);
    let lenient = Matcher::new(db.clone(), EventProducers::default()).with_tolerance(amount("0.005"));
    assert_eq!(lenient.try_match(&entry).await.unwrap(), MatchResult::Matched(OrderId::from("O1")));

    // The order keeps the price it asked for and records what was actually paid.
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.amount, amount("88.02"));
    assert_eq!(order.matched_amount, Some(amount("88.0249")));
}

#[tokio::test]
async fn an_unmatched_order_has_no_paid_amount() {
    let db = prepare_test_env().await;
    let order = create_order(&db, "O1", "88.02", Utc::now()).await;
    assert!(order.matched_amount.is_none());
    let matcher = Matcher::new(db.clone(), EventProducers::default()).with_tolerance(amount("-0.5"));
    assert_eq!(matcher.tolerance(), amount("0.5"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_for_one_order_match_at_most_once() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(30);
    create_order(&db, "contested", "42", t0).await;
    let mut entries = Vec::new();
    for i in 0..8 {
        entries.push(store_entry(&db, transfer(&format!("E{i}"), "42", "USDT", t0 + Duration::minutes(1))).await);
    }
    let mut handles = Vec::new();
    for entry in entries {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let matcher = Matcher::new(db, EventProducers::default());
            (entry.entry_id.clone(), matcher.try_match(&entry).await)
        }));
    }
    let mut winners = Vec::new();
    for handle in handles {
        let (entry_id, result) = handle.await.unwrap();
        if result.unwrap().is_matched() {
            winners.push(entry_id);
        }
    }
    assert_eq!(winners.len(), 1);
    let order = db.fetch_order(&OrderId::from("contested")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Matched);
    assert_eq!(order.matched_entry_id.as_ref(), Some(&winners[0]));
    let unmatched = db.fetch_unmatched_entries(t0).await.unwrap();
    assert_eq!(unmatched.len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn an_entry_raced_by_two_matchers_pays_for_one_order() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(30);
    create_order(&db, "first", "7", t0).await;
    create_order(&db, "second", "7", t0 + Duration::minutes(1)).await;
    let entry = store_entry(&db, transfer("E1", "7", "USDT", t0 + Duration::minutes(2))).await;

    let spawn_matcher = |db: recon_engine::SqliteDatabase, entry: recon_engine::db_types::LedgerEntry| {
        tokio::spawn(async move { Matcher::new(db, EventProducers::default()).try_match(&entry).await })
    };
    let a = spawn_matcher(db.clone(), entry.clone());
    let b = spawn_matcher(db.clone(), entry.clone());
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert_eq!(a, MatchResult::Matched(OrderId::from("first")));
    assert_eq!(b, MatchResult::Matched(OrderId::from("first")));
    let second = db.fetch_order(&OrderId::from("second")).await.unwrap().unwrap();
    assert_eq!(second.status, OrderStatusType::Pending);
    assert!(second.matched_entry_id.is_none());
}

#[tokio::test]
async fn the_backlog_rescan_picks_up_late_orders() {
    let db = prepare_test_env().await;
    let t0 = Utc::now() - Duration::minutes(30);
    let source = StaticLedgerSource::new(vec![record("E1", "15", "USDT", "1", t0 + Duration::minutes(5))]);
    let reconciler =
        Reconciler::new(LedgerPoller::new(source, db.clone()), Matcher::new(db.clone(), EventProducers::default()));
    let report = reconciler.run_cycle().await.unwrap();
    assert_eq!((report.ingested, report.matched), (1, 0));

    // The business system registers the order after the transfer has already been seen.
    create_order(&db, "late-registration", "15", t0).await;
    let report = reconciler.run_cycle().await.unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(report.backlog_matched, 1);
    let order = db.fetch_order(&OrderId::from("late-registration")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Matched);
    assert_eq!(order.matched_entry_id, Some(EntryId::from("E1")));
}
