mod support;

use std::time::Duration;

use chrono::Utc;
use recon_engine::{
    db_types::{EntryId, EntryKind, MatchState},
    ledger::LedgerSourceError,
    traits::{InsertEntryResult, ReconciliationDatabase, TransferStore},
    LedgerPoller,
    PollError,
};
use support::*;

#[tokio::test]
async fn ingesting_the_same_entry_twice_keeps_one_record() {
    let db = prepare_test_env().await;
    let t = Utc::now() - chrono::Duration::minutes(5);
    let entry = transfer("bill-001", "88.02", "usdt", t);
    let first = db.insert_entry(entry.clone()).await.unwrap();
    assert!(first.was_inserted());
    assert_eq!(first.entry().currency, "USDT");
    assert_eq!(first.entry().match_state, MatchState::Unmatched);

    let mut again = entry.clone();
    again.amount = amount("1000");
    let second = db.insert_entry(again).await.unwrap();
    let InsertEntryResult::AlreadyExists(stored) = second else {
        panic!("Expected the second insert to report an existing entry");
    };
    assert_eq!(stored.id, first.entry().id);
    assert_eq!(stored.amount, amount("88.02"));

    let known = db.filter_known_entries(&[EntryId::from("bill-001"), EntryId::from("bill-002")]).await.unwrap();
    assert_eq!(known.len(), 1);
    assert!(known.contains(&EntryId::from("bill-001")));
    assert!(db.filter_known_entries(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn poll_returns_only_unseen_entries_in_occurrence_order() {
    let db = prepare_test_env().await;
    let now = Utc::now();
    let m = chrono::Duration::minutes;
    store_entry(&db, transfer("seen", "1", "USDT", now - m(50))).await;
    let source = StaticLedgerSource::new(vec![
        record("c", "3", "USDT", "1", now - m(10)),
        record("seen", "1", "USDT", "1", now - m(50)),
        record("a", "1", "USDT", "2", now - m(40)),
        record("bad-kind", "1", "USDT", "not-a-kind", now - m(35)),
        record("b", "-2", "USDT", "1", now - m(30)),
        record("a", "1", "USDT", "2", now - m(40)),
        record("too-old", "5", "USDT", "1", now - m(180)),
    ]);
    let poller = LedgerPoller::new(source, db.clone());
    let batch = poller.poll().await.unwrap();
    assert_eq!(batch.fetched, 6);
    let ids = batch.entries.iter().map(|e| e.entry_id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(batch.entries[0].kind, EntryKind::Trade);

    // Polling has no side effects.
    assert!(db.fetch_entry(&EntryId::from("a")).await.unwrap().is_none());

    let stored = poller.ingest(batch.entries).await;
    assert_eq!(stored.len(), 3);
    let again = poller.poll().await.unwrap();
    assert!(again.entries.is_empty());
}

#[tokio::test]
async fn slow_sources_are_transient_failures() {
    let db = prepare_test_env().await;
    let source = StaticLedgerSource::new(vec![record("a", "1", "USDT", "1", Utc::now())])
        .with_delay(Duration::from_millis(500));
    let poller = LedgerPoller::new(source, db.clone()).with_fetch_timeout(Duration::from_millis(20));
    let err = poller.poll().await.unwrap_err();
    assert!(matches!(err, PollError::Transient(_)), "{err:?}");
    assert!(!err.is_fatal());
    assert!(db.fetch_entry(&EntryId::from("a")).await.unwrap().is_none());
}

#[tokio::test]
async fn authentication_failures_are_fatal() {
    let db = prepare_test_env().await;
    let source = StaticLedgerSource::new(vec![]);
    source.fail_with(LedgerSourceError::Authentication("API key revoked".into()));
    let poller = LedgerPoller::new(source.clone(), db.clone());
    let err = poller.poll().await.unwrap_err();
    assert!(err.is_fatal());

    source.fail_with(LedgerSourceError::Transient("502 Bad Gateway".into()));
    let err = poller.poll().await.unwrap_err();
    assert!(matches!(err, PollError::Transient(_)));
}

#[tokio::test]
async fn pruning_only_removes_old_unmatched_entries() {
    let db = prepare_test_env().await;
    let now = Utc::now();
    let old = now - chrono::Duration::days(10);
    store_entry(&db, transfer("old-unmatched", "5", "USDT", old).observed_at(old)).await;
    store_entry(&db, transfer("fresh-unmatched", "5", "USDT", now).observed_at(now)).await;
    let order = matched_order(&db, "ORD-1", CALLBACK_URL).await;
    let matched_entry_id = order.matched_entry_id.clone().unwrap();
    // Pretend the matched entry was observed long ago too.
    sqlx::query("UPDATE ledger_entries SET observed_at = ? WHERE entry_id = ?")
        .bind(old)
        .bind(&matched_entry_id)
        .execute(db.pool())
        .await
        .unwrap();

    let pruned = db.prune_unmatched_entries(now - chrono::Duration::days(7)).await.unwrap();
    assert_eq!(pruned, 1);
    assert!(db.fetch_entry(&EntryId::from("old-unmatched")).await.unwrap().is_none());
    assert!(db.fetch_entry(&EntryId::from("fresh-unmatched")).await.unwrap().is_some());
    let matched = db.fetch_entry(&matched_entry_id).await.unwrap().unwrap();
    assert_eq!(matched.match_state, MatchState::Matched);
    assert!(db.url().starts_with("sqlite://"));
}
