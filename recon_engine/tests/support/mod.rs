#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use recon_common::Amount;
use recon_engine::{
    db_types::{EntryId, EntryKind, LedgerEntry, NewLedgerEntry, PaymentOrder},
    ledger::{LedgerRecord, LedgerSource, LedgerSourceError},
    notifier::{CallbackRequest, CallbackResponse, CallbackSender, CallbackTransportError},
    order_objects::OrderIntake,
    traits::{InsertEntryResult, MatchCommit, ReconciliationDatabase, TransferStore},
    OrderFlowApi,
    RetryPolicy,
    SqliteDatabase,
};

pub const CALLBACK_URL: &str = "https://shop.example.com/hooks/paid";

/// Creates a fresh, migrated database in the temp directory.
pub async fn prepare_test_env() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = random_db_url();
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    db.migrate().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub fn random_db_url() -> String {
    let path = std::env::temp_dir().join(format!("recon_test_{}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}

pub fn amount(s: &str) -> Amount {
    s.parse().expect("Invalid amount in test")
}

pub fn transfer(entry_id: &str, value: &str, currency: &str, occurred_at: DateTime<Utc>) -> NewLedgerEntry {
    NewLedgerEntry::new(EntryId::from(entry_id), amount(value), currency, occurred_at).with_kind(EntryKind::Transfer)
}

pub fn record(entry_id: &str, value: &str, currency: &str, kind: &str, occurred_at: DateTime<Utc>) -> LedgerRecord {
    LedgerRecord {
        identifier: entry_id.to_string(),
        amount: amount(value),
        currency: currency.to_string(),
        balance: Amount::default(),
        kind: kind.to_string(),
        occurred_at,
    }
}

pub async fn store_entry(db: &SqliteDatabase, entry: NewLedgerEntry) -> LedgerEntry {
    match db.insert_entry(entry).await.expect("Error storing ledger entry") {
        InsertEntryResult::Inserted(e) => e,
        InsertEntryResult::AlreadyExists(e) => panic!("Entry {} already exists", e.entry_id),
    }
}

pub async fn create_order(
    db: &SqliteDatabase,
    order_id: &str,
    value: &str,
    created_at: DateTime<Utc>,
) -> PaymentOrder {
    let api = OrderFlowApi::new(db.clone(), Default::default());
    let intake = OrderIntake::new(order_id, amount(value), "USDT", CALLBACK_URL).created_at(created_at);
    api.create_order(intake).await.expect("Error creating order")
}

/// Creates an order and an entry that pays for it, and commits the match directly.
pub async fn matched_order(db: &SqliteDatabase, order_id: &str, callback_url: &str) -> PaymentOrder {
    let t0 = Utc::now() - chrono::Duration::minutes(10);
    let api = OrderFlowApi::new(db.clone(), Default::default());
    let intake = OrderIntake::new(order_id, amount("25"), "USDT", callback_url).created_at(t0);
    let order = api.create_order(intake).await.expect("Error creating order");
    let entry_id = format!("bill-{order_id}");
    let entry = store_entry(db, transfer(&entry_id, "25", "USDT", t0 + chrono::Duration::minutes(1))).await;
    match db.commit_match(&entry.entry_id, &order.order_id, Utc::now()).await.expect("Error committing match") {
        MatchCommit::Committed { order, .. } => order,
        other => panic!("Expected the match to commit, got {other:?}"),
    }
}

pub fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(5), Duration::from_millis(20))
}

//--------------------------------------   Ledger source double   -----------------------------------------------------
#[derive(Clone, Default)]
pub struct StaticLedgerSource {
    records: Arc<Mutex<Vec<LedgerRecord>>>,
    failure: Arc<Mutex<Option<LedgerSourceError>>>,
    delay: Option<Duration>,
}

impl StaticLedgerSource {
    pub fn new(records: Vec<LedgerRecord>) -> Self {
        Self { records: Arc::new(Mutex::new(records)), ..Default::default() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, record: LedgerRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn fail_with(&self, error: LedgerSourceError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

impl LedgerSource for StaticLedgerSource {
    async fn fetch_entries(&self, since: DateTime<Utc>) -> Result<Vec<LedgerRecord>, LedgerSourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.failure.lock().unwrap().clone() {
            return Err(e);
        }
        let records = self.records.lock().unwrap().iter().filter(|r| r.occurred_at >= since).cloned().collect();
        Ok(records)
    }
}

//--------------------------------------  Callback sender double  -----------------------------------------------------
/// Replays scripted responses in order. Once the script runs out, the last response is repeated.
#[derive(Clone)]
pub struct ScriptedSender {
    script: Arc<Mutex<VecDeque<Result<CallbackResponse, CallbackTransportError>>>>,
    last: Arc<Mutex<Result<CallbackResponse, CallbackTransportError>>>,
    requests: Arc<Mutex<Vec<CallbackRequest>>>,
}

impl ScriptedSender {
    pub fn new(script: Vec<Result<CallbackResponse, CallbackTransportError>>) -> Self {
        let last = script.last().cloned().unwrap_or_else(|| Ok(ok_response()));
        Self {
            script: Arc::new(Mutex::new(script.into())),
            last: Arc::new(Mutex::new(last)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(vec![Ok(ok_response())])
    }

    pub fn always_status(status: u16) -> Self {
        Self::new(vec![Ok(CallbackResponse { status, body: format!("status {status}") })])
    }

    pub fn requests(&self) -> Vec<CallbackRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn ok_response() -> CallbackResponse {
    CallbackResponse { status: 200, body: "ok".to_string() }
}

impl CallbackSender for ScriptedSender {
    async fn send(&self, request: &CallbackRequest) -> Result<CallbackResponse, CallbackTransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self.last.lock().unwrap().clone(),
        }
    }
}
