use std::{collections::HashSet, fmt::Debug};

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{db_url, new_pool, orders, transfers, SqliteDatabaseError};
use crate::{
    db::traits::{
        CandidateQuery,
        InsertEntryResult,
        MatchCommit,
        OrderStore,
        ReconciliationDatabase,
        StoreError,
        TransferStore,
    },
    db_types::{
        CallbackRecord,
        EntryId,
        LedgerEntry,
        NewLedgerEntry,
        NewPaymentOrder,
        OrderId,
        OrderStatusType,
        PaymentOrder,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `RECON_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Connection pool for {url} created");
        Ok(Self { url: url.to_string(), pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete for {}", self.url);
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl TransferStore for SqliteDatabase {
    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<InsertEntryResult, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = transfers::idempotent_insert(entry, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let entry = transfers::fetch_entry(entry_id, &mut conn).await?;
        Ok(entry)
    }

    async fn filter_known_entries(&self, entry_ids: &[EntryId]) -> Result<HashSet<EntryId>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let known = transfers::filter_known_entries(entry_ids, &mut conn).await?;
        Ok(known)
    }

    async fn fetch_unmatched_entries(&self, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let entries = transfers::fetch_unmatched_entries(since, &mut conn).await?;
        Ok(entries)
    }

    async fn prune_unmatched_entries(&self, observed_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let count = transfers::prune_unmatched_entries(observed_before, &mut conn).await?;
        if count > 0 {
            debug!("🗃️ Pruned {count} unmatched ledger entries observed before {observed_before}");
        }
        Ok(count)
    }
}

impl OrderStore for SqliteDatabase {
    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<PaymentOrder>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_match_candidates(&self, query: &CandidateQuery) -> Result<Vec<PaymentOrder>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_match_candidates(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_overdue_orders(now, &mut conn).await?;
        Ok(orders)
    }

    async fn compare_and_set_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new: OrderStatusType,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let changed = orders::compare_and_set_status(order_id, expected, new, &mut conn).await?;
        Ok(changed)
    }

    async fn fetch_undelivered_callbacks(
        &self,
        settled_before: DateTime<Utc>,
    ) -> Result<Vec<PaymentOrder>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_undelivered_callbacks(settled_before, &mut conn).await?;
        Ok(orders)
    }

    async fn record_callback(&self, order_id: &OrderId, record: CallbackRecord) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let updated = orders::record_callback(order_id, record, &mut conn).await?;
        Ok(updated)
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The order update is the first write in the transaction, so SQLite takes the write lock before either
    /// precondition is evaluated. A competing matcher blocks on the lock and then sees the committed state.
    async fn commit_match(
        &self,
        entry_id: &EntryId,
        order_id: &OrderId,
        matched_at: DateTime<Utc>,
    ) -> Result<MatchCommit, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !orders::claim_order(order_id, entry_id, matched_at, &mut tx).await? {
            tx.rollback().await?;
            debug!("🗃️ Order {order_id} is no longer pending. Entry {entry_id} was not matched to it.");
            return Ok(MatchCommit::OrderClaimed);
        }
        if !transfers::claim_entry(entry_id, order_id, matched_at, &mut tx).await? {
            tx.rollback().await?;
            debug!("🗃️ Entry {entry_id} has already been matched. Order {order_id} remains pending.");
            return Ok(MatchCommit::EntryClaimed);
        }
        let order = orders::fetch_order(order_id, &mut tx).await?;
        let order = order.ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;
        let entry = transfers::fetch_entry(entry_id, &mut tx).await?;
        let entry = entry.ok_or_else(|| StoreError::EntryNotFound(entry_id.clone()))?;
        tx.commit().await?;
        info!("🗃️ Entry {entry_id} matched to order {order_id}");
        Ok(MatchCommit::Committed { order, entry })
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
