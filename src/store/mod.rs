//! In-memory document stores
//!
//! `InMemoryMarketStore` gives each market a version counter and commits
//! `run_atomic` updates with compare-and-swap, retrying on conflict. This is the
//! same optimistic contract a hosted document store offers, so the coordinator
//! can be exercised against it unchanged.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{
    AtomicUpdate, Error, Market, MarketId, MarketStore, Result, TransactionLog, TransactionRecord,
    TransferId,
};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    market: Market,
}

/// Market store backed by a versioned map
pub struct InMemoryMarketStore {
    markets: Arc<RwLock<HashMap<MarketId, Versioned>>>,
    max_retries: u32,
}

impl InMemoryMarketStore {
    pub fn new(max_retries: u32) -> Self {
        Self {
            markets: Arc::new(RwLock::new(HashMap::new())),
            max_retries: max_retries.max(1),
        }
    }

    /// Insert a record under its own id, bypassing id assignment.
    pub fn insert(&self, market: Market) {
        self.markets.write().insert(
            market.id.clone(),
            Versioned {
                version: 0,
                market,
            },
        );
    }

    /// Current version of a market document
    pub fn version(&self, id: &MarketId) -> Option<u64> {
        self.markets.read().get(id).map(|v| v.version)
    }
}

impl Default for InMemoryMarketStore {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn get(&self, id: &MarketId) -> Result<Option<Market>> {
        Ok(self.markets.read().get(id).map(|v| v.market.clone()))
    }

    async fn run_atomic(&self, id: &MarketId, update: &mut AtomicUpdate<'_>) -> Result<Market> {
        for attempt in 1..=self.max_retries {
            let snapshot = self
                .markets
                .read()
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.clone()))?;

            let mut updated = update(&snapshot.market)?;
            updated.id = id.clone();

            let mut markets = self.markets.write();
            match markets.get_mut(id) {
                Some(current) if current.version == snapshot.version => {
                    current.version += 1;
                    current.market = updated.clone();
                    debug!(market_id = %id, version = current.version, "Committed market update");
                    return Ok(updated);
                }
                Some(_) => {
                    debug!(market_id = %id, attempt, "Market changed underneath update, retrying");
                }
                None => return Err(Error::NotFound(id.clone())),
            }
        }

        warn!(market_id = %id, attempts = self.max_retries, "Giving up on contended market");
        Err(Error::StoreConflict {
            market_id: id.clone(),
            attempts: self.max_retries,
        })
    }

    async fn create(&self, mut market: Market) -> Result<MarketId> {
        let id = MarketId::new(Uuid::new_v4().simple().to_string());
        market.id = id.clone();
        self.insert(market);
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<Market>> {
        Ok(self
            .markets
            .read()
            .values()
            .map(|v| v.market.clone())
            .collect())
    }
}

/// Write-once transaction log
#[derive(Default)]
pub struct InMemoryTransactionLog {
    records: Arc<RwLock<HashMap<TransferId, TransactionRecord>>>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all records (for diagnostics / reporting).
    pub fn snapshot(&self) -> Vec<TransactionRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl TransactionLog for InMemoryTransactionLog {
    async fn get(&self, id: &TransferId) -> Result<Option<TransactionRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn insert(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.transfer_id) {
            return Err(Error::DuplicateTransfer(record.transfer_id));
        }
        records.insert(record.transfer_id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AssetId, TradeKind};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn market() -> Market {
        let now = Utc::now();
        Market {
            id: MarketId::new("ignored"),
            name: "Election".into(),
            description: "Who wins the election".into(),
            share_count: 1_000,
            yes_shares: 1_000,
            no_shares: 1_000,
            collateral_committed: Decimal::from(100),
            collateral_balance: Decimal::from(100),
            yes_asset_id: AssetId(10),
            no_asset_id: AssetId(11),
            resolved: false,
            expiry_date: now + Duration::days(1),
            resolution_date: now + Duration::days(2),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let store = InMemoryMarketStore::default();
        let id = store.create(market()).await.unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
        assert!(store.get(&MarketId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_atomic_commits_and_bumps_version() {
        let store = InMemoryMarketStore::default();
        let id = store.create(market()).await.unwrap();

        let committed = store
            .run_atomic(&id, &mut |m: &Market| {
                let mut next = m.clone();
                next.yes_shares -= 10;
                Ok(next)
            })
            .await
            .unwrap();

        assert_eq!(committed.yes_shares, 990);
        assert_eq!(store.version(&id), Some(1));
    }

    #[tokio::test]
    async fn test_run_atomic_error_leaves_record_untouched() {
        let store = InMemoryMarketStore::default();
        let id = store.create(market()).await.unwrap();

        let result = store
            .run_atomic(&id, &mut |_: &Market| -> Result<Market> { Err(Error::MarketExpired) })
            .await;

        assert!(matches!(result, Err(Error::MarketExpired)));
        assert_eq!(store.version(&id), Some(0));
        assert_eq!(store.get(&id).await.unwrap().unwrap().yes_shares, 1_000);
    }

    #[tokio::test]
    async fn test_run_atomic_unknown_market() {
        let store = InMemoryMarketStore::default();
        let result = store
            .run_atomic(&MarketId::new("ghost"), &mut |m: &Market| Ok(m.clone()))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_never_lose_writes() {
        let store = Arc::new(InMemoryMarketStore::new(1_000));
        let id = store.create(market()).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    store
                        .run_atomic(&id, &mut |m: &Market| {
                            let mut next = m.clone();
                            next.no_shares -= 1;
                            next.collateral_balance += Decimal::ONE;
                            Ok(next)
                        })
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let final_state = store.get(&id).await.unwrap().unwrap();
        assert_eq!(final_state.no_shares, 950);
        assert_eq!(final_state.collateral_balance, Decimal::from(150));
        assert_eq!(store.version(&id), Some(50));
    }

    #[tokio::test]
    async fn test_transaction_log_is_write_once() {
        let log = InMemoryTransactionLog::new();
        let record = TransactionRecord::failed(
            TransferId::new("tx-1"),
            MarketId::new("m"),
            TradeKind::Purchase,
            crate::core::SagaStage::Received,
            "Transaction Data mismatch",
        );
        log.insert(record.clone()).await.unwrap();
        assert!(matches!(
            log.insert(record).await,
            Err(Error::DuplicateTransfer(_))
        ));
        assert_eq!(log.len(), 1);
        assert!(log.get(&TransferId::new("tx-1")).await.unwrap().is_some());
    }
}
