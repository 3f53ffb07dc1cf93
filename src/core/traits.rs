//! Core traits - Collaborator seams consumed by the registry and the trade coordinator

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::{Result, types::*};

/// Inbound transfer the coordinator expects to find on the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedTransfer {
    pub transfer_id: TransferId,
    pub sender: Address,
    pub receiver: Address,
    /// Collateral amount, or whole asset units for `TransferKind::Asset`
    pub amount: Decimal,
    pub kind: TransferKind,
}

/// Outcome of a ledger lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Mismatch(String),
}

/// Read-only view of the external ledger
#[async_trait]
pub trait LedgerVerifier: Send + Sync {
    /// Check that `expected` was completed on the ledger exactly as described
    async fn verify_transfer(&self, expected: &ExpectedTransfer) -> Result<Verification>;
}

/// Fungible asset issuance
#[async_trait]
pub trait AssetIssuer: Send + Sync {
    async fn issue_asset(&self, name: &str, unit_label: &str, total_supply: u64) -> Result<AssetId>;
}

/// Outbound legs, paid from the pool account
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn transfer_collateral(&self, amount: Decimal, recipient: &Address) -> Result<TransferId>;

    async fn transfer_asset(
        &self,
        asset_id: AssetId,
        amount: u64,
        recipient: &Address,
    ) -> Result<TransferId>;
}

/// Single-document mutation run inside `MarketStore::run_atomic`.
/// May be invoked several times if the store retries on conflict.
pub type AtomicUpdate<'a> = dyn FnMut(&Market) -> Result<Market> + Send + 'a;

/// Market document store with optimistic single-document transactions
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn get(&self, id: &MarketId) -> Result<Option<Market>>;

    /// Read-modify-write against the freshest copy of one market; returns the committed record
    async fn run_atomic(&self, id: &MarketId, update: &mut AtomicUpdate<'_>) -> Result<Market>;

    /// Persist a new market; the store assigns the id (the record's own id is ignored)
    async fn create(&self, market: Market) -> Result<MarketId>;

    async fn list_all(&self) -> Result<Vec<Market>>;
}

/// Write-once log of terminal trade records
#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn get(&self, id: &TransferId) -> Result<Option<TransactionRecord>>;

    /// Insert a record; fails `DuplicateTransfer` if one already exists for the id
    async fn insert(&self, record: TransactionRecord) -> Result<()>;
}
