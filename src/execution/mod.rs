//! Execution layer - trade saga coordinator
//!
//! Every trade runs `Received -> Verified -> Priced -> Committed -> Settled`,
//! falling back to `Compensated` once inbound funds are verified. The ledger and
//! the market store cannot share a transaction, so each forward leg has exactly
//! one compensating action:
//!
//! | forward leg            | compensation                         |
//! |------------------------|--------------------------------------|
//! | inbound transfer       | refund collateral / return shares    |
//! | pool mutation          | reverse the pool deltas atomically   |
//!
//! The only serialization point is the per-market `run_atomic` in stage 3.

mod purchase;
mod request;
mod sale;


pub use request::{PurchaseRequest, SaleRequest};

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::core::{
    Address, Error, ExpectedTransfer, LedgerVerifier, MarketId, MarketStore, Result, SagaStage,
    Settlement, TradeKind, TransactionLog, TransactionRecord, TransferId, Verification,
};

/// Orchestrates purchases and sales against shared pool liquidity
pub struct TradeCoordinator {
    store: Arc<dyn MarketStore>,
    log: Arc<dyn TransactionLog>,
    verifier: Arc<dyn LedgerVerifier>,
    settlement: Arc<dyn Settlement>,
    /// Account inbound legs must pay into
    pool: Address,
    in_flight: Mutex<HashSet<TransferId>>,
}

/// Progress of one trade request
struct Saga {
    transfer_id: TransferId,
    market_id: MarketId,
    kind: TradeKind,
    stage: SagaStage,
}

impl Saga {
    fn new(transfer_id: TransferId, market_id: MarketId, kind: TradeKind) -> Self {
        debug!(%transfer_id, %market_id, %kind, "Trade received");
        Self {
            transfer_id,
            market_id,
            kind,
            stage: SagaStage::Received,
        }
    }

    fn advance(&mut self, stage: SagaStage) {
        debug!(
            transfer_id = %self.transfer_id,
            market_id = %self.market_id,
            from = %self.stage,
            to = %stage,
            "Saga stage"
        );
        self.stage = stage;
    }

    fn failure(&self, reason: impl Into<String>) -> TransactionRecord {
        TransactionRecord::failed(
            self.transfer_id.clone(),
            self.market_id.clone(),
            self.kind,
            self.stage,
            reason,
        )
    }
}

/// Releases an in-flight transfer id when the trade finishes
struct Claim<'a> {
    set: &'a Mutex<HashSet<TransferId>>,
    id: TransferId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

impl TradeCoordinator {
    pub fn new(
        store: Arc<dyn MarketStore>,
        log: Arc<dyn TransactionLog>,
        verifier: Arc<dyn LedgerVerifier>,
        settlement: Arc<dyn Settlement>,
        pool: Address,
    ) -> Self {
        Self {
            store,
            log,
            verifier,
            settlement,
            pool,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn pool(&self) -> &Address {
        &self.pool
    }

    /// Reserve a transfer id for the lifetime of one saga.
    fn claim(&self, id: &TransferId) -> Result<Claim<'_>> {
        if !self.in_flight.lock().insert(id.clone()) {
            warn!(transfer_id = %id, "Transfer already in flight");
            return Err(Error::DuplicateTransfer(id.clone()));
        }
        Ok(Claim {
            set: &self.in_flight,
            id: id.clone(),
        })
    }

    /// Stage 2. A mismatch is recorded as `Failed`; a replayed id and an
    /// unreachable ledger are returned without touching the log.
    async fn verify(&self, saga: &mut Saga, expected: ExpectedTransfer) -> Result<()> {
        if self.log.get(&saga.transfer_id).await?.is_some() {
            warn!(transfer_id = %saga.transfer_id, "Transfer has been processed before");
            return Err(Error::DuplicateTransfer(saga.transfer_id.clone()));
        }

        match self.verifier.verify_transfer(&expected).await? {
            Verification::Valid => {
                saga.advance(SagaStage::Verified);
                Ok(())
            }
            Verification::Mismatch(reason) => {
                warn!(transfer_id = %saga.transfer_id, %reason, "Transaction verification failed");
                self.record(saga.failure(reason.clone())).await;
                Err(Error::VerificationMismatch(reason))
            }
        }
    }

    /// Write the terminal record. Trade outcome stands even if this fails.
    async fn record(&self, record: TransactionRecord) {
        let transfer_id = record.transfer_id.clone();
        if let Err(e) = self.log.insert(record).await {
            error!(%transfer_id, "Failed to write transaction record: {}", e);
        }
    }

    /// Compensating leg: best effort, its own failure is only logged.
    async fn compensate<F>(&self, saga: &mut Saga, leg: F)
    where
        F: std::future::Future<Output = Result<TransferId>>,
    {
        match leg.await {
            Ok(id) => {
                saga.advance(SagaStage::Compensated);
                debug!(transfer_id = %saga.transfer_id, compensation_id = %id, "Compensation sent");
            }
            Err(e) => {
                error!(transfer_id = %saga.transfer_id, "Compensating transfer failed: {}", e);
            }
        }
    }

    /// Record the failure and hand the error back to the caller.
    async fn fail(&self, saga: &Saga, error: Error) -> Error {
        warn!(
            transfer_id = %saga.transfer_id,
            market_id = %saga.market_id,
            stage = %saga.stage,
            "Trade failed: {}",
            error
        );
        self.record(saga.failure(format!("Error executing share {}: {}", saga.kind, error)))
            .await;
        error
    }
}
