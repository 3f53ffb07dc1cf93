//! Paper ledger - in-process stand-in for the external chain
//!
//! Holds completed transfers, issues assets and executes outbound legs from the
//! pool account. Used by paper mode and by tests; failures can be injected to
//! drive the compensation paths.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

use crate::core::{
    Address, AssetId, AssetIssuer, Error, ExpectedTransfer, LedgerVerifier, Result, Settlement,
    TransferId, TransferKind, Verification,
};

/// A completed transfer on the paper ledger
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransfer {
    pub id: TransferId,
    pub sender: Address,
    pub receiver: Address,
    pub amount: Decimal,
    pub kind: TransferKind,
}

/// An asset created through `AssetIssuer`
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedAsset {
    pub id: AssetId,
    pub name: String,
    pub unit_label: String,
    pub total_supply: u64,
}

pub struct PaperLedger {
    pool: Address,
    transfers: Arc<RwLock<HashMap<TransferId, LedgerTransfer>>>,
    /// Outbound legs in submission order
    outbound: Arc<RwLock<Vec<TransferId>>>,
    assets: Arc<RwLock<Vec<IssuedAsset>>>,
    next_asset: AtomicU64,
    fail_settlement: AtomicBool,
    /// Outbound legs still to be rejected
    fail_next: AtomicU32,
    fail_issuance: AtomicBool,
}

impl PaperLedger {
    pub fn new(pool: Address) -> Self {
        Self {
            pool,
            transfers: Arc::new(RwLock::new(HashMap::new())),
            outbound: Arc::new(RwLock::new(Vec::new())),
            assets: Arc::new(RwLock::new(Vec::new())),
            next_asset: AtomicU64::new(1_000),
            fail_settlement: AtomicBool::new(false),
            fail_next: AtomicU32::new(0),
            fail_issuance: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &Address {
        &self.pool
    }

    /// Record a client-side collateral payment (the inbound leg of a purchase).
    pub fn submit_payment(&self, sender: &Address, receiver: &Address, amount: Decimal) -> TransferId {
        self.book(sender.clone(), receiver.clone(), amount, TransferKind::Collateral)
    }

    /// Record a client-side asset transfer (the inbound leg of a sale).
    pub fn submit_asset_transfer(
        &self,
        asset_id: AssetId,
        sender: &Address,
        receiver: &Address,
        amount: u64,
    ) -> TransferId {
        self.book(
            sender.clone(),
            receiver.clone(),
            Decimal::from(amount),
            TransferKind::Asset(asset_id),
        )
    }

    fn book(&self, sender: Address, receiver: Address, amount: Decimal, kind: TransferKind) -> TransferId {
        let id = TransferId::new(Uuid::new_v4().simple().to_string().to_uppercase());
        let transfer = LedgerTransfer {
            id: id.clone(),
            sender,
            receiver,
            amount,
            kind,
        };
        self.transfers.write().insert(id.clone(), transfer);
        id
    }

    pub fn transfer(&self, id: &TransferId) -> Option<LedgerTransfer> {
        self.transfers.read().get(id).cloned()
    }

    /// Outbound legs paid from the pool, oldest first
    pub fn outbound(&self) -> Vec<LedgerTransfer> {
        let transfers = self.transfers.read();
        self.outbound
            .read()
            .iter()
            .filter_map(|id| transfers.get(id).cloned())
            .collect()
    }

    pub fn issued_assets(&self) -> Vec<IssuedAsset> {
        self.assets.read().clone()
    }

    pub fn set_fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    /// Reject only the next `count` outbound legs.
    pub fn fail_next_settlements(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_issuance(&self, fail: bool) {
        self.fail_issuance.store(fail, Ordering::SeqCst);
    }

    fn pay_out(&self, recipient: &Address, amount: Decimal, kind: TransferKind) -> Result<TransferId> {
        let scheduled = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled || self.fail_settlement.load(Ordering::SeqCst) {
            return Err(Error::Settlement("paper ledger rejected transfer".into()));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::Settlement(format!("non-positive transfer amount {}", amount)));
        }
        let id = self.book(self.pool.clone(), recipient.clone(), amount, kind);
        self.outbound.write().push(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl LedgerVerifier for PaperLedger {
    async fn verify_transfer(&self, expected: &ExpectedTransfer) -> Result<Verification> {
        let Some(actual) = self.transfer(&expected.transfer_id) else {
            return Ok(Verification::Mismatch("Transaction not found".into()));
        };

        let same_type = matches!(
            (actual.kind, expected.kind),
            (TransferKind::Collateral, TransferKind::Collateral)
                | (TransferKind::Asset(_), TransferKind::Asset(_))
        );
        if !same_type {
            return Ok(Verification::Mismatch("Transaction type mismatch".into()));
        }

        if actual.kind != expected.kind
            || actual.sender != expected.sender
            || actual.receiver != expected.receiver
            || actual.amount != expected.amount
        {
            return Ok(Verification::Mismatch("Transaction Data mismatch".into()));
        }

        Ok(Verification::Valid)
    }
}

#[async_trait]
impl AssetIssuer for PaperLedger {
    async fn issue_asset(&self, name: &str, unit_label: &str, total_supply: u64) -> Result<AssetId> {
        if self.fail_issuance.load(Ordering::SeqCst) {
            return Err(Error::Ledger("asset issuance rejected".into()));
        }
        let id = AssetId(self.next_asset.fetch_add(1, Ordering::SeqCst));
        self.assets.write().push(IssuedAsset {
            id,
            name: name.to_string(),
            unit_label: unit_label.to_string(),
            total_supply,
        });
        info!(asset_id = %id, name, unit_label, total_supply, "Issued asset");
        Ok(id)
    }
}

#[async_trait]
impl Settlement for PaperLedger {
    async fn transfer_collateral(&self, amount: Decimal, recipient: &Address) -> Result<TransferId> {
        self.pay_out(recipient, amount, TransferKind::Collateral)
    }

    async fn transfer_asset(
        &self,
        asset_id: AssetId,
        amount: u64,
        recipient: &Address,
    ) -> Result<TransferId> {
        self.pay_out(recipient, Decimal::from(amount), TransferKind::Asset(asset_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::new("ALICE")
    }

    fn expected(id: TransferId, amount: Decimal, kind: TransferKind) -> ExpectedTransfer {
        ExpectedTransfer {
            transfer_id: id,
            sender: alice(),
            receiver: Address::new("POOL"),
            amount,
            kind,
        }
    }

    #[tokio::test]
    async fn test_verify_matching_payment() {
        let ledger = PaperLedger::new(Address::new("POOL"));
        let id = ledger.submit_payment(&alice(), ledger.pool(), Decimal::from(15));
        let v = ledger
            .verify_transfer(&expected(id, Decimal::from(15), TransferKind::Collateral))
            .await
            .unwrap();
        assert_eq!(v, Verification::Valid);
    }

    #[tokio::test]
    async fn test_verify_mismatches() {
        let ledger = PaperLedger::new(Address::new("POOL"));
        let pay = ledger.submit_payment(&alice(), ledger.pool(), Decimal::from(15));

        let wrong_amount = ledger
            .verify_transfer(&expected(pay.clone(), Decimal::from(16), TransferKind::Collateral))
            .await
            .unwrap();
        assert_eq!(wrong_amount, Verification::Mismatch("Transaction Data mismatch".into()));

        let wrong_type = ledger
            .verify_transfer(&expected(pay, Decimal::from(15), TransferKind::Asset(AssetId(1))))
            .await
            .unwrap();
        assert_eq!(wrong_type, Verification::Mismatch("Transaction type mismatch".into()));

        let axfer = ledger.submit_asset_transfer(AssetId(7), &alice(), ledger.pool(), 200);
        let wrong_asset = ledger
            .verify_transfer(&expected(axfer, Decimal::from(200), TransferKind::Asset(AssetId(8))))
            .await
            .unwrap();
        assert_eq!(wrong_asset, Verification::Mismatch("Transaction Data mismatch".into()));

        let missing = ledger
            .verify_transfer(&expected(TransferId::new("nope"), Decimal::ONE, TransferKind::Collateral))
            .await
            .unwrap();
        assert!(matches!(missing, Verification::Mismatch(_)));
    }

    #[tokio::test]
    async fn test_outbound_and_failure_injection() {
        let ledger = PaperLedger::new(Address::new("POOL"));
        ledger.transfer_collateral(Decimal::from(3), &alice()).await.unwrap();
        ledger.transfer_asset(AssetId(5), 40, &alice()).await.unwrap();
        assert_eq!(ledger.outbound().len(), 2);

        ledger.set_fail_settlement(true);
        assert!(matches!(
            ledger.transfer_collateral(Decimal::ONE, &alice()).await,
            Err(Error::Settlement(_))
        ));
        ledger.set_fail_settlement(false);
        assert!(ledger.transfer_collateral(Decimal::ZERO, &alice()).await.is_err());
        assert_eq!(ledger.outbound().len(), 2);

        ledger.fail_next_settlements(1);
        assert!(ledger.transfer_asset(AssetId(5), 1, &alice()).await.is_err());
        assert!(ledger.transfer_asset(AssetId(5), 1, &alice()).await.is_ok());
        assert_eq!(ledger.outbound().len(), 3);
    }

    #[tokio::test]
    async fn test_issue_distinct_assets() {
        let ledger = PaperLedger::new(Address::new("POOL"));
        let yes = ledger.issue_asset("Rain_YES", "xmp-YES", 500).await.unwrap();
        let no = ledger.issue_asset("Rain_NO", "xmp-NO", 500).await.unwrap();
        assert_ne!(yes, no);
        assert_eq!(ledger.issued_assets().len(), 2);
    }
}
