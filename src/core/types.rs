//! Core types - Strong typing for markets, transfers and trade records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::pricing::CurveState;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Opaque market id, assigned by the store on creation
    MarketId
);
string_id!(
    /// External ledger transfer id; doubles as the idempotency key of a trade
    TransferId
);
string_id!(
    /// Ledger account address
    Address
);

/// External asset identifier (one per share kind per market)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Share kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    Yes,
    No,
}

impl ShareType {
    pub fn other(self) -> Self {
        match self {
            ShareType::Yes => ShareType::No,
            ShareType::No => ShareType::Yes,
        }
    }

    /// Upper-case label used in asset names
    pub fn label(self) -> &'static str {
        match self {
            ShareType::Yes => "YES",
            ShareType::No => "NO",
        }
    }
}

impl std::str::FromStr for ShareType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(ShareType::Yes),
            "no" => Ok(ShareType::No),
            _ => Err(Error::Validation(format!("Invalid share type: {}", s))),
        }
    }
}

impl std::fmt::Display for ShareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareType::Yes => write!(f, "yes"),
            ShareType::No => write!(f, "no"),
        }
    }
}

/// Binary-outcome market record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub name: String,
    pub description: String,
    /// Initial supply of each share kind
    pub share_count: u64,
    /// Pool liquidity available for purchase
    pub yes_shares: u64,
    pub no_shares: u64,
    /// Initial collateral committed by the creator
    pub collateral_committed: Decimal,
    /// Collateral currently held by the pool
    pub collateral_balance: Decimal,
    pub yes_asset_id: AssetId,
    pub no_asset_id: AssetId,
    pub resolved: bool,
    pub expiry_date: DateTime<Utc>,
    pub resolution_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Market {
    pub fn shares(&self, share_type: ShareType) -> u64 {
        match share_type {
            ShareType::Yes => self.yes_shares,
            ShareType::No => self.no_shares,
        }
    }

    pub fn shares_mut(&mut self, share_type: ShareType) -> &mut u64 {
        match share_type {
            ShareType::Yes => &mut self.yes_shares,
            ShareType::No => &mut self.no_shares,
        }
    }

    pub fn asset_id(&self, share_type: ShareType) -> AssetId {
        match share_type {
            ShareType::Yes => self.yes_asset_id,
            ShareType::No => self.no_asset_id,
        }
    }

    /// Pricing snapshot from the point of view of `share_type`
    pub fn curve(&self, share_type: ShareType) -> CurveState {
        CurveState {
            token_shares: self.shares(share_type),
            other_shares: self.shares(share_type.other()),
            collateral: self.collateral_balance,
        }
    }

    /// Trading window check: resolution first, then expiry.
    pub fn ensure_tradable(&self, now: DateTime<Utc>) -> Result<()> {
        if now > self.resolution_date {
            return Err(Error::MarketEnded);
        }
        if now > self.expiry_date {
            return Err(Error::MarketExpired);
        }
        Ok(())
    }
}

/// Parameters for a new market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMarket {
    pub name: String,
    pub description: String,
    pub share_count: u64,
    pub collateral: Decimal,
    pub expiry_date: DateTime<Utc>,
    pub resolution_date: DateTime<Utc>,
}

/// What the inbound leg of a trade carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Collateral payment
    Collateral,
    /// Share asset transfer
    Asset(AssetId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Purchase,
    Sale,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Purchase => write!(f, "purchase"),
            TradeKind::Sale => write!(f, "sale"),
        }
    }
}

/// Saga progress of a single trade request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaStage {
    Received,
    Verified,
    Priced,
    Committed,
    Settled,
    Compensated,
}

impl std::fmt::Display for SagaStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SagaStage::Received => "received",
            SagaStage::Verified => "verified",
            SagaStage::Priced => "priced",
            SagaStage::Committed => "committed",
            SagaStage::Settled => "settled",
            SagaStage::Compensated => "compensated",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Successful,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordDetail {
    /// Shares delivered to a buyer
    Shares(u64),
    /// Gross collateral released by a sale
    Collateral(Decimal),
    Reason(String),
}

/// Terminal record of a trade attempt, keyed by the inbound transfer id. Written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transfer_id: TransferId,
    pub market_id: MarketId,
    pub kind: TradeKind,
    pub status: TransactionStatus,
    pub detail: RecordDetail,
    /// Stage the saga ended in (`Compensated` once the compensating transfer went out)
    pub stage: SagaStage,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn successful(
        transfer_id: TransferId,
        market_id: MarketId,
        kind: TradeKind,
        detail: RecordDetail,
    ) -> Self {
        Self {
            transfer_id,
            market_id,
            kind,
            status: TransactionStatus::Successful,
            detail,
            stage: SagaStage::Settled,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(
        transfer_id: TransferId,
        market_id: MarketId,
        kind: TradeKind,
        stage: SagaStage,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            transfer_id,
            market_id,
            kind,
            status: TransactionStatus::Failed,
            detail: RecordDetail::Reason(reason.into()),
            stage,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Successful
    }
}

/// Result of a settled trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub transfer_id: TransferId,
    pub market_id: MarketId,
    pub kind: TradeKind,
    pub share_type: ShareType,
    pub shares: u64,
    /// Collateral paid in (purchase) or gross collateral released (sale)
    pub collateral: Decimal,
    /// Collateral actually paid out to a seller after fee and allowance
    pub payout: Option<Decimal>,
    pub settlement_id: TransferId,
}
