//! Error handling - One taxonomy for every trade, quote and market operation

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::types::{MarketId, TransferId};

pub type Result<T> = std::result::Result<T, Error>;

/// Market engine error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request, rejected before any state is touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown market id
    #[error("Market not found: {0}")]
    NotFound(MarketId),

    /// Expiry / resolution dates out of order
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Inbound transfer does not match the request
    #[error("Verification mismatch: {0}")]
    VerificationMismatch(String),

    /// Transfer id already processed (or in flight)
    #[error("Transfer {0} has been processed before")]
    DuplicateTransfer(TransferId),

    #[error("The market has expired")]
    MarketExpired,

    #[error("The market has ended and must be resolved")]
    MarketEnded,

    /// Purchase would drain the pool
    #[error("Liquidity exhausted: requested {requested} shares, pool holds {available}")]
    LiquidityExhausted { requested: u64, available: u64 },

    #[error("Slippage exceeded: got {actual}, minimum allowed {minimum}")]
    SlippageExceeded { actual: Decimal, minimum: Decimal },

    /// Trade too small to produce a whole share or a positive payout
    #[error("Trade too small: {0}")]
    TradeTooSmall(String),

    /// Pool snapshot with non-positive reserves
    #[error("Invalid market state: {0}")]
    InvalidMarketState(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Outbound settlement leg failed
    #[error("Settlement failure: {0}")]
    Settlement(String),

    /// External ledger unreachable or returned garbage
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Market / transaction store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Optimistic update lost the race too many times
    #[error("Store conflict on market {market_id} after {attempts} attempts")]
    StoreConflict { market_id: MarketId, attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller may resubmit (with a fresh transfer) and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Ledger(_) | Error::Store(_) | Error::StoreConflict { .. } | Error::Settlement(_)
        )
    }

    /// Whether this failure, once inbound funds are verified, triggers the compensating leg.
    pub fn compensates(&self) -> bool {
        !matches!(
            self,
            Error::Validation(_)
                | Error::VerificationMismatch(_)
                | Error::DuplicateTransfer(_)
                | Error::Config(_)
        )
    }
}
