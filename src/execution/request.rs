//! Trade requests and their shape validation

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::core::{Address, Error, MarketId, Result, ShareType, TransferId};

/// Buyer paid `amount` collateral under `transfer_id` and wants `share_type` shares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub transfer_id: TransferId,
    pub sender: Address,
    pub market_id: MarketId,
    pub share_type: String,
    pub amount: Decimal,
    /// Quoted share amount; must be a whole number
    pub expected_shares: Decimal,
    /// Tolerated shortfall as a fraction in [0, 1]
    pub slippage: Decimal,
}

/// Seller delivered `shares` of `share_type` under `transfer_id` and wants collateral
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRequest {
    pub transfer_id: TransferId,
    pub sender: Address,
    pub market_id: MarketId,
    pub share_type: String,
    pub shares: u64,
    /// Quoted gross collateral
    pub expected_collateral: Decimal,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PurchaseOrder {
    pub transfer_id: TransferId,
    pub sender: Address,
    pub market_id: MarketId,
    pub share_type: ShareType,
    pub amount: Decimal,
    pub expected_shares: u64,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SaleOrder {
    pub transfer_id: TransferId,
    pub sender: Address,
    pub market_id: MarketId,
    pub share_type: ShareType,
    pub shares: u64,
    pub expected_collateral: Decimal,
    pub slippage: Decimal,
}

impl PurchaseOrder {
    /// Smallest share amount the buyer accepts
    pub fn minimum_shares(&self) -> Decimal {
        Decimal::from(self.expected_shares) * (Decimal::ONE - self.slippage)
    }
}

impl SaleOrder {
    /// Smallest gross collateral the seller accepts
    pub fn minimum_collateral(&self) -> Decimal {
        self.expected_collateral * (Decimal::ONE - self.slippage)
    }
}

fn check_identity(transfer_id: &TransferId, sender: &Address, market_id: &MarketId) -> Result<()> {
    if transfer_id.as_str().trim().is_empty() {
        return Err(Error::Validation("Transaction ID must not be empty".into()));
    }
    if sender.as_str().trim().is_empty() {
        return Err(Error::Validation("Sender must not be empty".into()));
    }
    if market_id.as_str().trim().is_empty() {
        return Err(Error::Validation("Market ID must not be empty".into()));
    }
    Ok(())
}

fn check_slippage(slippage: Decimal) -> Result<()> {
    if slippage < Decimal::ZERO || slippage > Decimal::ONE {
        return Err(Error::Validation("Invalid slippage allowed".into()));
    }
    Ok(())
}

impl PurchaseRequest {
    pub(crate) fn validate(self) -> Result<PurchaseOrder> {
        check_identity(&self.transfer_id, &self.sender, &self.market_id)?;
        let share_type: ShareType = self.share_type.parse()?;

        if self.expected_shares < Decimal::ZERO || !self.expected_shares.fract().is_zero() {
            return Err(Error::Validation("Invalid expected amount".into()));
        }
        let expected_shares = self
            .expected_shares
            .to_u64()
            .ok_or_else(|| Error::Validation("Invalid expected amount".into()))?;

        check_slippage(self.slippage)?;
        if self.amount <= Decimal::ZERO {
            return Err(Error::Validation("Amount for purchase must be positive".into()));
        }

        Ok(PurchaseOrder {
            transfer_id: self.transfer_id,
            sender: self.sender,
            market_id: self.market_id,
            share_type,
            amount: self.amount,
            expected_shares,
            slippage: self.slippage,
        })
    }
}

impl SaleRequest {
    pub(crate) fn validate(self) -> Result<SaleOrder> {
        check_identity(&self.transfer_id, &self.sender, &self.market_id)?;
        let share_type: ShareType = self.share_type.parse()?;

        if self.expected_collateral < Decimal::ZERO {
            return Err(Error::Validation("Invalid expected amount".into()));
        }
        check_slippage(self.slippage)?;
        if self.shares == 0 {
            return Err(Error::Validation("Shares for sale must be positive".into()));
        }

        Ok(SaleOrder {
            transfer_id: self.transfer_id,
            sender: self.sender,
            market_id: self.market_id,
            share_type,
            shares: self.shares,
            expected_collateral: self.expected_collateral,
            slippage: self.slippage,
        })
    }
}
