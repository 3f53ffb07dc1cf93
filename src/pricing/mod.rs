//! Pricing engine - constant-product bonding curve over (token, other, collateral)
//!
//! The curve holds `k = token_shares * other_shares * collateral` constant across
//! fee-free trades of one share kind. `I = cbrt(k)` is the reported invariant.
//! Every result handed to a trader is floored, so rounding always favours the pool.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Fixed allowance for the external network's own transaction cost.
pub const NETWORK_ALLOWANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 3);

/// Market fee withheld from every sale payout.
pub const SALE_FEE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Snapshot of a pool as seen from the traded share kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveState {
    /// Pool supply of the traded kind
    pub token_shares: u64,
    /// Pool supply of the complementary kind
    pub other_shares: u64,
    /// Collateral held by the pool
    pub collateral: Decimal,
}

impl CurveState {
    pub fn new(token_shares: u64, other_shares: u64, collateral: Decimal) -> Self {
        Self {
            token_shares,
            other_shares,
            collateral,
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.token_shares == 0 || self.other_shares == 0 {
            return Err(Error::InvalidMarketState(format!(
                "share pools must be positive (token={}, other={})",
                self.token_shares, self.other_shares
            )));
        }
        if self.collateral <= Decimal::ZERO {
            return Err(Error::InvalidMarketState(format!(
                "collateral balance must be positive (got {})",
                self.collateral
            )));
        }
        Ok(())
    }

    /// `I^3`, computed before the trade
    fn product(&self) -> Result<Decimal> {
        Decimal::from(self.token_shares)
            .checked_mul(Decimal::from(self.other_shares))
            .and_then(|p| p.checked_mul(self.collateral))
            .ok_or_else(|| Error::Arithmetic("invariant overflow".into()))
    }

    /// `k / (other_shares * denominator)`
    fn solve(&self, denominator: Decimal) -> Result<Decimal> {
        let k = self.product()?;
        Decimal::from(self.other_shares)
            .checked_mul(denominator)
            .and_then(|d| k.checked_div(d))
            .ok_or_else(|| Error::Arithmetic("curve division failed".into()))
    }

    /// Reported invariant `I = cbrt(yes * no * collateral)`
    pub fn invariant(&self) -> Result<f64> {
        let k = self.product()?.to_f64().ok_or_else(|| Error::Arithmetic("invariant not representable".into()))?;
        let i = k.cbrt();
        if !i.is_finite() {
            return Err(Error::Arithmetic("invariant is not finite".into()));
        }
        Ok(i)
    }

    /// Collateral needed to take `desired` shares out of the pool.
    pub fn cost_to_purchase(&self, desired: u64) -> Result<Decimal> {
        self.ensure_valid()?;
        if desired >= self.token_shares {
            return Err(Error::LiquidityExhausted {
                requested: desired,
                available: self.token_shares,
            });
        }

        let new_token = Decimal::from(self.token_shares - desired);
        let new_balance = self.solve(new_token)?;
        Ok(new_balance - self.collateral)
    }

    /// Whole shares released for `collateral_in`; the fractional remainder stays in the pool.
    pub fn shares_for_collateral(&self, collateral_in: Decimal) -> Result<u64> {
        self.ensure_valid()?;
        if collateral_in < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "collateral amount must not be negative (got {})",
                collateral_in
            )));
        }

        let new_balance = self
            .collateral
            .checked_add(collateral_in)
            .ok_or_else(|| Error::Arithmetic("collateral overflow".into()))?;
        let new_token = self.solve(new_balance)?;
        let shares = (Decimal::from(self.token_shares) - new_token)
            .floor()
            .max(Decimal::ZERO);

        shares
            .to_u64()
            .ok_or_else(|| Error::Arithmetic(format!("share amount {} out of range", shares)))
    }

    /// Whole collateral units released for `shares_in` returned to the pool.
    pub fn collateral_for_sale(&self, shares_in: u64) -> Result<Decimal> {
        self.ensure_valid()?;
        let new_token = self
            .token_shares
            .checked_add(shares_in)
            .ok_or_else(|| Error::Arithmetic("share pool overflow".into()))?;

        let new_balance = self.solve(Decimal::from(new_token))?;
        Ok((self.collateral - new_balance).floor().max(Decimal::ZERO))
    }
}

/// Breakdown of a sale payout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalePayout {
    /// Collateral released by the curve
    pub gross: Decimal,
    /// Market fee retained
    pub fee: Decimal,
    /// Network allowance retained
    pub allowance: Decimal,
    /// Paid to the seller
    pub net: Decimal,
}

/// `gross - (0.002 + gross * 0.05)`
pub fn sale_payout(gross: Decimal) -> SalePayout {
    let fee = gross * SALE_FEE_RATE;
    SalePayout {
        gross,
        fee,
        allowance: NETWORK_ALLOWANCE,
        net: gross - (NETWORK_ALLOWANCE + fee),
    }
}

/// Collateral returned to a buyer whose purchase failed after payment.
pub fn refund_amount(amount: Decimal) -> Decimal {
    (amount - NETWORK_ALLOWANCE).max(Decimal::ZERO)
}
