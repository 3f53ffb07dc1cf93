//! Purchase saga - collateral in, shares out

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::request::{PurchaseOrder, PurchaseRequest};
use super::{Saga, TradeCoordinator};
use crate::core::{
    Error, ExpectedTransfer, Market, RecordDetail, Result, SagaStage, TradeKind, TradeReceipt,
    TransactionRecord, TransferKind,
};
use crate::pricing;

/// Price a purchase against a fresh market snapshot.
/// Returns the updated record and the whole shares released to the buyer.
pub(crate) fn price_purchase(
    market: &Market,
    order: &PurchaseOrder,
    now: DateTime<Utc>,
) -> Result<(Market, u64)> {
    market.ensure_tradable(now)?;

    let curve = market.curve(order.share_type);
    let shares = curve
        .shares_for_collateral(order.amount)
        .map_err(|e| match e {
            Error::Arithmetic(msg) => Error::Arithmetic(format!("Error in shares calculation: {}", msg)),
            other => other,
        })?;

    let minimum = order.minimum_shares();
    if Decimal::from(shares) < minimum {
        return Err(Error::SlippageExceeded {
            actual: Decimal::from(shares),
            minimum,
        });
    }
    if shares == 0 {
        return Err(Error::TradeTooSmall(format!(
            "{} collateral buys no whole share",
            order.amount
        )));
    }
    if shares >= curve.token_shares {
        return Err(Error::LiquidityExhausted {
            requested: shares,
            available: curve.token_shares,
        });
    }

    let mut next = market.clone();
    *next.shares_mut(order.share_type) -= shares;
    next.collateral_balance = market
        .collateral_balance
        .checked_add(order.amount)
        .ok_or_else(|| Error::Arithmetic("Error in calculation of new collateral balance".into()))?;

    Ok((next, shares))
}

impl TradeCoordinator {
    /// Settle a purchase whose collateral payment is already on the ledger.
    pub async fn execute_purchase(&self, request: PurchaseRequest) -> Result<TradeReceipt> {
        let order = request.validate()?;
        let _claim = self.claim(&order.transfer_id)?;
        let mut saga = Saga::new(
            order.transfer_id.clone(),
            order.market_id.clone(),
            TradeKind::Purchase,
        );

        self.verify(
            &mut saga,
            ExpectedTransfer {
                transfer_id: order.transfer_id.clone(),
                sender: order.sender.clone(),
                receiver: self.pool.clone(),
                amount: order.amount,
                kind: TransferKind::Collateral,
            },
        )
        .await?;

        let mut priced = None;
        let committed = self
            .store
            .run_atomic(&order.market_id, &mut |market: &Market| {
                priced = None;
                let (next, shares) = price_purchase(market, &order, Utc::now())?;
                priced = Some(shares);
                Ok(next)
            })
            .await;

        if priced.is_some() {
            saga.advance(SagaStage::Priced);
        }
        let (market, shares) = match (committed, priced) {
            (Ok(market), Some(shares)) => (market, shares),
            (result, _) => {
                let e = result
                    .err()
                    .unwrap_or_else(|| Error::Store("update committed without a price".into()));
                if e.compensates() {
                    self.refund(&mut saga, &order).await;
                }
                return Err(self.fail(&saga, e).await);
            }
        };
        saga.advance(SagaStage::Committed);

        let asset_id = market.asset_id(order.share_type);
        match self
            .settlement
            .transfer_asset(asset_id, shares, &order.sender)
            .await
        {
            Ok(settlement_id) => {
                saga.advance(SagaStage::Settled);
                info!(
                    transfer_id = %order.transfer_id,
                    market_id = %order.market_id,
                    %settlement_id,
                    shares,
                    "Trade executed successfully"
                );
                self.record(TransactionRecord::successful(
                    order.transfer_id.clone(),
                    order.market_id.clone(),
                    TradeKind::Purchase,
                    RecordDetail::Shares(shares),
                ))
                .await;

                Ok(TradeReceipt {
                    transfer_id: order.transfer_id,
                    market_id: order.market_id,
                    kind: TradeKind::Purchase,
                    share_type: order.share_type,
                    shares,
                    collateral: order.amount,
                    payout: None,
                    settlement_id,
                })
            }
            Err(e) => {
                error!(transfer_id = %order.transfer_id, %asset_id, shares, "Share delivery failed: {}", e);
                let reverted = self.revert_purchase(&order, shares).await;
                self.refund(&mut saga, &order).await;
                let reason = match e {
                    Error::Settlement(msg) => msg,
                    other => other.to_string(),
                };
                let reason = match reverted {
                    Ok(()) => reason,
                    Err(revert) => format!("{}; pool revert failed: {}", reason, revert),
                };
                Err(self.fail(&saga, Error::Settlement(reason)).await)
            }
        }
    }

    /// Return the paid collateral minus the network allowance.
    async fn refund(&self, saga: &mut Saga, order: &PurchaseOrder) {
        let amount = pricing::refund_amount(order.amount);
        if amount.is_zero() {
            warn!(transfer_id = %order.transfer_id, paid = %order.amount, "Payment too small to refund");
            return;
        }
        self.compensate(saga, self.settlement.transfer_collateral(amount, &order.sender))
            .await;
    }

    /// Put the delivered shares back into the pool and take the payment out again.
    async fn revert_purchase(&self, order: &PurchaseOrder, shares: u64) -> Result<()> {
        let reverted = self
            .store
            .run_atomic(&order.market_id, &mut |market: &Market| {
                let mut next = market.clone();
                let pool = next.shares_mut(order.share_type);
                *pool = pool
                    .checked_add(shares)
                    .ok_or_else(|| Error::Arithmetic("share pool overflow".into()))?;
                next.collateral_balance -= order.amount;
                if next.collateral_balance < Decimal::ZERO {
                    return Err(Error::InvalidMarketState("collateral balance would go negative".into()));
                }
                Ok(next)
            })
            .await;

        if let Err(e) = &reverted {
            error!(
                transfer_id = %order.transfer_id,
                market_id = %order.market_id,
                "Failed to revert pool after settlement failure: {}",
                e
            );
        }
        reverted.map(|_| ())
    }
}
