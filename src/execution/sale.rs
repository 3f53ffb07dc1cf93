//! Sale saga - shares in, collateral out

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info};

use super::request::{SaleOrder, SaleRequest};
use super::{Saga, TradeCoordinator};
use crate::core::{
    AssetId, Error, ExpectedTransfer, Market, RecordDetail, Result, SagaStage, TradeKind,
    TradeReceipt, TransactionRecord, TransferKind,
};
use crate::pricing::{self, SalePayout};

/// Price a sale against a fresh market snapshot.
/// The pool gives up the gross amount; the fee is simply not paid out.
pub(crate) fn price_sale(
    market: &Market,
    order: &SaleOrder,
    now: DateTime<Utc>,
) -> Result<(Market, SalePayout)> {
    market.ensure_tradable(now)?;

    let gross = market
        .curve(order.share_type)
        .collateral_for_sale(order.shares)?;

    let minimum = order.minimum_collateral();
    if gross < minimum {
        return Err(Error::SlippageExceeded {
            actual: gross,
            minimum,
        });
    }

    let payout = pricing::sale_payout(gross);
    if payout.net <= Decimal::ZERO {
        return Err(Error::TradeTooSmall(format!(
            "payout of {} does not cover fee and network allowance",
            gross
        )));
    }

    let mut next = market.clone();
    let pool = next.shares_mut(order.share_type);
    *pool = pool
        .checked_add(order.shares)
        .ok_or_else(|| Error::Arithmetic("share pool overflow".into()))?;
    next.collateral_balance = market.collateral_balance - gross;
    if next.collateral_balance < Decimal::ZERO {
        return Err(Error::InvalidMarketState("collateral balance would go negative".into()));
    }

    Ok((next, payout))
}

impl TradeCoordinator {
    /// Settle a sale whose share transfer is already on the ledger.
    pub async fn execute_sale(&self, request: SaleRequest) -> Result<TradeReceipt> {
        let order = request.validate()?;
        let _claim = self.claim(&order.transfer_id)?;
        let mut saga = Saga::new(
            order.transfer_id.clone(),
            order.market_id.clone(),
            TradeKind::Sale,
        );

        // asset ids are immutable, a plain read is enough to know what to verify
        let asset_id = self
            .store
            .get(&order.market_id)
            .await?
            .ok_or_else(|| Error::NotFound(order.market_id.clone()))?
            .asset_id(order.share_type);

        self.verify(
            &mut saga,
            ExpectedTransfer {
                transfer_id: order.transfer_id.clone(),
                sender: order.sender.clone(),
                receiver: self.pool.clone(),
                amount: Decimal::from(order.shares),
                kind: TransferKind::Asset(asset_id),
            },
        )
        .await?;

        let mut priced = None;
        let committed = self
            .store
            .run_atomic(&order.market_id, &mut |market: &Market| {
                priced = None;
                let (next, payout) = price_sale(market, &order, Utc::now())?;
                priced = Some(payout);
                Ok(next)
            })
            .await;

        if priced.is_some() {
            saga.advance(SagaStage::Priced);
        }
        let payout = match (committed, priced) {
            (Ok(_), Some(payout)) => payout,
            (result, _) => {
                let e = result
                    .err()
                    .unwrap_or_else(|| Error::Store("update committed without a price".into()));
                if e.compensates() {
                    self.return_shares(&mut saga, &order, asset_id).await;
                }
                return Err(self.fail(&saga, e).await);
            }
        };
        saga.advance(SagaStage::Committed);

        match self
            .settlement
            .transfer_collateral(payout.net, &order.sender)
            .await
        {
            Ok(settlement_id) => {
                saga.advance(SagaStage::Settled);
                info!(
                    transfer_id = %order.transfer_id,
                    market_id = %order.market_id,
                    %settlement_id,
                    gross = %payout.gross,
                    net = %payout.net,
                    "Trade executed successfully"
                );
                self.record(TransactionRecord::successful(
                    order.transfer_id.clone(),
                    order.market_id.clone(),
                    TradeKind::Sale,
                    RecordDetail::Collateral(payout.gross),
                ))
                .await;

                Ok(TradeReceipt {
                    transfer_id: order.transfer_id,
                    market_id: order.market_id,
                    kind: TradeKind::Sale,
                    share_type: order.share_type,
                    shares: order.shares,
                    collateral: payout.gross,
                    payout: Some(payout.net),
                    settlement_id,
                })
            }
            Err(e) => {
                error!(transfer_id = %order.transfer_id, net = %payout.net, "Collateral payout failed: {}", e);
                let reverted = self.revert_sale(&order, payout.gross).await;
                self.return_shares(&mut saga, &order, asset_id).await;
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

    /// Send the verified shares back to the seller.
    async fn return_shares(&self, saga: &mut Saga, order: &SaleOrder, asset_id: AssetId) {
        self.compensate(
            saga,
            self.settlement
                .transfer_asset(asset_id, order.shares, &order.sender),
        )
        .await;
    }

    /// Take the sold shares back out of the pool and restore the released collateral.
    async fn revert_sale(&self, order: &SaleOrder, gross: Decimal) -> Result<()> {
        let reverted = self
            .store
            .run_atomic(&order.market_id, &mut |market: &Market| {
                let mut next = market.clone();
                let pool = next.shares_mut(order.share_type);
                *pool = pool.checked_sub(order.shares).ok_or_else(|| {
                    Error::InvalidMarketState("share pool would go negative".into())
                })?;
                next.collateral_balance += gross;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, MarketId, ShareType, TransferId};
    use chrono::Duration;

    fn market() -> Market {
        let now = Utc::now();
        Market {
            id: MarketId::new("m"),
            name: "Example Market".into(),
            description: "This is an example market".into(),
            share_count: 50_000,
            yes_shares: 50_000,
            no_shares: 50_000,
            collateral_committed: Decimal::from(2000),
            collateral_balance: Decimal::from(2000),
            yes_asset_id: AssetId(1),
            no_asset_id: AssetId(2),
            resolved: false,
            expiry_date: now + Duration::days(1),
            resolution_date: now + Duration::days(2),
            created_at: now,
        }
    }

    fn order(shares: u64, expected: Decimal) -> SaleOrder {
        SaleOrder {
            transfer_id: TransferId::new("tx"),
            sender: Address::new("SELLER"),
            market_id: MarketId::new("m"),
            share_type: ShareType::No,
            shares,
            expected_collateral: expected,
            slippage: Decimal::new(1, 1),
        }
    }

    #[test]
    fn test_example_sale_exceeds_slippage() {
        let err = price_sale(&market(), &order(200, Decimal::new(113, 1)), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::SlippageExceeded { .. }));
    }

    #[test]
    fn test_price_sale_moves_pool() {
        let (next, payout) = price_sale(&market(), &order(2_000, Decimal::from(70)), Utc::now()).unwrap();
        // 2000 - 1e8 / 52000 = 76.92 -> 76
        assert_eq!(payout.gross, Decimal::from(76));
        assert_eq!(payout.net, Decimal::new(72198, 3));
        assert_eq!(next.no_shares, 52_000);
        assert_eq!(next.yes_shares, 50_000);
        assert_eq!(next.collateral_balance, Decimal::from(1924));
    }

    #[test]
    fn test_price_sale_dust() {
        assert!(matches!(
            price_sale(&market(), &order(1, Decimal::ZERO), Utc::now()),
            Err(Error::TradeTooSmall(_))
        ));
    }

    #[test]
    fn test_price_sale_after_resolution() {
        let now = Utc::now() + Duration::days(5);
        assert!(matches!(
            price_sale(&market(), &order(2_000, Decimal::ZERO), now),
            Err(Error::MarketEnded)
        ));
    }
}
