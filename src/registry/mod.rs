//! Market registry - creation, lookup and read-only quotes
//!
//! Creation issues the two share assets before persisting the market. The
//! issuance calls are not transactional with the store: a failure after the
//! first issuance leaves an orphaned asset behind.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::core::{
    AssetIssuer, Config, Error, Market, MarketId, MarketStore, NewMarket, Result, ShareType,
};
use crate::pricing::{self, CurveState, SalePayout};

/// Shares a purchase would deliver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PurchaseQuote {
    pub collateral: Decimal,
    pub shares: u64,
}

/// Collateral a sale would release
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaleQuote {
    pub shares: u64,
    pub payout: SalePayout,
}

pub struct MarketRegistry {
    store: Arc<dyn MarketStore>,
    issuer: Arc<dyn AssetIssuer>,
    config: Config,
}

impl MarketRegistry {
    pub fn new(store: Arc<dyn MarketStore>, issuer: Arc<dyn AssetIssuer>, config: Config) -> Self {
        Self {
            store,
            issuer,
            config,
        }
    }

    fn validate(&self, params: &NewMarket) -> Result<()> {
        if params.name.trim().is_empty() {
            return Err(Error::Validation("Market name must not be empty".into()));
        }
        if params.share_count == 0 {
            return Err(Error::Validation("Share count must be greater than 0".into()));
        }
        if params.collateral <= Decimal::ZERO || params.collateral < self.config.market.min_collateral {
            return Err(Error::Validation(format!(
                "Collateral must be positive and at least {}",
                self.config.market.min_collateral
            )));
        }

        let now = Utc::now();
        if params.expiry_date <= now {
            return Err(Error::InvalidSchedule("expiry date cannot be in the past".into()));
        }
        let gap = Duration::try_hours(self.config.market.min_resolution_gap_hours).ok_or_else(|| {
            Error::Config("market.min_resolution_gap_hours is out of range".into())
        })?;
        if params.resolution_date - params.expiry_date < gap {
            return Err(Error::InvalidSchedule(format!(
                "resolution date must be at least {} hours after the expiry date",
                self.config.market.min_resolution_gap_hours
            )));
        }

        // the pool must stay priceable in decimal arithmetic
        CurveState::new(params.share_count, params.share_count, params.collateral)
            .invariant()
            .map_err(|e| Error::Validation(format!("Pool too large to price: {}", e)))?;
        Ok(())
    }

    /// Issue both share assets and persist the market.
    pub async fn create_market(&self, params: NewMarket) -> Result<MarketId> {
        self.validate(&params)?;

        let prefix = &self.config.pool.unit_prefix;
        let yes_asset_id = self
            .issuer
            .issue_asset(
                &format!("{}_{}", params.name, ShareType::Yes.label()),
                &format!("{}-{}", prefix, ShareType::Yes.label()),
                params.share_count,
            )
            .await?;
        let no_asset_id = match self
            .issuer
            .issue_asset(
                &format!("{}_{}", params.name, ShareType::No.label()),
                &format!("{}-{}", prefix, ShareType::No.label()),
                params.share_count,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(asset_id = %yes_asset_id, "NO issuance failed, YES asset is orphaned: {}", e);
                return Err(e);
            }
        };

        let invariant = CurveState::new(params.share_count, params.share_count, params.collateral)
            .invariant()
            .unwrap_or_default();
        let market = Market {
            id: MarketId::new(""),
            name: params.name,
            description: params.description,
            share_count: params.share_count,
            yes_shares: params.share_count,
            no_shares: params.share_count,
            collateral_committed: params.collateral,
            collateral_balance: params.collateral,
            yes_asset_id,
            no_asset_id,
            resolved: false,
            expiry_date: params.expiry_date,
            resolution_date: params.resolution_date,
            created_at: Utc::now(),
        };

        let id = match self.store.create(market).await {
            Ok(id) => id,
            Err(e) => {
                error!(%yes_asset_id, %no_asset_id, "Market persistence failed, assets are orphaned: {}", e);
                return Err(e);
            }
        };
        info!(market_id = %id, %yes_asset_id, %no_asset_id, invariant, "Market created");
        Ok(id)
    }

    pub async fn get_market(&self, id: &MarketId) -> Result<Market> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Unordered snapshot; not consistent with concurrent trades
    pub async fn list_markets(&self) -> Result<Vec<Market>> {
        self.store.list_all().await
    }

    pub async fn quote_purchase(
        &self,
        id: &MarketId,
        share_type: ShareType,
        collateral: Decimal,
    ) -> Result<PurchaseQuote> {
        if collateral <= Decimal::ZERO {
            return Err(Error::Validation("Amount must be greater than 0".into()));
        }
        let market = self.get_market(id).await?;
        let shares = market.curve(share_type).shares_for_collateral(collateral)?;
        Ok(PurchaseQuote { collateral, shares })
    }

    /// Collateral required to buy exactly `shares`
    pub async fn quote_purchase_cost(
        &self,
        id: &MarketId,
        share_type: ShareType,
        shares: u64,
    ) -> Result<Decimal> {
        let market = self.get_market(id).await?;
        market.curve(share_type).cost_to_purchase(shares)
    }

    pub async fn quote_sale(&self, id: &MarketId, share_type: ShareType, shares: u64) -> Result<SaleQuote> {
        if shares == 0 {
            return Err(Error::Validation("Shares must be greater than 0".into()));
        }
        let market = self.get_market(id).await?;
        let gross = market.curve(share_type).collateral_for_sale(shares)?;
        Ok(SaleQuote {
            shares,
            payout: pricing::sale_payout(gross),
        })
    }
}
