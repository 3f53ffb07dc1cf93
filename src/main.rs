use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use binary_amm::core::{Address, NewMarket, ShareType};
use binary_amm::core::config::RunMode;
use binary_amm::ledger::PaperLedger;
use binary_amm::store::{InMemoryMarketStore, InMemoryTransactionLog};
use binary_amm::{Config, MarketRegistry, PurchaseRequest, SaleRequest, TradeCoordinator};

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 1. Logger
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,binary_amm=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // 2. Config
    let config = match std::env::var("BINARY_AMM_CONFIG") {
        Ok(path) => Config::load(Path::new(&path))?,
        Err(_) => Config::load_default(),
    };
    if config.app.mode == RunMode::Live {
        anyhow::bail!("live mode needs a chain-backed ledger; only paper mode is available");
    }

    tracing::info!(pool = %config.pool.account, "Binary AMM starting in paper mode");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    // 3. Wire the paper stack
    let pool = config.pool.account.clone();
    let store = Arc::new(InMemoryMarketStore::new(config.store.max_atomic_retries));
    let log = Arc::new(InMemoryTransactionLog::new());
    let ledger = Arc::new(PaperLedger::new(pool.clone()));

    let registry = MarketRegistry::new(store.clone(), ledger.clone(), config);
    let coordinator = TradeCoordinator::new(
        store.clone(),
        log.clone(),
        ledger.clone(),
        ledger.clone(),
        pool.clone(),
    );

    // 4. Demo market
    let now = Utc::now();
    let market_id = registry
        .create_market(NewMarket {
            name: "Example Market".into(),
            description: "This is an example market".into(),
            share_count: 50_000,
            collateral: Decimal::from(2000),
            expiry_date: now + Duration::days(7),
            resolution_date: now + Duration::days(8),
        })
        .await?;

    let quote = registry
        .quote_purchase(&market_id, ShareType::Yes, Decimal::from(15))
        .await?;
    tracing::info!(collateral = %quote.collateral, shares = quote.shares, "Purchase quote");

    // 5. Buy yes shares, then sell no shares
    let trader = Address::new("TRADER");
    let payment = ledger.submit_payment(&trader, &pool, quote.collateral);
    let receipt = coordinator
        .execute_purchase(PurchaseRequest {
            transfer_id: payment,
            sender: trader.clone(),
            market_id: market_id.clone(),
            share_type: "yes".into(),
            amount: quote.collateral,
            expected_shares: Decimal::from(quote.shares),
            slippage: Decimal::new(1, 1),
        })
        .await?;
    tracing::info!(shares = receipt.shares, settlement_id = %receipt.settlement_id, "Purchase settled");

    let market = registry.get_market(&market_id).await?;
    let sale_quote = registry.quote_sale(&market_id, ShareType::No, 2_000).await?;
    let shares_in = ledger.submit_asset_transfer(market.no_asset_id, &trader, &pool, 2_000);
    match coordinator
        .execute_sale(SaleRequest {
            transfer_id: shares_in,
            sender: trader,
            market_id: market_id.clone(),
            share_type: "no".into(),
            shares: 2_000,
            expected_collateral: sale_quote.payout.gross,
            slippage: Decimal::new(1, 1),
        })
        .await
    {
        Ok(receipt) => tracing::info!(payout = ?receipt.payout, "Sale settled"),
        Err(e) => tracing::warn!("Sale failed: {}", e),
    }

    // 6. Final state
    let market = registry.get_market(&market_id).await?;
    println!("{}", serde_json::to_string_pretty(&market)?);
    println!("{}", serde_json::to_string_pretty(&log.snapshot())?);

    Ok(())
}
