//! Binary AMM - Core Library
//! Bonding-curve pricing and trade settlement for yes/no prediction markets

// Public modules
pub mod core;
pub mod pricing;
pub mod registry;
pub mod execution;
pub mod store;
pub mod ledger;

// Re-exports
pub use core::{Config, Error, Result};
pub use execution::{PurchaseRequest, SaleRequest, TradeCoordinator};
pub use registry::MarketRegistry;
