//! Core payment processing module
//!
//! This module contains the core subsidized-payment components:
//! - `split` - Payer/sponsor amount and refund splitting
//! - `cashback` - Cashback calculation, rounding and cap tracking
//! - `asset_ledger` - External asset-ledger seam and in-memory implementation
//! - `payment_store` - Payment storage with status-aware identifier admission
//! - `aggregates` - Engine-wide aggregate accounting
//! - `engine` - Payment operation orchestration

pub mod aggregates;
pub mod asset_ledger;
pub mod cashback;
pub mod engine;
pub mod payment_store;
pub mod split;

pub use aggregates::Aggregates;
pub use asset_ledger::{AssetLedger, InMemoryAssetLedger};
pub use cashback::{CashbackStatus, CashbackTracker, Clock, SystemClock};
pub use engine::PaymentEngine;
pub use payment_store::PaymentStore;
pub use split::{split_amount, split_refund, AmountSplit, RefundSplit};
