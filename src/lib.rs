//! Subsidized Payments Engine Library
//! # Overview
//!
//! This library provides a subsidized-payment ledger with cashback
//! accounting, driven either programmatically through [`core::PaymentEngine`]
//! or from CSV operation files implementing both a sync and an async strategy
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Payment, EngineConfig, identifiers, errors)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Payment operation orchestration
//!   - [`core::split`] - Payer/sponsor amount and refund splitting
//!   - [`core::cashback`] - Cashback computation, rounding and cap tracking
//!   - [`core::asset_ledger`] - Asset ledger abstraction and in-memory ledger
//!   - [`core::payment_store`] - Payment state storage
//!   - [`core::aggregates`] - Engine-wide balance aggregates
//! - [`events`] - Versioned binary observability events
//! - [`io`] - I/O handling with pluggable parsing strategies
//! - [`strategy`] - Complete CSV processing pipelines (sync and async)
//!
//! # Operations
//!
//! The engine supports eight payment operations:
//!
//! - **Make**: Create a payment, pulling funds from payer and sponsor into
//!   custody, with optional inline confirmation and a cashback grant
//! - **Update**: Replace the base and extra amounts of an active payment
//! - **Refund**: Raise the cumulative refund, splitting the return between
//!   payer and sponsor
//! - **Confirm**: Move part of the unconfirmed remainder to the cash-out
//!   account (or pull it back when lowered)
//! - **Revoke**: Cancel a payment, returning all unconfirmed funds
//! - **Reverse**: Like revoke, but terminal; the payment id stays burned
//! - **Merge**: Fold a batch of payments into a target payment of the same
//!   payer, preserving amounts and regranting revoked cashback
//!
//! # Amount Model
//!
//! Every payment carries a base amount, an extra amount, a cumulative refund
//! and a confirmed amount, all in integer asset units. A sponsor covers the
//! payment up to its subsidy limit, base first; refunds are split back
//! proportionally to the original split.

// Module declarations
pub mod cli;
pub mod core;
pub mod events;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{Aggregates, AssetLedger, InMemoryAssetLedger, PaymentEngine, PaymentStore};
pub use events::{CashbackEvent, EngineEvent, PaymentEvent};
pub use io::write_payments_csv;
pub use types::{
    AccountId, EngineConfig, EngineError, OperationRecord, OperationType, Payment, PaymentId,
    PaymentStatus,
};
