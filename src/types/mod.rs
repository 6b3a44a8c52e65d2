//! Core data types for the subsidized-payments engine
//!
//! This module re-exports the identifier types, the payment record and its
//! lifecycle status, the operation records read from CSV, the engine
//! configuration record, and the error types.

pub mod config;
pub mod error;
pub mod ids;
pub mod payment;

pub use config::EngineConfig;
pub use error::{EngineError, TransferError};
pub use ids::{AccountId, PaymentId};
pub use payment::{
    OperationRecord, OperationType, Payment, PaymentStatus, CASHBACK_ROUNDING_UNIT,
    DEFAULT_CAP_RESET_PERIOD_SECS, DEFAULT_CASHBACK_CAP, MAX_CASHBACK_RATE, RATE_FACTOR,
};
