//! Error types for the subsidized-payments engine
//!
//! # Error categories
//!
//! - **Validation**: zero id/address/amount, empty batch, refund or confirm
//!   amounts exceeding their bound, fixed-width overflow of a sum.
//! - **State**: operation attempted on a payment not in the required status;
//!   always reports the actual status found.
//! - **Consistency**: merge precondition violations.
//! - **Configuration**: treasury/cash-out account unset, or a setter that
//!   would not change anything.
//! - **Resource**: surfaced by the external asset ledger as
//!   [`TransferError`], never generated by the core. Fatal for primary
//!   debits; absorbed as a recorded status for cashback sub-transfers.
//!
//! No category is retried automatically.

use super::ids::{AccountId, PaymentId};
use super::payment::PaymentStatus;
use thiserror::Error;

/// Failure reported by the external asset ledger's transfer primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The source account does not hold enough of the asset
    #[error("insufficient balance on account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Debited account
        account: AccountId,
        /// Balance at the time of the transfer
        balance: u64,
        /// Requested transfer amount
        requested: u64,
    },

    /// The source account has not authorized a large enough transfer
    #[error(
        "insufficient allowance on account {account}: allowance {allowance}, requested {requested}"
    )]
    InsufficientAllowance {
        /// Debited account
        account: AccountId,
        /// Authorized amount at the time of the transfer
        allowance: u64,
        /// Requested transfer amount
        requested: u64,
    },

    /// The ledger call itself failed
    #[error("asset transfer rejected: {reason}")]
    Rejected {
        /// Ledger-provided failure description
        reason: String,
    },
}

/// Main error type for the payments engine
///
/// Every variant carries enough context to diagnose the rejected operation.
/// All errors are fatal to the requesting operation: no partial mutation is
/// ever left behind (the single documented exception, cashback sub-transfer
/// failure, is absorbed as a status and never raised as an error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The zero payment identifier was supplied
    #[error("payment id must not be zero")]
    ZeroPaymentId,

    /// The zero address was supplied where an account is required
    #[error("zero address supplied for {context}")]
    ZeroAccountAddress {
        /// Which account field was zero (payer, sponsor, treasury, ...)
        context: String,
    },

    /// A make operation with `base + extra == 0`
    #[error("payment {id} has zero amount")]
    ZeroPaymentAmount {
        /// Payment identifier
        id: PaymentId,
    },

    /// A batched entry point received no items
    #[error("empty batch for {operation}")]
    EmptyBatch {
        /// Batched operation name
        operation: String,
    },

    /// A sum or subsidy limit exceeds the fixed-width (u64) bound
    #[error("amount overflow in {operation} for payment {id}")]
    AmountOverflow {
        /// Payment identifier
        id: PaymentId,
        /// Operation in which the overflow occurred
        operation: String,
    },

    /// Cumulative refund amount exceeds `base + extra`
    #[error("refund {refund} exceeds payment sum {sum} for payment {id}")]
    RefundExceedsSum {
        /// Payment identifier
        id: PaymentId,
        /// Requested cumulative refund
        refund: u64,
        /// Current `base + extra`
        sum: u64,
    },

    /// New base/extra would drop below the already-refunded amount
    #[error("new sum {sum} is below refunded amount {refund} for payment {id}")]
    SumBelowRefund {
        /// Payment identifier
        id: PaymentId,
        /// New `base + extra`
        sum: u64,
        /// Already-refunded amount
        refund: u64,
    },

    /// Confirmation amount exceeds the unrefunded remainder
    #[error("confirmed amount {requested} exceeds remainder {remainder} for payment {id}")]
    ConfirmExceedsRemainder {
        /// Payment identifier
        id: PaymentId,
        /// Requested confirmed amount
        requested: u64,
        /// Current `base + extra - refund`
        remainder: u64,
    },

    /// Cashback rate outside `[0, MAX_CASHBACK_RATE]`
    #[error("cashback rate {rate} exceeds maximum {max}")]
    RateOutOfRange {
        /// Rejected rate
        rate: u16,
        /// Inclusive maximum
        max: u16,
    },

    /// Make on an identifier that is still live or permanently retired
    #[error("payment {id} already exists with status {status}")]
    PaymentAlreadyExists {
        /// Payment identifier
        id: PaymentId,
        /// Actual status found
        status: PaymentStatus,
    },

    /// Operation on an identifier with no stored payment
    #[error("payment {id} not found for {operation}")]
    PaymentNotFound {
        /// Payment identifier
        id: PaymentId,
        /// Operation that failed
        operation: String,
    },

    /// Operation on a payment not in the required status
    #[error("payment {id} has status {status}, not active ({operation})")]
    InappropriateStatus {
        /// Payment identifier
        id: PaymentId,
        /// Actual status found
        status: PaymentStatus,
        /// Operation that failed
        operation: String,
    },

    // Fields below are named source_id, not source: thiserror reserves a
    // field named `source` for the error cause chain

    /// Merge source belongs to a different payer than the target
    #[error(
        "merge source {source_id} payer {source_payer} does not match target payer {target_payer}"
    )]
    MergePayerMismatch {
        /// Source payment identifier
        source_id: PaymentId,
        /// Source payment's payer
        source_payer: AccountId,
        /// Target payment's payer
        target_payer: AccountId,
    },

    /// Merge source cashback rate exceeds the target's
    #[error("merge source {source_id} rate {source_rate} exceeds target rate {target_rate}")]
    MergeRateMismatch {
        /// Source payment identifier
        source_id: PaymentId,
        /// Source payment's snapshot rate
        source_rate: u16,
        /// Target payment's snapshot rate
        target_rate: u16,
    },

    /// Merge source id listed more than once
    #[error("merge source {id} appears more than once")]
    MergeDuplicateSource {
        /// Duplicated source identifier
        id: PaymentId,
    },

    /// Merge source id equals the target id
    #[error("payment {id} cannot be merged into itself")]
    MergeWithItself {
        /// Offending identifier
        id: PaymentId,
    },

    /// Merge target carries a sponsor
    #[error("merge target {id} is subsidized")]
    MergeSponsoredTarget {
        /// Target payment identifier
        id: PaymentId,
    },

    /// A confirm operation requires the cash-out account to be configured
    #[error("cash-out account is not configured")]
    CashOutAccountUnset,

    /// A cashback movement requires the treasury account to be configured
    #[error("cashback treasury account is not configured")]
    TreasuryAccountUnset,

    /// A configuration setter would not change the stored value
    #[error("configuration value for {setting} is unchanged")]
    ConfigurationUnchanged {
        /// Configuration field name
        setting: String,
    },

    /// Primary debit or credit failed on the external asset ledger
    #[error("asset ledger transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

// Helper functions for errors carrying owned strings

impl EngineError {
    /// Create a ZeroAccountAddress error
    pub fn zero_address(context: &str) -> Self {
        EngineError::ZeroAccountAddress {
            context: context.to_string(),
        }
    }

    /// Create an EmptyBatch error
    pub fn empty_batch(operation: &str) -> Self {
        EngineError::EmptyBatch {
            operation: operation.to_string(),
        }
    }

    /// Create an AmountOverflow error
    pub fn amount_overflow(id: PaymentId, operation: &str) -> Self {
        EngineError::AmountOverflow {
            id,
            operation: operation.to_string(),
        }
    }

    /// Create a PaymentNotFound error
    pub fn payment_not_found(id: PaymentId, operation: &str) -> Self {
        EngineError::PaymentNotFound {
            id,
            operation: operation.to_string(),
        }
    }

    /// Create an InappropriateStatus error
    pub fn inappropriate_status(id: PaymentId, status: PaymentStatus, operation: &str) -> Self {
        EngineError::InappropriateStatus {
            id,
            status,
            operation: operation.to_string(),
        }
    }

    /// Create a ConfigurationUnchanged error
    pub fn configuration_unchanged(setting: &str) -> Self {
        EngineError::ConfigurationUnchanged {
            setting: setting.to_string(),
        }
    }
}
