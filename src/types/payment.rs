//! Payment records and operation types for the subsidized-payments engine
//!
//! This module defines the stored `Payment` record, its lifecycle status,
//! the flat `OperationRecord` read from CSV input, and the engine-wide
//! monetary constants.

use super::ids::{AccountId, PaymentId};

/// Denominator of the per-mille-like cashback rate: a rate of 200 is 20%
pub const RATE_FACTOR: u64 = 1000;

/// Upper bound for a cashback rate, inclusive
pub const MAX_CASHBACK_RATE: u16 = 500;

/// Cashback amounts are rounded to the nearest multiple of this unit,
/// with exact ties rounding up
pub const CASHBACK_ROUNDING_UNIT: u64 = 10_000;

/// Default per-recipient cashback cap within one reset window
pub const DEFAULT_CASHBACK_CAP: u64 = 300_000_000;

/// Default length of the rolling cashback cap window, in seconds (30 days)
pub const DEFAULT_CAP_RESET_PERIOD_SECS: u64 = 30 * 24 * 60 * 60;

/// Lifecycle status of a payment
///
/// `make` admits identifiers that are unknown or `Revoked`; `Merged` and
/// `Reversed` retire an identifier permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    /// Live payment, accepts update/refund/confirm/revoke/reverse/merge
    Active,

    /// Consolidated into another payment; identifier retired
    Merged,

    /// Cancelled; identifier may be reused by a later `make`
    Revoked,

    /// Cancelled permanently; identifier retired
    Reversed,
}

impl PaymentStatus {
    /// Lowercase name used in CSV output and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Active => "active",
            PaymentStatus::Merged => "merged",
            PaymentStatus::Revoked => "revoked",
            PaymentStatus::Reversed => "reversed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored payment record
///
/// Amount invariants maintained by the engine:
/// - `refund_amount <= base_amount + extra_amount`
/// - `confirmed_amount <= base_amount + extra_amount - refund_amount`
/// - `base_amount + extra_amount` never overflows u64
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Account that ultimately bears the unsubsidized cost
    pub payer: AccountId,

    /// Lifecycle status
    pub status: PaymentStatus,

    /// Cashback-eligible portion of the payment amount
    pub base_amount: u64,

    /// Additional, never cashback-eligible portion
    pub extra_amount: u64,

    /// Cumulative refunded amount
    pub refund_amount: u64,

    /// Amount settled to the cash-out account
    pub confirmed_amount: u64,

    /// Sponsor covering up to `subsidy_limit` of the cost, if any
    pub sponsor: Option<AccountId>,

    /// Maximum amount the sponsor covers; meaningful only with a sponsor
    pub subsidy_limit: u64,

    /// Snapshot of the global cashback toggle, taken at creation
    pub cashback_enabled: bool,

    /// Snapshot of the cashback rate (per `RATE_FACTOR`), taken at creation
    pub cashback_rate: u16,

    /// Cumulative cashback credited to the payer through this payment
    pub cashback_amount: u64,
}

impl Payment {
    /// Total payment amount, `base + extra`
    ///
    /// The engine validates the sum against overflow before storing, so this
    /// cannot wrap for a stored payment.
    pub fn sum(&self) -> u64 {
        self.base_amount + self.extra_amount
    }

    /// Amount not yet refunded, `base + extra - refund`
    pub fn remainder(&self) -> u64 {
        self.sum() - self.refund_amount
    }
}

/// Operation kinds accepted from CSV input
///
/// `Fund` seeds the in-memory asset ledger and is handled by the pipeline,
/// not the engine. The remaining kinds map one-to-one onto engine
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Credit an account on the in-memory asset ledger (pipeline only)
    Fund,

    /// Create a payment, debiting payer and sponsor
    Make,

    /// Change a payment's base/extra amounts
    Update,

    /// Set a payment's cumulative refund amount
    Refund,

    /// Set a payment's confirmed amount, settling funds to cash-out
    Confirm,

    /// Cancel a payment; its identifier becomes reusable
    Revoke,

    /// Cancel a payment; its identifier is retired
    Reverse,

    /// Consolidate a source payment into a target payment
    Merge,
}

/// Flat operation record parsed from one CSV row
///
/// Fields are optional because different operations use different subsets;
/// `io::csv_format` validates presence per operation kind before the record
/// reaches a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// The operation to perform
    pub op: OperationType,

    /// Payment identifier (target identifier for `merge`)
    pub id: Option<PaymentId>,

    /// Payer address for `make`; funded account for `fund`
    pub payer: Option<AccountId>,

    /// Base amount for `make`/`update`
    pub base: Option<u64>,

    /// Extra amount for `make`/`update`
    pub extra: Option<u64>,

    /// Sponsor address for `make`
    pub sponsor: Option<AccountId>,

    /// Subsidy limit for `make`
    pub subsidy_limit: Option<u64>,

    /// Amount for `fund`/`refund`/`confirm`
    pub amount: Option<u64>,

    /// Source payment identifier for `merge`
    pub source: Option<PaymentId>,
}
