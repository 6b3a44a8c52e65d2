//! Engine-wide aggregate accounting
//!
//! Three running totals serve as system-level invariant checks over the live
//! payment set: the custodied balance (assets held by the engine account),
//! the confirmed total (assets moved to the cash-out account) and the
//! unconfirmed remainder (sum over active payments of
//! `remainder - confirmed`). They are not independently authoritative; the
//! audit helper re-derives them from the payment store so tests can assert
//! they never drift.

use crate::core::payment_store::PaymentStore;
use crate::types::error::EngineError;
use crate::types::ids::PaymentId;

/// Running engine-wide totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aggregates {
    /// Assets currently held by the engine account on behalf of payments
    pub custodied_balance: u64,

    /// Assets settled to the cash-out account
    pub confirmed_total: u64,

    /// Sum over active payments of `remainder - confirmed`
    pub unconfirmed_remainder: u64,
}

impl Aggregates {
    /// Create zeroed aggregates
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed delta to the custodied balance
    pub fn adjust_custodied(&mut self, delta: i128, id: PaymentId) -> Result<(), EngineError> {
        self.custodied_balance = apply_delta(self.custodied_balance, delta)
            .ok_or_else(|| EngineError::amount_overflow(id, "custodied balance"))?;
        Ok(())
    }

    /// Apply a signed delta to the confirmed total
    pub fn adjust_confirmed(&mut self, delta: i128, id: PaymentId) -> Result<(), EngineError> {
        self.confirmed_total = apply_delta(self.confirmed_total, delta)
            .ok_or_else(|| EngineError::amount_overflow(id, "confirmed total"))?;
        Ok(())
    }

    /// Apply a signed delta to the unconfirmed remainder
    pub fn adjust_unconfirmed(&mut self, delta: i128, id: PaymentId) -> Result<(), EngineError> {
        self.unconfirmed_remainder = apply_delta(self.unconfirmed_remainder, delta)
            .ok_or_else(|| EngineError::amount_overflow(id, "unconfirmed remainder"))?;
        Ok(())
    }

    /// Re-derive the confirmed total and unconfirmed remainder from the live
    /// payment set and compare with the running values
    ///
    /// Returns the derived `(confirmed_total, unconfirmed_remainder)` pair;
    /// equality with the stored values is the invariant tests assert.
    pub fn derive_from(&self, store: &PaymentStore) -> (u64, u64) {
        let mut confirmed = 0u64;
        let mut unconfirmed = 0u64;
        for (_, payment) in store.active_payments() {
            confirmed += payment.confirmed_amount;
            unconfirmed += payment.remainder() - payment.confirmed_amount;
        }
        (confirmed, unconfirmed)
    }
}

/// Apply a signed 128-bit delta to a u64 total, checking both directions
fn apply_delta(value: u64, delta: i128) -> Option<u64> {
    let next = value as i128 + delta;
    u64::try_from(next).ok()
}
