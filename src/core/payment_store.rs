//! Payment storage with status-aware identifier admission
//!
//! Maintains the map of payment identifiers to stored payments. Terminated
//! payments are retained so that `Merged` and `Reversed` identifiers stay
//! permanently retired, while a `Revoked` slot can be reclaimed by a later
//! make operation.

use crate::types::error::EngineError;
use crate::types::ids::PaymentId;
use crate::types::payment::{Payment, PaymentStatus};
use std::collections::HashMap;

/// In-memory store of payment records
#[derive(Debug, Default)]
pub struct PaymentStore {
    payments: HashMap<PaymentId, Payment>,
}

impl PaymentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `id` can admit a new payment
    ///
    /// Admissible identifiers are unknown ones and those holding a `Revoked`
    /// payment. `Active`, `Merged` and `Reversed` identifiers are rejected,
    /// reporting the actual status found.
    pub fn ensure_admissible(&self, id: PaymentId) -> Result<(), EngineError> {
        match self.payments.get(&id) {
            None => Ok(()),
            Some(existing) if existing.status == PaymentStatus::Revoked => Ok(()),
            Some(existing) => Err(EngineError::PaymentAlreadyExists {
                id,
                status: existing.status,
            }),
        }
    }

    /// Admit a new payment under `id`, replacing a `Revoked` occupant
    pub fn insert(&mut self, id: PaymentId, payment: Payment) -> Result<(), EngineError> {
        self.ensure_admissible(id)?;
        self.payments.insert(id, payment);
        Ok(())
    }

    /// Get a payment in `Active` status
    ///
    /// Reports `PaymentNotFound` for unknown identifiers and
    /// `InappropriateStatus` (with the actual status) otherwise.
    pub fn get_active(&self, id: PaymentId, operation: &str) -> Result<&Payment, EngineError> {
        let payment = self
            .payments
            .get(&id)
            .ok_or_else(|| EngineError::payment_not_found(id, operation))?;
        if payment.status != PaymentStatus::Active {
            return Err(EngineError::inappropriate_status(
                id,
                payment.status,
                operation,
            ));
        }
        Ok(payment)
    }

    /// Mutable variant of [`PaymentStore::get_active`]
    pub fn get_active_mut(
        &mut self,
        id: PaymentId,
        operation: &str,
    ) -> Result<&mut Payment, EngineError> {
        let payment = self
            .payments
            .get_mut(&id)
            .ok_or_else(|| EngineError::payment_not_found(id, operation))?;
        if payment.status != PaymentStatus::Active {
            return Err(EngineError::inappropriate_status(
                id,
                payment.status,
                operation,
            ));
        }
        Ok(payment)
    }

    /// Get a payment regardless of status
    pub fn get(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.get(&id)
    }

    /// All stored payments with their identifiers, sorted by identifier
    ///
    /// Sorted for deterministic CSV output.
    pub fn all_sorted(&self) -> Vec<(PaymentId, &Payment)> {
        let mut entries: Vec<(PaymentId, &Payment)> =
            self.payments.iter().map(|(id, p)| (*id, p)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Iterate over payments currently in `Active` status
    pub fn active_payments(&self) -> impl Iterator<Item = (&PaymentId, &Payment)> {
        self.payments
            .iter()
            .filter(|(_, p)| p.status == PaymentStatus::Active)
    }
}
