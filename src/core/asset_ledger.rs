//! External asset-ledger seam
//!
//! The engine never holds balances itself; it moves them through an
//! [`AssetLedger`] implementation exposing a single transfer primitive that
//! can fail. The in-memory implementation backs the CLI pipeline and the
//! test suite; production deployments plug in a real ledger behind the same
//! trait.

use crate::types::error::TransferError;
use crate::types::ids::AccountId;
use std::collections::HashMap;

/// External fungible-asset ledger
///
/// `transfer` either moves the full amount or fails without effect. The
/// engine treats failures as resource errors: fatal for primary debits,
/// absorbed as a recorded status for cashback sub-transfers.
pub trait AssetLedger {
    /// Move `amount` from one account to another
    fn transfer(&mut self, from: AccountId, to: AccountId, amount: u64)
        -> Result<(), TransferError>;

    /// Current balance of an account
    fn balance_of(&self, account: AccountId) -> u64;
}

/// HashMap-backed asset ledger for tests and the CLI pipeline
///
/// Accounts spring into existence with a zero balance; `mint` seeds them.
/// There is no allowance concept: the only failure mode is an insufficient
/// balance.
#[derive(Debug, Default)]
pub struct InMemoryAssetLedger {
    balances: HashMap<AccountId, u64>,
}

impl InMemoryAssetLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account out of thin air
    ///
    /// Saturates at `u64::MAX`; seeding amounts near the bound is a test
    /// setup mistake, not something to fail on.
    pub fn mint(&mut self, account: AccountId, amount: u64) {
        let balance = self.balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: u64,
    ) -> Result<(), TransferError> {
        if amount == 0 {
            return Ok(());
        }

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(TransferError::InsufficientBalance {
                account: from,
                balance: from_balance,
                requested: amount,
            });
        }

        let to_balance = self.balance_of(to);
        let Some(new_to_balance) = to_balance.checked_add(amount) else {
            return Err(TransferError::Rejected {
                reason: format!("balance overflow on account {}", to),
            });
        };

        self.balances.insert(from, from_balance - amount);
        self.balances.insert(to, new_to_balance);
        Ok(())
    }

    fn balance_of(&self, account: AccountId) -> u64 {
        self.balances.get(&account).copied().unwrap_or(0)
    }
}
