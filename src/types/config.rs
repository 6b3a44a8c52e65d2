//! Engine configuration record
//!
//! Global mutable configuration (cashback toggle and rate, treasury and
//! cash-out accounts) is modeled as an explicit record held by the engine
//! rather than ambient state. Payments snapshot the cashback fields at
//! creation time; the account fields are read at the moment a transfer
//! needs a destination.

use super::ids::AccountId;
use super::payment::{DEFAULT_CAP_RESET_PERIOD_SECS, DEFAULT_CASHBACK_CAP};

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Account holding custodied payment funds on the asset ledger
    pub engine_account: AccountId,

    /// Source/sink account for cashback transfers; must be set before any
    /// cashback can actually move
    pub treasury: Option<AccountId>,

    /// Destination account for confirmed amounts; must be set before a
    /// confirm operation can succeed
    pub cash_out_account: Option<AccountId>,

    /// Global cashback toggle, snapshotted into each new payment
    pub cashback_enabled: bool,

    /// Global cashback rate (per `RATE_FACTOR`), snapshotted into each new
    /// payment unless the make operation overrides it
    pub cashback_rate: u16,

    /// Per-recipient cashback cap within one reset window
    pub cashback_cap: u64,

    /// Length of the rolling cashback cap window, in seconds
    pub cap_reset_period: u64,
}

impl EngineConfig {
    /// Create a configuration with default cashback limits
    ///
    /// Treasury and cash-out start unset; operations that need them fail
    /// with a configuration error until they are provided.
    pub fn new(engine_account: AccountId) -> Self {
        EngineConfig {
            engine_account,
            treasury: None,
            cash_out_account: None,
            cashback_enabled: true,
            cashback_rate: 100,
            cashback_cap: DEFAULT_CASHBACK_CAP,
            cap_reset_period: DEFAULT_CAP_RESET_PERIOD_SECS,
        }
    }

    /// Snapshot the cashback settings for a new payment
    ///
    /// Returns `(enabled, rate)`, applying the per-payment rate override
    /// when given. The snapshot governs every later cashback delta of that
    /// payment, even if the global settings change afterwards.
    pub fn cashback_snapshot(&self, rate_override: Option<u16>) -> (bool, u16) {
        (
            self.cashback_enabled,
            rate_override.unwrap_or(self.cashback_rate),
        )
    }
}
