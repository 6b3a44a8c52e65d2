//! Cashback calculation and per-recipient cap tracking
//!
//! Cashback is computed on the payer-funded base of a payment, rounded to
//! the nearest multiple of [`CASHBACK_ROUNDING_UNIT`] (ties rounding up),
//! and granted subject to a rolling per-recipient cap. The cap window resets
//! lazily: when the current time has moved past `last_reset + reset_period`,
//! the window restarts before the new delta is classified.
//!
//! Only increase-direction deltas are capped. Revocations always apply in
//! full and release cap headroom, saturating at zero.

use crate::types::ids::AccountId;
use crate::types::payment::{CASHBACK_ROUNDING_UNIT, RATE_FACTOR};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome classification of a cashback sub-operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashbackStatus {
    /// No cashback was requested (zero delta, or cashback disabled)
    Undefined,

    /// The full requested delta was applied
    Success,

    /// The delta was clipped to the recipient's remaining cap headroom
    Partial,

    /// The recipient had no cap headroom left; nothing was applied
    Capped,

    /// The backing asset transfer failed for lack of balance or allowance
    OutOfFunds,

    /// The backing asset transfer failed for another reason
    Failed,
}

/// Unrounded cashback for a payer-funded amount at a given rate
///
/// `floor((payer_base - payer_refund) * rate / RATE_FACTOR)`; returns 0 when
/// the refund exceeds the base.
pub fn raw_cashback(payer_base: u64, payer_refund: u64, rate: u16) -> u64 {
    if payer_refund > payer_base {
        return 0;
    }
    let eligible = (payer_base - payer_refund) as u128;
    (eligible * rate as u128 / RATE_FACTOR as u128) as u64
}

/// Round a cashback amount to the nearest multiple of the rounding unit,
/// with exact ties rounding up
pub fn round_cashback(amount: u64) -> u64 {
    let half = CASHBACK_ROUNDING_UNIT / 2;
    (amount.saturating_add(half) / CASHBACK_ROUNDING_UNIT).saturating_mul(CASHBACK_ROUNDING_UNIT)
}

/// Target cashback for a payer-funded base/refund pair: raw then rounded
pub fn target_cashback(payer_base: u64, payer_refund: u64, rate: u16) -> u64 {
    round_cashback(raw_cashback(payer_base, payer_refund, rate))
}

/// Time source seam for the lazy cap-window reset
pub trait Clock: Send {
    /// Current time as seconds since the Unix epoch
    fn now(&self) -> u64;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Per-recipient cap window state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CapWindow {
    /// Cashback granted to the recipient since the last reset
    granted_since_reset: u64,
    /// Unix time at which the current window started
    last_reset: u64,
}

/// Tracks cashback granted per recipient within a rolling window
///
/// The tracker classifies increase requests against the cap and records the
/// amounts that actually moved. Revocations release headroom so a refunded
/// recipient can earn again inside the same window.
#[derive(Debug)]
pub struct CashbackTracker {
    cap: u64,
    reset_period: u64,
    windows: HashMap<AccountId, CapWindow>,
}

impl CashbackTracker {
    /// Create a tracker with the given cap and reset period (seconds)
    pub fn new(cap: u64, reset_period: u64) -> Self {
        CashbackTracker {
            cap,
            reset_period,
            windows: HashMap::new(),
        }
    }

    /// Apply a due window reset and return the recipient's window
    fn window_mut(&mut self, recipient: AccountId, now: u64) -> &mut CapWindow {
        let window = self.windows.entry(recipient).or_insert(CapWindow {
            granted_since_reset: 0,
            last_reset: now,
        });
        if now > window.last_reset + self.reset_period {
            window.granted_since_reset = 0;
            window.last_reset = now;
        }
        window
    }

    /// Classify an increase request against the recipient's cap
    ///
    /// Returns the grantable amount and its classification without recording
    /// anything; call [`CashbackTracker::record_grant`] once the backing
    /// transfer has succeeded.
    pub fn classify_increase(
        &mut self,
        recipient: AccountId,
        requested: u64,
        now: u64,
    ) -> (u64, CashbackStatus) {
        if requested == 0 {
            return (0, CashbackStatus::Undefined);
        }
        let cap = self.cap;
        let window = self.window_mut(recipient, now);

        if window.granted_since_reset >= cap {
            return (0, CashbackStatus::Capped);
        }
        let headroom = cap - window.granted_since_reset;
        if requested > headroom {
            (headroom, CashbackStatus::Partial)
        } else {
            (requested, CashbackStatus::Success)
        }
    }

    /// Record a granted amount against the recipient's window
    pub fn record_grant(&mut self, recipient: AccountId, amount: u64, now: u64) {
        let window = self.window_mut(recipient, now);
        window.granted_since_reset = window.granted_since_reset.saturating_add(amount);
    }

    /// Release headroom after a revocation, saturating at zero
    pub fn record_revocation(&mut self, recipient: AccountId, amount: u64, now: u64) {
        let window = self.window_mut(recipient, now);
        window.granted_since_reset = window.granted_since_reset.saturating_sub(amount);
    }

    /// Cashback granted to the recipient in the current window
    ///
    /// Reads without applying a reset, so a stale window reports its last
    /// recorded total.
    pub fn granted_since_reset(&self, recipient: AccountId) -> u64 {
        self.windows
            .get(&recipient)
            .map(|w| w.granted_since_reset)
            .unwrap_or(0)
    }
}
