//! Observability events with a versioned binary payload
//!
//! Every state-changing operation produces one payment event carrying the
//! payment id, the payer, and a fixed-width binary payload:
//!
//! - byte 0: schema version ([`EVENT_SCHEMA_VERSION`]);
//! - byte 1: bit flags (bit 0 = sponsor present);
//! - one or more 8-byte big-endian amount fields specific to the event kind;
//! - when the sponsor flag is set, the 20-byte sponsor address followed by
//!   sponsor-side amount fields.
//!
//! New fields are appended, never inserted, so old consumers keep decoding
//! the prefix they know.
//!
//! Cashback sub-operations produce [`CashbackEvent`]s carrying the outcome
//! classification plus the payment's cashback total before and after.
//!
//! # Payload layout per event kind
//!
//! | Kind        | Amount fields                               | Sponsor fields    |
//! |-------------|---------------------------------------------|-------------------|
//! | `Made`      | base, extra                                 | subsidy limit     |
//! | `Updated`   | old base, new base, old extra, new extra    | subsidy limit     |
//! | `Refunded`  | old refund, new refund                      | old/new sponsor refund |
//! | `Confirmed` | old confirmed, new confirmed                | none              |
//! | `Revoked`   | payer remainder returned, refund            | sponsor remainder returned |
//! | `Reversed`  | payer remainder returned, refund            | sponsor remainder returned |
//! | `Merged`    | folded base, folded extra, folded cashback  | none              |

use crate::core::cashback::CashbackStatus;
use crate::types::ids::{AccountId, PaymentId};

/// Schema version written into byte 0 of every payload
pub const EVENT_SCHEMA_VERSION: u8 = 1;

/// Flag bit: a sponsor address and sponsor-side amounts follow the common
/// amount fields
pub const FLAG_SPONSOR_PRESENT: u8 = 0b0000_0001;

/// Kind of a payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    /// Payment created
    Made,
    /// Base/extra amounts changed
    Updated,
    /// Cumulative refund changed
    Refunded,
    /// Confirmed amount changed
    Confirmed,
    /// Payment cancelled, identifier reusable
    Revoked,
    /// Payment cancelled, identifier retired
    Reversed,
    /// Payment consolidated into a merge target
    Merged,
}

/// One observability event for a state-changing payment operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    /// Event kind
    pub kind: PaymentEventKind,
    /// Affected payment
    pub payment_id: PaymentId,
    /// The payment's payer
    pub payer: AccountId,
    /// Versioned binary payload (see module docs for the layout)
    pub payload: Vec<u8>,
}

/// Kind of a cashback sub-event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashbackEventKind {
    /// Initial grant attempted while making a payment
    Sent,
    /// Increase-direction delta attempted on an existing payment
    Increased,
    /// Revocation-direction delta attempted
    Revoked,
}

/// One cashback sub-event, attached to its host payment operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashbackEvent {
    /// Sub-event kind
    pub kind: CashbackEventKind,
    /// Host payment
    pub payment_id: PaymentId,
    /// Cashback recipient
    pub payer: AccountId,
    /// Outcome classification of the sub-operation
    pub status: CashbackStatus,
    /// Payment's cashback total before the delta
    pub old_total: u64,
    /// Payment's cashback total after the delta
    pub new_total: u64,
}

/// Event stream entry, drained from the engine by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Primary payment operation event
    Payment(PaymentEvent),
    /// Cashback sub-operation event
    Cashback(CashbackEvent),
}

/// Builder for the versioned binary payload
///
/// Amount fields are appended big-endian; attaching a sponsor sets the flag
/// bit and appends the address, after which further amounts become
/// sponsor-side fields.
#[derive(Debug)]
pub struct PayloadBuilder {
    buf: Vec<u8>,
}

impl PayloadBuilder {
    /// Start a payload with the current schema version and empty flags
    pub fn new() -> Self {
        PayloadBuilder {
            buf: vec![EVENT_SCHEMA_VERSION, 0],
        }
    }

    /// Append an 8-byte big-endian amount field
    pub fn amount(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Set the sponsor flag and append the 20-byte sponsor address
    pub fn sponsor(mut self, sponsor: AccountId) -> Self {
        self.buf[1] |= FLAG_SPONSOR_PRESENT;
        self.buf.extend_from_slice(&sponsor.0);
        self
    }

    /// Finish the payload
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
