//! Identifier types for payments and accounts
//!
//! Payments are keyed by an opaque 32-byte identifier; accounts are 20-byte
//! addresses on the external asset ledger. Both use a hex text form
//! (optionally `0x`-prefixed) in CSV input and in event/error output. Short
//! hex strings are left-padded with zeros so test fixtures and CLI input can
//! write `"01"` instead of 64 digits.

use std::fmt;
use std::str::FromStr;

/// Opaque 32-byte payment identifier
///
/// Unique among currently live identifiers: a `Revoked` payment frees its
/// identifier for reuse, while `Merged` and `Reversed` retire it permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaymentId(pub [u8; 32]);

/// 20-byte account address on the external asset ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 20]);

impl PaymentId {
    /// The all-zero identifier, rejected by every engine operation
    pub const ZERO: PaymentId = PaymentId([0u8; 32]);

    /// Check whether this is the (invalid) zero identifier
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl AccountId {
    /// The all-zero address, rejected wherever an address is required
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    /// Check whether this is the (invalid) zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

/// Decode a hex string into a fixed-width byte array
///
/// Accepts an optional `0x` prefix and left-pads odd or short input with
/// zeros, so `"0x1"`, `"01"` and the full-width form all decode to the same
/// value. Rejects input longer than `N` bytes worth of digits.
fn parse_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Err("empty hex string".to_string());
    }
    if digits.len() > N * 2 {
        return Err(format!(
            "hex string '{}' exceeds {} bytes",
            s, N
        ));
    }

    // Left-pad to full width so hex::decode sees an even-length string
    let padded = format!("{:0>width$}", digits, width = N * 2);
    let bytes = hex::decode(&padded).map_err(|e| format!("invalid hex '{}': {}", s, e))?;

    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

impl FromStr for PaymentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_fixed::<32>(s).map(PaymentId)
    }
}

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_fixed::<20>(s).map(AccountId)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
