//! Amount and refund splitting between payer and sponsor
//!
//! Pure functions mapping a payment's amounts and subsidy limit onto the
//! payer-funded and sponsor-funded sub-amounts. The subsidy is consumed
//! base-first, spilling into extra; cashback is computed only on the
//! payer-funded base, so this ordering decides how much of the spend is
//! cashback-eligible. Refund attribution stays proportional to each party's
//! share of the base without a stored per-party ledger.

/// Payer/sponsor sub-amounts of a payment's base and extra
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmountSplit {
    /// Payer-funded part of the base amount (cashback-eligible)
    pub payer_base: u64,
    /// Payer-funded part of the extra amount
    pub payer_extra: u64,
    /// Sponsor-funded part of the base amount
    pub sponsor_base: u64,
    /// Sponsor-funded part of the extra amount
    pub sponsor_extra: u64,
}

impl AmountSplit {
    /// Total payer-funded amount
    pub fn payer_sum(&self) -> u64 {
        self.payer_base + self.payer_extra
    }

    /// Total sponsor-funded amount
    pub fn sponsor_sum(&self) -> u64 {
        self.sponsor_base + self.sponsor_extra
    }
}

/// Payer/sponsor attribution of a cumulative refund amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefundSplit {
    /// Part of the refund returned at the payer's expense
    pub payer_refund: u64,
    /// Part of the refund returned at the sponsor's expense
    pub sponsor_refund: u64,
}

/// Split a payment amount between payer and sponsor
///
/// The subsidy covers the base first, then spills into extra:
/// - `subsidy_limit >= base + extra`: sponsor covers everything;
/// - `subsidy_limit >= base`: sponsor covers all of base plus
///   `subsidy_limit - base` of extra;
/// - otherwise: sponsor covers `subsidy_limit` of base, payer covers the
///   rest of base and all of extra.
///
/// Callers validate `base + extra` against overflow before splitting.
pub fn split_amount(base: u64, extra: u64, subsidy_limit: u64) -> AmountSplit {
    if subsidy_limit >= base + extra {
        AmountSplit {
            payer_base: 0,
            payer_extra: 0,
            sponsor_base: base,
            sponsor_extra: extra,
        }
    } else if subsidy_limit >= base {
        AmountSplit {
            payer_base: 0,
            payer_extra: extra - (subsidy_limit - base),
            sponsor_base: base,
            sponsor_extra: subsidy_limit - base,
        }
    } else {
        AmountSplit {
            payer_base: base - subsidy_limit,
            payer_extra: extra,
            sponsor_base: subsidy_limit,
            sponsor_extra: 0,
        }
    }
}

/// Split a cumulative refund amount between payer and sponsor
///
/// - No subsidy: the payer absorbs the whole refund.
/// - `subsidy_limit >= base`: the sponsor financed the base entirely (and
///   possibly part of extra), so the sponsor absorbs the whole refund.
/// - Otherwise the sponsor's share is `floor(refund * limit / base)`,
///   capped at `subsidy_limit`; the payer takes the rest.
///
/// Callers validate `refund <= base + extra` before splitting.
pub fn split_refund(refund: u64, base: u64, subsidy_limit: u64) -> RefundSplit {
    if subsidy_limit == 0 {
        return RefundSplit {
            payer_refund: refund,
            sponsor_refund: 0,
        };
    }
    if subsidy_limit >= base {
        return RefundSplit {
            payer_refund: 0,
            sponsor_refund: refund,
        };
    }

    // 128-bit intermediate: refund and limit can each approach u64::MAX
    let proportional = (refund as u128 * subsidy_limit as u128 / base as u128) as u64;
    let sponsor_refund = proportional.min(subsidy_limit);
    RefundSplit {
        payer_refund: refund - sponsor_refund,
        sponsor_refund,
    }
}
