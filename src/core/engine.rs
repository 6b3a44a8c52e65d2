//! Payment engine orchestrating splitting, cashback and settlement
//!
//! [`PaymentEngine`] owns the payment store, the cashback tracker, the
//! aggregate totals and the engine configuration, and moves assets through
//! an [`AssetLedger`] implementation. Every mutating operation funnels
//! through one internal amount-change routine that recomputes the
//! payer/sponsor split, plans the balance movements, clamps the confirmed
//! amount and derives the cashback delta exactly once.
//!
//! Operations are atomic: all validation happens before the first transfer,
//! and a transfer failure mid-plan unwinds the already-executed legs. The
//! single exception is the cashback sub-transfer, whose failure is absorbed
//! into a recorded [`CashbackStatus`] instead of failing the host operation.

use crate::core::aggregates::Aggregates;
use crate::core::asset_ledger::AssetLedger;
use crate::core::cashback::{
    target_cashback, CashbackStatus, CashbackTracker, Clock, SystemClock,
};
use crate::core::payment_store::PaymentStore;
use crate::core::split::{split_amount, split_refund};
use crate::events::{
    CashbackEvent, CashbackEventKind, EngineEvent, PaymentEvent, PaymentEventKind, PayloadBuilder,
};
use crate::types::config::EngineConfig;
use crate::types::error::{EngineError, TransferError};
use crate::types::ids::{AccountId, PaymentId};
use crate::types::payment::{Payment, PaymentStatus, MAX_CASHBACK_RATE};

/// Which operation is driving an amount change
///
/// The shared routine uses the kind to pick the cashback behavior: `Making`
/// labels the first grant, `MergeFold` suppresses the recomputation entirely
/// (the merge adds the source's cashback explicitly), and the others derive
/// the delta from the recomputed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Making,
    Updating,
    Refunding,
    Confirming,
    Cancelling,
    MergeFold,
}

/// What the shared amount-change routine computed and moved
struct ChangeOutcome {
    /// Payment state before the change
    before: Payment,
    /// Net payer movement; positive means the payer was debited
    payer_delta: i128,
    /// Net sponsor movement; positive means the sponsor was debited
    sponsor_delta: i128,
    /// Cashback sub-event, when a delta was attempted
    cashback_event: Option<CashbackEvent>,
    /// Cashback amount actually revoked (nonzero only for revocations)
    cashback_revoked: u64,
}

/// Subsidized-payment engine, generic over the external asset ledger
pub struct PaymentEngine<L: AssetLedger> {
    ledger: L,
    store: PaymentStore,
    tracker: CashbackTracker,
    aggregates: Aggregates,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    events: Vec<EngineEvent>,
}

impl<L: AssetLedger> PaymentEngine<L> {
    /// Create an engine over `ledger` with the given configuration
    pub fn new(ledger: L, config: EngineConfig) -> Self {
        Self::with_clock(ledger, config, Box::new(SystemClock))
    }

    /// Create an engine with an injected time source
    ///
    /// The clock drives only the lazy cashback cap-window reset; tests use
    /// this to step time manually.
    pub fn with_clock(ledger: L, config: EngineConfig, clock: Box<dyn Clock>) -> Self {
        let tracker = CashbackTracker::new(config.cashback_cap, config.cap_reset_period);
        PaymentEngine {
            ledger,
            store: PaymentStore::new(),
            tracker,
            aggregates: Aggregates::new(),
            config,
            clock,
            events: Vec::new(),
        }
    }

    /// Create a payment, debiting the payer and (up to the subsidy limit)
    /// the sponsor
    ///
    /// The cashback toggle and rate are snapshotted from the configuration
    /// (or `rate_override`) and govern every later delta of this payment.
    /// A nonzero `confirm_amount` settles part of the sum to the cash-out
    /// account in the same atomic operation.
    ///
    /// # Arguments
    /// * `id` - Fresh payment identifier (a `Revoked` slot may be reused)
    /// * `payer` - Account bearing the unsubsidized cost
    /// * `base` - Cashback-eligible amount
    /// * `extra` - Additional, never cashback-eligible amount
    /// * `sponsor` - Optional sponsor account
    /// * `subsidy_limit` - Maximum amount the sponsor covers (base first)
    /// * `rate_override` - Per-payment cashback rate instead of the global one
    /// * `confirm_amount` - Amount to confirm inline, 0 for none
    ///
    /// # Errors
    /// Rejects zero ids/addresses, a zero sum, overflowing sums, live or
    /// retired identifiers, out-of-range rates, a `confirm_amount` above the
    /// sum, and unconfigured cash-out/treasury accounts where the operation
    /// needs them. A failed payer or sponsor debit is fatal and leaves no
    /// state behind.
    #[allow(clippy::too_many_arguments)]
    pub fn make_payment(
        &mut self,
        id: PaymentId,
        payer: AccountId,
        base: u64,
        extra: u64,
        sponsor: Option<AccountId>,
        subsidy_limit: u64,
        rate_override: Option<u16>,
        confirm_amount: u64,
    ) -> Result<(), EngineError> {
        if id.is_zero() {
            return Err(EngineError::ZeroPaymentId);
        }
        if payer.is_zero() {
            return Err(EngineError::zero_address("payer"));
        }
        if sponsor.is_some_and(|s| s.is_zero()) {
            return Err(EngineError::zero_address("sponsor"));
        }
        let sum = base
            .checked_add(extra)
            .ok_or_else(|| EngineError::amount_overflow(id, "make"))?;
        if sum == 0 {
            return Err(EngineError::ZeroPaymentAmount { id });
        }
        if let Some(rate) = rate_override {
            if rate > MAX_CASHBACK_RATE {
                return Err(EngineError::RateOutOfRange {
                    rate,
                    max: MAX_CASHBACK_RATE,
                });
            }
        }
        if confirm_amount > sum {
            return Err(EngineError::ConfirmExceedsRemainder {
                id,
                requested: confirm_amount,
                remainder: sum,
            });
        }
        self.store.ensure_admissible(id)?;

        let (cashback_enabled, cashback_rate) = self.config.cashback_snapshot(rate_override);
        let mut payment = Payment {
            payer,
            status: PaymentStatus::Active,
            base_amount: 0,
            extra_amount: 0,
            refund_amount: 0,
            confirmed_amount: 0,
            sponsor,
            subsidy_limit: if sponsor.is_some() { subsidy_limit } else { 0 },
            cashback_enabled,
            cashback_rate,
            cashback_amount: 0,
        };

        let outcome = self.apply_amount_change(
            id,
            &mut payment,
            ChangeKind::Making,
            base,
            extra,
            0,
            Some(confirm_amount),
        )?;
        self.store.insert(id, payment)?;

        let mut payload = PayloadBuilder::new().amount(base).amount(extra);
        if let Some(sponsor) = sponsor {
            payload = payload.sponsor(sponsor).amount(subsidy_limit);
        }
        self.push_payment_event(PaymentEventKind::Made, id, payer, payload.build());
        if confirm_amount > 0 {
            let payload = PayloadBuilder::new().amount(0).amount(confirm_amount).build();
            self.push_payment_event(PaymentEventKind::Confirmed, id, payer, payload);
        }
        self.push_cashback_event(outcome.cashback_event);
        Ok(())
    }

    /// Change a payment's base/extra amounts
    ///
    /// Re-splits against the subsidy limit and moves only the balance
    /// differences. If the new remainder drops below the confirmed amount,
    /// the confirmed amount is clamped down, pulling the difference back
    /// from the cash-out account. The cashback target is recomputed; an
    /// increase is capped, a decrease is revoked in full.
    ///
    /// # Errors
    /// Rejects unknown or non-`Active` payments, a zero or overflowing new
    /// sum, and a new sum below the already-refunded amount.
    pub fn update_payment(
        &mut self,
        id: PaymentId,
        new_base: u64,
        new_extra: u64,
    ) -> Result<(), EngineError> {
        self.update_inner(id, new_base, new_extra, false)
    }

    /// [`PaymentEngine::update_payment`] without the `Updated` event
    ///
    /// Used by update-then-confirm chains that report both changes through
    /// the confirm event; cashback sub-events are still emitted.
    pub fn update_payment_lazy(
        &mut self,
        id: PaymentId,
        new_base: u64,
        new_extra: u64,
    ) -> Result<(), EngineError> {
        self.update_inner(id, new_base, new_extra, true)
    }

    fn update_inner(
        &mut self,
        id: PaymentId,
        new_base: u64,
        new_extra: u64,
        lazy: bool,
    ) -> Result<(), EngineError> {
        let mut payment = self.store.get_active(id, "update")?.clone();
        let new_sum = new_base
            .checked_add(new_extra)
            .ok_or_else(|| EngineError::amount_overflow(id, "update"))?;
        if new_sum == 0 {
            return Err(EngineError::ZeroPaymentAmount { id });
        }
        if new_sum < payment.refund_amount {
            return Err(EngineError::SumBelowRefund {
                id,
                sum: new_sum,
                refund: payment.refund_amount,
            });
        }

        let refund = payment.refund_amount;
        let outcome = self.apply_amount_change(
            id,
            &mut payment,
            ChangeKind::Updating,
            new_base,
            new_extra,
            refund,
            None,
        )?;
        let payer = payment.payer;
        let sponsor = payment.sponsor;
        let subsidy_limit = payment.subsidy_limit;
        *self.store.get_active_mut(id, "update")? = payment;

        if !lazy {
            let mut payload = PayloadBuilder::new()
                .amount(outcome.before.base_amount)
                .amount(new_base)
                .amount(outcome.before.extra_amount)
                .amount(new_extra);
            if let Some(sponsor) = sponsor {
                payload = payload.sponsor(sponsor).amount(subsidy_limit);
            }
            self.push_payment_event(PaymentEventKind::Updated, id, payer, payload.build());
        }
        self.push_cashback_event(outcome.cashback_event);
        Ok(())
    }

    /// Set a payment's cumulative refund amount
    ///
    /// The refund is attributed between payer and sponsor proportionally to
    /// their shares of the base, and the attributed parts are returned from
    /// custody. Confirmed amounts above the new remainder are clamped down;
    /// the cashback target is recomputed on the reduced payer base.
    ///
    /// # Errors
    /// Rejects unknown or non-`Active` payments and a refund above
    /// `base + extra`.
    pub fn refund_payment(
        &mut self,
        id: PaymentId,
        cumulative_refund: u64,
    ) -> Result<(), EngineError> {
        let mut payment = self.store.get_active(id, "refund")?.clone();
        if cumulative_refund > payment.sum() {
            return Err(EngineError::RefundExceedsSum {
                id,
                refund: cumulative_refund,
                sum: payment.sum(),
            });
        }

        let (base, extra) = (payment.base_amount, payment.extra_amount);
        let outcome = self.apply_amount_change(
            id,
            &mut payment,
            ChangeKind::Refunding,
            base,
            extra,
            cumulative_refund,
            None,
        )?;
        let payer = payment.payer;
        let sponsor = payment.sponsor;
        let subsidy_limit = payment.subsidy_limit;
        *self.store.get_active_mut(id, "refund")? = payment;

        let mut payload = PayloadBuilder::new()
            .amount(outcome.before.refund_amount)
            .amount(cumulative_refund);
        if let Some(sponsor) = sponsor {
            let old = split_refund(outcome.before.refund_amount, base, subsidy_limit);
            let new = split_refund(cumulative_refund, base, subsidy_limit);
            payload = payload
                .sponsor(sponsor)
                .amount(old.sponsor_refund)
                .amount(new.sponsor_refund);
        }
        self.push_payment_event(PaymentEventKind::Refunded, id, payer, payload.build());
        self.push_cashback_event(outcome.cashback_event);
        Ok(())
    }

    /// Set a payment's confirmed amount
    ///
    /// Moves the difference between custody and the cash-out account in
    /// whichever direction the change requires. Confirmation never affects
    /// cashback.
    ///
    /// # Errors
    /// Rejects unknown or non-`Active` payments, a confirmed amount above
    /// the unrefunded remainder, and an unconfigured cash-out account.
    pub fn confirm_payment(&mut self, id: PaymentId, new_confirmed: u64) -> Result<(), EngineError> {
        let mut payment = self.store.get_active(id, "confirm")?.clone();
        self.confirm_inner(id, &mut payment, new_confirmed)?;
        *self.store.get_active_mut(id, "confirm")? = payment;
        Ok(())
    }

    /// Confirm a batch of payments in caller order
    ///
    /// The whole batch is validated against the current state before any
    /// balance moves, so a validation failure leaves every payment untouched.
    /// If a ledger transfer fails partway through, the entries already
    /// applied are confirmed back to their previous amounts and the batch's
    /// events are discarded, so a failed batch leaves no trace.
    ///
    /// # Errors
    /// Rejects an empty batch and any entry that
    /// [`PaymentEngine::confirm_payment`] would reject.
    pub fn confirm_payments(&mut self, batch: &[(PaymentId, u64)]) -> Result<(), EngineError> {
        if batch.is_empty() {
            return Err(EngineError::empty_batch("confirm"));
        }
        for &(id, new_confirmed) in batch {
            let payment = self.store.get_active(id, "confirm")?;
            if new_confirmed > payment.remainder() {
                return Err(EngineError::ConfirmExceedsRemainder {
                    id,
                    requested: new_confirmed,
                    remainder: payment.remainder(),
                });
            }
            if new_confirmed != payment.confirmed_amount && self.config.cash_out_account.is_none() {
                return Err(EngineError::CashOutAccountUnset);
            }
        }
        let events_before = self.events.len();
        let mut applied: Vec<(PaymentId, u64)> = Vec::with_capacity(batch.len());
        for &(id, new_confirmed) in batch {
            let previous = self.store.get_active(id, "confirm")?.confirmed_amount;
            if let Err(error) = self.confirm_payment(id, new_confirmed) {
                // Restore already-applied entries in reverse, reusing the
                // balance the failed pull could not cover
                for &(id, previous) in applied.iter().rev() {
                    let _ = self.confirm_payment(id, previous);
                }
                self.events.truncate(events_before);
                return Err(error);
            }
            applied.push((id, previous));
        }
        Ok(())
    }

    fn confirm_inner(
        &mut self,
        id: PaymentId,
        payment: &mut Payment,
        new_confirmed: u64,
    ) -> Result<(), EngineError> {
        if new_confirmed > payment.remainder() {
            return Err(EngineError::ConfirmExceedsRemainder {
                id,
                requested: new_confirmed,
                remainder: payment.remainder(),
            });
        }
        let (base, extra, refund) = (
            payment.base_amount,
            payment.extra_amount,
            payment.refund_amount,
        );
        let outcome = self.apply_amount_change(
            id,
            payment,
            ChangeKind::Confirming,
            base,
            extra,
            refund,
            Some(new_confirmed),
        )?;
        let payload = PayloadBuilder::new()
            .amount(outcome.before.confirmed_amount)
            .amount(new_confirmed)
            .build();
        self.push_payment_event(PaymentEventKind::Confirmed, id, payment.payer, payload);
        Ok(())
    }

    /// Cancel a payment, leaving its identifier reusable
    ///
    /// Pulls any confirmed amount back from the cash-out account, returns
    /// the payer and sponsor remainders from custody, revokes the full
    /// cashback amount and zeroes the record under status `Revoked`.
    ///
    /// # Errors
    /// Rejects unknown or non-`Active` payments; a failed return transfer
    /// is fatal and unwinds the cancellation.
    pub fn revoke_payment(&mut self, id: PaymentId) -> Result<(), EngineError> {
        self.cancel_payment(id, PaymentStatus::Revoked, PaymentEventKind::Revoked, "revoke")
    }

    /// Cancel a payment and retire its identifier permanently
    ///
    /// Same returns as [`PaymentEngine::revoke_payment`], but the terminal
    /// status is `Reversed` and the identifier can never be reused.
    pub fn reverse_payment(&mut self, id: PaymentId) -> Result<(), EngineError> {
        self.cancel_payment(id, PaymentStatus::Reversed, PaymentEventKind::Reversed, "reverse")
    }

    fn cancel_payment(
        &mut self,
        id: PaymentId,
        status: PaymentStatus,
        event_kind: PaymentEventKind,
        operation: &str,
    ) -> Result<(), EngineError> {
        let mut payment = self.store.get_active(id, operation)?.clone();
        let outcome =
            self.apply_amount_change(id, &mut payment, ChangeKind::Cancelling, 0, 0, 0, Some(0))?;
        payment.status = status;
        let payer = payment.payer;
        let sponsor = payment.sponsor;
        *self.store.get_active_mut(id, operation)? = payment;

        let payer_returned = (-outcome.payer_delta).max(0) as u64;
        let mut payload = PayloadBuilder::new()
            .amount(payer_returned)
            .amount(outcome.before.refund_amount);
        if let Some(sponsor) = sponsor {
            let sponsor_returned = (-outcome.sponsor_delta).max(0) as u64;
            payload = payload.sponsor(sponsor).amount(sponsor_returned);
        }
        self.push_payment_event(event_kind, id, payer, payload.build());
        self.push_cashback_event(outcome.cashback_event);
        Ok(())
    }

    /// Consolidate source payments into a target payment
    ///
    /// Each source is cancelled through the shared cancellation path (its
    /// remainders return and its cashback is revoked), its amounts and
    /// refund fold into the target, the combined confirmed amount is
    /// re-confirmed, and the cashback actually revoked from the source is
    /// re-granted to the target outside the cap. Sources end up `Merged`,
    /// their identifiers retired.
    ///
    /// # Errors
    /// Rejects an empty source list, a sponsored target, sources that are
    /// not `Active`, belong to a different payer, carry a rate above the
    /// target's, equal the target, or appear more than once, and a combined
    /// sum that overflows.
    pub fn merge_payments(
        &mut self,
        target: PaymentId,
        sources: &[PaymentId],
    ) -> Result<(), EngineError> {
        if sources.is_empty() {
            return Err(EngineError::empty_batch("merge"));
        }
        let mut target_payment = self.store.get_active(target, "merge")?.clone();
        if target_payment.sponsor.is_some() {
            return Err(EngineError::MergeSponsoredTarget { id: target });
        }

        let mut combined_sum = target_payment.sum();
        for (index, &source) in sources.iter().enumerate() {
            if source == target {
                return Err(EngineError::MergeWithItself { id: source });
            }
            if sources[..index].contains(&source) {
                return Err(EngineError::MergeDuplicateSource { id: source });
            }
            let source_payment = self.store.get_active(source, "merge")?;
            if source_payment.payer != target_payment.payer {
                return Err(EngineError::MergePayerMismatch {
                    source_id: source,
                    source_payer: source_payment.payer,
                    target_payer: target_payment.payer,
                });
            }
            if source_payment.cashback_rate > target_payment.cashback_rate {
                return Err(EngineError::MergeRateMismatch {
                    source_id: source,
                    source_rate: source_payment.cashback_rate,
                    target_rate: target_payment.cashback_rate,
                });
            }
            combined_sum = combined_sum
                .checked_add(source_payment.sum())
                .ok_or_else(|| EngineError::amount_overflow(target, "merge"))?;
        }

        let payer = target_payment.payer;
        for &source in sources {
            let mut source_payment = self.store.get_active(source, "merge")?.clone();
            let cancelled = self.apply_amount_change(
                source,
                &mut source_payment,
                ChangeKind::Cancelling,
                0,
                0,
                0,
                Some(0),
            )?;
            source_payment.status = PaymentStatus::Merged;
            *self.store.get_active_mut(source, "merge")? = source_payment;
            self.push_cashback_event(cancelled.cashback_event);

            let before = &cancelled.before;
            let folded_base = target_payment.base_amount + before.base_amount;
            let folded_extra = target_payment.extra_amount + before.extra_amount;
            let folded_refund = target_payment.refund_amount + before.refund_amount;
            let folded_confirmed = target_payment.confirmed_amount + before.confirmed_amount;
            self.apply_amount_change(
                target,
                &mut target_payment,
                ChangeKind::MergeFold,
                folded_base,
                folded_extra,
                folded_refund,
                Some(folded_confirmed),
            )?;

            let regrant = self.regrant_cashback(target, &mut target_payment, cancelled.cashback_revoked);
            self.push_cashback_event(regrant);

            // Persist the fold before touching the next source so the stored
            // target never lags behind a source already marked Merged
            *self.store.get_active_mut(target, "merge")? = target_payment.clone();

            let payload = PayloadBuilder::new()
                .amount(before.base_amount)
                .amount(before.extra_amount)
                .amount(cancelled.cashback_revoked)
                .build();
            self.push_payment_event(PaymentEventKind::Merged, source, payer, payload);
        }
        Ok(())
    }

    /// Re-grant cashback revoked from a merge source to the target, outside
    /// the per-recipient cap
    fn regrant_cashback(
        &mut self,
        target: PaymentId,
        payment: &mut Payment,
        amount: u64,
    ) -> Option<CashbackEvent> {
        if amount == 0 {
            return None;
        }
        // The revocation that produced `amount` required a configured
        // treasury, and setters never unset it
        let treasury = self.config.treasury?;
        let now = self.clock.now();
        let old_total = payment.cashback_amount;
        let status = match self.ledger.transfer(treasury, payment.payer, amount) {
            Ok(()) => {
                self.tracker.record_grant(payment.payer, amount, now);
                payment.cashback_amount = old_total.saturating_add(amount);
                CashbackStatus::Success
            }
            Err(error) => transfer_failure_status(&error),
        };
        Some(CashbackEvent {
            kind: CashbackEventKind::Increased,
            payment_id: target,
            payer: payment.payer,
            status,
            old_total,
            new_total: payment.cashback_amount,
        })
    }

    /// The shared amount-change routine
    ///
    /// Recomputes the payer/sponsor split for the new amounts, plans the
    /// balance legs (confirmed pull-backs first, payer and sponsor diffs,
    /// confirmed push last), executes them with compensation on failure,
    /// commits the new amounts and aggregates, and finally attempts the
    /// cashback delta, whose failure is absorbed.
    ///
    /// Callers validate the new amounts (`refund <= sum`, no overflow,
    /// `confirmed <= remainder`) before calling.
    fn apply_amount_change(
        &mut self,
        id: PaymentId,
        payment: &mut Payment,
        kind: ChangeKind,
        new_base: u64,
        new_extra: u64,
        new_refund: u64,
        new_confirmed: Option<u64>,
    ) -> Result<ChangeOutcome, EngineError> {
        let before = payment.clone();
        let limit = before.subsidy_limit;

        let old_split = split_amount(before.base_amount, before.extra_amount, limit);
        let old_refund_split = split_refund(before.refund_amount, before.base_amount, limit);
        let new_split = split_amount(new_base, new_extra, limit);
        let new_refund_split = split_refund(new_refund, new_base, limit);

        let payer_delta = (new_split.payer_sum() as i128 - new_refund_split.payer_refund as i128)
            - (old_split.payer_sum() as i128 - old_refund_split.payer_refund as i128);
        let sponsor_delta = (new_split.sponsor_sum() as i128
            - new_refund_split.sponsor_refund as i128)
            - (old_split.sponsor_sum() as i128 - old_refund_split.sponsor_refund as i128);

        let new_remainder = new_base + new_extra - new_refund;
        let target_confirmed = match new_confirmed {
            Some(confirmed) => confirmed,
            None => before.confirmed_amount.min(new_remainder),
        };
        let confirmed_delta = target_confirmed as i128 - before.confirmed_amount as i128;
        let remainder_delta = new_remainder as i128 - before.remainder() as i128;

        // Cashback delta requested by this change; a nonzero request needs
        // the treasury configured even if the transfer later fails
        let cashback_current = payment.cashback_amount;
        let cashback_target = match kind {
            ChangeKind::MergeFold => cashback_current,
            _ if !payment.cashback_enabled => 0,
            _ => target_cashback(
                new_split.payer_base,
                new_refund_split.payer_refund,
                payment.cashback_rate,
            ),
        };
        let treasury = if cashback_target != cashback_current {
            Some(
                self.config
                    .treasury
                    .ok_or(EngineError::TreasuryAccountUnset)?,
            )
        } else {
            None
        };

        let mut aggregates = self.aggregates;
        aggregates.adjust_custodied(remainder_delta - confirmed_delta, id)?;
        aggregates.adjust_confirmed(confirmed_delta, id)?;
        aggregates.adjust_unconfirmed(remainder_delta - confirmed_delta, id)?;

        let engine = self.config.engine_account;
        let mut plan: Vec<(AccountId, AccountId, u64)> = Vec::new();
        if confirmed_delta < 0 {
            let cash_out = self
                .config
                .cash_out_account
                .ok_or(EngineError::CashOutAccountUnset)?;
            plan.push((cash_out, engine, (-confirmed_delta) as u64));
        }
        if payer_delta > 0 {
            plan.push((payment.payer, engine, payer_delta as u64));
        } else if payer_delta < 0 {
            plan.push((engine, payment.payer, (-payer_delta) as u64));
        }
        if let Some(sponsor) = payment.sponsor {
            if sponsor_delta > 0 {
                plan.push((sponsor, engine, sponsor_delta as u64));
            } else if sponsor_delta < 0 {
                plan.push((engine, sponsor, (-sponsor_delta) as u64));
            }
        }
        if confirmed_delta > 0 {
            let cash_out = self
                .config
                .cash_out_account
                .ok_or(EngineError::CashOutAccountUnset)?;
            plan.push((engine, cash_out, confirmed_delta as u64));
        }

        self.execute_plan(&plan)?;

        payment.base_amount = new_base;
        payment.extra_amount = new_extra;
        payment.refund_amount = new_refund;
        payment.confirmed_amount = target_confirmed;
        self.aggregates = aggregates;

        let mut cashback_event = None;
        let mut cashback_revoked = 0u64;
        if let Some(treasury) = treasury {
            let now = self.clock.now();
            if cashback_target > cashback_current {
                let requested = cashback_target - cashback_current;
                let (grantable, mut status) =
                    self.tracker.classify_increase(payment.payer, requested, now);
                let mut applied = 0;
                if grantable > 0 {
                    match self.ledger.transfer(treasury, payment.payer, grantable) {
                        Ok(()) => {
                            self.tracker.record_grant(payment.payer, grantable, now);
                            applied = grantable;
                        }
                        Err(error) => status = transfer_failure_status(&error),
                    }
                }
                payment.cashback_amount = cashback_current + applied;
                let kind = match kind {
                    ChangeKind::Making => CashbackEventKind::Sent,
                    _ => CashbackEventKind::Increased,
                };
                cashback_event = Some(CashbackEvent {
                    kind,
                    payment_id: id,
                    payer: payment.payer,
                    status,
                    old_total: cashback_current,
                    new_total: payment.cashback_amount,
                });
            } else {
                let requested = cashback_current - cashback_target;
                let mut status = CashbackStatus::Success;
                let mut applied = 0;
                match self.ledger.transfer(payment.payer, treasury, requested) {
                    Ok(()) => {
                        self.tracker.record_revocation(payment.payer, requested, now);
                        applied = requested;
                    }
                    Err(error) => status = transfer_failure_status(&error),
                }
                payment.cashback_amount = cashback_current - applied;
                cashback_revoked = applied;
                cashback_event = Some(CashbackEvent {
                    kind: CashbackEventKind::Revoked,
                    payment_id: id,
                    payer: payment.payer,
                    status,
                    old_total: cashback_current,
                    new_total: payment.cashback_amount,
                });
            }
        }

        Ok(ChangeOutcome {
            before,
            payer_delta,
            sponsor_delta,
            cashback_event,
            cashback_revoked,
        })
    }

    /// Execute transfer legs in order, unwinding executed legs in reverse
    /// when one fails
    fn execute_plan(&mut self, plan: &[(AccountId, AccountId, u64)]) -> Result<(), EngineError> {
        let mut executed = 0;
        for &(from, to, amount) in plan {
            if let Err(error) = self.ledger.transfer(from, to, amount) {
                for &(from, to, amount) in plan[..executed].iter().rev() {
                    // Best-effort unwind; legs just executed forward
                    let _ = self.ledger.transfer(to, from, amount);
                }
                return Err(error.into());
            }
            executed += 1;
        }
        Ok(())
    }

    fn push_payment_event(
        &mut self,
        kind: PaymentEventKind,
        payment_id: PaymentId,
        payer: AccountId,
        payload: Vec<u8>,
    ) {
        self.events.push(EngineEvent::Payment(PaymentEvent {
            kind,
            payment_id,
            payer,
            payload,
        }));
    }

    fn push_cashback_event(&mut self, event: Option<CashbackEvent>) {
        if let Some(event) = event {
            self.events.push(EngineEvent::Cashback(event));
        }
    }

    // Configuration entry points

    /// Toggle cashback for payments made from now on
    ///
    /// Existing payments keep their snapshot.
    pub fn set_cashback_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        if self.config.cashback_enabled == enabled {
            return Err(EngineError::configuration_unchanged("cashback_enabled"));
        }
        self.config.cashback_enabled = enabled;
        Ok(())
    }

    /// Set the global cashback rate for payments made from now on
    pub fn set_cashback_rate(&mut self, rate: u16) -> Result<(), EngineError> {
        if rate > MAX_CASHBACK_RATE {
            return Err(EngineError::RateOutOfRange {
                rate,
                max: MAX_CASHBACK_RATE,
            });
        }
        if self.config.cashback_rate == rate {
            return Err(EngineError::configuration_unchanged("cashback_rate"));
        }
        self.config.cashback_rate = rate;
        Ok(())
    }

    /// Set the treasury account funding cashback transfers
    pub fn set_cashback_treasury(&mut self, treasury: AccountId) -> Result<(), EngineError> {
        if treasury.is_zero() {
            return Err(EngineError::zero_address("treasury"));
        }
        if self.config.treasury == Some(treasury) {
            return Err(EngineError::configuration_unchanged("treasury"));
        }
        self.config.treasury = Some(treasury);
        Ok(())
    }

    /// Set the destination account for confirmed amounts
    pub fn set_cash_out_account(&mut self, cash_out: AccountId) -> Result<(), EngineError> {
        if cash_out.is_zero() {
            return Err(EngineError::zero_address("cash-out"));
        }
        if self.config.cash_out_account == Some(cash_out) {
            return Err(EngineError::configuration_unchanged("cash_out_account"));
        }
        self.config.cash_out_account = Some(cash_out);
        Ok(())
    }

    // Accessors

    /// Look up a payment by identifier, regardless of status
    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.store.get(id)
    }

    /// All stored payments, sorted by identifier
    pub fn payments_sorted(&self) -> Vec<(PaymentId, &Payment)> {
        self.store.all_sorted()
    }

    /// Current engine-wide aggregate totals
    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    /// Re-derive `(confirmed_total, unconfirmed_remainder)` from the live
    /// payment set, for audits against [`PaymentEngine::aggregates`]
    pub fn derive_aggregates(&self) -> (u64, u64) {
        self.aggregates.derive_from(&self.store)
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying asset ledger
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable access to the asset ledger, for seeding balances
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Drain the buffered events
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Map a cashback sub-transfer failure onto its absorbed status
fn transfer_failure_status(error: &TransferError) -> CashbackStatus {
    match error {
        TransferError::InsufficientBalance { .. } | TransferError::InsufficientAllowance { .. } => {
            CashbackStatus::OutOfFunds
        }
        TransferError::Rejected { .. } => CashbackStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset_ledger::InMemoryAssetLedger;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const ENGINE: AccountId = AccountId([0xE0; 20]);
    const TREASURY: AccountId = AccountId([0xE1; 20]);
    const CASH_OUT: AccountId = AccountId([0xE2; 20]);
    const PAYER: AccountId = AccountId([0x01; 20]);
    const SPONSOR: AccountId = AccountId([0x02; 20]);

    const ID: PaymentId = PaymentId([0xAA; 32]);
    const ID2: PaymentId = PaymentId([0xBB; 32]);

    // Unit scale keeping cashback amounts above the rounding unit
    const U: u64 = 1_000_000;

    #[derive(Clone)]
    struct ManualClock(Arc<AtomicU64>);

    impl Clock for ManualClock {
        fn now(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn engine() -> PaymentEngine<InMemoryAssetLedger> {
        engine_with_clock().0
    }

    fn engine_with_clock() -> (PaymentEngine<InMemoryAssetLedger>, Arc<AtomicU64>) {
        let mut ledger = InMemoryAssetLedger::new();
        ledger.mint(PAYER, 1_000_000 * U);
        ledger.mint(SPONSOR, 1_000_000 * U);
        ledger.mint(TREASURY, 1_000_000 * U);

        let mut config = EngineConfig::new(ENGINE);
        config.treasury = Some(TREASURY);
        config.cash_out_account = Some(CASH_OUT);
        config.cashback_rate = 200;

        let time = Arc::new(AtomicU64::new(0));
        let clock = ManualClock(Arc::clone(&time));
        (
            PaymentEngine::with_clock(ledger, config, Box::new(clock)),
            time,
        )
    }

    fn make_simple(engine: &mut PaymentEngine<InMemoryAssetLedger>, id: PaymentId, base: u64) {
        engine
            .make_payment(id, PAYER, base, 0, None, 0, None, 0)
            .unwrap();
    }

    #[test]
    fn test_make_subsidized_payment() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 400 * U, Some(SPONSOR), 800 * U, None, 0)
            .unwrap();

        // Sponsor covers 800u of base; payer pays 200u base + 400u extra and
        // earns 20% cashback on the 200u payer base
        assert_eq!(engine.ledger().balance_of(PAYER), 1_000_000 * U - 600 * U + 40 * U);
        assert_eq!(engine.ledger().balance_of(SPONSOR), 1_000_000 * U - 800 * U);
        assert_eq!(engine.ledger().balance_of(ENGINE), 1_400 * U);
        assert_eq!(engine.ledger().balance_of(TREASURY), 1_000_000 * U - 40 * U);

        let payment = engine.payment(ID).unwrap();
        assert_eq!(payment.cashback_amount, 40 * U);
        assert_eq!(engine.aggregates().custodied_balance, 1_400 * U);
        assert_eq!(engine.aggregates().unconfirmed_remainder, 1_400 * U);
    }

    #[test]
    fn test_make_fully_subsidized_payment_earns_no_cashback() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 400 * U, Some(SPONSOR), 1_400 * U, None, 0)
            .unwrap();

        assert_eq!(engine.ledger().balance_of(PAYER), 1_000_000 * U);
        assert_eq!(engine.ledger().balance_of(SPONSOR), 1_000_000 * U - 1_400 * U);
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 0);
    }

    #[test]
    fn test_make_with_inline_confirm() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 0, None, 0, None, 300 * U)
            .unwrap();

        assert_eq!(engine.ledger().balance_of(CASH_OUT), 300 * U);
        assert_eq!(engine.payment(ID).unwrap().confirmed_amount, 300 * U);
        assert_eq!(engine.aggregates().confirmed_total, 300 * U);
        assert_eq!(engine.aggregates().custodied_balance, 700 * U);
    }

    #[test]
    fn test_make_validation_failures() {
        let mut engine = engine();
        assert_eq!(
            engine.make_payment(PaymentId::ZERO, PAYER, U, 0, None, 0, None, 0),
            Err(EngineError::ZeroPaymentId)
        );
        assert_eq!(
            engine.make_payment(ID, AccountId::ZERO, U, 0, None, 0, None, 0),
            Err(EngineError::zero_address("payer"))
        );
        assert_eq!(
            engine.make_payment(ID, PAYER, 0, 0, None, 0, None, 0),
            Err(EngineError::ZeroPaymentAmount { id: ID })
        );
        assert_eq!(
            engine.make_payment(ID, PAYER, u64::MAX, 1, None, 0, None, 0),
            Err(EngineError::amount_overflow(ID, "make"))
        );
        assert_eq!(
            engine.make_payment(ID, PAYER, U, 0, None, 0, Some(501), 0),
            Err(EngineError::RateOutOfRange { rate: 501, max: 500 })
        );
        assert_eq!(
            engine.make_payment(ID, PAYER, U, 0, None, 0, None, 2 * U),
            Err(EngineError::ConfirmExceedsRemainder {
                id: ID,
                requested: 2 * U,
                remainder: U,
            })
        );
    }

    #[test]
    fn test_make_failed_debit_leaves_no_state() {
        let mut engine = engine();
        let result = engine.make_payment(ID, PAYER, 2_000_000 * U, 0, None, 0, None, 0);
        assert!(matches!(result, Err(EngineError::Transfer(_))));
        assert!(engine.payment(ID).is_none());
        assert_eq!(engine.aggregates().custodied_balance, 0);
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_remake_after_revoke_but_not_after_reverse() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 100 * U);
        engine.revoke_payment(ID).unwrap();
        make_simple(&mut engine, ID, 200 * U);
        assert_eq!(engine.payment(ID).unwrap().base_amount, 200 * U);

        engine.reverse_payment(ID).unwrap();
        assert_eq!(
            engine.make_payment(ID, PAYER, 100 * U, 0, None, 0, None, 0),
            Err(EngineError::PaymentAlreadyExists {
                id: ID,
                status: PaymentStatus::Reversed,
            })
        );
    }

    #[test]
    fn test_update_moves_only_the_difference() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        let payer_after_make = engine.ledger().balance_of(PAYER);

        engine.update_payment(ID, 1_500 * U, 0).unwrap();

        // 500u more debited, 100u more cashback at 20%
        assert_eq!(
            engine.ledger().balance_of(PAYER),
            payer_after_make - 500 * U + 100 * U
        );
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 300 * U);
        assert_eq!(engine.aggregates().custodied_balance, 1_500 * U);
    }

    #[test]
    fn test_update_clamps_confirmed_to_new_remainder() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        engine.confirm_payment(ID, 800 * U).unwrap();

        engine.update_payment(ID, 500 * U, 0).unwrap();

        let payment = engine.payment(ID).unwrap();
        assert_eq!(payment.confirmed_amount, 500 * U);
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 500 * U);
        assert_eq!(engine.aggregates().confirmed_total, 500 * U);
        assert_eq!(engine.aggregates().unconfirmed_remainder, 0);
    }

    #[test]
    fn test_update_rejects_sum_below_refund() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        engine.refund_payment(ID, 600 * U).unwrap();

        assert_eq!(
            engine.update_payment(ID, 500 * U, 0),
            Err(EngineError::SumBelowRefund {
                id: ID,
                sum: 500 * U,
                refund: 600 * U,
            })
        );
    }

    #[test]
    fn test_refund_returns_and_revokes_cashback() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        let payer_after_make = engine.ledger().balance_of(PAYER);

        engine.refund_payment(ID, 400 * U).unwrap();

        // 400u returned, cashback drops from 200u to 120u
        assert_eq!(
            engine.ledger().balance_of(PAYER),
            payer_after_make + 400 * U - 80 * U
        );
        let payment = engine.payment(ID).unwrap();
        assert_eq!(payment.refund_amount, 400 * U);
        assert_eq!(payment.cashback_amount, 120 * U);
        assert_eq!(engine.aggregates().custodied_balance, 600 * U);
    }

    #[test]
    fn test_refund_split_with_sponsor() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 400 * U, Some(SPONSOR), 800 * U, None, 0)
            .unwrap();
        let payer_before = engine.ledger().balance_of(PAYER);
        let sponsor_before = engine.ledger().balance_of(SPONSOR);

        // 500u refund at limit 800/base 1000: sponsor gets 400u, payer 100u
        engine.refund_payment(ID, 500 * U).unwrap();

        assert_eq!(engine.ledger().balance_of(SPONSOR), sponsor_before + 400 * U);
        // Payer's 100u return nets against the 20u cashback revocation
        assert_eq!(
            engine.ledger().balance_of(PAYER),
            payer_before + 100 * U - 20 * U
        );
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 20 * U);
    }

    #[test]
    fn test_refund_rejects_above_sum() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        assert_eq!(
            engine.refund_payment(ID, 1_001 * U),
            Err(EngineError::RefundExceedsSum {
                id: ID,
                refund: 1_001 * U,
                sum: 1_000 * U,
            })
        );
    }

    #[test]
    fn test_confirm_and_unconfirm() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);

        engine.confirm_payment(ID, 700 * U).unwrap();
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 700 * U);

        engine.confirm_payment(ID, 200 * U).unwrap();
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 200 * U);
        assert_eq!(engine.aggregates().confirmed_total, 200 * U);
        assert_eq!(engine.aggregates().custodied_balance, 800 * U);
    }

    #[test]
    fn test_confirm_rejects_above_remainder() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        engine.refund_payment(ID, 400 * U).unwrap();

        assert_eq!(
            engine.confirm_payment(ID, 700 * U),
            Err(EngineError::ConfirmExceedsRemainder {
                id: ID,
                requested: 700 * U,
                remainder: 600 * U,
            })
        );
    }

    #[test]
    fn test_confirm_requires_cash_out_account() {
        let (mut engine, _) = engine_with_clock();
        engine.config.cash_out_account = None;
        make_simple(&mut engine, ID, 1_000 * U);

        assert_eq!(
            engine.confirm_payment(ID, 100 * U),
            Err(EngineError::CashOutAccountUnset)
        );
    }

    #[test]
    fn test_confirm_batch_validates_before_mutating() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        make_simple(&mut engine, ID2, 500 * U);

        let result = engine.confirm_payments(&[(ID, 300 * U), (ID2, 600 * U)]);
        assert_eq!(
            result,
            Err(EngineError::ConfirmExceedsRemainder {
                id: ID2,
                requested: 600 * U,
                remainder: 500 * U,
            })
        );
        // First entry untouched despite being valid
        assert_eq!(engine.payment(ID).unwrap().confirmed_amount, 0);
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 0);
    }

    #[test]
    fn test_confirm_batch_applies_in_order() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        make_simple(&mut engine, ID2, 500 * U);

        engine
            .confirm_payments(&[(ID, 300 * U), (ID2, 500 * U)])
            .unwrap();
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 800 * U);
        assert_eq!(engine.payment(ID2).unwrap().confirmed_amount, 500 * U);
    }

    #[test]
    fn test_confirm_batch_unwinds_on_ledger_fault() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        make_simple(&mut engine, ID2, 500 * U);
        engine.confirm_payment(ID, 300 * U).unwrap();
        engine.take_events();

        // Empty the cash-out account so the second entry's pull-back fails
        // mid-batch, after the first entry has already moved funds
        let drained = engine.ledger().balance_of(CASH_OUT);
        engine
            .ledger_mut()
            .transfer(CASH_OUT, PAYER, drained)
            .unwrap();
        let payer_before = engine.ledger().balance_of(PAYER);

        let result = engine.confirm_payments(&[(ID2, 100 * U), (ID, 0)]);
        assert!(matches!(result, Err(EngineError::Transfer(_))));

        // The first entry is confirmed back to its previous amount and the
        // batch leaves no events behind
        assert_eq!(engine.payment(ID2).unwrap().confirmed_amount, 0);
        assert_eq!(engine.payment(ID).unwrap().confirmed_amount, 300 * U);
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 0);
        assert_eq!(engine.ledger().balance_of(PAYER), payer_before);
        assert!(engine.take_events().is_empty());

        let (confirmed, unconfirmed) = engine.derive_aggregates();
        assert_eq!(confirmed, engine.aggregates().confirmed_total);
        assert_eq!(unconfirmed, engine.aggregates().unconfirmed_remainder);
    }

    #[test]
    fn test_empty_confirm_batch_rejected() {
        let mut engine = engine();
        assert_eq!(
            engine.confirm_payments(&[]),
            Err(EngineError::empty_batch("confirm"))
        );
    }

    #[test]
    fn test_revoke_returns_everything() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 400 * U, Some(SPONSOR), 800 * U, None, 0)
            .unwrap();
        engine.confirm_payment(ID, 500 * U).unwrap();

        engine.revoke_payment(ID).unwrap();

        // All parties restored, cashback pulled back
        assert_eq!(engine.ledger().balance_of(PAYER), 1_000_000 * U);
        assert_eq!(engine.ledger().balance_of(SPONSOR), 1_000_000 * U);
        assert_eq!(engine.ledger().balance_of(TREASURY), 1_000_000 * U);
        assert_eq!(engine.ledger().balance_of(ENGINE), 0);
        assert_eq!(engine.ledger().balance_of(CASH_OUT), 0);

        let payment = engine.payment(ID).unwrap();
        assert_eq!(payment.status, PaymentStatus::Revoked);
        assert_eq!(payment.sum(), 0);
        assert_eq!(engine.aggregates(), Aggregates::new());
    }

    #[test]
    fn test_cashback_rounding_examples() {
        let mut engine = engine();
        // 20% of 125000 is an exact tie, rounding up to 30000
        make_simple(&mut engine, ID, 125_000);
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 30_000);

        // 20% of 124999 is below the tie point, rounding down to 20000
        make_simple(&mut engine, ID2, 124_999);
        assert_eq!(engine.payment(ID2).unwrap().cashback_amount, 20_000);
    }

    #[test]
    fn test_cashback_cap_saturation() {
        let (mut engine, _) = engine_with_clock();
        engine.config.cashback_cap = 150 * U;
        engine.tracker = CashbackTracker::new(150 * U, engine.config.cap_reset_period);

        // 200u target against a 150u cap: clipped to the headroom
        make_simple(&mut engine, ID, 1_000 * U);
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 150 * U);

        // No headroom left: suppressed entirely
        make_simple(&mut engine, ID2, 1_000 * U);
        assert_eq!(engine.payment(ID2).unwrap().cashback_amount, 0);

        let events = engine.take_events();
        let statuses: Vec<CashbackStatus> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Cashback(cb) => Some(cb.status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![CashbackStatus::Partial, CashbackStatus::Capped]);
    }

    #[test]
    fn test_cashback_window_reset() {
        let (mut engine, time) = engine_with_clock();
        engine.config.cashback_cap = 150 * U;
        engine.tracker = CashbackTracker::new(150 * U, engine.config.cap_reset_period);

        make_simple(&mut engine, ID, 1_000 * U);
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 150 * U);

        // Step past the window: the cap replenishes
        time.store(engine.config.cap_reset_period + 1, Ordering::Relaxed);
        make_simple(&mut engine, ID2, 1_000 * U);
        assert_eq!(engine.payment(ID2).unwrap().cashback_amount, 150 * U);
    }

    #[test]
    fn test_cashback_out_of_funds_is_absorbed() {
        let (mut engine, _) = engine_with_clock();
        let drained = engine.ledger().balance_of(TREASURY);
        engine
            .ledger_mut()
            .transfer(TREASURY, CASH_OUT, drained)
            .unwrap();

        make_simple(&mut engine, ID, 1_000 * U);

        // The payment commits; only the cashback is missing
        let payment = engine.payment(ID).unwrap();
        assert_eq!(payment.base_amount, 1_000 * U);
        assert_eq!(payment.cashback_amount, 0);

        let events = engine.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Cashback(cb) if cb.status == CashbackStatus::OutOfFunds
        )));
    }

    #[test]
    fn test_treasury_unset_with_cashback_due_is_fatal() {
        let (mut engine, _) = engine_with_clock();
        engine.config.treasury = None;

        let result = engine.make_payment(ID, PAYER, 1_000 * U, 0, None, 0, None, 0);
        assert_eq!(result, Err(EngineError::TreasuryAccountUnset));
        assert!(engine.payment(ID).is_none());
        assert_eq!(engine.ledger().balance_of(PAYER), 1_000_000 * U);
    }

    #[test]
    fn test_disabled_cashback_never_needs_treasury() {
        let (mut engine, _) = engine_with_clock();
        engine.config.treasury = None;
        engine.config.cashback_enabled = false;

        make_simple(&mut engine, ID, 1_000 * U);
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 0);
    }

    #[test]
    fn test_merge_conserves_amounts_and_cashback() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        engine
            .make_payment(ID2, PAYER, 500 * U, 100 * U, None, 0, None, 0)
            .unwrap();
        engine.confirm_payment(ID2, 200 * U).unwrap();
        let payer_before = engine.ledger().balance_of(PAYER);
        let engine_before = engine.ledger().balance_of(ENGINE);
        let cashback_before = engine.payment(ID).unwrap().cashback_amount
            + engine.payment(ID2).unwrap().cashback_amount;

        engine.merge_payments(ID, &[ID2]).unwrap();

        let target = engine.payment(ID).unwrap();
        assert_eq!(target.base_amount, 1_500 * U);
        assert_eq!(target.extra_amount, 100 * U);
        assert_eq!(target.confirmed_amount, 200 * U);
        assert_eq!(target.cashback_amount, cashback_before);
        assert_eq!(engine.payment(ID2).unwrap().status, PaymentStatus::Merged);

        // Zero net external movement
        assert_eq!(engine.ledger().balance_of(PAYER), payer_before);
        assert_eq!(engine.ledger().balance_of(ENGINE), engine_before);

        let (confirmed, unconfirmed) = engine.derive_aggregates();
        assert_eq!(confirmed, engine.aggregates().confirmed_total);
        assert_eq!(unconfirmed, engine.aggregates().unconfirmed_remainder);
    }

    #[test]
    fn test_merge_validation() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);

        assert_eq!(
            engine.merge_payments(ID, &[]),
            Err(EngineError::empty_batch("merge"))
        );
        assert_eq!(
            engine.merge_payments(ID, &[ID]),
            Err(EngineError::MergeWithItself { id: ID })
        );

        let other_payer = AccountId([0x05; 20]);
        engine.ledger_mut().mint(other_payer, 1_000 * U);
        engine
            .make_payment(ID2, other_payer, 500 * U, 0, None, 0, None, 0)
            .unwrap();
        assert_eq!(
            engine.merge_payments(ID, &[ID2]),
            Err(EngineError::MergePayerMismatch {
                source_id: ID2,
                source_payer: other_payer,
                target_payer: PAYER,
            })
        );
    }

    #[test]
    fn test_merge_rejects_sponsored_target_and_higher_rate_source() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 0, Some(SPONSOR), 500 * U, None, 0)
            .unwrap();
        make_simple(&mut engine, ID2, 500 * U);
        assert_eq!(
            engine.merge_payments(ID, &[ID2]),
            Err(EngineError::MergeSponsoredTarget { id: ID })
        );

        let target = PaymentId([0xCC; 32]);
        engine
            .make_payment(target, PAYER, 100 * U, 0, None, 0, Some(100), 0)
            .unwrap();
        assert_eq!(
            engine.merge_payments(target, &[ID2]),
            Err(EngineError::MergeRateMismatch {
                source_id: ID2,
                source_rate: 200,
                target_rate: 100,
            })
        );
    }

    #[test]
    fn test_merge_rejects_duplicate_sources_untouched() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        make_simple(&mut engine, ID2, 500 * U);
        let payer_before = engine.ledger().balance_of(PAYER);
        engine.take_events();

        assert_eq!(
            engine.merge_payments(ID, &[ID2, ID2]),
            Err(EngineError::MergeDuplicateSource { id: ID2 })
        );

        // Nothing merged, nothing moved
        assert_eq!(engine.payment(ID2).unwrap().status, PaymentStatus::Active);
        assert_eq!(engine.payment(ID).unwrap().base_amount, 1_000 * U);
        assert_eq!(engine.ledger().balance_of(PAYER), payer_before);
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_merge_multiple_sources_folds_each() {
        let mut engine = engine();
        let id3 = PaymentId([0xDD; 32]);
        make_simple(&mut engine, ID, 500 * U);
        make_simple(&mut engine, ID2, 250 * U);
        make_simple(&mut engine, id3, 125 * U);

        engine.merge_payments(ID, &[ID2, id3]).unwrap();

        let target = engine.payment(ID).unwrap();
        assert_eq!(target.base_amount, 875 * U);
        assert_eq!(target.cashback_amount, 175 * U);
        assert_eq!(engine.payment(ID2).unwrap().status, PaymentStatus::Merged);
        assert_eq!(engine.payment(id3).unwrap().status, PaymentStatus::Merged);

        // The stored target reflects both folds
        let (confirmed, unconfirmed) = engine.derive_aggregates();
        assert_eq!(confirmed, engine.aggregates().confirmed_total);
        assert_eq!(unconfirmed, engine.aggregates().unconfirmed_remainder);
        assert_eq!(engine.aggregates().custodied_balance, 875 * U);
    }

    #[test]
    fn test_config_setters_reject_noop() {
        let mut engine = engine();
        assert_eq!(
            engine.set_cashback_rate(200),
            Err(EngineError::configuration_unchanged("cashback_rate"))
        );
        assert_eq!(engine.set_cashback_rate(501), Err(EngineError::RateOutOfRange {
            rate: 501,
            max: 500,
        }));
        engine.set_cashback_rate(300).unwrap();
        assert_eq!(engine.config().cashback_rate, 300);

        assert_eq!(
            engine.set_cashback_treasury(AccountId::ZERO),
            Err(EngineError::zero_address("treasury"))
        );
        assert_eq!(
            engine.set_cashback_treasury(TREASURY),
            Err(EngineError::configuration_unchanged("treasury"))
        );
        engine.set_cashback_enabled(false).unwrap();
        assert_eq!(
            engine.set_cashback_enabled(false),
            Err(EngineError::configuration_unchanged("cashback_enabled"))
        );
    }

    #[test]
    fn test_snapshot_governs_later_deltas() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 200 * U);

        // The global rate change does not affect the existing payment: the
        // downsized target is 20% of 500u, not 40%
        engine.set_cashback_rate(400).unwrap();
        engine.update_payment(ID, 500 * U, 0).unwrap();
        assert_eq!(engine.payment(ID).unwrap().cashback_amount, 100 * U);
    }

    #[test]
    fn test_events_are_emitted_and_drained() {
        let mut engine = engine();
        engine
            .make_payment(ID, PAYER, 1_000 * U, 0, Some(SPONSOR), 400 * U, None, 100 * U)
            .unwrap();

        let events = engine.take_events();
        assert_eq!(events.len(), 3);
        match &events[0] {
            EngineEvent::Payment(event) => {
                assert_eq!(event.kind, PaymentEventKind::Made);
                assert_eq!(event.payment_id, ID);
                assert_eq!(event.payload[0], crate::events::EVENT_SCHEMA_VERSION);
                assert_eq!(event.payload[1], crate::events::FLAG_SPONSOR_PRESENT);
            }
            other => panic!("expected payment event, got {:?}", other),
        }
        assert!(matches!(
            &events[1],
            EngineEvent::Payment(e) if e.kind == PaymentEventKind::Confirmed
        ));
        assert!(matches!(
            &events[2],
            EngineEvent::Cashback(cb) if cb.kind == CashbackEventKind::Sent
        ));
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_lazy_update_applies_without_updated_event() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        engine.take_events();

        engine.update_payment_lazy(ID, 1_500 * U, 0).unwrap();

        assert_eq!(engine.payment(ID).unwrap().base_amount, 1_500 * U);
        let events = engine.take_events();
        assert!(!events.iter().any(|e| matches!(
            e,
            EngineEvent::Payment(p) if p.kind == PaymentEventKind::Updated
        )));
        // The cashback sub-event still surfaces
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Cashback(cb) if cb.kind == CashbackEventKind::Increased
        )));
    }

    #[test]
    fn test_aggregates_audit_after_mixed_operations() {
        let mut engine = engine();
        make_simple(&mut engine, ID, 1_000 * U);
        engine
            .make_payment(ID2, PAYER, 600 * U, 200 * U, Some(SPONSOR), 300 * U, None, 0)
            .unwrap();
        engine.confirm_payment(ID, 250 * U).unwrap();
        engine.refund_payment(ID2, 100 * U).unwrap();
        engine.update_payment(ID, 1_200 * U, 50 * U).unwrap();

        let (confirmed, unconfirmed) = engine.derive_aggregates();
        assert_eq!(confirmed, engine.aggregates().confirmed_total);
        assert_eq!(unconfirmed, engine.aggregates().unconfirmed_remainder);
        assert_eq!(
            engine.ledger().balance_of(ENGINE),
            engine.aggregates().custodied_balance
        );
    }
}
