//! Fee splitting, expiry and refund arithmetic.
//!
//! Pure integer functions shared by the planner and the validator. Amounts
//! are AGENT base units (6 decimals); products are taken in `u128` so that
//! only genuinely unrepresentable results report [`ArithmeticOverflow`].

use serde::Serialize;

use super::datum::{Installment, SubscriptionDatum};
use super::error::ArithmeticOverflow;
use super::ledger::KeyHash;

/// A claimed fee divided between merchant and partner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub merchant: u64,
    pub partner: u64,
}

/// `partner = floor(fee * pct / 100)`, merchant takes the remainder, so the
/// two always sum to `service_fee`.
pub fn split_fee(service_fee: u64, partner_percentage: u8) -> Result<FeeSplit, ArithmeticOverflow> {
    let partner = u128::from(service_fee) * u128::from(partner_percentage) / 100;
    let partner = u64::try_from(partner).map_err(|_| ArithmeticOverflow)?;
    let merchant = service_fee.checked_sub(partner).ok_or(ArithmeticOverflow)?;
    Ok(FeeSplit { merchant, partner })
}

/// Recipients of a claimed fee with non-zero amounts. The partner share falls
/// to the merchant when no partner is set; shares owed to one key merge.
pub fn payouts(datum: &SubscriptionDatum, split: FeeSplit) -> Vec<(KeyHash, u64)> {
    let partner = datum.partner.unwrap_or(datum.merchant);
    let shares = if partner == datum.merchant {
        vec![(datum.merchant, split.merchant.saturating_add(split.partner))]
    } else {
        vec![(datum.merchant, split.merchant), (partner, split.partner)]
    };
    shares.into_iter().filter(|(_, amount)| *amount > 0).collect()
}

pub fn is_expired(subscription_end: u64, now: u64) -> bool {
    now >= subscription_end
}

/// Refund proportional to the unexpired part of `total_period`:
/// `floor(total_deposited * clamp(end - now, 0, total_period) / total_period)`.
///
/// Zero at or after expiry and when nothing was purchased.
pub fn prorated_refund(
    subscription_end: u64,
    now: u64,
    total_deposited: u64,
    total_period: u64,
) -> Result<u64, ArithmeticOverflow> {
    if total_period == 0 {
        return Ok(0);
    }
    let remaining = subscription_end.saturating_sub(now).min(total_period);
    let refund = u128::from(total_deposited) * u128::from(remaining) / u128::from(total_period);
    u64::try_from(refund).map_err(|_| ArithmeticOverflow)
}

pub fn sum_installments(installments: &[Installment]) -> Result<u64, ArithmeticOverflow> {
    installments
        .iter()
        .try_fold(0u64, |acc, i| acc.checked_add(i.amount).ok_or(ArithmeticOverflow))
}

/// How pending installments are divided when the subscriber cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cancellation {
    /// Sum of pending installments.
    pub pending: u64,
    /// Part of `pending` returned to the subscriber.
    pub refund: u64,
    /// Unrefunded part of `pending`, split between merchant and partner.
    pub fee: FeeSplit,
}

/// Pending installments pay for the last `installments.len()` periods before
/// `subscription_end`; the unserved share of them is refunded.
pub fn cancellation(
    datum: &SubscriptionDatum,
    now: u64,
    period_ms: u64,
) -> Result<Cancellation, ArithmeticOverflow> {
    let pending = sum_installments(&datum.installments)?;
    let periods = u64::try_from(datum.installments.len()).map_err(|_| ArithmeticOverflow)?;
    let total_period = periods.checked_mul(period_ms).ok_or(ArithmeticOverflow)?;
    let refund = prorated_refund(datum.subscription_end, now, pending, total_period)?;
    let earned = pending.checked_sub(refund).ok_or(ArithmeticOverflow)?;
    Ok(Cancellation {
        pending,
        refund,
        fee: split_fee(earned, datum.partner_percentage)?,
    })
}
