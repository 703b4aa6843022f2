//! Proportional value allocation.
//!
//! Distributes a transaction's aggregate offer across line items that carry
//! no usable price, by weight when any unpriced item has one and evenly
//! otherwise. Amounts are `rust_decimal::Decimal` rounded half away from zero
//! to cents. The last item in the caller's order absorbs the rounding
//! residual, so callers must keep item order stable between runs.
//! All sums and products are checked: amounts too large for `Decimal` turn
//! into [`Discrepancy::ArithmeticOverflow`] instead of a panic.

use crate::domain::model::{
    AllocatedPrice, AllocationResult, Discrepancy, LineItem, PriceOrigin, PriceSource,
};
use rust_decimal::prelude::*;

pub use crate::domain::model::PrecedencePolicy;

const CURRENCY_PLACES: u32 = 2;

/// Round to cents, half away from zero, always carrying two decimal places.
pub fn round_currency(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_PLACES);
    rounded
}

/// Pads to two decimal places without rounding away extra precision.
pub fn with_cents(value: Decimal) -> Decimal {
    let mut padded = value;
    if padded.scale() < CURRENCY_PLACES {
        padded.rescale(CURRENCY_PLACES);
    }
    padded
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// 已有價格的項目：回傳 (price, buy_price)
fn resolve_existing(item: &LineItem, policy: &PrecedencePolicy) -> Option<(Decimal, Decimal)> {
    let price = positive(item.price);
    let buy_price = positive(item.buy_price);

    let resolved = match policy.source_of_truth {
        PriceSource::Price => price.or(buy_price),
        PriceSource::BuyPrice => buy_price.or(price),
    }?;

    let buy = if policy.preserve_buy_price {
        buy_price.unwrap_or(resolved)
    } else {
        resolved
    };
    Some((resolved, buy))
}

/// The residual assigned to the last slot; negative residuals clamp to zero
/// and are handed back for reporting.
fn absorb(residual: Decimal) -> (Decimal, Option<Decimal>) {
    if residual < Decimal::ZERO {
        (round_currency(Decimal::ZERO), Some(residual))
    } else {
        (round_currency(residual), None)
    }
}

fn checked_sum<'a>(values: impl IntoIterator<Item = &'a Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(*value))
}

fn split_evenly(amount: Decimal, count: usize) -> Option<(Vec<Decimal>, Option<Decimal>)> {
    if count == 0 {
        return Some((Vec::new(), None));
    }

    let share = round_currency(amount.checked_div(Decimal::from(count))?);
    let mut shares = vec![share; count - 1];
    let distributed = checked_sum(&shares)?;

    let (last, clamped) = absorb(amount.checked_sub(distributed)?);
    shares.push(last);
    Some((shares, clamped))
}

/// Allocates `target` across `items` under the default precedence policy.
pub fn allocate_default(target: Decimal, items: &[LineItem]) -> AllocationResult {
    allocate(target, items, PrecedencePolicy::default())
}

/// Allocates `target` across the unpriced entries of `items`.
///
/// Items with a positive `price` or `buy_price` keep their value (resolved
/// through `policy`) and count against the target. The rest share
/// `round(max(0, target - existing), 2)`:
///
/// * weighted items in proportion to their weight, the last weighted item
///   taking whatever rounding left over;
/// * unweighted items split evenly whatever the weighted items did not
///   take, the last one absorbing rounding.
///
/// Missing, zero and negative weights count as no weight. A negative target
/// is treated as zero. The result lists every input item once, in input
/// order. Nothing here fails; conditions that cannot be reconciled exactly
/// come back as [`Discrepancy`] values. The one exception to the ordering
/// rule is arithmetic overflow: the result then carries no prices and a
/// single [`Discrepancy::ArithmeticOverflow`], so the caller can skip the
/// transaction.
pub fn allocate(target: Decimal, items: &[LineItem], policy: PrecedencePolicy) -> AllocationResult {
    try_allocate(target, items, policy).unwrap_or_else(|| AllocationResult {
        prices: Vec::new(),
        discrepancies: vec![Discrepancy::ArithmeticOverflow],
    })
}

fn try_allocate(
    target: Decimal,
    items: &[LineItem],
    policy: PrecedencePolicy,
) -> Option<AllocationResult> {
    let target = target.max(Decimal::ZERO);
    let mut slots: Vec<Option<AllocatedPrice>> = vec![None; items.len()];
    let mut discrepancies = Vec::new();
    let mut existing_total = Decimal::ZERO;
    let mut unpriced = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match resolve_existing(item, &policy) {
            Some((price, buy_price)) => {
                existing_total = existing_total.checked_add(price)?;
                slots[index] = Some(AllocatedPrice {
                    id: item.id.clone(),
                    price,
                    buy_price,
                    origin: PriceOrigin::Existing,
                });
            }
            None => unpriced.push(index),
        }
    }

    if existing_total > target {
        discrepancies.push(Discrepancy::ExistingExceedsTarget {
            existing: existing_total,
            target,
        });
    }

    if !unpriced.is_empty() {
        let remaining = round_currency((target - existing_total).max(Decimal::ZERO));
        let shares = distribute(remaining, items, &unpriced, &mut discrepancies)?;

        for (index, price) in unpriced.into_iter().zip(shares) {
            slots[index] = Some(AllocatedPrice {
                id: items[index].id.clone(),
                price,
                buy_price: price,
                origin: PriceOrigin::Allocated,
            });
        }
    }

    Some(AllocationResult {
        prices: slots.into_iter().flatten().collect(),
        discrepancies,
    })
}

/// `remaining * weight / total`; falls back to multiplying by the ratio when
/// the product alone would not fit.
fn weighted_share(remaining: Decimal, weight: Decimal, total: Decimal) -> Option<Decimal> {
    remaining
        .checked_mul(weight)
        .and_then(|product| product.checked_div(total))
        .or_else(|| remaining.checked_mul(weight.checked_div(total)?))
}

/// 將 remaining 分配給未定價項目，回傳順序與 `unpriced` 相同
fn distribute(
    remaining: Decimal,
    items: &[LineItem],
    unpriced: &[usize],
    discrepancies: &mut Vec<Discrepancy>,
) -> Option<Vec<Decimal>> {
    if remaining <= Decimal::ZERO {
        return Some(vec![round_currency(Decimal::ZERO); unpriced.len()]);
    }

    let weights: Vec<Decimal> = unpriced
        .iter()
        .map(|&index| positive(items[index].weight).unwrap_or(Decimal::ZERO))
        .collect();
    let total_weight = checked_sum(&weights)?;

    if total_weight.is_zero() {
        let (shares, clamped) = split_evenly(remaining, unpriced.len())?;
        if let (Some(residual), Some(&last)) = (clamped, unpriced.last()) {
            discrepancies.push(Discrepancy::ResidualClamped {
                item_id: items[last].id.clone(),
                residual,
            });
        }
        return Some(shares);
    }

    let mut shares = vec![round_currency(Decimal::ZERO); unpriced.len()];
    let weighted: Vec<usize> = (0..unpriced.len())
        .filter(|&pos| weights[pos] > Decimal::ZERO)
        .collect();
    let unweighted: Vec<usize> = (0..unpriced.len())
        .filter(|&pos| weights[pos].is_zero())
        .collect();

    let mut distributed = Decimal::ZERO;
    for (n, &pos) in weighted.iter().enumerate() {
        if n + 1 == weighted.len() {
            let (share, clamped) = absorb(remaining.checked_sub(distributed)?);
            if let Some(residual) = clamped {
                discrepancies.push(Discrepancy::ResidualClamped {
                    item_id: items[unpriced[pos]].id.clone(),
                    residual,
                });
            }
            shares[pos] = share;
        } else {
            let share = round_currency(weighted_share(remaining, weights[pos], total_weight)?);
            distributed = distributed.checked_add(share)?;
            shares[pos] = share;
        }
    }

    // 沒有重量的項目平分剩下的金額（通常為 0）
    let assigned = checked_sum(weighted.iter().map(|&pos| &shares[pos]))?;
    let leftover = remaining.checked_sub(assigned)?.max(Decimal::ZERO);
    let (even, clamped) = split_evenly(leftover, unweighted.len())?;
    if let (Some(residual), Some(&last)) = (clamped, unweighted.last()) {
        discrepancies.push(Discrepancy::ResidualClamped {
            item_id: items[unpriced[last]].id.clone(),
            residual,
        });
    }
    for (&pos, share) in unweighted.iter().zip(even) {
        shares[pos] = share;
    }

    Some(shares)
}
