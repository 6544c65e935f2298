// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Welfare, fairness and utilization over recorded allocation history.
//!
//! History is kept as [`Matrix`](crate::trace::Matrix) values indexed
//! `[round][tenant]`, with columns in the same tenant order for every
//! round. None of these functions are used by the allocators themselves.
//!
//! *Welfare* is the fraction of a tenant's demand that was met. A tenant
//! that never asked for anything is fully satisfied by convention.
//!
//! *Fairness* is `min(welfare) / max(welfare)`, 1 meaning perfectly even.

use ordered_float::OrderedFloat;

/// Block value a tenant derives per unit of payment, given its demand.
pub type Valuation<'a> = &'a dyn Fn(u32) -> u32;

fn nr_tenants(demands: &[Vec<u32>]) -> usize {
    demands.first().map(|row| row.len()).unwrap_or(0)
}

fn ratio(met: u64, wanted: u64) -> f32 {
    if wanted > 0 {
        met as f32 / wanted as f32
    } else {
        1.0
    }
}

// Blocks' worth of value a tenant gets for `units` blocks bought at
// `payment`, capped at what it asked for.
fn valued(demand: u32, units: u32, payment: u32, valuation: Valuation) -> u64 {
    let value = if payment == 0 {
        units as u64
    } else {
        units as u64 * valuation(demand) as u64 / payment as u64
    };
    value.min(demand as u64)
}

/// Per-tenant cumulative welfare: `sum(min(demand, alloc)) / sum(demand)`.
pub fn welfares(demands: &[Vec<u32>], allocations: &[Vec<u32>]) -> Vec<f32> {
    (0..nr_tenants(demands))
        .map(|i| {
            let mut used = 0u64;
            let mut wanted = 0u64;
            for (d, a) in demands.iter().zip(allocations.iter()) {
                used += d[i].min(a[i]) as u64;
                wanted += d[i] as u64;
            }
            ratio(used, wanted)
        })
        .collect()
}

/// Like [`welfares`], but each round's allocation is converted to value
/// through `valuation(demand) / payment` before being capped at demand.
/// Rounds with zero payment count the allocation at face value.
pub fn welfares_with_payments(
    demands: &[Vec<u32>],
    allocations: &[Vec<u32>],
    payments: &[Vec<u32>],
    valuation: Valuation,
) -> Vec<f32> {
    (0..nr_tenants(demands))
        .map(|i| {
            let mut actual = 0u64;
            let mut expected = 0u64;
            for ((d, a), p) in demands.iter().zip(allocations.iter()).zip(payments.iter()) {
                actual += valued(d[i], a[i], p[i], valuation);
                expected += d[i] as u64;
            }
            ratio(actual, expected)
        })
        .collect()
}

fn min_max_ratio(values: impl Iterator<Item = f32>) -> f32 {
    let (min, max) = values.fold(
        (OrderedFloat(f32::INFINITY), OrderedFloat(0.0f32)),
        |(min, max), w| (min.min(OrderedFloat(w)), max.max(OrderedFloat(w))),
    );
    if max.0 == 0.0 {
        return 1.0;
    }
    min.0 / max.0
}

/// `min / max` over `welfares[start..]`. 1 when the slice is empty or
/// every welfare is 0.
pub fn fairness(welfares: &[f32], start: usize) -> f32 {
    match welfares.get(start..) {
        Some(tail) if !tail.is_empty() => min_max_ratio(tail.iter().copied()),
        _ => 1.0,
    }
}

/// Fairness of a single round, tenants from `start` onward.
pub fn instant_fairness(demands: &[u32], allocations: &[u32], start: usize) -> f32 {
    min_max_ratio(
        demands
            .iter()
            .zip(allocations.iter())
            .skip(start)
            .map(|(&d, &a)| ratio(d.min(a) as u64, d as u64)),
    )
}

/// Value-weighted [`instant_fairness`].
pub fn instant_fairness_with_payments(
    demands: &[u32],
    allocations: &[u32],
    payments: &[u32],
    valuation: Valuation,
    start: usize,
) -> f32 {
    min_max_ratio(
        demands
            .iter()
            .zip(allocations.iter())
            .zip(payments.iter())
            .skip(start)
            .map(|((&d, &a), &p)| ratio(valued(d, d.min(a), p, valuation), d as u64)),
    )
}

/// Fraction of `blocks` that went to satisfying demand in one round.
///
/// Panics if `blocks` is 0; that means the allocator was misconfigured.
pub fn utilization(demands: &[u32], allocations: &[u32], blocks: u64) -> f32 {
    assert!(blocks > 0, "utilization over zero blocks");
    let used: u64 = demands
        .iter()
        .zip(allocations.iter())
        .map(|(&d, &a)| d.min(a) as u64)
        .sum();
    used as f32 / blocks as f32
}

/// Mean of `arr[a..b]`, 0 for an empty range.
pub fn range_average(arr: &[f32], a: usize, b: usize) -> f32 {
    assert!(b >= a, "range_average over [{}, {})", a, b);
    if b == a {
        return 0.0;
    }
    arr[a..b].iter().sum::<f32>() / (b - a) as f32
}
