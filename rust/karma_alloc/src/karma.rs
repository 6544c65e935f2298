// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Karma credit-based allocator
//!
//! Karma lets tenants trade allocation across rounds. Each tenant is
//! guaranteed a baseline of `fair_share` blocks per round; the rest of
//! the capacity forms a public pool. Demand below the baseline is
//! donated, demand above it is borrowed, and every block that changes
//! hands moves one credit the other way.
//!
//! Terminology
//! -----------
//!
//! *Fair share*
//!
//! With `n` tenants and `num_blocks` total blocks, each tenant's
//! guaranteed baseline is
//!
//! ```text
//! fair_share = floor(alpha * floor(num_blocks / n))
//! public_blocks = num_blocks - n * fair_share
//! ```
//!
//! `alpha` in `[0, 1]` decides how much of the capacity is guaranteed and
//! how much is up for trade. Both values are recomputed whenever the
//! tenant set changes.
//!
//! *Donor / borrower*
//!
//! A tenant demanding less than `fair_share` is a donor with a surplus of
//! `fair_share - demand`. A tenant demanding more is a borrower that wants
//! `demand - fair_share`, bounded by how many credits it can spend before
//! reaching the credit floor.
//!
//! Round protocol
//! --------------
//!
//! Supply is the public pool plus all donor surplus. Then:
//!
//! 1. Supply covers every borrower (`borrow_from_poor`): each borrower
//!    gets everything it wants. The blocks are taken from donors first,
//!    poorest donor first, so donors short on credits get to earn them.
//!    Whatever donors cannot cover comes out of the public pool.
//!
//! 2. Supply falls short (`donate_to_rich`): all donor surplus and the
//!    whole public pool are handed out, richest borrower first.
//!
//! "Poorest first" and "richest first" are both credit-level water-fills:
//! one block at a time to whoever currently has the fewest (most)
//! credits, which is solved in one shot by searching for the final level
//! (see [`level_fill`]).
//!
//! Credits paid for public blocks go to the public ledger, which is paid
//! back out as an equal dividend to all tenants at the end of the round.
//! Credits are therefore conserved: `total_credits() + public_ledger()`
//! only changes when tenants join or leave.

use std::collections::BTreeMap;

use anyhow::bail;
use anyhow::Result;
use log::debug;
use log::trace;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

use crate::tenant::is_reserved;
use crate::tenant::Allocator;
use crate::tenant::TenantError;
use crate::tenant::Usage;

/// Configuration for [`KarmaAllocator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarmaConfig {
    /// Total blocks, baseline and public pool together.
    pub num_blocks: u32,
    /// Fraction of the per-tenant share that is guaranteed.
    pub alpha: f32,
    /// Opening credit balance of a new tenant.
    pub init_credits: u32,
    /// Lowest balance a tenant may reach by borrowing.
    pub credit_floor: i64,
}

impl Default for KarmaConfig {
    fn default() -> Self {
        Self {
            num_blocks: 100,
            alpha: 0.5,
            init_credits: 1000,
            credit_floor: 0,
        }
    }
}

impl KarmaConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            bail!("alpha {} is outside [0, 1]", self.alpha);
        }
        if self.num_blocks == 0 {
            bail!("num_blocks must be non-zero");
        }
        if (self.init_credits as i64) < self.credit_floor {
            bail!(
                "init_credits {} is below the credit floor {}",
                self.init_credits,
                self.credit_floor
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Tenant {
    usage: Usage,
    credits: i64,
    rate: i64,
}

/// A tenant taking part in a level fill.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: u32,
    level: i64,
    blocks: u32,
}

/// Hand out `amount` blocks one at a time, each to the candidate with the
/// lowest current `level`, where taking a block raises a candidate's level
/// by one and no candidate takes more than its `blocks`. Ties go to the
/// candidate listed first.
///
/// Rather than stepping block by block, binary-search the highest final
/// level `L` whose fill fits in `amount`, then place the few leftover
/// blocks on candidates sitting exactly at `L`.
fn level_fill(cands: &[Candidate], amount: u64) -> Vec<u32> {
    let capacity: u64 = cands.iter().map(|c| c.blocks as u64).sum();
    if amount >= capacity {
        return cands.iter().map(|c| c.blocks).collect();
    }

    let taken_at = |level: i64| -> u64 {
        cands
            .iter()
            .map(|c| (level - c.level).clamp(0, c.blocks as i64) as u64)
            .sum()
    };

    let mut lo = cands.iter().map(|c| c.level).min().unwrap_or(0);
    let mut hi = cands
        .iter()
        .map(|c| c.level + c.blocks as i64)
        .max()
        .unwrap_or(0);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if taken_at(mid) <= amount {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let mut left = amount - taken_at(lo);
    cands
        .iter()
        .map(|c| {
            let got = (lo - c.level).clamp(0, c.blocks as i64) as u32;
            if left > 0 && c.level <= lo && got < c.blocks {
                left -= 1;
                got + 1
            } else {
                got
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct KarmaAllocator {
    num_blocks: u32,
    alpha: f32,
    init_credits: u32,
    credit_floor: i64,
    fair_share: u32,
    public_blocks: u32,
    total_credits: i64,
    public_ledger: i64,
    tenants: BTreeMap<u32, Tenant>,
}

impl KarmaAllocator {
    /// Create an allocator over `num_blocks` blocks. `alpha` is clamped to
    /// `[0, 1]`.
    pub fn new(num_blocks: u32, alpha: f32, init_credits: u32) -> Self {
        let clamped = if alpha.is_nan() {
            1.0
        } else {
            alpha.clamp(0.0, 1.0)
        };
        if clamped != alpha {
            warn!("alpha {} is outside [0, 1], using {}", alpha, clamped);
        }
        Self {
            num_blocks,
            alpha: clamped,
            init_credits,
            credit_floor: 0,
            fair_share: 0,
            public_blocks: num_blocks,
            total_credits: 0,
            public_ledger: 0,
            tenants: BTreeMap::new(),
        }
    }

    pub fn from_config(cfg: &KarmaConfig) -> Result<Self> {
        cfg.validate()?;
        let mut alloc = Self::new(cfg.num_blocks, cfg.alpha, cfg.init_credits);
        alloc.credit_floor = cfg.credit_floor;
        Ok(alloc)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Guaranteed per-tenant baseline for the current tenant set.
    pub fn fair_share(&self) -> u32 {
        self.fair_share
    }

    pub fn public_blocks(&self) -> u32 {
        self.public_blocks
    }

    pub fn credit_floor(&self) -> i64 {
        self.credit_floor
    }

    /// Sum of every tenant's credit balance.
    pub fn total_credits(&self) -> i64 {
        self.total_credits
    }

    /// Credits paid for public blocks that are not yet paid out.
    pub fn public_ledger(&self) -> i64 {
        self.public_ledger
    }

    pub fn credits(&self, id: u32) -> Option<i64> {
        self.tenants.get(&id).map(|t| t.credits)
    }

    /// Net credit change applied by the last `allocate()`.
    pub fn rate(&self, id: u32) -> Option<i64> {
        self.tenants.get(&id).map(|t| t.rate)
    }

    /// Blocks of baseline `id` leaves unused at its current demand.
    pub fn block_surplus(&self, id: u32) -> Option<u32> {
        self.tenants
            .get(&id)
            .map(|t| self.fair_share.saturating_sub(t.usage.demand))
    }

    fn update_shares(&mut self) {
        let nr = self.tenants.len() as u32;
        if nr == 0 {
            self.fair_share = 0;
            self.public_blocks = self.num_blocks;
            return;
        }
        let per_tenant = self.num_blocks / nr;
        // f32 drops integers past 2^24. Capped so n * fair_share fits.
        self.fair_share = ((self.alpha as f64 * per_tenant as f64).floor() as u32).min(per_tenant);
        let reserved = nr as u64 * self.fair_share as u64;
        self.public_blocks = (self.num_blocks as u64).saturating_sub(reserved) as u32;
        debug!(
            "karma: {} tenants, fair_share={} public_blocks={}",
            nr, self.fair_share, self.public_blocks
        );
    }

    fn borrowing_limit(&self, t: &Tenant) -> u32 {
        let want = t.usage.demand - self.fair_share;
        let spendable = (t.credits - self.credit_floor).max(0);
        (want as i64).min(spendable) as u32
    }

    fn grant(&mut self, id: u32, blocks: u32) {
        if let Some(t) = self.tenants.get_mut(&id) {
            t.usage.allocation += blocks;
            t.rate -= blocks as i64;
        }
    }

    fn credit(&mut self, id: u32, blocks: u32) {
        if let Some(t) = self.tenants.get_mut(&id) {
            t.rate += blocks as i64;
        }
    }

    /// Every borrower is satisfied. Take `demand` blocks from donors,
    /// poorest first, and the rest from the public pool.
    fn borrow_from_poor(&mut self, demand: u64, donors: &[Candidate], borrowers: &[Candidate]) {
        for b in borrowers {
            self.grant(b.id, b.blocks);
        }

        let donated = level_fill(donors, demand);
        let mut from_donors = 0u64;
        for (d, &blocks) in donors.iter().zip(donated.iter()) {
            self.credit(d.id, blocks);
            from_donors += blocks as u64;
        }
        self.public_ledger += (demand - from_donors) as i64;
    }

    /// Supply is short. Every donor block and the public pool go out,
    /// richest borrower first.
    fn donate_to_rich(&mut self, supply: u64, donors: &[Candidate], borrowers: &[Candidate]) {
        for d in donors {
            self.credit(d.id, d.blocks);
        }
        self.public_ledger += self.public_blocks as i64;

        // Negated credits turn "richest first" into "lowest level first".
        let rich: Vec<Candidate> = borrowers
            .iter()
            .map(|b| Candidate {
                level: -b.level,
                ..*b
            })
            .collect();
        let granted = level_fill(&rich, supply);
        for (b, &blocks) in borrowers.iter().zip(granted.iter()) {
            self.grant(b.id, blocks);
        }
    }

    fn pay_dividend(&mut self) {
        let nr = self.tenants.len() as i64;
        if nr == 0 {
            return;
        }
        let dividend = self.public_ledger / nr;
        if dividend == 0 {
            return;
        }
        for t in self.tenants.values_mut() {
            t.rate += dividend;
        }
        self.public_ledger -= dividend * nr;
    }
}

impl Allocator for KarmaAllocator {
    fn total_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn try_add_user(&mut self, id: u32) -> Result<(), TenantError> {
        if is_reserved(id) {
            return Err(TenantError::Reserved(id));
        }
        if self.tenants.contains_key(&id) {
            return Err(TenantError::Duplicate(id));
        }
        self.tenants.insert(
            id,
            Tenant {
                usage: Usage::default(),
                credits: self.init_credits as i64,
                rate: 0,
            },
        );
        self.total_credits += self.init_credits as i64;
        self.update_shares();
        Ok(())
    }

    fn try_remove_user(&mut self, id: u32) -> Result<(), TenantError> {
        let t = self.tenants.remove(&id).ok_or(TenantError::NotFound(id))?;
        self.total_credits -= t.credits;
        self.update_shares();
        Ok(())
    }

    fn try_set_demand(&mut self, id: u32, demand: u32) -> Result<(), TenantError> {
        let t = self.tenants.get_mut(&id).ok_or(TenantError::NotFound(id))?;
        t.usage.demand = demand;
        Ok(())
    }

    fn allocate(&mut self) {
        let fair_share = self.fair_share;
        let mut donors = Vec::new();
        let mut borrowers = Vec::new();
        let mut supply = self.public_blocks as u64;
        let mut want = 0u64;

        for (&id, t) in self.tenants.iter() {
            if t.usage.demand < fair_share {
                let surplus = fair_share - t.usage.demand;
                donors.push(Candidate {
                    id,
                    level: t.credits,
                    blocks: surplus,
                });
                supply += surplus as u64;
            } else if t.usage.demand > fair_share {
                let limit = self.borrowing_limit(t);
                if limit > 0 {
                    borrowers.push(Candidate {
                        id,
                        level: t.credits,
                        blocks: limit,
                    });
                    want += limit as u64;
                }
            }
        }

        for t in self.tenants.values_mut() {
            t.rate = 0;
            t.usage.allocation = t.usage.demand.min(fair_share);
        }

        if supply >= want {
            self.borrow_from_poor(want, &donors, &borrowers);
        } else {
            self.donate_to_rich(supply, &donors, &borrowers);
        }
        self.pay_dividend();

        let mut delta = 0i64;
        for (id, t) in self.tenants.iter_mut() {
            t.credits += t.rate;
            delta += t.rate;
            trace!(
                "tenant {}: alloc={}/{} credits={} rate={}",
                id,
                t.usage.allocation,
                t.usage.demand,
                t.credits,
                t.rate
            );
        }
        self.total_credits += delta;

        debug!(
            "karma: supply={} want={} donors={} borrowers={} ledger={}",
            supply,
            want,
            donors.len(),
            borrowers.len(),
            self.public_ledger
        );
    }

    fn num_tenants(&self) -> u32 {
        self.tenants.len() as u32
    }

    fn tenant_ids(&self) -> Vec<u32> {
        self.tenants.keys().copied().collect()
    }

    fn demand(&self, id: u32) -> Option<u32> {
        self.tenants.get(&id).map(|t| t.usage.demand)
    }

    fn allocation(&self, id: u32) -> Option<u32> {
        self.tenants.get(&id).map(|t| t.usage.allocation)
    }
}
