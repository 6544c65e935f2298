// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use karma_alloc::metrics;
use karma_alloc::Allocator;
use karma_alloc::DemandGenerator;
use karma_alloc::KarmaAllocator;
use karma_alloc::Matrix;
use karma_alloc::MaxMinAllocator;
use log::debug;
use log::info;

use crate::config::SimConfig;

/// Metrics for one policy over the rounds after warmup.
#[derive(Debug, Clone)]
pub struct Report {
    pub policy: &'static str,
    /// `min / max` of cumulative per-tenant welfare.
    pub fairness: f32,
    pub instant_fairness: f32,
    pub utilization: f32,
    pub allocations: Matrix,
}

impl Report {
    pub fn log(&self) {
        let granted: u64 = self.allocations.iter().flatten().map(|&a| a as u64).sum();
        info!(
            "{:>6}: fairness={:.4} instant_fairness={:.4} utilization={:.4} granted={}",
            self.policy, self.fairness, self.instant_fairness, self.utilization, granted
        );
    }
}

pub fn demand_trace(cfg: &SimConfig) -> Result<Matrix> {
    let mut demand_gen = match cfg.seed {
        Some(seed) => DemandGenerator::new(seed),
        None => DemandGenerator::from_entropy(),
    };
    let tenants = cfg.tenants as usize;
    match (&cfg.demand_values, &cfg.demand_weights) {
        (Some(values), Some(weights)) => {
            demand_gen.discrete_demands(tenants, cfg.rounds, values, weights)
        }
        _ => Ok(demand_gen.uniform_demands(tenants, cfg.rounds, cfg.max_demand)),
    }
}

/// Drive `alloc` through `demands`, one row per round, for tenants
/// `1..=row.len()` which must already be registered. With `dump`, every
/// tenant's allocation is written out after each round.
pub fn simulate(
    alloc: &mut dyn Allocator,
    demands: &Matrix,
    mut dump: Option<&mut dyn Write>,
) -> Result<Matrix> {
    let mut history = Vec::with_capacity(demands.len());
    for (round, row) in demands.iter().enumerate() {
        for (i, &demand) in row.iter().enumerate() {
            alloc.try_set_demand(i as u32 + 1, demand)?;
        }
        alloc.allocate();

        if let Some(out) = dump.as_deref_mut() {
            writeln!(out, "round {}", round)?;
            for id in alloc.tenant_ids() {
                alloc.output_tenant(out, id)?;
            }
        }
        history.push(alloc.allocations());
    }
    Ok(history)
}

pub fn report(
    policy: &'static str,
    demands: &Matrix,
    allocations: Matrix,
    blocks: u32,
    warmup: usize,
) -> Report {
    let rounds = demands.len();
    let welfares = metrics::welfares(&demands[warmup..], &allocations[warmup..]);

    let mut instant = Vec::with_capacity(rounds);
    let mut util = Vec::with_capacity(rounds);
    for (d, a) in demands.iter().zip(allocations.iter()) {
        instant.push(metrics::instant_fairness(d, a, 0));
        util.push(metrics::utilization(d, a, blocks as u64));
    }
    debug!("{}: welfares {:?}", policy, welfares);

    Report {
        policy,
        fairness: metrics::fairness(&welfares, 0),
        instant_fairness: metrics::range_average(&instant, warmup, rounds),
        utilization: metrics::range_average(&util, warmup, rounds),
        allocations,
    }
}

fn register(alloc: &mut dyn Allocator, tenants: u32) -> Result<()> {
    for id in 1..=tenants {
        alloc
            .try_add_user(id)
            .with_context(|| format!("Failed to register tenant {}", id))?;
    }
    Ok(())
}

/// Run every policy `cfg` selects over one shared demand trace.
pub fn run(cfg: &SimConfig, mut dump: Option<&mut dyn Write>) -> Result<Vec<Report>> {
    cfg.validate()?;
    let demands = demand_trace(cfg)?;
    let blocks = cfg.karma.num_blocks;
    info!(
        "simulating {} tenants over {} blocks for {} rounds ({} warmup)",
        cfg.tenants, blocks, cfg.rounds, cfg.warmup
    );

    let mut reports = vec![];
    if cfg.policy.runs_maxmin() {
        let mut alloc = MaxMinAllocator::new(blocks);
        register(&mut alloc, cfg.tenants)?;
        let history = simulate(&mut alloc, &demands, dump.as_mut().map(|d| &mut **d as &mut dyn Write))?;
        reports.push(report("maxmin", &demands, history, blocks, cfg.warmup));
    }
    if cfg.policy.runs_karma() {
        let mut alloc = KarmaAllocator::from_config(&cfg.karma)?;
        register(&mut alloc, cfg.tenants)?;
        info!(
            "karma: fair_share={} public_blocks={}",
            alloc.fair_share(),
            alloc.public_blocks()
        );
        let history = simulate(&mut alloc, &demands, dump.as_mut().map(|d| &mut **d as &mut dyn Write))?;
        reports.push(report("karma", &demands, history, blocks, cfg.warmup));
    }
    Ok(reports)
}
