// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

mod config;
mod run;

use std::io::Write;

use anyhow::Result;
use clap::Parser;
use karma_alloc::KarmaConfig;
use log::info;

use crate::config::Policy;
use crate::config::SimConfig;

/// karma_sim: replay a synthetic demand trace through the max-min and
/// Karma block allocators and compare how evenly they share.
///
/// Every round each tenant draws a demand, the allocator divides the
/// blocks, and the resulting history is scored for fairness of
/// cumulative welfare, per-round fairness and utilization.
#[derive(Debug, Parser)]
struct Opts {
    /// Allocation policy to run. Both policies see the same trace.
    #[clap(short = 'p', long, value_enum, default_value = "both")]
    policy: Policy,

    /// Number of tenants, registered as IDs 1..=N.
    #[clap(short = 'n', long, default_value = "10")]
    tenants: u32,

    /// Number of rounds to simulate.
    #[clap(short = 'r', long, default_value = "1000")]
    rounds: usize,

    /// Rounds at the start left out of the reported averages.
    #[clap(short = 'w', long, default_value = "100")]
    warmup: usize,

    /// Total blocks shared by all tenants.
    #[clap(short = 'b', long, default_value = "100")]
    blocks: u32,

    /// Per-tenant demand is drawn uniformly from [0, MAX_DEMAND].
    #[clap(short = 'm', long, default_value = "20")]
    max_demand: u32,

    /// Karma: fraction of the per-tenant share that is guaranteed.
    #[clap(short = 'a', long, default_value = "0.5")]
    alpha: f32,

    /// Karma: opening credit balance of each tenant.
    #[clap(short = 'c', long, default_value = "1000")]
    init_credits: u32,

    /// Karma: lowest credit balance reachable by borrowing.
    #[clap(long, default_value = "0", allow_negative_numbers = true)]
    credit_floor: i64,

    /// Seed for the demand trace. Random if not given.
    #[clap(short = 's', long)]
    seed: Option<u64>,

    /// Load the whole configuration from JSON instead of the options
    /// above. Either inline or "f:PATH".
    #[clap(long, env = "KARMA_SIM_CONFIG")]
    config: Option<String>,

    /// Print every tenant's allocation after each round.
    #[clap(short = 'd', long, action = clap::ArgAction::SetTrue)]
    dump: bool,

    /// Enable verbose output. Specify multiple times to increase
    /// verbosity.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Opts {
    fn sim_config(&self) -> Result<SimConfig> {
        if let Some(input) = &self.config {
            return SimConfig::parse(input);
        }
        let cfg = SimConfig {
            policy: self.policy,
            tenants: self.tenants,
            rounds: self.rounds,
            warmup: self.warmup,
            max_demand: self.max_demand,
            demand_values: None,
            demand_weights: None,
            seed: self.seed,
            karma: KarmaConfig {
                num_blocks: self.blocks,
                alpha: self.alpha,
                init_credits: self.init_credits,
                credit_floor: self.credit_floor,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let llv = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let cfg = opts.sim_config()?;
    info!("config: {}", serde_json::to_string(&cfg)?);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let reports = if opts.dump {
        run::run(&cfg, Some(&mut out))?
    } else {
        run::run(&cfg, None)?
    };
    out.flush()?;

    for r in &reports {
        r.log();
    }
    Ok(())
}
