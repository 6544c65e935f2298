// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Synthetic demand traces.
//!
//! A trace is a [`Matrix`] of demands indexed `[round][tenant]`. All
//! randomness flows through a [`DemandGenerator`] owned by the caller, so
//! a trace is fully determined by its seed and two generators never share
//! state.

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use rand::distributions::Distribution;
use rand::distributions::WeightedIndex;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

/// Per-round, per-tenant values, indexed `[round][tenant]`.
pub type Matrix = Vec<Vec<u32>>;

#[derive(Debug, Clone)]
pub struct DemandGenerator {
    rng: SmallRng,
}

impl DemandGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from OS entropy. Traces are not reproducible.
    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn rand_bool(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    /// Uniform integer in `[min, max]`, bounds in either order.
    pub fn uniform(&mut self, min: u32, max: u32) -> u32 {
        self.rng.gen_range(min.min(max)..=max.max(min))
    }

    /// Index sampler where index `i` is drawn with probability
    /// `weights[i] / sum(weights)`.
    pub fn discrete(weights: &[u32]) -> Result<WeightedIndex<u32>> {
        WeightedIndex::new(weights).context("invalid discrete distribution weights")
    }

    pub fn sample(&mut self, dist: &WeightedIndex<u32>) -> usize {
        dist.sample(&mut self.rng)
    }

    /// `rounds` rounds of `tenants` demands, each uniform in
    /// `[0, max_demand]`.
    pub fn uniform_demands(&mut self, tenants: usize, rounds: usize, max_demand: u32) -> Matrix {
        (0..rounds)
            .map(|_| (0..tenants).map(|_| self.uniform(0, max_demand)).collect())
            .collect()
    }

    /// `rounds` rounds of `tenants` demands, each drawn from `values` with
    /// the matching `weights`.
    pub fn discrete_demands(
        &mut self,
        tenants: usize,
        rounds: usize,
        values: &[u32],
        weights: &[u32],
    ) -> Result<Matrix> {
        if values.len() != weights.len() {
            bail!(
                "{} demand values but {} weights",
                values.len(),
                weights.len()
            );
        }
        let dist = Self::discrete(weights)?;
        Ok((0..rounds)
            .map(|_| {
                (0..tenants)
                    .map(|_| values[self.sample(&dist)])
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_demands_shape_and_range() {
        let mut g = DemandGenerator::new(7);
        let m = g.uniform_demands(4, 10, 20);
        assert_eq!(m.len(), 10);
        assert!(m.iter().all(|row| row.len() == 4));
        assert!(m.iter().flatten().all(|&d| d <= 20));
    }

    #[test]
    fn test_same_seed_same_trace() {
        let a = DemandGenerator::new(42).uniform_demands(8, 16, 100);
        let b = DemandGenerator::new(42).uniform_demands(8, 16, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_uniform_bounds() {
        let mut g = DemandGenerator::new(1);
        for _ in 0..100 {
            let v = g.uniform(9, 3);
            assert!((3..=9).contains(&v));
        }
        assert_eq!(g.uniform(5, 5), 5);
    }

    #[test]
    fn test_rand_bool_seeded() {
        let draws: Vec<bool> = {
            let mut g = DemandGenerator::new(12);
            (0..64).map(|_| g.rand_bool()).collect()
        };
        assert!(draws.contains(&true));
        assert!(draws.contains(&false));

        let mut again = DemandGenerator::new(12);
        assert!(draws.iter().all(|&b| b == again.rand_bool()));
    }

    #[test]
    fn test_discrete_demands() {
        let mut g = DemandGenerator::new(3);
        // Weight 0 on 50 means it never shows up.
        let m = g.discrete_demands(5, 20, &[0, 10, 50], &[1, 1, 0]).unwrap();
        assert!(m.iter().flatten().all(|&d| d == 0 || d == 10));

        assert!(g.discrete_demands(1, 1, &[1, 2], &[1]).is_err());
        assert!(g.discrete_demands(1, 1, &[1], &[0]).is_err());
    }
}
