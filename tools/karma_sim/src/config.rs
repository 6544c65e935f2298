// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::fs;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use karma_alloc::KarmaConfig;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    #[value(name = "maxmin")]
    MaxMin,
    Karma,
    Both,
}

impl Policy {
    pub fn runs_maxmin(self) -> bool {
        matches!(self, Policy::MaxMin | Policy::Both)
    }

    pub fn runs_karma(self) -> bool {
        matches!(self, Policy::Karma | Policy::Both)
    }
}

/// One simulation run. Tenants are numbered `1..=tenants`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub policy: Policy,
    pub tenants: u32,
    pub rounds: usize,
    /// Rounds excluded from the reported averages.
    pub warmup: usize,
    /// Upper bound of uniformly drawn demand.
    pub max_demand: u32,
    /// Draw demand from these values instead, weighted by
    /// `demand_weights`.
    pub demand_values: Option<Vec<u32>>,
    pub demand_weights: Option<Vec<u32>>,
    /// Unset means seed from entropy.
    pub seed: Option<u64>,
    /// `num_blocks` is shared by both policies.
    pub karma: KarmaConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Both,
            tenants: 10,
            rounds: 1000,
            warmup: 100,
            max_demand: 20,
            demand_values: None,
            demand_weights: None,
            seed: None,
            karma: KarmaConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse a JSON config, either inline or from a file given as
    /// `f:PATH` or `file:PATH`.
    pub fn parse(input: &str) -> Result<Self> {
        let config: SimConfig = match input.split_once(':') {
            Some((prefix, path)) if prefix == "f" || prefix == "file" => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?
            }
            _ => serde_json::from_str(input).context("Failed to parse inline config")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tenants == 0 {
            bail!("at least one tenant is required");
        }
        if self.rounds == 0 {
            bail!("at least one round is required");
        }
        if self.warmup >= self.rounds {
            bail!(
                "warmup ({}) leaves nothing of {} rounds to report",
                self.warmup,
                self.rounds
            );
        }
        match (&self.demand_values, &self.demand_weights) {
            (None, None) => {}
            (Some(v), Some(w)) if v.len() == w.len() && !v.is_empty() => {}
            _ => bail!("demand_values and demand_weights must be given together, same length"),
        }
        self.karma.validate().context("Invalid karma config")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_inline_partial() {
        let cfg = SimConfig::parse(
            r#"{"policy": "maxmin", "tenants": 3, "karma": {"num_blocks": 9}}"#,
        )
        .unwrap();
        assert_eq!(cfg.policy, Policy::MaxMin);
        assert_eq!(cfg.tenants, 3);
        assert_eq!(cfg.karma.num_blocks, 9);
        assert_eq!(cfg.karma.alpha, 0.5);
        assert_eq!(cfg.rounds, 1000);
    }

    #[test]
    fn test_parse_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"tenants": 4, "rounds": 50, "warmup": 5, "seed": 9,
                "demand_values": [0, 10], "demand_weights": [3, 1]}}"#
        )
        .unwrap();
        let path = f.path().to_str().unwrap().to_string();

        for prefix in ["f:", "file:"] {
            let cfg = SimConfig::parse(&format!("{prefix}{path}")).unwrap();
            assert_eq!(cfg.tenants, 4);
            assert_eq!(cfg.seed, Some(9));
            assert_eq!(cfg.demand_values, Some(vec![0, 10]));
        }
    }

    #[test]
    fn test_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(SimConfig::parse(&format!("f:{}", missing.display())).is_err());
        assert!(SimConfig::parse("{not json").is_err());
        assert!(SimConfig::parse(r#"{"tenants": 0}"#).is_err());
        assert!(SimConfig::parse(r#"{"rounds": 10, "warmup": 10}"#).is_err());
        assert!(SimConfig::parse(r#"{"demand_values": [1, 2]}"#).is_err());
        assert!(SimConfig::parse(r#"{"karma": {"alpha": 2.0}}"#).is_err());
        assert!(SimConfig::parse(r#"{"policy": "fifo"}"#).is_err());
    }

    #[test]
    fn test_policy_selection() {
        assert!(Policy::Both.runs_maxmin() && Policy::Both.runs_karma());
        assert!(!Policy::MaxMin.runs_karma());
        assert!(!Policy::Karma.runs_maxmin());
    }
}
