//! Randomised checks of the bake / serialize / reconstruct pipeline.
//!
//! Each run draws circuits from a seeded ChaCha20 stream, bakes them twice,
//! pushes the metadata through JSON, and drives original and rebuilt
//! evaluators with the same random input sequence. Same seed, same report.

use crate::bake::bake_graph;
use crate::error::BakeError;
use crate::graph::random_graph;
use crate::registry::ChipTypeRegistry;
use crate::serialize::reconstruct_from_json;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    pub seed: u64,
    /// Number of random circuits.
    pub graphs: usize,
    /// Chips per circuit, connection points excluded.
    pub chips: usize,
    pub ticks: usize,
    /// Probability of wiring each socket, in basis points.
    pub wire_per10k: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            seed: 0,
            graphs: 200,
            chips: 12,
            ticks: 32,
            wire_per10k: 7000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressReport {
    pub graphs: usize,
    pub baked: usize,
    pub cycles: usize,
    pub ticks: usize,
    /// Re-bakes whose metadata differed from the first bake.
    pub unstable_bakes: usize,
    /// Circuits whose rebuilt evaluator diverged from the original.
    pub divergent: usize,
}

impl StressReport {
    pub fn ok(&self) -> bool {
        self.unstable_bakes == 0 && self.divergent == 0
    }
}

pub fn run_stress(config: &StressConfig, registry: &ChipTypeRegistry) -> Result<StressReport, BakeError> {
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
    let mut report = StressReport::default();
    for idx in 0..config.graphs {
        report.graphs += 1;
        let inputs = rng.gen_range(0..=3);
        let outputs = rng.gen_range(0..=3);
        let graph = random_graph(
            &mut rng,
            registry,
            inputs,
            outputs,
            config.chips,
            config.wire_per10k,
        )?;
        let mut original = match bake_graph(&graph, registry) {
            Ok(baked) => baked,
            Err(err) if err.is_cycle() => {
                report.cycles += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        report.baked += 1;

        let again = bake_graph(&graph, registry)?;
        if again.metadata() != original.metadata() {
            warn!(graph = idx, "re-bake produced different metadata");
            report.unstable_bakes += 1;
        }

        let text = original.metadata().to_json()?;
        let mut rebuilt = reconstruct_from_json(&text, registry)?;
        let mut diverged = false;
        for _ in 0..config.ticks {
            let tick_inputs: Vec<f64> = (0..inputs)
                .map(|_| rng.gen_range(-100..=100) as f64)
                .collect();
            let a = original.evaluate(&tick_inputs);
            let b = rebuilt.evaluate(&tick_inputs);
            report.ticks += 1;
            if a != b {
                diverged = true;
            }
        }
        if diverged {
            warn!(graph = idx, "reconstructed evaluator diverged");
            report.divergent += 1;
        }
    }
    debug!(?report, "stress run finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_run_is_clean_and_reproducible() {
        let registry = ChipTypeRegistry::new();
        let config = StressConfig {
            seed: 1337,
            graphs: 40,
            chips: 8,
            ticks: 16,
            wire_per10k: 6000,
        };
        let a = run_stress(&config, &registry).unwrap();
        let b = run_stress(&config, &registry).unwrap();
        assert_eq!(a, b);
        assert!(a.ok(), "{:?}", a);
        assert_eq!(a.graphs, 40);
        assert_eq!(a.baked + a.cycles, 40);
    }
}
