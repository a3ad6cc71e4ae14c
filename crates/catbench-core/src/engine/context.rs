use super::accumulator::{Accumulator, AccumulatorMark};
use super::cache::{GasCache, GasSettings};
use super::config::BenchmarkConfig;
use super::error::EngineError;
use super::progress::ProgressReporter;
use super::report::ReactionReport;
use super::transaction::Checkpoint;
use crate::core::potential::Potential;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

/// Read-only inputs shared by every reaction of a run.
#[derive(Clone, Copy)]
pub struct BenchmarkContext<'a> {
    pub config: &'a BenchmarkConfig,
    /// One calculator per seed, in seed order.
    pub potentials: &'a [Box<dyn Potential>],
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> BenchmarkContext<'a> {
    /// # Errors
    ///
    /// Returns [`EngineError::NoCalculators`] for an empty calculator list.
    pub fn new(
        config: &'a BenchmarkConfig,
        potentials: &'a [Box<dyn Potential>],
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        if potentials.is_empty() {
            return Err(EngineError::NoCalculators);
        }
        Ok(Self {
            config,
            potentials,
            reporter,
        })
    }

    pub fn seed_count(&self) -> usize {
        self.potentials.len()
    }

    /// Directory holding per-structure artifacts, if artifacts are enabled.
    pub fn artifacts_dir(&self) -> Option<PathBuf> {
        self.config
            .output
            .write_artifacts
            .then(|| self.config.run_dir())
    }

    pub fn gas_settings(&self) -> GasSettings {
        GasSettings {
            f_crit: self.config.relaxation.f_crit,
            max_steps: self.config.gas.max_steps,
            cell_distance: self.config.gas.cell_distance,
            optimizer: self.config.relaxation.optimizer,
            artifacts_dir: self.artifacts_dir().map(|dir| dir.join("gases")),
        }
    }
}

/// Mutable state accumulated over a run and owned by the driver.
///
/// Only the result mapping and the accumulator are reverted when a reaction fails. Gas energies
/// stay cached for the rest of the run and the anchor RNG keeps its position.
#[derive(Debug)]
pub struct RunContext {
    pub gas_cache: GasCache,
    pub results: IndexMap<String, ReactionReport>,
    pub accumulator: Accumulator,
    /// Drives the choice of the pinned atom in gas relaxations.
    pub rng: StdRng,
}

impl RunContext {
    pub fn new(random_seed: u64) -> Self {
        Self {
            gas_cache: GasCache::new(),
            results: IndexMap::new(),
            accumulator: Accumulator::default(),
            rng: StdRng::seed_from_u64(random_seed),
        }
    }
}

impl Checkpoint for RunContext {
    type Mark = (usize, AccumulatorMark);

    fn mark(&self) -> Self::Mark {
        (self.results.mark(), self.accumulator.mark())
    }

    fn restore(&mut self, (results, accumulator): Self::Mark) {
        self.results.restore(results);
        self.accumulator.restore(accumulator);
    }
}
