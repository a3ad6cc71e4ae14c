use catbench::core::potential::Potential;
use catbench::core::potential::pair::{PairParameters, PairPotential};
use catbench::engine::config::BenchmarkConfig;
use std::path::PathBuf;

use crate::error::{CliError, Result};

/// How the seed ensemble of reference pair potentials is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialSettings {
    pub params_path: PathBuf,
    pub seeds: usize,
    pub jitter: f64,
    pub seed: u64,
}

impl PotentialSettings {
    /// Loads the parameter file and builds one calculator per seed.
    pub fn build(&self, name: &str) -> Result<Vec<Box<dyn Potential>>> {
        let params = PairParameters::load(&self.params_path).map_err(|e| CliError::FileParsing {
            path: self.params_path.clone(),
            source: e.into(),
        })?;
        Ok(PairPotential::ensemble(
            name,
            &params,
            self.seeds,
            self.seed,
            self.jitter,
        ))
    }
}

pub struct AppConfig {
    pub core_config: BenchmarkConfig,
    pub potential: PotentialSettings,
}
