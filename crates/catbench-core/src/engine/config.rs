use crate::core::optimize::OptimizerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Which structures of a reaction are relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenchmarkMode {
    /// Relax the bare slab and the adsorbate-slab, combine with gas references.
    #[default]
    Full,
    /// Relax only the adsorbate-slab; its energy is the adsorption energy.
    AdsorbateOnly,
}

impl fmt::Display for BenchmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchmarkMode::Full => f.write_str("full"),
            BenchmarkMode::AdsorbateOnly => f.write_str("adsorbate-only"),
        }
    }
}

impl FromStr for BenchmarkMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "full" => Ok(BenchmarkMode::Full),
            "adsorbate-only" | "oc20" => Ok(BenchmarkMode::AdsorbateOnly),
            other => Err(ConfigError::InvalidParameter {
                name: "mode",
                reason: format!("unknown benchmark mode '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxationConfig {
    /// Maximum per-atom force (eV/A) below which a relaxation is converged.
    pub f_crit: f64,
    /// Step cap; reaching it marks the relaxation as unconverged.
    pub max_steps: usize,
    /// Fraction of the bare slab's height below which atoms are fixed (0 disables).
    pub rate: f64,
    pub damping: f64,
    pub optimizer: OptimizerKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyThresholds {
    pub disp_thrs_slab: f64,
    pub disp_thrs_ads: f64,
    pub again_seed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GasConfig {
    /// Initial edge of the cubic box gas molecules are relaxed in.
    pub cell_distance: f64,
    pub max_steps: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub output_root: PathBuf,
    /// Write per-relaxation logs, trajectories and gas geometries.
    pub write_artifacts: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    pub mlp_name: String,
    pub benchmark: String,
    pub mode: BenchmarkMode,
    pub relaxation: RelaxationConfig,
    pub anomaly: AnomalyThresholds,
    pub gas: GasConfig,
    pub output: OutputConfig,
    /// Seed of the RNG choosing which gas atom is held fixed.
    pub random_seed: u64,
}

impl BenchmarkConfig {
    /// `<data_dir>/<benchmark>.json`
    pub fn dataset_path(&self) -> PathBuf {
        self.output
            .data_dir
            .join(format!("{}.json", self.benchmark))
    }

    /// `<output_root>/<mlp_name>`
    pub fn run_dir(&self) -> PathBuf {
        self.output.output_root.join(&self.mlp_name)
    }
}

pub const DEFAULT_F_CRIT_RELAX: f64 = 0.05;
pub const DEFAULT_N_CRIT_RELAX: usize = 999;
pub const DEFAULT_RATE: f64 = 0.5;
pub const DEFAULT_DISP_THRS_SLAB: f64 = 1.0;
pub const DEFAULT_DISP_THRS_ADS: f64 = 1.5;
pub const DEFAULT_AGAIN_SEED: f64 = 0.2;
pub const DEFAULT_DAMPING: f64 = 1.0;
pub const DEFAULT_GAS_DISTANCE: f64 = 10.0;
pub const DEFAULT_GAS_MAX_STEPS: usize = 500;
pub const DEFAULT_RANDOM_SEED: u64 = 42;
pub const DEFAULT_DATA_DIR: &str = "raw_data";
pub const DEFAULT_OUTPUT_ROOT: &str = "result";

#[derive(Default)]
pub struct BenchmarkConfigBuilder {
    mlp_name: Option<String>,
    benchmark: Option<String>,
    mode: Option<BenchmarkMode>,
    data_dir: Option<PathBuf>,
    output_root: Option<PathBuf>,
    write_artifacts: Option<bool>,
    f_crit_relax: Option<f64>,
    n_crit_relax: Option<usize>,
    rate: Option<f64>,
    damping: Option<f64>,
    optimizer: Option<OptimizerKind>,
    disp_thrs_slab: Option<f64>,
    disp_thrs_ads: Option<f64>,
    again_seed: Option<f64>,
    gas_distance: Option<f64>,
    gas_max_steps: Option<usize>,
    random_seed: Option<u64>,
}

impl BenchmarkConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mlp_name(mut self, name: impl Into<String>) -> Self {
        self.mlp_name = Some(name.into());
        self
    }
    pub fn benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }
    pub fn mode(mut self, mode: BenchmarkMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn data_dir(mut self, path: PathBuf) -> Self {
        self.data_dir = Some(path);
        self
    }
    pub fn output_root(mut self, path: PathBuf) -> Self {
        self.output_root = Some(path);
        self
    }
    pub fn write_artifacts(mut self, enabled: bool) -> Self {
        self.write_artifacts = Some(enabled);
        self
    }
    pub fn f_crit_relax(mut self, f_crit: f64) -> Self {
        self.f_crit_relax = Some(f_crit);
        self
    }
    pub fn n_crit_relax(mut self, n_crit: usize) -> Self {
        self.n_crit_relax = Some(n_crit);
        self
    }
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }
    pub fn damping(mut self, damping: f64) -> Self {
        self.damping = Some(damping);
        self
    }
    pub fn optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = Some(optimizer);
        self
    }
    pub fn disp_thrs_slab(mut self, threshold: f64) -> Self {
        self.disp_thrs_slab = Some(threshold);
        self
    }
    pub fn disp_thrs_ads(mut self, threshold: f64) -> Self {
        self.disp_thrs_ads = Some(threshold);
        self
    }
    pub fn again_seed(mut self, threshold: f64) -> Self {
        self.again_seed = Some(threshold);
        self
    }
    pub fn gas_distance(mut self, distance: f64) -> Self {
        self.gas_distance = Some(distance);
        self
    }
    pub fn gas_max_steps(mut self, steps: usize) -> Self {
        self.gas_max_steps = Some(steps);
        self
    }
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<BenchmarkConfig, ConfigError> {
        let mlp_name = self
            .mlp_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ConfigError::MissingParameter("mlp_name"))?;
        let benchmark = self
            .benchmark
            .filter(|name| !name.trim().is_empty())
            .ok_or(ConfigError::MissingParameter("benchmark"))?;

        let relaxation = RelaxationConfig {
            f_crit: positive("f_crit_relax", self.f_crit_relax.unwrap_or(DEFAULT_F_CRIT_RELAX))?,
            max_steps: nonzero("n_crit_relax", self.n_crit_relax.unwrap_or(DEFAULT_N_CRIT_RELAX))?,
            rate: fraction("rate", self.rate.unwrap_or(DEFAULT_RATE))?,
            damping: positive("damping", self.damping.unwrap_or(DEFAULT_DAMPING))?,
            optimizer: self.optimizer.unwrap_or_default(),
        };
        let anomaly = AnomalyThresholds {
            disp_thrs_slab: positive(
                "disp_thrs_slab",
                self.disp_thrs_slab.unwrap_or(DEFAULT_DISP_THRS_SLAB),
            )?,
            disp_thrs_ads: positive(
                "disp_thrs_ads",
                self.disp_thrs_ads.unwrap_or(DEFAULT_DISP_THRS_ADS),
            )?,
            again_seed: positive("again_seed", self.again_seed.unwrap_or(DEFAULT_AGAIN_SEED))?,
        };
        let gas = GasConfig {
            cell_distance: positive(
                "gas_distance",
                self.gas_distance.unwrap_or(DEFAULT_GAS_DISTANCE),
            )?,
            max_steps: nonzero(
                "gas_max_steps",
                self.gas_max_steps.unwrap_or(DEFAULT_GAS_MAX_STEPS),
            )?,
        };
        let output = OutputConfig {
            data_dir: self
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            output_root: self
                .output_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT)),
            write_artifacts: self.write_artifacts.unwrap_or(true),
        };

        Ok(BenchmarkConfig {
            mlp_name,
            benchmark,
            mode: self.mode.unwrap_or_default(),
            relaxation,
            anomaly,
            gas,
            output,
            random_seed: self.random_seed.unwrap_or(DEFAULT_RANDOM_SEED),
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

fn nonzero(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: "must be greater than zero".to_string(),
        })
    }
}

fn fraction(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must lie in [0, 1], got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BenchmarkConfigBuilder {
        BenchmarkConfigBuilder::new().mlp_name("mace").benchmark("Pt_CO")
    }

    #[test]
    fn build_applies_documented_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.relaxation.f_crit, 0.05);
        assert_eq!(config.relaxation.max_steps, 999);
        assert_eq!(config.relaxation.rate, 0.5);
        assert_eq!(config.relaxation.damping, 1.0);
        assert_eq!(config.relaxation.optimizer, OptimizerKind::Lbfgs);
        assert_eq!(config.anomaly.disp_thrs_slab, 1.0);
        assert_eq!(config.anomaly.disp_thrs_ads, 1.5);
        assert_eq!(config.anomaly.again_seed, 0.2);
        assert_eq!(config.gas.cell_distance, 10.0);
        assert_eq!(config.gas.max_steps, 500);
        assert_eq!(config.mode, BenchmarkMode::Full);
        assert_eq!(config.random_seed, 42);
        assert!(config.output.write_artifacts);
    }

    #[test]
    fn build_requires_names() {
        assert_eq!(
            BenchmarkConfigBuilder::new().benchmark("x").build(),
            Err(ConfigError::MissingParameter("mlp_name"))
        );
        assert_eq!(
            BenchmarkConfigBuilder::new().mlp_name("m").benchmark("  ").build(),
            Err(ConfigError::MissingParameter("benchmark"))
        );
    }

    #[test]
    fn build_rejects_out_of_range_values() {
        assert!(matches!(
            minimal().rate(1.5).build(),
            Err(ConfigError::InvalidParameter { name: "rate", .. })
        ));
        assert!(matches!(
            minimal().n_crit_relax(0).build(),
            Err(ConfigError::InvalidParameter {
                name: "n_crit_relax",
                ..
            })
        ));
        assert!(matches!(
            minimal().gas_distance(-1.0).build(),
            Err(ConfigError::InvalidParameter {
                name: "gas_distance",
                ..
            })
        ));
        assert!(matches!(
            minimal().again_seed(f64::NAN).build(),
            Err(ConfigError::InvalidParameter {
                name: "again_seed",
                ..
            })
        ));
    }

    #[test]
    fn rate_zero_is_accepted() {
        assert_eq!(minimal().rate(0.0).build().unwrap().relaxation.rate, 0.0);
    }

    #[test]
    fn paths_follow_output_layout() {
        let config = minimal()
            .data_dir(PathBuf::from("data"))
            .output_root(PathBuf::from("out"))
            .build()
            .unwrap();
        assert_eq!(config.dataset_path(), PathBuf::from("data/Pt_CO.json"));
        assert_eq!(config.run_dir(), PathBuf::from("out/mace"));
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("adsorbate_only".parse::<BenchmarkMode>(), Ok(BenchmarkMode::AdsorbateOnly));
        assert_eq!("OC20".parse::<BenchmarkMode>(), Ok(BenchmarkMode::AdsorbateOnly));
        assert_eq!("Full".parse::<BenchmarkMode>(), Ok(BenchmarkMode::Full));
        assert!("partial".parse::<BenchmarkMode>().is_err());
    }
}
