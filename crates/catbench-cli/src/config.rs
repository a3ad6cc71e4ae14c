pub mod defaults;
pub mod models;

use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser::{self, ParseError};
use catbench::core::optimize::OptimizerKind;
use catbench::engine::config::{BenchmarkConfigBuilder, BenchmarkMode};
use defaults::DefaultsConfig;
use models::{AppConfig, PotentialSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialBenchmarkSection {
    mlp_name: Option<String>,
    name: Option<String>,
    mode: Option<String>,
    data_dir: Option<PathBuf>,
    output_root: Option<PathBuf>,
    write_artifacts: Option<bool>,
    random_seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialRelaxationConfig {
    f_crit: Option<f64>,
    max_steps: Option<usize>,
    rate: Option<f64>,
    damping: Option<f64>,
    optimizer: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialAnomalyConfig {
    disp_thrs_slab: Option<f64>,
    disp_thrs_ads: Option<f64>,
    again_seed: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialGasConfig {
    cell_distance: Option<f64>,
    max_steps: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPotentialConfig {
    params: Option<PathBuf>,
    seeds: Option<usize>,
    jitter: Option<f64>,
    seed: Option<u64>,
}

/// The benchmark configuration file as written by the user; every field is optional until
/// merged with the command line.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialBenchmarkConfig {
    benchmark: Option<PartialBenchmarkSection>,
    relaxation: Option<PartialRelaxationConfig>,
    anomaly: Option<PartialAnomalyConfig>,
    gas: Option<PartialGasConfig>,
    potential: Option<PartialPotentialConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn config_err(e: impl std::fmt::Display) -> CliError {
    CliError::Config(e.to_string())
}

impl PartialBenchmarkConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<AppConfig> {
        self.apply_set_values(&args.set_values)?;

        let bench = self.benchmark.take().unwrap_or_default();
        let relax = self.relaxation.take().unwrap_or_default();
        let anomaly = self.anomaly.take().unwrap_or_default();
        let gas = self.gas.take().unwrap_or_default();
        let potential = self.potential.take().unwrap_or_default();
        let defaults = DefaultsConfig::default();

        let mut builder = BenchmarkConfigBuilder::new();
        if let Some(name) = args.mlp_name.clone().or(bench.mlp_name) {
            builder = builder.mlp_name(name);
        }
        if let Some(name) = args.benchmark.clone().or(bench.name) {
            builder = builder.benchmark(name);
        }
        if let Some(mode) = args.mode.as_ref().or(bench.mode.as_ref()) {
            builder = builder.mode(mode.parse::<BenchmarkMode>().map_err(config_err)?);
        }
        if let Some(dir) = args.data_dir.clone().or(bench.data_dir) {
            builder = builder.data_dir(dir);
        }
        if let Some(dir) = args.output_root.clone().or(bench.output_root) {
            builder = builder.output_root(dir);
        }
        if args.no_artifacts {
            builder = builder.write_artifacts(false);
        } else if let Some(enabled) = bench.write_artifacts {
            builder = builder.write_artifacts(enabled);
        }
        if let Some(seed) = bench.random_seed {
            builder = builder.random_seed(seed);
        }

        if let Some(v) = relax.f_crit {
            builder = builder.f_crit_relax(v);
        }
        if let Some(v) = relax.max_steps {
            builder = builder.n_crit_relax(v);
        }
        if let Some(v) = relax.rate {
            builder = builder.rate(v);
        }
        if let Some(v) = relax.damping {
            builder = builder.damping(v);
        }
        if let Some(name) = relax.optimizer {
            builder = builder.optimizer(name.parse::<OptimizerKind>().map_err(config_err)?);
        }

        if let Some(v) = anomaly.disp_thrs_slab {
            builder = builder.disp_thrs_slab(v);
        }
        if let Some(v) = anomaly.disp_thrs_ads {
            builder = builder.disp_thrs_ads(v);
        }
        if let Some(v) = anomaly.again_seed {
            builder = builder.again_seed(v);
        }

        if let Some(v) = gas.cell_distance {
            builder = builder.gas_distance(v);
        }
        if let Some(v) = gas.max_steps {
            builder = builder.gas_max_steps(v);
        }

        let core_config = builder.build().map_err(config_err)?;

        let params_path = match (&args.params, potential.params) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) if path.is_relative() => self.base_dir.join(path),
            (None, Some(path)) => path,
            (None, None) => {
                return Err(CliError::Config(
                    "`potential.params` is required either in the config file or via --params."
                        .to_string(),
                ));
            }
        };
        let seeds = args.seeds.or(potential.seeds).unwrap_or(defaults.seeds);
        if seeds == 0 {
            return Err(CliError::Config("`potential.seeds` must be at least 1.".to_string()));
        }

        Ok(AppConfig {
            core_config,
            potential: PotentialSettings {
                params_path,
                seeds,
                jitter: potential.jitter.unwrap_or(defaults.jitter),
                seed: potential.seed.unwrap_or(defaults.potential_seed),
            },
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = parser::parse_key_value(kv_pair).map_err(config_err)?;
            self.set_value(key, value).map_err(config_err)?;
        }
        Ok(())
    }

    fn set_value(&mut self, key: &str, value: &str) -> std::result::Result<(), ParseError> {
        match key {
            "benchmark.mlp-name" => {
                self.benchmark.get_or_insert_with(Default::default).mlp_name = Some(value.to_string())
            }
            "benchmark.name" => self.benchmark.get_or_insert_with(Default::default).name = Some(value.to_string()),
            "benchmark.mode" => self.benchmark.get_or_insert_with(Default::default).mode = Some(value.to_string()),
            "benchmark.write-artifacts" => {
                self.benchmark.get_or_insert_with(Default::default).write_artifacts =
                    Some(parser::parse_value(key, value)?)
            }
            "benchmark.random-seed" => {
                self.benchmark.get_or_insert_with(Default::default).random_seed =
                    Some(parser::parse_value(key, value)?)
            }
            "relaxation.f-crit" => {
                self.relaxation.get_or_insert_with(Default::default).f_crit =
                    Some(parser::parse_value(key, value)?)
            }
            "relaxation.max-steps" => {
                self.relaxation.get_or_insert_with(Default::default).max_steps =
                    Some(parser::parse_value(key, value)?)
            }
            "relaxation.rate" => {
                self.relaxation.get_or_insert_with(Default::default).rate =
                    Some(parser::parse_value(key, value)?)
            }
            "relaxation.damping" => {
                self.relaxation.get_or_insert_with(Default::default).damping =
                    Some(parser::parse_value(key, value)?)
            }
            "relaxation.optimizer" => {
                self.relaxation.get_or_insert_with(Default::default).optimizer = Some(value.to_string())
            }
            "anomaly.disp-thrs-slab" => {
                self.anomaly.get_or_insert_with(Default::default).disp_thrs_slab =
                    Some(parser::parse_value(key, value)?)
            }
            "anomaly.disp-thrs-ads" => {
                self.anomaly.get_or_insert_with(Default::default).disp_thrs_ads =
                    Some(parser::parse_value(key, value)?)
            }
            "anomaly.again-seed" => {
                self.anomaly.get_or_insert_with(Default::default).again_seed =
                    Some(parser::parse_value(key, value)?)
            }
            "gas.cell-distance" => {
                self.gas.get_or_insert_with(Default::default).cell_distance =
                    Some(parser::parse_value(key, value)?)
            }
            "gas.max-steps" => {
                self.gas.get_or_insert_with(Default::default).max_steps =
                    Some(parser::parse_value(key, value)?)
            }
            "potential.seeds" => {
                self.potential.get_or_insert_with(Default::default).seeds =
                    Some(parser::parse_value(key, value)?)
            }
            "potential.jitter" => {
                self.potential.get_or_insert_with(Default::default).jitter =
                    Some(parser::parse_value(key, value)?)
            }
            "potential.seed" => {
                self.potential.get_or_insert_with(Default::default).seed =
                    Some(parser::parse_value(key, value)?)
            }
            _ => {
                return Err(ParseError::InvalidValue {
                    key: "--set".to_string(),
                    value: format!("unsupported configuration key '{key}'"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn write_config_file(dir: &TempDir, content: &str) -> PathBuf {
        let file_path = dir.path().join("catbench.toml");
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_args(config_path: &Path, extra: &[&str]) -> RunArgs {
        let mut args = vec![
            "catbench".to_string(),
            "run".to_string(),
            "-c".to_string(),
            config_path.to_str().unwrap().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(args).command {
            Commands::Run(run_args) => run_args,
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    fn merge(content: &str, extra: &[&str]) -> (TempDir, Result<AppConfig>) {
        let dir = tempdir().unwrap();
        let config_path = write_config_file(&dir, content);
        let args = run_args(&config_path, extra);
        let result = PartialBenchmarkConfig::from_file(&config_path)
            .unwrap()
            .merge_with_cli(&args);
        (dir, result)
    }

    const MINIMAL: &str = r#"
        [benchmark]
        mlp-name = "lj"
        name = "Pt_CO"

        [potential]
        params = "params.toml"
        "#;

    #[test]
    fn load_from_file_and_merge_with_defaults() {
        let (dir, result) = merge(MINIMAL, &[]);
        let config = result.unwrap();

        assert_eq!(config.core_config.mlp_name, "lj");
        assert_eq!(config.core_config.benchmark, "Pt_CO");
        assert_eq!(config.core_config.mode, BenchmarkMode::Full);
        assert_eq!(config.core_config.relaxation.f_crit, 0.05);
        assert_eq!(config.core_config.relaxation.max_steps, 999);
        assert_eq!(config.core_config.anomaly.again_seed, 0.2);
        assert_eq!(config.potential.params_path, dir.path().join("params.toml"));
        assert_eq!(config.potential.seeds, 5);
        assert_eq!(config.potential.jitter, 0.02);
    }

    #[test]
    fn cli_args_override_file_values() {
        let content = r#"
        [benchmark]
        mlp-name = "lj"
        name = "Pt_CO"
        mode = "full"

        [potential]
        params = "params.toml"
        seeds = 3
        "#;
        let (_dir, result) = merge(
            content,
            &[
                "--mlp-name",
                "lj-small",
                "--mode",
                "adsorbate-only",
                "--seeds",
                "2",
                "--params",
                "/tmp/other.toml",
                "--no-artifacts",
            ],
        );
        let config = result.unwrap();

        assert_eq!(config.core_config.mlp_name, "lj-small");
        assert_eq!(config.core_config.mode, BenchmarkMode::AdsorbateOnly);
        assert!(!config.core_config.output.write_artifacts);
        assert_eq!(config.potential.seeds, 2);
        assert_eq!(config.potential.params_path, PathBuf::from("/tmp/other.toml"));
    }

    #[test]
    fn set_value_overrides_file_and_defaults() {
        let content = format!("{MINIMAL}\n[relaxation]\nf-crit = 0.1\n");
        let (_dir, result) = merge(
            &content,
            &[
                "-S",
                "relaxation.f-crit=0.03",
                "-S",
                "relaxation.optimizer=FIRE",
                "-S",
                "anomaly.disp-thrs-ads=2.0",
            ],
        );
        let config = result.unwrap();

        assert_eq!(config.core_config.relaxation.f_crit, 0.03);
        assert_eq!(config.core_config.relaxation.optimizer, OptimizerKind::Fire);
        assert_eq!(config.core_config.anomaly.disp_thrs_ads, 2.0);
        assert_eq!(config.core_config.anomaly.disp_thrs_slab, 1.0);
    }

    #[test]
    fn unsupported_set_key_is_rejected() {
        let (_dir, result) = merge(MINIMAL, &["-S", "relaxation.speed=3"]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("relaxation.speed")));
    }

    #[test]
    fn missing_required_field_returns_error() {
        let content = r#"
        [benchmark]
        name = "Pt_CO"

        [potential]
        params = "params.toml"
        "#;
        let (_dir, result) = merge(content, &[]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("mlp_name")));

        let content = r#"
        [benchmark]
        mlp-name = "lj"
        name = "Pt_CO"
        "#;
        let (_dir, result) = merge(content, &[]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("potential.params")));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config_file(&dir, "[relaxation]\nfcrit = 0.1\n");
        assert!(matches!(
            PartialBenchmarkConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn invalid_threshold_is_a_config_error() {
        let content = format!("{MINIMAL}\n[anomaly]\nagain-seed = -1.0\n");
        let (_dir, result) = merge(&content, &[]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
