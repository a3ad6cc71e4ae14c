use crate::core::io::extxyz::ExtXyzFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::dataset::{Dataset, validate_reaction};
use crate::core::models::reaction::{ReactionRecord, StructureRole};
use crate::core::potential::Potential;
use crate::engine::cache::{GasCache, GasSettings};
use crate::engine::combine::combine;
use crate::engine::config::BenchmarkConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::relax::evaluate_checked;
use crate::engine::report::{ReferenceEnergies, RunDocuments, SinglePointEnergies, SinglePointReport};
use crate::engine::state::{ReactionFailure, RunReport};
use crate::engine::transaction::transaction;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, instrument, warn};

/// Force criterion of the gas relaxations of a single-point run.
pub const SINGLE_POINT_GAS_F_CRIT: f64 = 0.05;

#[derive(Debug)]
pub struct SinglePointResult {
    pub report: RunReport,
    pub results: IndexMap<String, SinglePointReport>,
    pub gases: GasCache,
    pub documents: RunDocuments,
}

/// Evaluates every slab and adsorbate-slab structure once, without relaxing it. Gas references
/// are still relaxed (seed index 0).
///
/// # Errors
///
/// Fails when the dataset is missing or unreadable; malformed reactions and per-reaction errors
/// go into the report.
#[instrument(skip_all, name = "single_point_workflow", fields(mlp = %config.mlp_name, benchmark = %config.benchmark))]
pub fn run(
    config: &BenchmarkConfig,
    potential: &dyn Potential,
    reporter: &ProgressReporter,
) -> Result<SinglePointResult, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Loading Dataset",
    });
    let dataset = Dataset::load(&config.dataset_path())?;
    reporter.report(Progress::PhaseFinish);

    run_dataset(config, potential, reporter, &dataset)
}

pub fn run_dataset(
    config: &BenchmarkConfig,
    potential: &dyn Potential,
    reporter: &ProgressReporter,
    dataset: &Dataset,
) -> Result<SinglePointResult, EngineError> {
    let run_dir = config.run_dir();
    let documents = RunDocuments::new(&run_dir, &config.mlp_name);
    let gas_settings = GasSettings {
        f_crit: SINGLE_POINT_GAS_F_CRIT,
        max_steps: config.gas.max_steps,
        cell_distance: config.gas.cell_distance,
        optimizer: config.relaxation.optimizer,
        artifacts_dir: config.output.write_artifacts.then(|| run_dir.join("gases")),
    };
    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let mut gases = GasCache::new();
    let mut results: IndexMap<String, SinglePointReport> = IndexMap::new();
    let mut report = RunReport::default();

    info!(reactions = dataset.len(), "Starting {} single-point benchmarking.", config.mlp_name);
    reporter.report(Progress::PhaseStart {
        name: "Single-Point Evaluation",
    });
    reporter.report(Progress::TaskStart {
        total_steps: dataset.len() as u64,
    });

    for (index, (key, reaction)) in dataset.reactions.iter().enumerate() {
        info!("[{}/{}] {}", index + 1, dataset.len(), key);
        reporter.report(Progress::ReactionStart {
            index,
            key: key.clone(),
        });

        let outcome = transaction(&mut results, |results| {
            validate_reaction(key, reaction)?;
            let energies = evaluate_reaction(
                config,
                &run_dir,
                key,
                reaction,
                potential,
                &gas_settings,
                &mut gases,
                &mut rng,
            )?;
            results.insert(
                key.clone(),
                SinglePointReport {
                    reference: ReferenceEnergies::from_reaction(reaction),
                    single_point: energies,
                },
            );
            documents.persist(&*results, None, Some(&gases))
        });
        if outcome.is_err() {
            if let Err(err) = documents.persist(&results, None, Some(&gases)) {
                warn!(key = %key, error = %err, "Could not restore result documents after failure.");
            }
        }

        match outcome {
            Ok(()) => {
                report.succeeded.push(key.clone());
                reporter.report(Progress::ReactionFinish {
                    key: key.clone(),
                    anomalous: false,
                });
            }
            Err(err) => {
                error!(key = %key, error = %err, "Error occurred while processing reaction, skipping.");
                reporter.report(Progress::ReactionFailed {
                    key: key.clone(),
                    reason: err.to_string(),
                });
                report.failures.push(ReactionFailure {
                    index,
                    key: key.clone(),
                    error: err,
                });
            }
        }
        reporter.report(Progress::TaskIncrement);
    }

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failures.len(),
        "{} single-point benchmarking finished.",
        config.mlp_name
    );

    Ok(SinglePointResult {
        report,
        results,
        gases,
        documents,
    })
}

#[allow(clippy::too_many_arguments)]
fn evaluate_reaction(
    config: &BenchmarkConfig,
    run_dir: &std::path::Path,
    key: &str,
    reaction: &ReactionRecord,
    potential: &dyn Potential,
    gas_settings: &GasSettings,
    cache: &mut GasCache,
    rng: &mut StdRng,
) -> Result<SinglePointEnergies, EngineError> {
    let mut energies = IndexMap::new();
    let mut slab_abs = None;
    let mut ads_abs = None;

    for (role, entry) in &reaction.structures {
        let kind = StructureRole::classify(role);
        if kind == StructureRole::Gas {
            let energy = cache.get_or_compute(role, 0, &entry.geometry, potential, gas_settings, rng)?;
            energies.insert(role.clone(), energy);
            continue;
        }

        if config.output.write_artifacts {
            let path = run_dir
                .join("structures")
                .join(key)
                .join(format!("{role}.extxyz"));
            ExtXyzFile::write_structure_to_path(&entry.geometry, &path)?;
        }
        let energy = evaluate_checked(potential, &entry.geometry, 0)?.energy;
        energies.insert(role.clone(), energy);
        match kind {
            StructureRole::Slab => slab_abs = Some(energy),
            _ => ads_abs = Some(energy),
        }
    }

    let coefficients: IndexMap<String, f64> = reaction
        .structures
        .iter()
        .map(|(role, entry)| (role.clone(), entry.coefficient))
        .collect();
    let missing = |what: &str| EngineError::Internal(format!("Reaction '{key}' has no {what} structure"));

    Ok(SinglePointEnergies {
        ads_eng: combine(&energies, &coefficients)?,
        slab_abs: slab_abs.ok_or_else(|| missing("slab"))?,
        ads_abs: ads_abs.ok_or_else(|| missing("adsorbate-slab"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::json::read_json;
    use crate::core::models::dataset::DatasetError;
    use crate::core::models::reaction::tests::co_reaction;
    use crate::core::potential::testing::{ConstantPotential, FailingPotential};
    use crate::engine::config::BenchmarkConfigBuilder;
    use tempfile::tempdir;

    fn config(root: &std::path::Path) -> BenchmarkConfig {
        BenchmarkConfigBuilder::new()
            .mlp_name("mlp")
            .benchmark("bench")
            .output_root(root.to_path_buf())
            .build()
            .unwrap()
    }

    fn dataset(extra: Option<(&str, ReactionRecord)>) -> Dataset {
        let mut reactions = IndexMap::new();
        reactions.insert("Pt2_CO".to_string(), co_reaction());
        if let Some((key, reaction)) = extra {
            reactions.insert(key.to_string(), reaction);
        }
        Dataset {
            name: None,
            reactions,
        }
    }

    #[test]
    fn energies_are_evaluated_without_relaxation() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let result = run_dataset(
            &config,
            &ConstantPotential::new(0.4),
            &ProgressReporter::new(),
            &dataset(None),
        )
        .unwrap();

        let energies = &result.results["Pt2_CO"].single_point;
        assert!((energies.ads_eng - (-0.4)).abs() < 1e-9);
        assert!((energies.slab_abs - (-1.6)).abs() < 1e-9);
        assert!((energies.ads_abs - (-3.6)).abs() < 1e-9);
        assert_eq!(result.gases.get("COgas", 0), Some(-1.6));

        let run_dir = dir.path().join("mlp");
        assert!(run_dir.join("structures/Pt2_CO/star.extxyz").exists());
        assert!(run_dir.join("structures/Pt2_CO/COstar.extxyz").exists());
        let persisted: IndexMap<String, SinglePointReport> =
            read_json(&result.documents.result).unwrap();
        assert_eq!(persisted, result.results);
        assert!(result.documents.gases.exists());
        assert!(!result.documents.anomaly_detection.exists());
    }

    #[test]
    fn failing_reaction_is_isolated() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let mut gold = co_reaction();
        gold.structures["star"].geometry =
            crate::core::models::reaction::tests::entry(-1.0, -10.0, &["Au", "Au"]).geometry;

        let result = run_dataset(
            &config,
            &FailingPotential::new("Au"),
            &ProgressReporter::new(),
            &dataset(Some(("Au2_CO", gold))),
        )
        .unwrap();

        assert_eq!(result.report.succeeded, vec!["Pt2_CO"]);
        assert_eq!(result.report.failures[0].key, "Au2_CO");
        assert_eq!(result.results.len(), 1);
    }

    #[test]
    fn malformed_reaction_is_reported_and_skipped() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let mut open = co_reaction();
        open.reference_energy = 4.0;

        let result = run_dataset(
            &config,
            &ConstantPotential::new(0.0),
            &ProgressReporter::new(),
            &dataset(Some(("Pt2_CO_1", open))),
        )
        .unwrap();

        assert_eq!(result.report.succeeded, vec!["Pt2_CO"]);
        assert!(matches!(
            result.report.failures[0].error,
            EngineError::Dataset(DatasetError::InvalidReaction { .. })
        ));
        let persisted: IndexMap<String, SinglePointReport> =
            read_json(&result.documents.result).unwrap();
        assert_eq!(persisted.keys().collect::<Vec<_>>(), vec!["Pt2_CO"]);
    }
}
