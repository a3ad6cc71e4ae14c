use crate::core::models::dataset::{Dataset, validate_reaction};
use crate::core::models::reaction::ReactionRecord;
use crate::core::potential::Potential;
use crate::engine::accumulator::Accumulator;
use crate::engine::aggregate::evaluate_reaction;
use crate::engine::cache::GasCache;
use crate::engine::config::{BenchmarkConfig, BenchmarkMode};
use crate::engine::context::{BenchmarkContext, RunContext};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::report::{ReactionReport, RunDocuments};
use crate::engine::state::{ReactionFailure, ReactionState, RunReport};
use crate::engine::transaction::transaction;
use indexmap::IndexMap;
use tracing::{debug, error, info, instrument, warn};

/// Everything a finished benchmark run produced.
#[derive(Debug)]
pub struct BenchmarkResult {
    pub report: RunReport,
    pub results: IndexMap<String, ReactionReport>,
    pub accumulator: Accumulator,
    pub gases: GasCache,
    pub documents: RunDocuments,
}

/// Loads `<data_dir>/<benchmark>.json` and benchmarks every reaction with one calculator
/// per seed.
///
/// # Errors
///
/// Fails before processing any reaction when the calculator list is empty or the dataset is
/// missing or unreadable. Malformed reactions and errors inside a reaction are recorded in the
/// returned [`RunReport`].
#[instrument(skip_all, name = "benchmark_workflow", fields(mlp = %config.mlp_name, benchmark = %config.benchmark))]
pub fn run(
    config: &BenchmarkConfig,
    potentials: &[Box<dyn Potential>],
    reporter: &ProgressReporter,
) -> Result<BenchmarkResult, EngineError> {
    let context = BenchmarkContext::new(config, potentials, reporter)?;

    reporter.report(Progress::PhaseStart {
        name: "Loading Dataset",
    });
    let dataset = Dataset::load(&config.dataset_path())?;
    reporter.report(Progress::PhaseFinish);

    run_dataset(&context, &dataset)
}

/// Benchmarks an already loaded dataset.
pub fn run_dataset(
    context: &BenchmarkContext<'_>,
    dataset: &Dataset,
) -> Result<BenchmarkResult, EngineError> {
    let config = context.config;
    let reporter = context.reporter;
    let documents = RunDocuments::new(&config.run_dir(), &config.mlp_name);
    let mut run = RunContext::new(config.random_seed);
    let mut report = RunReport::default();

    info!(
        reactions = dataset.len(),
        seeds = context.seed_count(),
        mode = %config.mode,
        "Starting {} benchmarking.",
        config.mlp_name
    );
    reporter.report(Progress::PhaseStart { name: "Benchmarking" });
    reporter.report(Progress::TaskStart {
        total_steps: dataset.len() as u64,
    });

    for (index, (key, reaction)) in dataset.reactions.iter().enumerate() {
        info!("[{}/{}] {}", index + 1, dataset.len(), key);
        reporter.report(Progress::ReactionStart {
            index,
            key: key.clone(),
        });

        match process_reaction(context, &documents, &mut run, key, reaction) {
            Ok(anomalous) => {
                report.succeeded.push(key.clone());
                reporter.report(Progress::ReactionFinish {
                    key: key.clone(),
                    anomalous,
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
        normal = run.accumulator.normal.len(),
        anomalous = run.accumulator.anomaly.len(),
        time = run.accumulator.time,
        "{} benchmarking finished.",
        config.mlp_name
    );

    Ok(BenchmarkResult {
        report,
        results: run.results,
        accumulator: run.accumulator,
        gases: run.gas_cache,
        documents,
    })
}

fn advance(state: &mut ReactionState, next: ReactionState, key: &str) {
    if !state.can_advance_to(next) {
        warn!(key, from = %state, to = %next, "Unexpected reaction state transition.");
    }
    debug!(key, from = %state, to = %next, "Reaction state changed.");
    *state = next;
}

/// Evaluates, records and persists one reaction.
///
/// On error the reaction's result entry and accumulator record are reverted and the documents
/// are rewritten from the reverted state. Gas energies relaxed along the way stay cached.
fn process_reaction(
    context: &BenchmarkContext<'_>,
    documents: &RunDocuments,
    run: &mut RunContext,
    key: &str,
    reaction: &ReactionRecord,
) -> Result<bool, EngineError> {
    let mode = context.config.mode;
    let mut state = ReactionState::Pending;

    let outcome = transaction(run, |run| {
        validate_reaction(key, reaction)?;
        let RunContext {
            gas_cache,
            results,
            accumulator,
            rng,
        } = run;

        advance(&mut state, ReactionState::Relaxing, key);
        let outcome = evaluate_reaction(context, key, reaction, gas_cache, rng)?;
        advance(&mut state, ReactionState::Classified, key);

        let reaction_report = ReactionReport::new(reaction, &outcome);
        let anomalous = reaction_report.is_anomalous();
        results.insert(key.to_string(), reaction_report);
        accumulator.record(key, outcome.elapsed(), anomalous);

        let gases = (mode == BenchmarkMode::Full).then_some(&*gas_cache);
        documents.persist(&*results, Some(&*accumulator), gases)?;
        advance(&mut state, ReactionState::Persisted, key);

        if anomalous {
            warn!(key, anomalies = ?outcome.anomalies, "Reaction flagged as anomalous.");
        }
        Ok(anomalous)
    });

    if outcome.is_err() {
        advance(&mut state, ReactionState::Failed, key);
        let gases = (mode == BenchmarkMode::Full).then_some(&run.gas_cache);
        if let Err(err) = documents.persist(&run.results, Some(&run.accumulator), gases) {
            warn!(key, error = %err, "Could not restore result documents after failure.");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::json::read_json;
    use crate::core::models::dataset::DatasetError;
    use crate::core::models::reaction::tests::{co_reaction, entry};
    use crate::core::potential::testing::{ConstantPotential, FailingPotential};
    use crate::engine::config::BenchmarkConfigBuilder;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn config(root: &Path, mode: BenchmarkMode) -> BenchmarkConfig {
        BenchmarkConfigBuilder::new()
            .mlp_name("mlp")
            .benchmark("bench")
            .data_dir(root.join("raw_data"))
            .output_root(root.join("result"))
            .mode(mode)
            .build()
            .unwrap()
    }

    /// O adsorption on gold; its gas reference is listed first so that it is relaxed before
    /// the gold structures.
    fn gold_reaction() -> ReactionRecord {
        let mut structures = IndexMap::new();
        structures.insert("Ogas".to_string(), entry(-1.0, -5.0, &["O"]));
        structures.insert("star".to_string(), entry(-1.0, -10.0, &["Au", "Au"]));
        structures.insert("Ostar".to_string(), entry(1.0, -15.5, &["Au", "Au", "O"]));
        ReactionRecord {
            reference_energy: -0.5,
            structures,
        }
    }

    fn dataset() -> Dataset {
        let mut reactions = IndexMap::new();
        reactions.insert("Pt2_CO".to_string(), co_reaction());
        reactions.insert("Au2_O".to_string(), gold_reaction());
        reactions.insert("Pt2_CO_1".to_string(), co_reaction());
        Dataset {
            name: Some("toy".into()),
            reactions,
        }
    }

    #[test]
    fn failing_reaction_is_skipped_and_keeps_its_gas_energies() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(FailingPotential::new("Au"))];
        let reporter = ProgressReporter::new();
        let context = BenchmarkContext::new(&config, &potentials, &reporter).unwrap();

        let result = run_dataset(&context, &dataset()).unwrap();

        assert_eq!(result.report.succeeded, vec!["Pt2_CO", "Pt2_CO_1"]);
        assert_eq!(result.report.failures.len(), 1);
        assert_eq!(result.report.failures[0].index, 1);
        assert_eq!(result.report.failures[0].key, "Au2_O");
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.accumulator.len(), 2);
        assert!(!result.results.contains_key("Au2_O"));
        assert!(result.gases.contains("Ogas", 0));
        assert!(result.gases.contains("COgas", 0));

        let persisted: IndexMap<String, ReactionReport> = read_json(&result.documents.result).unwrap();
        assert_eq!(persisted.keys().collect::<Vec<_>>(), vec!["Pt2_CO", "Pt2_CO_1"]);
        let gases: GasCache = read_json(&result.documents.gases).unwrap();
        assert_eq!(gases, result.gases);
    }

    #[test]
    fn malformed_reaction_is_skipped_and_the_rest_still_run() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        let mut dataset = dataset();
        dataset.reactions["Au2_O"].reference_energy = 5.0;
        dataset.save(&config.dataset_path()).unwrap();
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(ConstantPotential::new(0.0))];

        let result = run(&config, &potentials, &ProgressReporter::new()).unwrap();

        assert_eq!(result.report.succeeded, vec!["Pt2_CO", "Pt2_CO_1"]);
        assert_eq!(result.report.failures.len(), 1);
        assert_eq!(result.report.failures[0].key, "Au2_O");
        assert!(matches!(
            result.report.failures[0].error,
            EngineError::Dataset(DatasetError::InvalidReaction { .. })
        ));
        assert!(!result.gases.contains("Ogas", 0));
        assert_eq!(result.accumulator.len(), 2);
    }

    #[test]
    fn failed_persist_leaves_no_reaction_in_result_document() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        let documents = RunDocuments::new(&config.run_dir(), &config.mlp_name);
        std::fs::create_dir_all(documents.anomaly_detection.join("occupied")).unwrap();
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(ConstantPotential::new(0.0))];
        let reporter = ProgressReporter::new();
        let context = BenchmarkContext::new(&config, &potentials, &reporter).unwrap();

        let result = run_dataset(&context, &dataset()).unwrap();

        assert!(result.report.succeeded.is_empty());
        assert_eq!(result.report.failures.len(), 3);
        assert!(result.results.is_empty());
        assert!(result.accumulator.is_empty());
        let persisted: IndexMap<String, ReactionReport> = read_json(&documents.result).unwrap();
        assert!(persisted.is_empty());
    }

    #[test]
    fn rerun_reproduces_the_partition() {
        let partition = |root: &Path| {
            let config = config(root, BenchmarkMode::Full);
            let potentials: Vec<Box<dyn Potential>> = vec![
                Box::new(ConstantPotential::new(0.1)),
                Box::new(ConstantPotential::new(0.5)),
            ];
            let reporter = ProgressReporter::new();
            let context = BenchmarkContext::new(&config, &potentials, &reporter).unwrap();
            run_dataset(&context, &dataset()).unwrap();
            let documents = RunDocuments::new(&config.run_dir(), &config.mlp_name);
            let accumulator: Accumulator = read_json(&documents.anomaly_detection).unwrap();
            (accumulator.normal, accumulator.anomaly)
        };

        let dir = tempdir().unwrap();
        let first = partition(dir.path());
        let second = partition(dir.path());
        assert_eq!(first, second);
        assert_eq!(first.0.len() + first.1.len(), 3);
        // Seeds disagree by 0.4 eV, above the 0.2 eV seed threshold.
        assert_eq!(first.1.len(), 3);
    }

    #[test]
    fn adsorbate_only_mode_writes_no_gas_document() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::AdsorbateOnly);
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(ConstantPotential::new(0.0))];
        let reporter = ProgressReporter::new();
        let context = BenchmarkContext::new(&config, &potentials, &reporter).unwrap();

        let result = run_dataset(&context, &dataset()).unwrap();

        assert!(result.report.is_complete_success());
        assert!(result.documents.result.exists());
        assert!(result.documents.anomaly_detection.exists());
        assert!(!result.documents.gases.exists());
        assert!(result.gases.is_empty());
    }

    #[test]
    fn progress_events_bracket_every_reaction() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(FailingPotential::new("Au"))];
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::ReactionFinish { key, .. } => events.lock().unwrap().push(format!("ok {key}")),
            Progress::ReactionFailed { key, .. } => events.lock().unwrap().push(format!("err {key}")),
            _ => {}
        }));
        let context = BenchmarkContext::new(&config, &potentials, &reporter).unwrap();
        run_dataset(&context, &dataset()).unwrap();
        drop(reporter);

        assert_eq!(
            events.into_inner().unwrap(),
            vec!["ok Pt2_CO", "err Au2_O", "ok Pt2_CO_1"]
        );
    }

    #[test]
    fn missing_dataset_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(ConstantPotential::new(0.0))];
        let result = run(&config, &potentials, &ProgressReporter::new());
        assert!(matches!(result, Err(EngineError::Dataset(_))));
    }

    #[test]
    fn empty_calculator_list_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        let result = run(&config, &[], &ProgressReporter::new());
        assert!(matches!(result, Err(EngineError::NoCalculators)));
    }

    #[test]
    fn run_loads_dataset_from_data_dir() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), BenchmarkMode::Full);
        dataset().save(&config.dataset_path()).unwrap();
        let potentials: Vec<Box<dyn Potential>> = vec![Box::new(ConstantPotential::new(0.0))];

        let result = run(&config, &potentials, &ProgressReporter::new()).unwrap();

        assert_eq!(result.report.total(), 3);
        assert_eq!(result.accumulator.normal.len(), 3);
        assert!(
            dir.path()
                .join("result/mlp/mlp_anomaly_detection.json")
                .exists()
        );
    }
}
