use crate::core::io::json::{ResultsIoError, read_json};
use crate::engine::accumulator::Accumulator;
use crate::engine::anomaly::AnomalyKind;
use crate::engine::report::{ReactionReport, ReferenceEnergies, RunDocuments, SinglePointReport};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to read benchmark documents: {0}")]
    Results(#[from] ResultsIoError),
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to write CSV table '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("No benchmark runs found under '{0}'")]
    NoRuns(String),
}

/// Which runs to analyze.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    /// Directory holding one sub-directory per MLP run.
    pub result_root: PathBuf,
    /// Runs to analyze; every run under `result_root` when `None`.
    pub mlp_names: Option<Vec<String>>,
    /// Adsorbates to include; every adsorbate when `None`.
    pub target_adsorbates: Option<BTreeSet<String>>,
}

/// Headline numbers of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlpSummary {
    #[serde(rename = "MLP_name")]
    pub mlp_name: String,
    #[serde(rename = "Anomaly ratio (%)")]
    pub anomaly_ratio: f64,
    #[serde(rename = "MAE_total (eV)")]
    pub mae_total: Option<f64>,
    #[serde(rename = "MAE_normal (eV)")]
    pub mae_normal: Option<f64>,
    #[serde(rename = "MAE_anomaly (eV)")]
    pub mae_anomaly: Option<f64>,
    #[serde(rename = "Num_total")]
    pub num_total: usize,
    #[serde(rename = "Num_normal")]
    pub num_normal: usize,
    #[serde(rename = "Num_anomaly")]
    pub num_anomaly: usize,
    #[serde(rename = "Time_total (s)")]
    pub time_total: f64,
    #[serde(rename = "Time_per_step (s)")]
    pub time_per_step: Option<f64>,
}

/// Number of reactions that tripped each anomaly kind. Slab kinds are absent for runs in
/// adsorbate-only mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyCounts {
    #[serde(rename = "MLP_name")]
    pub mlp_name: String,
    #[serde(rename = "Num_anomaly")]
    pub num_anomaly: usize,
    pub slab_conv: Option<usize>,
    pub ads_conv: usize,
    pub slab_move: Option<usize>,
    pub ads_move: usize,
    pub slab_seed: Option<usize>,
    pub ads_seed: Option<usize>,
    pub ads_eng_seed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdsorbateSummary {
    #[serde(rename = "Adsorbate_name")]
    pub adsorbate: String,
    #[serde(rename = "Anomaly ratio (%)")]
    pub anomaly_ratio: f64,
    #[serde(rename = "MAE_total (eV)")]
    pub mae_total: Option<f64>,
    #[serde(rename = "MAE_normal (eV)")]
    pub mae_normal: Option<f64>,
    #[serde(rename = "MAE_anomaly (eV)")]
    pub mae_anomaly: Option<f64>,
    #[serde(rename = "Num_total")]
    pub num_total: usize,
    #[serde(rename = "Num_normal")]
    pub num_normal: usize,
    #[serde(rename = "Num_anomaly")]
    pub num_anomaly: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlpAnalysis {
    pub summary: MlpSummary,
    pub anomalies: AnomalyCounts,
    pub adsorbates: Vec<AdsorbateSummary>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisReport {
    pub mlps: Vec<MlpAnalysis>,
}

/// MAE of a single-point run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinglePointSummary {
    #[serde(rename = "MLP_name")]
    pub mlp_name: String,
    #[serde(rename = "MAE (eV)")]
    pub mae: Option<f64>,
    #[serde(rename = "Num_total")]
    pub num_total: usize,
}

/// Absolute errors of reactions split into normal and anomalous ones.
#[derive(Debug, Default, Clone)]
struct ErrorBins {
    normal: Vec<f64>,
    anomaly: Vec<f64>,
}

impl ErrorBins {
    fn push(&mut self, error: f64, anomalous: bool) {
        if anomalous {
            self.anomaly.push(error);
        } else {
            self.normal.push(error);
        }
    }

    fn total(&self) -> usize {
        self.normal.len() + self.anomaly.len()
    }

    fn mae_total(&self) -> Option<f64> {
        mean(self.normal.iter().chain(&self.anomaly).copied())
    }

    /// Percentage of anomalous reactions.
    fn anomaly_ratio(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        100.0 * self.anomaly.len() as f64 / self.total() as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// The adsorbate of a reaction, read from its `<adsorbate>star_abs` reference entry.
pub fn adsorbate_of(reference: &ReferenceEnergies) -> Option<&str> {
    reference
        .structures
        .keys()
        .filter(|key| key.as_str() != "star_abs")
        .find_map(|key| key.strip_suffix("star_abs"))
}

/// Energy evaluations behind one reaction: every relaxation of `n` steps evaluated `n + 1`
/// geometries.
fn evaluation_count(report: &ReactionReport) -> usize {
    report
        .seeds
        .iter()
        .map(|seed| seed.ads_steps + 1 + seed.slab_steps.map_or(0, |steps| steps + 1))
        .sum()
}

/// Names of the run directories under `result_root` that hold a result document, sorted
/// case-insensitively.
pub fn discover_runs(result_root: &Path) -> Result<Vec<String>, AnalysisError> {
    let entries = std::fs::read_dir(result_root).map_err(|source| AnalysisError::Io {
        path: result_root.to_string_lossy().to_string(),
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if RunDocuments::new(&entry.path(), &name).result.exists() {
            names.push(name);
        } else {
            warn!(run = %name, "Skipping directory without a result document.");
        }
    }
    names.sort_by_key(|name| name.to_lowercase());
    Ok(names)
}

fn run_names(options: &AnalysisOptions) -> Result<Vec<String>, AnalysisError> {
    let names = match &options.mlp_names {
        Some(names) => names.clone(),
        None => discover_runs(&options.result_root)?,
    };
    if names.is_empty() {
        return Err(AnalysisError::NoRuns(
            options.result_root.to_string_lossy().to_string(),
        ));
    }
    Ok(names)
}

/// Analyzes one run directory.
pub fn analyze_run(
    run_dir: &Path,
    mlp_name: &str,
    target_adsorbates: Option<&BTreeSet<String>>,
) -> Result<MlpAnalysis, AnalysisError> {
    let documents = RunDocuments::new(run_dir, mlp_name);
    let results: IndexMap<String, ReactionReport> = read_json(&documents.result)?;
    let accumulator: Accumulator = read_json(&documents.anomaly_detection)?;

    let full_mode = results
        .values()
        .next()
        .is_none_or(|report| report.anomalies.iter().any(|(kind, _)| kind == AnomalyKind::SlabConv));

    let mut all = ErrorBins::default();
    let mut per_adsorbate: IndexMap<String, ErrorBins> = IndexMap::new();
    let mut kind_counts: IndexMap<AnomalyKind, usize> = IndexMap::new();
    let mut time_accum = 0.0;
    let mut step_accum = 0;

    for report in results.values() {
        let Some(adsorbate) = adsorbate_of(&report.reference) else {
            continue;
        };
        if target_adsorbates.is_some_and(|targets| !targets.contains(adsorbate)) {
            continue;
        }

        let error = (report.summary.ads_eng_median - report.reference.ads_eng).abs();
        let anomalous = report.is_anomalous();
        all.push(error, anomalous);
        per_adsorbate
            .entry(adsorbate.to_string())
            .or_default()
            .push(error, anomalous);

        for (kind, count) in report.anomalies.iter() {
            if count > 0 {
                *kind_counts.entry(kind).or_default() += 1;
            }
        }
        time_accum += report.summary.time_total_slab.unwrap_or(0.0) + report.summary.time_total_ads;
        step_accum += evaluation_count(report);
    }

    let count = |kind: AnomalyKind| kind_counts.get(&kind).copied().unwrap_or(0);
    let slab_count = |kind: AnomalyKind| full_mode.then(|| count(kind));

    let summary = MlpSummary {
        mlp_name: mlp_name.to_string(),
        anomaly_ratio: all.anomaly_ratio(),
        mae_total: all.mae_total(),
        mae_normal: mean(all.normal.iter().copied()),
        mae_anomaly: mean(all.anomaly.iter().copied()),
        num_total: all.total(),
        num_normal: all.normal.len(),
        num_anomaly: all.anomaly.len(),
        time_total: accumulator.time,
        time_per_step: (step_accum > 0).then(|| time_accum / step_accum as f64),
    };
    let anomalies = AnomalyCounts {
        mlp_name: mlp_name.to_string(),
        num_anomaly: all.anomaly.len(),
        slab_conv: slab_count(AnomalyKind::SlabConv),
        ads_conv: count(AnomalyKind::AdsConv),
        slab_move: slab_count(AnomalyKind::SlabMove),
        ads_move: count(AnomalyKind::AdsMove),
        slab_seed: slab_count(AnomalyKind::SlabSeed),
        ads_seed: slab_count(AnomalyKind::AdsSeed),
        ads_eng_seed: count(AnomalyKind::AdsEngSeed),
    };
    let adsorbates = per_adsorbate
        .into_iter()
        .map(|(adsorbate, bins)| AdsorbateSummary {
            adsorbate,
            anomaly_ratio: bins.anomaly_ratio(),
            mae_total: bins.mae_total(),
            mae_normal: mean(bins.normal.iter().copied()),
            mae_anomaly: mean(bins.anomaly.iter().copied()),
            num_total: bins.total(),
            num_normal: bins.normal.len(),
            num_anomaly: bins.anomaly.len(),
        })
        .collect();

    Ok(MlpAnalysis {
        summary,
        anomalies,
        adsorbates,
    })
}

/// Analyzes every selected run under `options.result_root`.
#[instrument(skip_all, name = "analysis_workflow")]
pub fn analyze(options: &AnalysisOptions) -> Result<AnalysisReport, AnalysisError> {
    let names = run_names(options)?;

    let mut report = AnalysisReport::default();
    for name in names {
        let analysis = analyze_run(
            &options.result_root.join(&name),
            &name,
            options.target_adsorbates.as_ref(),
        )?;
        info!(
            mlp = %name,
            mae = ?analysis.summary.mae_total,
            anomaly_ratio = analysis.summary.anomaly_ratio,
            "Run analyzed."
        );
        report.mlps.push(analysis);
    }
    Ok(report)
}

/// MAE of the single-point energies of one run.
pub fn analyze_single_point(run_dir: &Path, mlp_name: &str) -> Result<SinglePointSummary, AnalysisError> {
    let documents = RunDocuments::new(run_dir, mlp_name);
    let results: IndexMap<String, SinglePointReport> = read_json(&documents.result)?;
    Ok(SinglePointSummary {
        mlp_name: mlp_name.to_string(),
        mae: mean(
            results
                .values()
                .map(|r| (r.single_point.ads_eng - r.reference.ads_eng).abs()),
        ),
        num_total: results.len(),
    })
}

/// Single-point MAE of every selected run under `options.result_root`. Adsorbate filters do
/// not apply.
#[instrument(skip_all, name = "single_point_analysis_workflow")]
pub fn analyze_single_points(options: &AnalysisOptions) -> Result<Vec<SinglePointSummary>, AnalysisError> {
    run_names(options)?
        .iter()
        .map(|name| analyze_single_point(&options.result_root.join(name), name))
        .collect()
}

/// Writes `<name>_single_point.csv` into `dir`.
pub fn write_single_point_csv(
    rows: &[SinglePointSummary],
    dir: &Path,
    name: &str,
) -> Result<PathBuf, AnalysisError> {
    std::fs::create_dir_all(dir).map_err(|source| AnalysisError::Io {
        path: dir.to_string_lossy().to_string(),
        source,
    })?;
    let path = dir.join(format!("{name}_single_point.csv"));
    write_table(&path, rows)?;
    Ok(path)
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AnalysisError> {
    let csv_err = |source| AnalysisError::Csv {
        path: path.to_string_lossy().to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| AnalysisError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })
}

impl AnalysisReport {
    /// Writes `<name>_analysis.csv`, `<name>_anomaly.csv` and one
    /// `<name>_<mlp>_adsorbates.csv` per run into `dir`, returning the written paths.
    pub fn write_csv(&self, dir: &Path, name: &str) -> Result<Vec<PathBuf>, AnalysisError> {
        std::fs::create_dir_all(dir).map_err(|source| AnalysisError::Io {
            path: dir.to_string_lossy().to_string(),
            source,
        })?;
        let mut written = Vec::new();

        let path = dir.join(format!("{name}_analysis.csv"));
        let summaries: Vec<&MlpSummary> = self.mlps.iter().map(|m| &m.summary).collect();
        write_table(&path, &summaries)?;
        written.push(path);

        let path = dir.join(format!("{name}_anomaly.csv"));
        let anomalies: Vec<&AnomalyCounts> = self.mlps.iter().map(|m| &m.anomalies).collect();
        write_table(&path, &anomalies)?;
        written.push(path);

        for mlp in &self.mlps {
            let path = dir.join(format!("{name}_{}_adsorbates.csv", mlp.summary.mlp_name));
            write_table(&path, &mlp.adsorbates)?;
            written.push(path);
        }
        Ok(written)
    }
}
