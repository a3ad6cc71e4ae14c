use super::accumulator::Accumulator;
use super::aggregate::{FinalSummary, ReactionOutcome, SeedResult};
use super::anomaly::AnomalyRecord;
use super::cache::GasCache;
use super::error::EngineError;
use crate::core::io::json::{ResultsIoError, StagedSnapshot, stage_json_snapshot};
use crate::core::models::reaction::{ReactionRecord, StructureRole};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// DFT reference values of one reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEnergies {
    pub ads_eng: f64,
    /// `<role>_abs` for every slab and adsorbate-slab role.
    #[serde(flatten)]
    pub structures: IndexMap<String, f64>,
}

impl ReferenceEnergies {
    pub fn from_reaction(reaction: &ReactionRecord) -> Self {
        Self {
            ads_eng: reaction.reference_energy,
            structures: reaction
                .structures
                .iter()
                .filter(|(role, _)| StructureRole::classify(role) != StructureRole::Gas)
                .map(|(role, entry)| (format!("{role}_abs"), entry.reference_energy))
                .collect(),
        }
    }
}

/// Per-seed row of the result document. Slab columns are absent in adsorbate-only mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub ads_eng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slab_abs: Option<f64>,
    pub ads_abs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slab_disp: Option<f64>,
    pub ads_disp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slab_steps: Option<usize>,
    pub ads_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slab: Option<f64>,
    pub time_ads: f64,
}

impl From<&SeedResult> for SeedEntry {
    fn from(seed: &SeedResult) -> Self {
        let slab = seed.slab.as_ref();
        Self {
            ads_eng: seed.ads_eng,
            slab_abs: slab.map(|s| s.energy),
            ads_abs: seed.adsorbate.energy,
            slab_disp: slab.map(|s| s.displacement),
            ads_disp: seed.adsorbate.displacement,
            slab_steps: slab.map(|s| s.steps),
            ads_steps: seed.adsorbate.steps,
            time_slab: slab.map(|s| s.elapsed),
            time_ads: seed.adsorbate.elapsed,
        }
    }
}

/// One entry of the result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionReport {
    pub reference: ReferenceEnergies,
    pub anomalies: AnomalyRecord,
    pub seeds: Vec<SeedEntry>,
    #[serde(rename = "final")]
    pub summary: FinalSummary,
}

impl ReactionReport {
    pub fn new(reaction: &ReactionRecord, outcome: &ReactionOutcome) -> Self {
        Self {
            reference: ReferenceEnergies::from_reaction(reaction),
            anomalies: outcome.anomalies.clone(),
            seeds: outcome.seeds.iter().map(SeedEntry::from).collect(),
            summary: outcome.summary.clone(),
        }
    }

    pub fn is_anomalous(&self) -> bool {
        !self.anomalies.is_normal()
    }
}

/// Energies of a single-point evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePointEnergies {
    pub ads_eng: f64,
    pub slab_abs: f64,
    pub ads_abs: f64,
}

/// One entry of the single-point result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePointReport {
    pub reference: ReferenceEnergies,
    pub single_point: SinglePointEnergies,
}

/// File locations of the documents of one run, all directly under the run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDocuments {
    pub result: PathBuf,
    pub anomaly_detection: PathBuf,
    pub gases: PathBuf,
}

impl RunDocuments {
    pub fn new(run_dir: &Path, mlp_name: &str) -> Self {
        Self {
            result: run_dir.join(format!("{mlp_name}_result.json")),
            anomaly_detection: run_dir.join(format!("{mlp_name}_anomaly_detection.json")),
            gases: run_dir.join(format!("{mlp_name}_gases.json")),
        }
    }

    /// Rewrites the result, anomaly-detection and (when given) gas documents.
    ///
    /// Every document is staged before any of them replaces its target, so a serialization or
    /// write error leaves all three files as they were.
    pub fn persist<R: Serialize>(
        &self,
        results: &IndexMap<String, R>,
        accumulator: Option<&Accumulator>,
        gases: Option<&GasCache>,
    ) -> Result<(), EngineError> {
        let mut staged = Vec::with_capacity(3);
        stage_into(&mut staged, &self.result, results)?;
        if let Some(accumulator) = accumulator {
            stage_into(&mut staged, &self.anomaly_detection, accumulator)?;
        }
        if let Some(gases) = gases {
            stage_into(&mut staged, &self.gases, gases)?;
        }
        let mut staged = staged.into_iter();
        while let Some(snapshot) = staged.next() {
            if let Err(err) = snapshot.commit() {
                staged.for_each(StagedSnapshot::discard);
                return Err(err.into());
            }
        }
        Ok(())
    }
}

fn stage_into<T: Serialize + ?Sized>(
    staged: &mut Vec<StagedSnapshot>,
    path: &Path,
    value: &T,
) -> Result<(), ResultsIoError> {
    match stage_json_snapshot(path, value) {
        Ok(snapshot) => {
            staged.push(snapshot);
            Ok(())
        }
        Err(err) => {
            staged.drain(..).for_each(StagedSnapshot::discard);
            Err(err)
        }
    }
}
