use super::anomaly::{AnomalyRecord, classify, seed_range};
use super::cache::GasCache;
use super::combine::combine;
use super::config::BenchmarkMode;
use super::context::BenchmarkContext;
use super::error::EngineError;
use super::relax::{RelaxCriteria, RelaxOptions, constrained, fix_height, relax};
use crate::core::models::reaction::{ReactionRecord, StructureEntry, StructureRole};
use crate::core::potential::Potential;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of relaxing one slab or adsorbate-slab structure for one seed.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureRelaxation {
    pub energy: f64,
    pub steps: usize,
    /// Largest per-atom displacement between the input and the relaxed geometry.
    pub displacement: f64,
    pub elapsed: f64,
}

/// Everything one seed contributes to a reaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedResult {
    /// Adsorption energy predicted with this seed.
    pub ads_eng: f64,
    /// Absent in adsorbate-only mode.
    pub slab: Option<StructureRelaxation>,
    pub adsorbate: StructureRelaxation,
}

/// Cross-seed statistics of one reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub ads_eng_median: f64,
    /// Seed index the median was taken from.
    pub median_num: usize,
    pub ads_eng_min: f64,
    pub ads_eng_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slab_max_disp: Option<f64>,
    pub ads_max_disp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slab_seed_range: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ads_seed_range: Option<f64>,
    pub ads_eng_seed_range: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_total_slab: Option<f64>,
    pub time_total_ads: f64,
}

/// Seeds, statistics and anomaly record of one successfully evaluated reaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionOutcome {
    pub seeds: Vec<SeedResult>,
    pub summary: FinalSummary,
    pub anomalies: AnomalyRecord,
}

impl ReactionOutcome {
    /// Relaxation wall time spent on this reaction (slab plus adsorbate-slab, all seeds).
    pub fn elapsed(&self) -> f64 {
        self.summary.time_total_slab.unwrap_or(0.0) + self.summary.time_total_ads
    }
}

/// Median by sorted position `(n - 1) / 2`, reported with the first original index that
/// holds the median value. `None` for an empty slice.
pub fn median_index(values: &[f64]) -> Option<(usize, f64)> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = *sorted.get(sorted.len().checked_sub(1)? / 2)?;
    let index = values.iter().position(|&v| v == median)?;
    Some((index, median))
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}

impl FinalSummary {
    /// # Errors
    ///
    /// Returns [`EngineError::Internal`] when there are no seeds.
    pub fn from_seeds(seeds: &[SeedResult], mode: BenchmarkMode) -> Result<Self, EngineError> {
        let ads_engs: Vec<f64> = seeds.iter().map(|s| s.ads_eng).collect();
        let (median_num, ads_eng_median) = median_index(&ads_engs)
            .ok_or_else(|| EngineError::Internal("Cannot summarize a reaction without seeds".into()))?;
        let full = mode == BenchmarkMode::Full;
        let slabs: Vec<&StructureRelaxation> = seeds.iter().filter_map(|s| s.slab.as_ref()).collect();

        Ok(Self {
            ads_eng_median,
            median_num,
            ads_eng_min: ads_engs.iter().copied().fold(f64::INFINITY, f64::min),
            ads_eng_max: max_of(ads_engs.iter().copied()),
            slab_max_disp: full.then(|| max_of(slabs.iter().map(|r| r.displacement))),
            ads_max_disp: max_of(seeds.iter().map(|s| s.adsorbate.displacement)),
            slab_seed_range: full.then(|| seed_range(slabs.iter().map(|r| r.energy))),
            ads_seed_range: full.then(|| seed_range(seeds.iter().map(|s| s.adsorbate.energy))),
            ads_eng_seed_range: seed_range(ads_engs.iter().copied()),
            time_total_slab: full.then(|| slabs.iter().map(|r| r.elapsed).sum()),
            time_total_ads: seeds.iter().map(|s| s.adsorbate.elapsed).sum(),
        })
    }
}

fn relax_structure(
    context: &BenchmarkContext<'_>,
    key: &str,
    role: &str,
    seed: usize,
    entry: &StructureEntry,
    potential: &dyn Potential,
    height: Option<f64>,
) -> Result<StructureRelaxation, EngineError> {
    let relaxation = &context.config.relaxation;
    let criteria = RelaxCriteria {
        f_crit: relaxation.f_crit,
        max_steps: relaxation.max_steps,
    };
    let options = match context.artifacts_dir() {
        Some(dir) => RelaxOptions {
            log_path: Some(dir.join("log").join(key).join(format!("{role}_{seed}.txt"))),
            trajectory_path: Some(
                dir.join("traj")
                    .join(key)
                    .join(format!("{role}_{seed}.extxyz")),
            ),
        },
        None => RelaxOptions::default(),
    };

    let start = constrained(&entry.geometry, height);
    let outcome = relax(
        &start,
        potential,
        relaxation.optimizer,
        relaxation.damping,
        &criteria,
        &options,
    )?;
    let displacement = entry.geometry.max_displacement(&outcome.structure)?;
    debug!(
        key,
        role,
        seed,
        energy = outcome.energy,
        steps = outcome.steps,
        displacement,
        "Structure relaxed."
    );

    Ok(StructureRelaxation {
        energy: outcome.energy,
        steps: outcome.steps,
        displacement,
        elapsed: outcome.elapsed,
    })
}

fn evaluate_seed(
    context: &BenchmarkContext<'_>,
    key: &str,
    reaction: &ReactionRecord,
    seed: usize,
    height: Option<f64>,
    cache: &mut GasCache,
    rng: &mut StdRng,
) -> Result<SeedResult, EngineError> {
    let potential = context.potentials[seed].as_ref();
    let mode = context.config.mode;
    let gas_settings = context.gas_settings();

    let mut energies = IndexMap::new();
    let mut slab = None;
    let mut adsorbate = None;
    for (role, entry) in &reaction.structures {
        match (StructureRole::classify(role), mode) {
            (StructureRole::Gas, BenchmarkMode::Full) => {
                let energy =
                    cache.get_or_compute(role, seed, &entry.geometry, potential, &gas_settings, rng)?;
                energies.insert(role.clone(), energy);
            }
            (StructureRole::Gas | StructureRole::Slab, BenchmarkMode::AdsorbateOnly) => {}
            (StructureRole::Slab, BenchmarkMode::Full) => {
                let relaxed = relax_structure(context, key, role, seed, entry, potential, height)?;
                energies.insert(role.clone(), relaxed.energy);
                slab = Some(relaxed);
            }
            (StructureRole::AdsorbateSlab, _) => {
                let relaxed = relax_structure(context, key, role, seed, entry, potential, height)?;
                energies.insert(role.clone(), relaxed.energy);
                adsorbate = Some(relaxed);
            }
        }
    }

    let adsorbate = adsorbate.ok_or_else(|| {
        EngineError::Internal(format!("Reaction '{key}' has no adsorbate-slab structure"))
    })?;
    let ads_eng = match mode {
        BenchmarkMode::Full => {
            let coefficients: IndexMap<String, f64> = reaction
                .structures
                .iter()
                .map(|(role, entry)| (role.clone(), entry.coefficient))
                .collect();
            combine(&energies, &coefficients)?
        }
        BenchmarkMode::AdsorbateOnly => adsorbate.energy,
    };

    Ok(SeedResult {
        ads_eng,
        slab,
        adsorbate,
    })
}

/// Evaluates one reaction with every seed in order, then summarizes and classifies it.
///
/// The fix height is taken from the unrelaxed bare slab and applied to every relaxed
/// structure of the reaction.
pub fn evaluate_reaction(
    context: &BenchmarkContext<'_>,
    key: &str,
    reaction: &ReactionRecord,
    cache: &mut GasCache,
    rng: &mut StdRng,
) -> Result<ReactionOutcome, EngineError> {
    let config = context.config;
    let height = reaction
        .slab()
        .and_then(|slab| fix_height(&slab.geometry, config.relaxation.rate));

    let seeds = (0..context.seed_count())
        .map(|seed| evaluate_seed(context, key, reaction, seed, height, cache, rng))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = FinalSummary::from_seeds(&seeds, config.mode)?;
    let anomalies = classify(
        &seeds,
        &config.anomaly,
        config.relaxation.max_steps,
        config.mode,
    );

    Ok(ReactionOutcome {
        seeds,
        summary,
        anomalies,
    })
}
