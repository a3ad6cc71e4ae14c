use super::aggregate::SeedResult;
use super::config::{AnomalyThresholds, BenchmarkMode};
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One heuristic a reaction can trip. Ordered the way the anomaly document lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Slab relaxation hit the step cap.
    SlabConv,
    /// Adsorbate-slab relaxation hit the step cap.
    AdsConv,
    /// Some slab atom moved further than `disp_thrs_slab`.
    SlabMove,
    /// Some adsorbate-slab atom moved further than `disp_thrs_ads`.
    AdsMove,
    /// Slab energies spread over more than `again_seed` across seeds.
    SlabSeed,
    /// Adsorbate-slab energies spread over more than `again_seed` across seeds.
    AdsSeed,
    /// Adsorption energies spread over more than `again_seed` across seeds.
    AdsEngSeed,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 7] = [
        AnomalyKind::SlabConv,
        AnomalyKind::AdsConv,
        AnomalyKind::SlabMove,
        AnomalyKind::AdsMove,
        AnomalyKind::SlabSeed,
        AnomalyKind::AdsSeed,
        AnomalyKind::AdsEngSeed,
    ];

    pub const ADSORBATE_ONLY: [AnomalyKind; 3] = [
        AnomalyKind::AdsConv,
        AnomalyKind::AdsMove,
        AnomalyKind::AdsEngSeed,
    ];

    pub fn for_mode(mode: BenchmarkMode) -> &'static [AnomalyKind] {
        match mode {
            BenchmarkMode::Full => &Self::ALL,
            BenchmarkMode::AdsorbateOnly => &Self::ADSORBATE_ONLY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::SlabConv => "slab_conv",
            AnomalyKind::AdsConv => "ads_conv",
            AnomalyKind::SlabMove => "slab_move",
            AnomalyKind::AdsMove => "ads_move",
            AnomalyKind::SlabSeed => "slab_seed",
            AnomalyKind::AdsSeed => "ads_seed",
            AnomalyKind::AdsEngSeed => "ads_eng_seed",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind anomaly counts of one reaction. A reaction is normal iff every count is zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnomalyRecord {
    counts: BTreeMap<AnomalyKind, u32>,
}

impl AnomalyRecord {
    /// A record carrying a zero count for every kind that exists in `mode`.
    pub fn new(mode: BenchmarkMode) -> Self {
        Self {
            counts: AnomalyKind::for_mode(mode)
                .iter()
                .map(|&kind| (kind, 0))
                .collect(),
        }
    }

    pub fn increment(&mut self, kind: AnomalyKind) {
        *self.counts.entry(kind).or_default() += 1;
    }

    pub fn get(&self, kind: AnomalyKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn is_normal(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnomalyKind, u32)> + '_ {
        self.counts.iter().map(|(&kind, &count)| (kind, count))
    }
}

/// `max - min` of the values, zero for fewer than two values.
pub fn seed_range(values: impl IntoIterator<Item = f64>) -> f64 {
    match values.into_iter().minmax() {
        MinMaxResult::MinMax(min, max) => max - min,
        MinMaxResult::NoElements | MinMaxResult::OneElement(_) => 0.0,
    }
}

/// Applies the convergence, displacement and seed-spread heuristics to one reaction.
///
/// Convergence and displacement kinds count seeds; seed kinds are 0/1 flags.
pub fn classify(
    seeds: &[SeedResult],
    thresholds: &AnomalyThresholds,
    max_steps: usize,
    mode: BenchmarkMode,
) -> AnomalyRecord {
    let mut record = AnomalyRecord::new(mode);

    for seed in seeds {
        if seed.adsorbate.steps == max_steps {
            record.increment(AnomalyKind::AdsConv);
        }
        if seed.adsorbate.displacement > thresholds.disp_thrs_ads {
            record.increment(AnomalyKind::AdsMove);
        }
        if mode == BenchmarkMode::Full {
            if let Some(slab) = &seed.slab {
                if slab.steps == max_steps {
                    record.increment(AnomalyKind::SlabConv);
                }
                if slab.displacement > thresholds.disp_thrs_slab {
                    record.increment(AnomalyKind::SlabMove);
                }
            }
        }
    }

    if seed_range(seeds.iter().map(|s| s.ads_eng)) > thresholds.again_seed {
        record.increment(AnomalyKind::AdsEngSeed);
    }
    if mode == BenchmarkMode::Full {
        let slab_range = seed_range(seeds.iter().filter_map(|s| s.slab.as_ref()).map(|r| r.energy));
        if slab_range > thresholds.again_seed {
            record.increment(AnomalyKind::SlabSeed);
        }
        if seed_range(seeds.iter().map(|s| s.adsorbate.energy)) > thresholds.again_seed {
            record.increment(AnomalyKind::AdsSeed);
        }
    }

    record
}
