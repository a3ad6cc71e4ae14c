use super::error::EngineError;
use super::relax::{RelaxCriteria, RelaxOptions, relax};
use crate::core::io::extxyz::ExtXyzFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::Structure;
use crate::core::optimize::OptimizerKind;
use crate::core::potential::Potential;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Cell edge decrement between two gas relaxation attempts, in Angstrom.
pub const GAS_DISTANCE_DECREMENT: f64 = 0.5;

/// Relaxed gas-phase energies keyed by species and seed index.
///
/// Serializes as `{ species: { seed: energy } }`, both levels sorted.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GasCache {
    data: BTreeMap<String, BTreeMap<usize, f64>>,
}

impl GasCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, species: &str, seed: usize) -> Option<f64> {
        self.data
            .get(species)
            .and_then(|seeds| seeds.get(&seed))
            .copied()
    }

    pub fn insert(&mut self, species: &str, seed: usize, energy: f64) {
        self.data
            .entry(species.to_string())
            .or_default()
            .insert(seed, energy);
    }

    pub fn remove(&mut self, species: &str, seed: usize) -> Option<f64> {
        let seeds = self.data.get_mut(species)?;
        let removed = seeds.remove(&seed);
        if seeds.is_empty() {
            self.data.remove(species);
        }
        removed
    }

    pub fn contains(&self, species: &str, seed: usize) -> bool {
        self.get(species, seed).is_some()
    }

    /// Every cached `(species, seed)` pair, sorted.
    pub fn keys(&self) -> impl Iterator<Item = (&str, usize)> {
        self.data
            .iter()
            .flat_map(|(species, seeds)| seeds.keys().map(move |&seed| (species.as_str(), seed)))
    }

    pub fn len(&self) -> usize {
        self.data.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// How gas molecules are boxed and relaxed.
#[derive(Debug, Clone, PartialEq)]
pub struct GasSettings {
    pub f_crit: f64,
    pub max_steps: usize,
    /// Initial cubic cell edge; shrunk by [`GAS_DISTANCE_DECREMENT`] after each failure.
    pub cell_distance: f64,
    pub optimizer: OptimizerKind,
    /// Root of the `gases/` artifact tree, if artifacts are written.
    pub artifacts_dir: Option<PathBuf>,
}

impl GasSettings {
    fn tag(species: &str, seed: usize) -> String {
        format!("{species}_{seed}")
    }

    fn options(&self, tag: &str) -> RelaxOptions {
        match &self.artifacts_dir {
            Some(dir) => RelaxOptions {
                log_path: Some(dir.join("log").join(format!("{tag}.txt"))),
                trajectory_path: Some(dir.join("traj").join(format!("{tag}.extxyz"))),
            },
            None => RelaxOptions::default(),
        }
    }

    fn write_geometry(&self, tag: &str, stage: &str, structure: &Structure) -> Result<(), EngineError> {
        if let Some(dir) = &self.artifacts_dir {
            let path = dir
                .join("structures")
                .join(format!("{tag}_{stage}.extxyz"));
            ExtXyzFile::write_structure_to_path(structure, &path)?;
        }
        Ok(())
    }
}

/// Index of the atom to pin: uniformly chosen among the atoms with the highest atomic number.
fn pick_anchor(molecule: &Structure, rng: &mut StdRng) -> Option<usize> {
    let numbers = molecule.atomic_numbers();
    let highest = numbers.iter().copied().max()?;
    let candidates: Vec<usize> = numbers
        .iter()
        .enumerate()
        .filter(|&(_, &z)| z == highest)
        .map(|(i, _)| i)
        .collect();
    Some(candidates[rng.gen_range(0..candidates.len())])
}

/// Relaxes an isolated gas molecule in a cubic box, shrinking the box after each failure.
///
/// The pinned atom is drawn once, so every attempt relaxes the same constrained molecule
/// starting from the input geometry.
///
/// # Errors
///
/// Returns [`EngineError::GasRelaxation`] with the last failure once the box edge would drop
/// to zero or below.
pub fn relax_gas(
    species: &str,
    seed: usize,
    geometry: &Structure,
    potential: &dyn Potential,
    settings: &GasSettings,
    rng: &mut StdRng,
) -> Result<f64, EngineError> {
    let tag = GasSettings::tag(species, seed);
    let anchor = pick_anchor(geometry, rng);
    let criteria = RelaxCriteria {
        f_crit: settings.f_crit,
        max_steps: settings.max_steps,
    };
    let options = settings.options(&tag);

    let mut distance = settings.cell_distance;
    let mut attempts = 0;
    loop {
        attempts += 1;
        let mut molecule = geometry.clone();
        molecule.clear_constraints();
        molecule.set_cubic_cell(distance);
        molecule.center();
        if let Some(anchor) = anchor {
            molecule.fix_atoms(&[anchor])?;
        }
        settings.write_geometry(&tag, "initial", &molecule)?;

        match relax(&molecule, potential, settings.optimizer, 1.0, &criteria, &options) {
            Ok(outcome) => {
                settings.write_geometry(&tag, "relaxed", &outcome.structure)?;
                debug!(
                    species,
                    seed,
                    attempts,
                    energy = outcome.energy,
                    "Gas molecule relaxed."
                );
                return Ok(outcome.energy);
            }
            Err(err) => {
                distance -= GAS_DISTANCE_DECREMENT;
                if distance <= 0.0 {
                    return Err(EngineError::GasRelaxation {
                        species: species.to_string(),
                        seed,
                        attempts,
                        source: Box::new(err),
                    });
                }
                warn!(
                    species,
                    seed,
                    attempts,
                    next_distance = distance,
                    error = %err,
                    "Gas relaxation failed, retrying with a smaller cell."
                );
            }
        }
    }
}

impl GasCache {
    /// Returns the cached energy of `species` for `seed`, relaxing and caching it on a miss.
    pub fn get_or_compute(
        &mut self,
        species: &str,
        seed: usize,
        geometry: &Structure,
        potential: &dyn Potential,
        settings: &GasSettings,
        rng: &mut StdRng,
    ) -> Result<f64, EngineError> {
        if let Some(energy) = self.get(species, seed) {
            return Ok(energy);
        }
        info!(species, seed, "Relaxing gas reference.");
        let energy = relax_gas(species, seed, geometry, potential, settings, rng)?;
        self.insert(species, seed, energy);
        Ok(energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::potential::testing::{ConstantPotential, FailingPotential};
    use nalgebra::Point3;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn co() -> Structure {
        Structure::new(
            vec!["C".into(), "O".into()],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.13)],
        )
        .unwrap()
    }

    fn settings(artifacts_dir: Option<PathBuf>) -> GasSettings {
        GasSettings {
            f_crit: 0.05,
            max_steps: 500,
            cell_distance: 10.0,
            optimizer: OptimizerKind::Lbfgs,
            artifacts_dir,
        }
    }

    #[test]
    fn cache_is_keyed_by_species_and_seed() {
        let mut cache = GasCache::new();
        cache.insert("COgas", 0, -1.0);
        cache.insert("COgas", 1, -1.1);
        cache.insert("H2gas", 0, -0.5);
        assert_eq!(cache.get("COgas", 1), Some(-1.1));
        assert_eq!(cache.get("COgas", 2), None);
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.keys().collect::<Vec<_>>(),
            vec![("COgas", 0), ("COgas", 1), ("H2gas", 0)]
        );
        assert_eq!(cache.remove("H2gas", 0), Some(-0.5));
        assert!(!cache.contains("H2gas", 0));
        assert_eq!(cache.keys().count(), 2);
    }

    #[test]
    fn cache_serializes_as_nested_sorted_document() {
        let mut cache = GasCache::new();
        cache.insert("O2gas", 1, -2.0);
        cache.insert("COgas", 0, -1.0);
        let json = serde_json::to_string(&cache).unwrap();
        assert_eq!(json, r#"{"COgas":{"0":-1.0},"O2gas":{"1":-2.0}}"#);
        let back: GasCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }

    #[test]
    fn anchor_is_one_of_the_heaviest_atoms() {
        let water = Structure::new(
            vec!["H".into(), "O".into(), "H".into()],
            vec![Point3::origin(); 3],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(pick_anchor(&water, &mut rng), Some(1));

        let h2 = Structure::new(vec!["H".into(), "H".into()], vec![Point3::origin(); 2]).unwrap();
        for _ in 0..10 {
            assert!(matches!(pick_anchor(&h2, &mut rng), Some(0 | 1)));
        }
        let empty = Structure::new(vec![], vec![]).unwrap();
        assert_eq!(pick_anchor(&empty, &mut rng), None);
    }

    #[test]
    fn miss_relaxes_and_hit_reuses() {
        let mut cache = GasCache::new();
        let mut rng = StdRng::seed_from_u64(42);
        let potential = ConstantPotential::new(0.5);
        let energy = cache
            .get_or_compute("COgas", 0, &co(), &potential, &settings(None), &mut rng)
            .unwrap();
        assert_eq!(energy, -1.5);
        assert_eq!(cache.get("COgas", 0), Some(-1.5));

        let other = ConstantPotential::new(3.0);
        let cached = cache
            .get_or_compute("COgas", 0, &co(), &other, &settings(None), &mut rng)
            .unwrap();
        assert_eq!(cached, -1.5);
    }

    #[test]
    fn failing_gas_retries_until_cell_vanishes() {
        let mut cache = GasCache::new();
        let mut rng = StdRng::seed_from_u64(42);
        let potential = FailingPotential::new("O");
        let result = cache.get_or_compute("COgas", 3, &co(), &potential, &settings(None), &mut rng);
        match result {
            Err(EngineError::GasRelaxation {
                species,
                seed,
                attempts,
                ..
            }) => {
                assert_eq!(species, "COgas");
                assert_eq!(seed, 3);
                assert_eq!(attempts, 20);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(potential.calls(), 20);
        assert!(cache.is_empty());
    }

    #[test]
    fn artifacts_land_under_gas_directory() {
        let dir = tempdir().unwrap();
        let gases = dir.path().join("gases");
        let mut rng = StdRng::seed_from_u64(1);
        relax_gas(
            "COgas",
            0,
            &co(),
            &ConstantPotential::new(0.0),
            &settings(Some(gases.clone())),
            &mut rng,
        )
        .unwrap();
        assert!(gases.join("structures").join("COgas_0_initial.extxyz").exists());
        assert!(gases.join("structures").join("COgas_0_relaxed.extxyz").exists());
        assert!(gases.join("log").join("COgas_0.txt").exists());
        assert!(gases.join("traj").join("COgas_0.extxyz").exists());

        let (relaxed, _) =
            ExtXyzFile::read_from_path(gases.join("structures").join("COgas_0_relaxed.extxyz"))
                .unwrap();
        assert_eq!(relaxed.cell()[0].x, 10.0);
    }
}
