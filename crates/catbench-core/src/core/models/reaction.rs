use super::structure::Structure;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role name of the bare slab in every reaction.
pub const SLAB_ROLE: &str = "star";
/// Marker carried by every role name that denotes a gas-phase reference molecule.
pub const GAS_MARKER: &str = "gas";
/// Tolerance of the stoichiometric closure check, in energy units.
pub const CLOSURE_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReactionError {
    #[error("Reaction has no bare slab structure ('{SLAB_ROLE}')")]
    MissingSlab,
    #[error("Reaction has no adsorbate-slab structure")]
    MissingAdsorbateSlab,
    #[error("Expected exactly 2 'star' roles, found {0}")]
    StarCount(usize),
    #[error(
        "Stoichiometric closure failed: combined reference energy {combined:.6} differs from reaction energy {expected:.6}"
    )]
    ClosureFailed { combined: f64, expected: f64 },
}

/// Classification of a structure inside a reaction, derived from its role name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureRole {
    /// The bare catalyst surface (`"star"`).
    Slab,
    /// The slab with the adsorbate attached (`"<adsorbate>star"`).
    AdsorbateSlab,
    /// A gas-phase reference molecule (role name contains `"gas"`).
    Gas,
}

impl StructureRole {
    pub fn classify(role_name: &str) -> Self {
        if role_name == SLAB_ROLE {
            StructureRole::Slab
        } else if role_name.contains(GAS_MARKER) {
            StructureRole::Gas
        } else {
            StructureRole::AdsorbateSlab
        }
    }
}

/// One physical structure participating in a reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    /// Signed stoichiometric coefficient (negative for reactants).
    pub coefficient: f64,
    /// DFT single-point energy of this structure.
    pub reference_energy: f64,
    pub geometry: Structure,
}

/// One adsorption reaction: its structures by role plus the DFT adsorption energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub reference_energy: f64,
    pub structures: IndexMap<String, StructureEntry>,
}

impl ReactionRecord {
    pub fn slab(&self) -> Option<&StructureEntry> {
        self.structures.get(SLAB_ROLE)
    }

    /// The first role classified as [`StructureRole::AdsorbateSlab`].
    pub fn adsorbate_slab(&self) -> Option<(&str, &StructureEntry)> {
        self.structures
            .iter()
            .find(|(role, _)| StructureRole::classify(role) == StructureRole::AdsorbateSlab)
            .map(|(role, entry)| (role.as_str(), entry))
    }

    /// The adsorbate name, i.e. the adsorbate-slab role without its `"star"` suffix.
    pub fn adsorbate(&self) -> Option<&str> {
        self.adsorbate_slab()
            .map(|(role, _)| role.strip_suffix(SLAB_ROLE).unwrap_or(role))
    }

    pub fn gas_entries(&self) -> impl Iterator<Item = (&str, &StructureEntry)> {
        self.structures
            .iter()
            .filter(|(role, _)| StructureRole::classify(role) == StructureRole::Gas)
            .map(|(role, entry)| (role.as_str(), entry))
    }

    /// `sum(coefficient_i * reference_energy_i)` over all structures.
    pub fn combined_reference_energy(&self) -> f64 {
        self.structures
            .values()
            .map(|entry| entry.coefficient * entry.reference_energy)
            .sum()
    }

    /// Checks the structural and energetic invariants every benchmarked reaction obeys.
    pub fn validate(&self) -> Result<(), ReactionError> {
        let star_count = self
            .structures
            .keys()
            .filter(|role| role.contains(SLAB_ROLE))
            .count();
        if star_count != 2 {
            return Err(ReactionError::StarCount(star_count));
        }
        if self.slab().is_none() {
            return Err(ReactionError::MissingSlab);
        }
        if self.adsorbate_slab().is_none() {
            return Err(ReactionError::MissingAdsorbateSlab);
        }

        let combined = self.combined_reference_energy();
        if (combined - self.reference_energy).abs() > CLOSURE_TOLERANCE {
            return Err(ReactionError::ClosureFailed {
                combined,
                expected: self.reference_energy,
            });
        }
        Ok(())
    }

    /// Renames the adsorbate-slab role according to `mapping` (adsorbate -> new name),
    /// keeping its position in the role order.
    pub fn integrate_adsorbate(&mut self, mapping: &IndexMap<String, String>) -> bool {
        let Some(adsorbate) = self.adsorbate().map(str::to_owned) else {
            return false;
        };
        let Some(replacement) = mapping.get(&adsorbate) else {
            return false;
        };
        let old_role = format!("{adsorbate}{SLAB_ROLE}");
        let new_role = format!("{replacement}{SLAB_ROLE}");
        let Some(index) = self.structures.get_index_of(&old_role) else {
            return false;
        };
        if let Some((_, entry)) = self.structures.shift_remove_index(index) {
            self.structures.shift_insert(index, new_role, entry);
        }
        true
    }
}
