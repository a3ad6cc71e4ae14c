use super::reaction::{ReactionError, ReactionRecord, SLAB_ROLE, StructureEntry};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("JSON parsing error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("Reaction '{key}' is invalid: {source}")]
    InvalidReaction { key: String, source: ReactionError },
    #[error("Dataset '{0}' contains no reactions")]
    Empty(String),
}

/// An ordered collection of adsorption reactions, keyed by a unique reaction key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub reactions: IndexMap<String, ReactionRecord>,
}

impl Dataset {
    /// Loads a dataset document.
    ///
    /// Reactions are not validated here; the workflows check each one with
    /// [`validate_reaction`] and skip those that fail.
    ///
    /// # Errors
    ///
    /// Fails on I/O or JSON errors and on an empty reaction mapping.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|e| DatasetError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let dataset: Dataset = serde_json::from_str(&content).map_err(|e| DatasetError::Json {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        if dataset.reactions.is_empty() {
            return Err(DatasetError::Empty(path.to_string_lossy().to_string()));
        }
        info!(
            path = %path.display(),
            reactions = dataset.reactions.len(),
            "Loaded dataset."
        );
        Ok(dataset)
    }

    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let io_err = |e| DatasetError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| DatasetError::Json {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    /// Renames adsorbates across all reactions (e.g. merging site-specific labels into
    /// one adsorbate). Returns the number of reactions that were changed.
    pub fn integrate_adsorbates(&mut self, mapping: &IndexMap<String, String>) -> usize {
        if mapping.is_empty() {
            return 0;
        }
        self.reactions
            .values_mut()
            .map(|reaction| reaction.integrate_adsorbate(mapping))
            .filter(|&changed| changed)
            .count()
    }
}

/// Checks one reaction of a dataset, naming it by `key` in the error.
pub fn validate_reaction(key: &str, reaction: &ReactionRecord) -> Result<(), DatasetError> {
    reaction
        .validate()
        .map_err(|source| DatasetError::InvalidReaction {
            key: key.to_string(),
            source,
        })
}

/// Produces unique reaction keys: the first occurrence of a base key is kept as is,
/// later ones get a `_<n>` suffix where `n` counts the earlier occurrences.
#[derive(Debug, Default)]
pub struct ReactionKeyGenerator {
    seen: HashMap<String, usize>,
}

impl ReactionKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&mut self, base: &str) -> String {
        let count = self.seen.entry(base.to_string()).or_insert(0);
        let key = if *count == 0 {
            base.to_string()
        } else {
            format!("{base}_{count}")
        };
        *count += 1;
        key
    }
}

/// A reaction as exported by a reaction database, before key assignment and validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReaction {
    /// Reaction equation, e.g. `"CO(g) + * -> CO*"`.
    pub equation: String,
    pub reference_energy: f64,
    pub structures: IndexMap<String, StructureEntry>,
}

/// Why a raw reaction did not make it into the assembled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedReaction {
    pub index: usize,
    pub base_key: String,
    pub reason: ReactionError,
}

/// Builds a validated [`Dataset`] from raw reaction exports.
///
/// Keys are `<slab formula>_<equation>`, disambiguated with [`ReactionKeyGenerator`].
/// Reactions that fail closure with their signed coefficients are retried with every
/// product coefficient set to one before being rejected.
pub fn assemble_dataset(
    name: Option<String>,
    raw_reactions: Vec<RawReaction>,
    adsorbate_integration: &IndexMap<String, String>,
) -> (Dataset, Vec<RejectedReaction>) {
    let mut keys = ReactionKeyGenerator::new();
    let mut dataset = Dataset {
        name,
        reactions: IndexMap::new(),
    };
    let mut rejected = Vec::new();
    let total = raw_reactions.len();

    for (index, raw) in raw_reactions.into_iter().enumerate() {
        let formula = raw
            .structures
            .get(SLAB_ROLE)
            .map(|entry| entry.geometry.chemical_formula())
            .unwrap_or_default();
        let base_key = format!("{formula}_{}", raw.equation);

        let mut record = ReactionRecord {
            reference_energy: raw.reference_energy,
            structures: raw.structures,
        };

        let outcome = match record.validate() {
            Err(ReactionError::ClosureFailed { .. }) => {
                let fallback = with_unit_product_coefficients(&record);
                match fallback.validate() {
                    Ok(()) => {
                        debug!(key = %base_key, "Closure restored with unit product coefficients.");
                        record = fallback;
                        Ok(())
                    }
                    Err(_) => record.validate(),
                }
            }
            other => other,
        };

        if let Err(reason) = outcome {
            warn!(key = %base_key, error = %reason, "Rejecting reaction.");
            rejected.push(RejectedReaction {
                index,
                base_key,
                reason,
            });
            continue;
        }

        record.integrate_adsorbate(adsorbate_integration);
        let key = keys.next_key(&base_key);
        dataset.reactions.insert(key, record);
    }

    info!(
        accepted = dataset.reactions.len(),
        total, "Dataset construction complete."
    );
    (dataset, rejected)
}

fn with_unit_product_coefficients(record: &ReactionRecord) -> ReactionRecord {
    let mut fallback = record.clone();
    for entry in fallback.structures.values_mut() {
        if entry.coefficient > 0.0 {
            entry.coefficient = 1.0;
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::reaction::tests::{co_reaction, entry};
    use std::fs;
    use tempfile::tempdir;

    fn raw_from(record: ReactionRecord, equation: &str) -> RawReaction {
        RawReaction {
            equation: equation.to_string(),
            reference_energy: record.reference_energy,
            structures: record.structures,
        }
    }

    #[test]
    fn key_generator_suffixes_repeated_keys_with_earlier_count() {
        let mut keys = ReactionKeyGenerator::new();
        assert_eq!(keys.next_key("Pt2_CO"), "Pt2_CO");
        assert_eq!(keys.next_key("Pt2_CO"), "Pt2_CO_1");
        assert_eq!(keys.next_key("Pt2_H"), "Pt2_H");
        assert_eq!(keys.next_key("Pt2_CO"), "Pt2_CO_2");
    }

    #[test]
    fn save_then_load_preserves_reaction_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("set.json");
        let mut dataset = Dataset::default();
        dataset.reactions.insert("b".into(), co_reaction());
        dataset.reactions.insert("a".into(), co_reaction());
        dataset.save(&path).unwrap();

        let loaded = Dataset::load(&path).unwrap();
        let keys: Vec<_> = loaded.reactions.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let result = Dataset::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(DatasetError::Io { .. })));
    }

    #[test]
    fn load_fails_for_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Dataset::load(&path), Err(DatasetError::Json { .. })));
    }

    #[test]
    fn load_keeps_reaction_violating_closure_for_later_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("open.json");
        let mut reaction = co_reaction();
        reaction.reference_energy = 3.0;
        let mut dataset = Dataset::default();
        dataset.reactions.insert("good".into(), co_reaction());
        dataset.reactions.insert("broken".into(), reaction);
        dataset.save(&path).unwrap();

        let loaded = Dataset::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(validate_reaction("good", &loaded.reactions["good"]).is_ok());
        match validate_reaction("broken", &loaded.reactions["broken"]) {
            Err(DatasetError::InvalidReaction { key, .. }) => assert_eq!(key, "broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn load_rejects_empty_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, r#"{"reactions": {}}"#).unwrap();
        assert!(matches!(Dataset::load(&path), Err(DatasetError::Empty(_))));
    }

    #[test]
    fn assemble_dataset_builds_disambiguated_keys() {
        let raws = vec![
            raw_from(co_reaction(), "CO(g) + * -> CO*"),
            raw_from(co_reaction(), "CO(g) + * -> CO*"),
        ];
        let (dataset, rejected) = assemble_dataset(None, raws, &IndexMap::new());
        assert!(rejected.is_empty());
        let keys: Vec<_> = dataset.reactions.keys().cloned().collect();
        assert_eq!(keys, vec!["Pt2_CO(g) + * -> CO*", "Pt2_CO(g) + * -> CO*_1"]);
    }

    #[test]
    fn assemble_dataset_rejects_reactions_without_two_stars_and_reuses_suffix() {
        let mut single_star = co_reaction();
        single_star.structures.shift_remove("COstar");
        let raws = vec![
            raw_from(single_star, "X"),
            raw_from(co_reaction(), "X"),
        ];
        let (dataset, rejected) = assemble_dataset(None, raws, &IndexMap::new());
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, ReactionError::StarCount(1));
        assert!(dataset.reactions.contains_key("Pt2_X"));
    }

    #[test]
    fn assemble_dataset_falls_back_to_unit_product_coefficients() {
        let mut structures = IndexMap::new();
        structures.insert("star".to_string(), entry(-1.0, -10.0, &["Pt", "Pt"]));
        structures.insert("Hstar".to_string(), entry(2.0, -11.0, &["Pt", "Pt", "H"]));
        structures.insert("H2gas".to_string(), entry(-0.5, -2.0, &["H", "H"]));
        let raw = RawReaction {
            equation: "0.5H2(g) + * -> H*".into(),
            reference_energy: 0.0,
            structures,
        };
        let (dataset, rejected) = assemble_dataset(None, vec![raw], &IndexMap::new());
        assert!(rejected.is_empty());
        let record = &dataset.reactions["Pt2_0.5H2(g) + * -> H*"];
        assert_eq!(record.structures["Hstar"].coefficient, 1.0);
    }

    #[test]
    fn integrate_adsorbates_counts_changed_reactions() {
        let mut dataset = Dataset::default();
        dataset.reactions.insert("r1".into(), co_reaction());
        dataset.reactions.insert("r2".into(), co_reaction());
        let mut mapping = IndexMap::new();
        mapping.insert("CO".to_string(), "CObridge".to_string());
        assert_eq!(dataset.integrate_adsorbates(&mapping), 2);
        assert!(dataset.reactions["r1"].structures.contains_key("CObridgestar"));
    }
}
