use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::extxyz::ExtXyzError;
use crate::core::io::json::ResultsIoError;
use crate::core::models::dataset::DatasetError;
use crate::core::models::structure::StructureError;
use crate::core::potential::PotentialError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("At least one calculator is required")]
    NoCalculators,

    #[error("Calculator '{calculator}' failed: {source}")]
    Potential {
        calculator: String,
        source: PotentialError,
    },

    #[error("Calculator '{calculator}' returned non-finite energy or forces at step {step}")]
    NonFinite { calculator: String, step: usize },

    #[error("Invalid structure: {0}")]
    Structure(#[from] StructureError),

    #[error(
        "Gas relaxation of '{species}' (seed {seed}) failed after {attempts} attempts: {source}"
    )]
    GasRelaxation {
        species: String,
        seed: usize,
        attempts: usize,
        source: Box<EngineError>,
    },

    #[error("Failed to write structure file: {0}")]
    StructureFile(#[from] ExtXyzError),

    #[error("Failed to persist results: {0}")]
    Results(#[from] ResultsIoError),

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
