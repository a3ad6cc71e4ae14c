//! # Core Models Module
//!
//! Data structures describing what gets benchmarked: atomic structures, the reactions
//! they take part in, and datasets of reactions.
//!
//! ## Key Components
//!
//! - [`elements`] - Periodic table lookups (symbol to atomic number)
//! - [`structure`] - Atomic structure with cell, periodicity and fixed-atom constraints
//! - [`reaction`] - Adsorption reaction records, structure roles and closure validation
//! - [`dataset`] - Ordered reaction collections, loading, assembly and key disambiguation

pub mod dataset;
pub mod elements;
pub mod reaction;
pub mod structure;
