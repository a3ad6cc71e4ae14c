//! Provides input/output functionality for atomic structures and result documents.
//!
//! Structure formats implement the [`traits::StructureFile`] interface; the extended XYZ
//! format is used for structure snapshots and relaxation trajectories. Result documents
//! are JSON files replaced atomically after each update.

pub mod extxyz;
pub mod json;
pub mod traits;
