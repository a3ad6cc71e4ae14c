//! # CatBench Core Library
//!
//! Benchmarking of machine-learning interatomic potentials (MLIPs) against DFT adsorption
//! energies on catalytic surfaces.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`, `ReactionRecord`,
//!   `Dataset`), the `Potential` calculator seam, the geometry optimizers and structure/JSON I/O.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer that relaxes structures under
//!   constraints, memoizes gas references, combines energies, classifies anomalies and rolls a
//!   failed reaction back out of the run state.
//!
//! - **[`workflows`]: The Public API.** Complete procedures (relaxation benchmark, single-point
//!   benchmark, analysis) that tie `engine` and `core` together.

pub mod core;
pub mod engine;
pub mod workflows;
