//! # Core Module
//!
//! Stateless building blocks of the benchmark: structure and reaction models, the
//! potential seam, local geometry optimizers and file I/O.
//!
//! - **Models** ([`models`]) - Structures, reactions and datasets
//! - **Potentials** ([`potential`]) - The energy/force evaluation trait and reference pair potentials
//! - **Optimizers** ([`optimize`]) - LBFGS, BFGS, FIRE and MDMin
//! - **File I/O** ([`io`]) - Extended XYZ structures and trajectories, JSON result snapshots

pub mod io;
pub mod models;
pub mod optimize;
pub mod potential;
