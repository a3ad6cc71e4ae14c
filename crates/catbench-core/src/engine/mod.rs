//! # Engine Module
//!
//! The stateful layer of the benchmark: it relaxes structures, caches gas references,
//! combines energies, classifies anomalies and accumulates run totals.
//!
//! ## Overview
//!
//! A reaction is evaluated once per seed. Every seed relaxes the slab and adsorbate-slab
//! structures ([`relax`]), looks gas references up in the [`cache`], and combines the
//! energies stoichiometrically ([`combine`]). The seeds are then summarized and checked
//! against the anomaly heuristics ([`aggregate`], [`anomaly`]).
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Validated run parameters and their builder
//! - **Relaxation** ([`relax`]) - Bounded optimizer loop with constraints, logs and trajectories
//! - **Gas references** ([`cache`]) - Memoized gas energies, kept for the whole run
//! - **Evaluation** ([`combine`], [`aggregate`], [`anomaly`]) - Per-reaction numbers and flags
//! - **Run state** ([`context`], [`accumulator`], [`state`], [`report`], [`transaction`]) - Totals,
//!   documents and per-reaction rollback
//! - **Progress Monitoring** ([`progress`]) - Events for user interfaces
//! - **Error Handling** ([`error`]) - Engine-specific error types

pub mod accumulator;
pub mod aggregate;
pub mod anomaly;
pub mod cache;
pub mod combine;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod relax;
pub mod report;
pub mod state;
pub mod transaction;
