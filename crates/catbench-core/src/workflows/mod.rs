//! # Workflows Module
//!
//! High-level entry points that run a complete benchmark procedure on top of the
//! [`engine`](crate::engine) and [`core`](crate::core) layers.
//!
//! ## Overview
//!
//! Each workflow loads its inputs, reports progress through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter), and returns a result
//! holding both the in-memory documents and the paths they were persisted to.
//!
//! ## Architecture
//!
//! - **Relaxation Benchmark** ([`benchmark`]) - Multi-seed relaxations, anomaly detection and
//!   incremental persistence of the result, anomaly and gas documents
//! - **Single-Point Benchmark** ([`single_point`]) - One energy evaluation per structure
//! - **Analysis** ([`analysis`]) - MAE, anomaly ratios and per-adsorbate tables over finished runs

pub mod analysis;
pub mod benchmark;
pub mod single_point;
