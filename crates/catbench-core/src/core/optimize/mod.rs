//! # Optimize Module
//!
//! Local geometry optimizers. Each optimizer turns the current positions and forces into
//! a displacement; the relaxation loop that calls them owns convergence checks, step
//! counting and constraints.
//!
//! - [`lbfgs`] - Limited-memory BFGS with a two-loop recursion (default)
//! - [`bfgs`] - Dense BFGS Hessian update with an eigen-decomposed step
//! - [`fire`] - Fast inertial relaxation engine
//! - [`mdmin`] - Velocity-quenched molecular dynamics

pub mod bfgs;
pub mod fire;
pub mod lbfgs;
pub mod mdmin;

use nalgebra::{DVector, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest displacement of any single atom in one step, in Angstrom.
pub const DEFAULT_MAX_STEP: f64 = 0.2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown optimizer '{0}' (expected one of LBFGS, BFGS, FIRE, MDMin)")]
pub struct UnknownOptimizer(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizerKind {
    #[default]
    Lbfgs,
    Bfgs,
    Fire,
    MdMin,
}

impl OptimizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Lbfgs => "LBFGS",
            OptimizerKind::Bfgs => "BFGS",
            OptimizerKind::Fire => "FIRE",
            OptimizerKind::MdMin => "MDMin",
        }
    }

    /// Instantiates a fresh optimizer of this kind. `damping` scales every LBFGS step and
    /// is ignored by the other optimizers.
    pub fn create(&self, damping: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Lbfgs => Box::new(lbfgs::Lbfgs::new(damping)),
            OptimizerKind::Bfgs => Box::new(bfgs::Bfgs::new()),
            OptimizerKind::Fire => Box::new(fire::Fire::new()),
            OptimizerKind::MdMin => Box::new(mdmin::MdMin::new()),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = UnknownOptimizer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lbfgs" => Ok(OptimizerKind::Lbfgs),
            "bfgs" => Ok(OptimizerKind::Bfgs),
            "fire" => Ok(OptimizerKind::Fire),
            "mdmin" => Ok(OptimizerKind::MdMin),
            _ => Err(UnknownOptimizer(s.to_string())),
        }
    }
}

impl TryFrom<String> for OptimizerKind {
    type Error = UnknownOptimizer;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OptimizerKind> for String {
    fn from(kind: OptimizerKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A stateful local optimizer.
pub trait Optimizer {
    fn name(&self) -> &'static str;

    /// Returns the per-atom displacement to apply, given the current geometry, the forces
    /// acting on it (already zeroed for fixed atoms) and its energy.
    fn step(
        &mut self,
        positions: &[Point3<f64>],
        forces: &[Vector3<f64>],
        energy: f64,
    ) -> Vec<Vector3<f64>>;
}

pub(crate) fn flatten_points(points: &[Point3<f64>]) -> DVector<f64> {
    DVector::from_iterator(
        points.len() * 3,
        points.iter().flat_map(|p| p.coords.iter().copied()),
    )
}

pub(crate) fn flatten_vectors(vectors: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(
        vectors.len() * 3,
        vectors.iter().flat_map(|v| v.iter().copied()),
    )
}

pub(crate) fn unflatten(flat: &DVector<f64>) -> Vec<Vector3<f64>> {
    flat.as_slice()
        .chunks_exact(3)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect()
}

/// Scales `dr` so that no atom moves further than `max_step`.
pub(crate) fn limit_atom_step(dr: &mut DVector<f64>, max_step: f64) {
    let longest = dr
        .as_slice()
        .chunks_exact(3)
        .map(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())
        .fold(0.0, f64::max);
    if longest >= max_step {
        *dr *= max_step / longest;
    }
}

/// Largest per-atom force norm.
pub fn max_force(forces: &[Vector3<f64>]) -> f64 {
    forces.iter().map(|f| f.norm()).fold(0.0, f64::max)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Anisotropic harmonic bowl centered on `minimum`, returning energy and forces.
    pub(crate) fn bowl(
        positions: &[Point3<f64>],
        minimum: &[Point3<f64>],
    ) -> (f64, Vec<Vector3<f64>>) {
        let stiffness = Vector3::new(1.0, 2.0, 3.0);
        let mut energy = 0.0;
        let mut forces = Vec::with_capacity(positions.len());
        for (p, m) in positions.iter().zip(minimum) {
            let d = p - m;
            energy += 0.5 * d.component_mul(&stiffness).dot(&d);
            forces.push(-d.component_mul(&stiffness));
        }
        (energy, forces)
    }

    pub(crate) fn run_to_convergence(kind: OptimizerKind, max_steps: usize) -> Option<usize> {
        let minimum = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)];
        let mut positions = vec![Point3::new(0.4, -0.3, 0.2), Point3::new(1.3, 0.8, 1.25)];
        let mut optimizer = kind.create(1.0);
        for step in 0..max_steps {
            let (energy, forces) = bowl(&positions, &minimum);
            if max_force(&forces) <= 0.05 {
                return Some(step);
            }
            let dr = optimizer.step(&positions, &forces, energy);
            for (p, d) in positions.iter_mut().zip(dr) {
                *p += d;
            }
        }
        None
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("lbfgs".parse::<OptimizerKind>(), Ok(OptimizerKind::Lbfgs));
        assert_eq!("FIRE".parse::<OptimizerKind>(), Ok(OptimizerKind::Fire));
        assert_eq!(" MDMin ".parse::<OptimizerKind>(), Ok(OptimizerKind::MdMin));
        assert_eq!(
            "gradient".parse::<OptimizerKind>(),
            Err(UnknownOptimizer("gradient".into()))
        );
    }

    #[test]
    fn display_and_serde_use_canonical_names() {
        assert_eq!(OptimizerKind::MdMin.to_string(), "MDMin");
        let json = serde_json::to_string(&OptimizerKind::Bfgs).unwrap();
        assert_eq!(json, "\"BFGS\"");
        let parsed: OptimizerKind = serde_json::from_str("\"lbfgs\"").unwrap();
        assert_eq!(parsed, OptimizerKind::Lbfgs);
        assert!(serde_json::from_str::<OptimizerKind>("\"newton\"").is_err());
    }

    #[test]
    fn limit_atom_step_caps_longest_atom_displacement() {
        let mut dr = DVector::from_vec(vec![0.0, 0.0, 0.4, 0.1, 0.0, 0.0]);
        limit_atom_step(&mut dr, 0.2);
        assert!((dr[2] - 0.2).abs() < 1e-12);
        assert!((dr[3] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn every_optimizer_relaxes_a_harmonic_bowl() {
        for kind in [
            OptimizerKind::Lbfgs,
            OptimizerKind::Bfgs,
            OptimizerKind::Fire,
            OptimizerKind::MdMin,
        ] {
            assert!(
                run_to_convergence(kind, 1000).is_some(),
                "{kind} did not converge"
            );
        }
    }

    #[test]
    fn quasi_newton_optimizers_beat_first_order_ones() {
        let lbfgs = run_to_convergence(OptimizerKind::Lbfgs, 1000).unwrap();
        let bfgs = run_to_convergence(OptimizerKind::Bfgs, 1000).unwrap();
        assert!(lbfgs < 100, "LBFGS took {lbfgs} steps");
        assert!(bfgs < 100, "BFGS took {bfgs} steps");
    }
}
