//! # Potential Module
//!
//! The energy/force evaluation seam of the benchmark. Anything able to return a total
//! energy and per-atom forces for a [`Structure`] can be benchmarked by implementing
//! [`Potential`]; the pipeline never looks inside.
//!
//! - [`pair`] - Lennard-Jones 12-6 and Buckingham exp-6 pair potentials with analytic
//!   forces, used as reference calculators and for driving the pipeline end-to-end.

pub mod pair;

use crate::core::models::structure::Structure;
use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PotentialError {
    #[error("No parameters for element '{0}'")]
    UnknownElement(String),
    #[error("Atoms {first} and {second} overlap (distance {distance:.2e} A)")]
    AtomOverlap {
        first: usize,
        second: usize,
        distance: f64,
    },
    #[error("Calculator '{calculator}' failed: {message}")]
    Evaluation { calculator: String, message: String },
}

/// Energy (eV) and per-atom forces (eV/A) of one structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub energy: f64,
    pub forces: Vec<Vector3<f64>>,
}

impl Evaluation {
    pub fn is_finite(&self) -> bool {
        self.energy.is_finite() && self.forces.iter().all(|f| f.iter().all(|x| x.is_finite()))
    }
}

/// An interatomic potential: maps a structure to its energy and forces.
pub trait Potential: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`PotentialError`] when the structure cannot be evaluated.
    fn evaluate(&self, structure: &Structure) -> Result<Evaluation, PotentialError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// `-1 eV` per atom plus a constant shift, zero forces.
    pub(crate) struct ConstantPotential {
        pub(crate) name: String,
        pub(crate) shift: f64,
    }

    impl ConstantPotential {
        pub(crate) fn new(shift: f64) -> Self {
            Self {
                name: format!("constant{shift}"),
                shift,
            }
        }
    }

    impl Potential for ConstantPotential {
        fn name(&self) -> &str {
            &self.name
        }

        fn evaluate(&self, structure: &Structure) -> Result<Evaluation, PotentialError> {
            Ok(Evaluation {
                energy: -(structure.len() as f64) + self.shift,
                forces: vec![Vector3::zeros(); structure.len()],
            })
        }
    }

    /// Constant force on every atom; never converges.
    pub(crate) struct PushPotential {
        pub(crate) force: Vector3<f64>,
    }

    impl Potential for PushPotential {
        fn name(&self) -> &str {
            "push"
        }

        fn evaluate(&self, structure: &Structure) -> Result<Evaluation, PotentialError> {
            let energy = -structure
                .positions()
                .iter()
                .map(|p| p.coords.dot(&self.force))
                .sum::<f64>();
            Ok(Evaluation {
                energy,
                forces: vec![self.force; structure.len()],
            })
        }
    }

    /// Fails for every structure containing the given element and counts its calls.
    pub(crate) struct FailingPotential {
        pub(crate) element: String,
        pub(crate) calls: Mutex<usize>,
    }

    impl FailingPotential {
        pub(crate) fn new(element: &str) -> Self {
            Self {
                element: element.to_string(),
                calls: Mutex::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.lock().map(|c| *c).unwrap_or(0)
        }
    }

    impl Potential for FailingPotential {
        fn name(&self) -> &str {
            "failing"
        }

        fn evaluate(&self, structure: &Structure) -> Result<Evaluation, PotentialError> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            if structure.symbols().iter().any(|s| *s == self.element) {
                return Err(PotentialError::Evaluation {
                    calculator: "failing".into(),
                    message: format!("cannot handle {}", self.element),
                });
            }
            Ok(Evaluation {
                energy: -(structure.len() as f64),
                forces: vec![Vector3::zeros(); structure.len()],
            })
        }
    }

    /// Produces a NaN energy.
    pub(crate) struct NanPotential;

    impl Potential for NanPotential {
        fn name(&self) -> &str {
            "nan"
        }

        fn evaluate(&self, structure: &Structure) -> Result<Evaluation, PotentialError> {
            Ok(Evaluation {
                energy: f64::NAN,
                forces: vec![Vector3::zeros(); structure.len()],
            })
        }
    }
}
