use super::{Evaluation, Potential, PotentialError};
use crate::core::models::structure::Structure;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const MIN_DISTANCE: f64 = 1e-6;
const DEFAULT_CUTOFF: f64 = 8.0;

#[inline]
pub fn lennard_jones_12_6(dist: f64, r_min: f64, well_depth: f64) -> f64 {
    if dist < MIN_DISTANCE {
        return 1e10;
    }
    let rho = r_min / dist;
    let rho6 = rho.powi(6);
    let rho12 = rho6 * rho6;
    well_depth * (rho12 - 2.0 * rho6)
}

/// Radial derivative `dE/dr` of [`lennard_jones_12_6`].
#[inline]
pub fn lennard_jones_12_6_derivative(dist: f64, r_min: f64, well_depth: f64) -> f64 {
    if dist < MIN_DISTANCE {
        return 0.0;
    }
    let rho = r_min / dist;
    let rho6 = rho.powi(6);
    let rho12 = rho6 * rho6;
    -12.0 * well_depth * (rho12 - rho6) / dist
}

#[inline]
pub fn buckingham_exp_6(dist: f64, r_min: f64, well_depth: f64, gamma: f64) -> f64 {
    if dist < MIN_DISTANCE {
        return 1e10;
    }
    let rho = dist / r_min;
    if rho < 0.1 {
        return 1e10;
    }

    let factor = gamma / (gamma - 6.0);
    well_depth * (6.0 / (gamma - 6.0) * (gamma * (1.0 - rho)).exp() - factor * rho.powi(-6))
}

/// Radial derivative `dE/dr` of [`buckingham_exp_6`].
#[inline]
pub fn buckingham_exp_6_derivative(dist: f64, r_min: f64, well_depth: f64, gamma: f64) -> f64 {
    let rho = dist / r_min;
    if dist < MIN_DISTANCE || rho < 0.1 {
        return 0.0;
    }
    let factor = 6.0 * gamma / (gamma - 6.0);
    well_depth / r_min * factor * (rho.powi(-7) - (gamma * (1.0 - rho)).exp())
}

/// Per-element van der Waals parameters. Entries with a `scale` are exp-6 parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum VdwParam {
    Buckingham {
        radius: f64,
        well_depth: f64,
        scale: f64,
    },
    LennardJones {
        radius: f64,
        well_depth: f64,
    },
}

impl VdwParam {
    pub fn radius(&self) -> f64 {
        match self {
            VdwParam::Buckingham { radius, .. } | VdwParam::LennardJones { radius, .. } => *radius,
        }
    }

    pub fn well_depth(&self) -> f64 {
        match self {
            VdwParam::Buckingham { well_depth, .. }
            | VdwParam::LennardJones { well_depth, .. } => *well_depth,
        }
    }

    fn scaled(&self, radius_factor: f64, depth_factor: f64) -> Self {
        match *self {
            VdwParam::Buckingham {
                radius,
                well_depth,
                scale,
            } => VdwParam::Buckingham {
                radius: radius * radius_factor,
                well_depth: well_depth * depth_factor,
                scale,
            },
            VdwParam::LennardJones { radius, well_depth } => VdwParam::LennardJones {
                radius: radius * radius_factor,
                well_depth: well_depth * depth_factor,
            },
        }
    }
}

fn default_cutoff() -> f64 {
    DEFAULT_CUTOFF
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GlobalParams {
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
        }
    }
}

/// Parameter set of a [`PairPotential`], typically loaded from a TOML file:
///
/// ```toml
/// [globals]
/// cutoff = 8.0
///
/// [vdw.Pt]
/// radius = 2.77
/// well_depth = 0.2
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct PairParameters {
    #[serde(default)]
    pub globals: GlobalParams,
    pub vdw: BTreeMap<String, VdwParam>,
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

impl PairParameters {
    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ParamLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    /// A copy with every radius and well depth scaled by an independent factor drawn
    /// uniformly from `[1 - amplitude, 1 + amplitude]`, deterministically from `seed`.
    pub fn perturbed(&self, seed: u64, amplitude: f64) -> Self {
        if amplitude <= 0.0 {
            return self.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let vdw = self
            .vdw
            .iter()
            .map(|(element, param)| {
                let radius_factor = 1.0 + rng.gen_range(-amplitude..=amplitude);
                let depth_factor = 1.0 + rng.gen_range(-amplitude..=amplitude);
                (element.clone(), param.scaled(radius_factor, depth_factor))
            })
            .collect();
        Self {
            globals: self.globals.clone(),
            vdw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PairTerm {
    LennardJones { r_min: f64, well_depth: f64 },
    Buckingham { r_min: f64, well_depth: f64, gamma: f64 },
}

impl PairTerm {
    /// Arithmetic-mean radius, geometric-mean well depth. Exp-6 only when both sides are exp-6.
    fn mix(a: &VdwParam, b: &VdwParam) -> Self {
        let r_min = 0.5 * (a.radius() + b.radius());
        let well_depth = (a.well_depth() * b.well_depth()).sqrt();
        match (a, b) {
            (VdwParam::Buckingham { scale: ga, .. }, VdwParam::Buckingham { scale: gb, .. }) => {
                PairTerm::Buckingham {
                    r_min,
                    well_depth,
                    gamma: 0.5 * (ga + gb),
                }
            }
            _ => PairTerm::LennardJones { r_min, well_depth },
        }
    }

    fn energy(&self, dist: f64) -> f64 {
        match *self {
            PairTerm::LennardJones { r_min, well_depth } => {
                lennard_jones_12_6(dist, r_min, well_depth)
            }
            PairTerm::Buckingham {
                r_min,
                well_depth,
                gamma,
            } => buckingham_exp_6(dist, r_min, well_depth, gamma),
        }
    }

    fn derivative(&self, dist: f64) -> f64 {
        match *self {
            PairTerm::LennardJones { r_min, well_depth } => {
                lennard_jones_12_6_derivative(dist, r_min, well_depth)
            }
            PairTerm::Buckingham {
                r_min,
                well_depth,
                gamma,
            } => buckingham_exp_6_derivative(dist, r_min, well_depth, gamma),
        }
    }
}

/// A truncated and shifted pair potential over all atom pairs, using the minimum-image
/// convention along periodic axes.
#[derive(Debug, Clone)]
pub struct PairPotential {
    name: String,
    params: PairParameters,
}

impl PairPotential {
    pub fn new(name: impl Into<String>, params: PairParameters) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn params(&self) -> &PairParameters {
        &self.params
    }

    /// Builds `count` calculators named `<name>_<i>`, each with parameters perturbed by a
    /// seed derived from `base_seed + i`. A zero amplitude yields identical members.
    pub fn ensemble(
        name: &str,
        params: &PairParameters,
        count: usize,
        base_seed: u64,
        amplitude: f64,
    ) -> Vec<Box<dyn Potential>> {
        (0..count)
            .map(|i| {
                let member = params.perturbed(base_seed.wrapping_add(i as u64), amplitude);
                Box::new(PairPotential::new(format!("{name}_{i}"), member)) as Box<dyn Potential>
            })
            .collect()
    }
}

impl Potential for PairPotential {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, structure: &Structure) -> Result<Evaluation, PotentialError> {
        let params: Vec<&VdwParam> = structure
            .symbols()
            .iter()
            .map(|symbol| {
                self.params
                    .vdw
                    .get(symbol)
                    .ok_or_else(|| PotentialError::UnknownElement(symbol.clone()))
            })
            .collect::<Result<_, _>>()?;

        let cutoff = self.params.globals.cutoff;
        let mic = structure.minimum_image();
        let positions = structure.positions();
        let mut energy = 0.0;
        let mut forces = vec![Vector3::zeros(); structure.len()];

        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let delta = mic.apply(positions[j] - positions[i]);
                let dist = delta.norm();
                if dist >= cutoff {
                    continue;
                }
                if dist < MIN_DISTANCE {
                    return Err(PotentialError::AtomOverlap {
                        first: i,
                        second: j,
                        distance: dist,
                    });
                }
                let term = PairTerm::mix(params[i], params[j]);
                energy += term.energy(dist) - term.energy(cutoff);
                // Force on j is -dE/dr along the i->j unit vector.
                let f = -term.derivative(dist) / dist * delta;
                forces[j] += f;
                forces[i] -= f;
            }
        }

        Ok(Evaluation { energy, forces })
    }
}
