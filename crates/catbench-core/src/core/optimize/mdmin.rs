use super::{DEFAULT_MAX_STEP, Optimizer, flatten_vectors, limit_atom_step, unflatten};
use nalgebra::{DVector, Point3, Vector3};

/// Molecular-dynamics minimizer: velocity-Verlet steps whose velocity is projected onto
/// the force direction and zeroed whenever it points uphill.
#[derive(Debug, Clone)]
pub struct MdMin {
    dt: f64,
    max_step: f64,
    state: Option<(DVector<f64>, DVector<f64>)>,
}

impl MdMin {
    pub fn new() -> Self {
        Self {
            dt: 0.2,
            max_step: DEFAULT_MAX_STEP,
            state: None,
        }
    }
}

impl Default for MdMin {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for MdMin {
    fn name(&self) -> &'static str {
        "MDMin"
    }

    fn step(
        &mut self,
        _positions: &[Point3<f64>],
        forces: &[Vector3<f64>],
        _energy: f64,
    ) -> Vec<Vector3<f64>> {
        let f = flatten_vectors(forces);
        let v = match self.state.take() {
            None => DVector::zeros(f.len()),
            Some((mut v, f0)) => {
                v += 0.5 * self.dt * (&f + f0);
                let vf = v.dot(&f);
                let ff = f.dot(&f);
                if vf < 0.0 || ff == 0.0 {
                    DVector::zeros(f.len())
                } else {
                    &f * (vf / ff)
                }
            }
        };

        let mut dr = self.dt * &v + 0.5 * self.dt * self.dt * &f;
        limit_atom_step(&mut dr, self.max_step);
        self.state = Some((v, f));
        unflatten(&dr)
    }
}
