use super::{DEFAULT_MAX_STEP, Optimizer, flatten_vectors, unflatten};
use nalgebra::{DVector, Point3, Vector3};

/// Fast inertial relaxation engine.
///
/// Mixes the velocity towards the force direction while the power `F.v` stays positive,
/// growing the time step after `n_min` such steps; any uphill step resets the velocity.
#[derive(Debug, Clone)]
pub struct Fire {
    dt: f64,
    dt_max: f64,
    max_step: f64,
    n_min: usize,
    f_inc: f64,
    f_dec: f64,
    a_start: f64,
    f_a: f64,
    a: f64,
    n_steps: usize,
    velocity: Option<DVector<f64>>,
}

impl Fire {
    pub fn new() -> Self {
        Self {
            dt: 0.1,
            dt_max: 1.0,
            max_step: DEFAULT_MAX_STEP,
            n_min: 5,
            f_inc: 1.1,
            f_dec: 0.5,
            a_start: 0.1,
            f_a: 0.99,
            a: 0.1,
            n_steps: 0,
            velocity: None,
        }
    }
}

impl Default for Fire {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for Fire {
    fn name(&self) -> &'static str {
        "FIRE"
    }

    fn step(
        &mut self,
        _positions: &[Point3<f64>],
        forces: &[Vector3<f64>],
        _energy: f64,
    ) -> Vec<Vector3<f64>> {
        let f = flatten_vectors(forces);
        let mut v = match self.velocity.take() {
            None => DVector::zeros(f.len()),
            Some(mut v) => {
                let power = f.dot(&v);
                if power > 0.0 {
                    let f_norm = f.norm();
                    if f_norm > 0.0 {
                        let v_norm = v.norm();
                        v = (1.0 - self.a) * v + self.a * v_norm / f_norm * &f;
                    }
                    if self.n_steps > self.n_min {
                        self.dt = (self.dt * self.f_inc).min(self.dt_max);
                        self.a *= self.f_a;
                    }
                    self.n_steps += 1;
                } else {
                    v.fill(0.0);
                    self.a = self.a_start;
                    self.dt *= self.f_dec;
                    self.n_steps = 0;
                }
                v
            }
        };

        v += self.dt * &f;
        let mut dr = self.dt * &v;
        let norm = dr.norm();
        if norm > self.max_step {
            dr *= self.max_step / norm;
        }
        self.velocity = Some(v);
        unflatten(&dr)
    }
}
