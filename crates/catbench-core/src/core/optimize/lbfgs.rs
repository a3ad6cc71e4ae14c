use super::{DEFAULT_MAX_STEP, Optimizer, flatten_points, flatten_vectors, limit_atom_step, unflatten};
use nalgebra::{DVector, Point3, Vector3};
use std::collections::VecDeque;

const MEMORY: usize = 100;
const ALPHA: f64 = 70.0;

/// Limited-memory BFGS.
///
/// The inverse Hessian is represented by the last [`MEMORY`] position/force differences
/// on top of an initial guess `1 / alpha`; steps are capped per atom and then scaled by
/// `damping`.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    damping: f64,
    max_step: f64,
    s: VecDeque<DVector<f64>>,
    y: VecDeque<DVector<f64>>,
    rho: VecDeque<f64>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Lbfgs {
    pub fn new(damping: f64) -> Self {
        Self {
            damping,
            max_step: DEFAULT_MAX_STEP,
            s: VecDeque::with_capacity(MEMORY),
            y: VecDeque::with_capacity(MEMORY),
            rho: VecDeque::with_capacity(MEMORY),
            previous: None,
        }
    }

    fn update(&mut self, r: &DVector<f64>, f: &DVector<f64>) {
        let Some((r0, f0)) = self.previous.take() else {
            return;
        };
        let s0 = r - r0;
        let y0 = f0 - f;
        let curvature = y0.dot(&s0);
        if curvature.abs() < 1e-12 {
            return;
        }
        if self.s.len() == MEMORY {
            self.s.pop_front();
            self.y.pop_front();
            self.rho.pop_front();
        }
        self.s.push_back(s0);
        self.y.push_back(y0);
        self.rho.push_back(1.0 / curvature);
    }
}

impl Optimizer for Lbfgs {
    fn name(&self) -> &'static str {
        "LBFGS"
    }

    fn step(
        &mut self,
        positions: &[Point3<f64>],
        forces: &[Vector3<f64>],
        _energy: f64,
    ) -> Vec<Vector3<f64>> {
        let r = flatten_points(positions);
        let f = flatten_vectors(forces);
        self.update(&r, &f);

        let mut q = -&f;
        let mut a = vec![0.0; self.s.len()];
        for i in (0..self.s.len()).rev() {
            a[i] = self.rho[i] * self.s[i].dot(&q);
            q -= a[i] * &self.y[i];
        }
        let mut z = q / ALPHA;
        for i in 0..self.s.len() {
            let b = self.rho[i] * self.y[i].dot(&z);
            z += (a[i] - b) * &self.s[i];
        }

        let mut dr = -z;
        limit_atom_step(&mut dr, self.max_step);
        dr *= self.damping;

        self.previous = Some((r, f));
        unflatten(&dr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_follows_forces_scaled_by_inverse_alpha() {
        let mut optimizer = Lbfgs::new(1.0);
        let positions = vec![Point3::origin()];
        let forces = vec![Vector3::new(0.7, 0.0, 0.0)];
        let dr = optimizer.step(&positions, &forces, 0.0);
        assert!((dr[0].x - 0.01).abs() < 1e-12);
    }

    #[test]
    fn damping_scales_the_step() {
        let mut damped = Lbfgs::new(0.5);
        let positions = vec![Point3::origin()];
        let forces = vec![Vector3::new(0.0, 70.0, 0.0)];
        let dr = damped.step(&positions, &forces, 0.0);
        // Capped at the max step, then damped.
        assert!((dr[0].y - 0.1).abs() < 1e-12);
    }

    #[test]
    fn history_is_bounded_by_memory() {
        let mut optimizer = Lbfgs::new(1.0);
        let mut x = 1.0;
        for _ in 0..(MEMORY + 20) {
            let positions = vec![Point3::new(x, 0.0, 0.0)];
            let forces = vec![Vector3::new(-2.0 * x, 0.0, 0.0)];
            let dr = optimizer.step(&positions, &forces, x * x);
            x += dr[0].x;
            if x.abs() < 1e-9 {
                x = 1.0;
            }
        }
        assert!(optimizer.s.len() <= MEMORY);
    }
}
