use super::{DEFAULT_MAX_STEP, Optimizer, flatten_points, flatten_vectors, limit_atom_step, unflatten};
use nalgebra::{DMatrix, DVector, Point3, Vector3};

const ALPHA: f64 = 70.0;

/// Dense BFGS on the Hessian. The step solves `H dr = f` through an eigen-decomposition,
/// using absolute eigenvalues so that negative curvature still yields a descent step.
#[derive(Debug, Clone)]
pub struct Bfgs {
    max_step: f64,
    hessian: Option<DMatrix<f64>>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Bfgs {
    pub fn new() -> Self {
        Self {
            max_step: DEFAULT_MAX_STEP,
            hessian: None,
            previous: None,
        }
    }

    fn update(&mut self, r: &DVector<f64>, f: &DVector<f64>) {
        if self.hessian.is_none() {
            self.hessian = Some(DMatrix::identity(r.len(), r.len()) * ALPHA);
            return;
        }
        let (Some(hessian), Some((r0, f0))) = (self.hessian.as_mut(), self.previous.as_ref()) else {
            return;
        };
        let dr = r - r0;
        if dr.amax() < 1e-7 {
            return;
        }
        let df = f - f0;
        let a = dr.dot(&df);
        let dg = &*hessian * &dr;
        let b = dr.dot(&dg);
        if a.abs() < 1e-12 || b.abs() < 1e-12 {
            return;
        }
        *hessian -= &df * df.transpose() / a + &dg * dg.transpose() / b;
    }
}

impl Default for Bfgs {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for Bfgs {
    fn name(&self) -> &'static str {
        "BFGS"
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

        let mut dr = match &self.hessian {
            Some(hessian) => {
                let eigen = hessian.clone().symmetric_eigen();
                let projected = eigen.eigenvectors.transpose() * &f;
                let scaled = projected.zip_map(&eigen.eigenvalues, |p, w| {
                    if w.abs() > 1e-12 { p / w.abs() } else { 0.0 }
                });
                &eigen.eigenvectors * scaled
            }
            None => &f / ALPHA,
        };
        limit_atom_step(&mut dr, self.max_step);

        self.previous = Some((r, f));
        unflatten(&dr)
    }
}
