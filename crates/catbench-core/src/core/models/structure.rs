use super::elements;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("Number of symbols ({symbols}) does not match number of positions ({positions})")]
    LengthMismatch { symbols: usize, positions: usize },
    #[error("Unknown chemical symbol '{0}'")]
    UnknownSymbol(String),
    #[error("Structures have different atom counts ({left} vs {right})")]
    AtomCountMismatch { left: usize, right: usize },
    #[error("Atom index {index} is out of range for a structure with {len} atoms")]
    IndexOutOfRange { index: usize, len: usize },
}

/// An atomic structure: species, Cartesian positions, cell and periodicity.
///
/// The cell is stored as three lattice row vectors (Angstrom). A per-structure list of
/// fixed atom indices plays the role of a positional constraint during relaxation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStructure")]
pub struct Structure {
    symbols: Vec<String>,
    positions: Vec<Point3<f64>>,
    cell: [Vector3<f64>; 3],
    pbc: [bool; 3],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fixed: Vec<usize>,
}

#[derive(Deserialize)]
struct RawStructure {
    symbols: Vec<String>,
    positions: Vec<Point3<f64>>,
    #[serde(default = "zero_cell")]
    cell: [Vector3<f64>; 3],
    #[serde(default)]
    pbc: [bool; 3],
    #[serde(default)]
    fixed: Vec<usize>,
}

fn zero_cell() -> [Vector3<f64>; 3] {
    [Vector3::zeros(), Vector3::zeros(), Vector3::zeros()]
}

impl TryFrom<RawStructure> for Structure {
    type Error = StructureError;

    fn try_from(raw: RawStructure) -> Result<Self, Self::Error> {
        let mut structure = Structure::new(raw.symbols, raw.positions)?;
        structure.cell = raw.cell;
        structure.pbc = raw.pbc;
        structure.fix_atoms(&raw.fixed)?;
        Ok(structure)
    }
}

impl Structure {
    /// Creates a non-periodic structure with a zero cell and no constraints.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::LengthMismatch`] when the inputs differ in length and
    /// [`StructureError::UnknownSymbol`] for symbols outside the periodic table.
    pub fn new(symbols: Vec<String>, positions: Vec<Point3<f64>>) -> Result<Self, StructureError> {
        if symbols.len() != positions.len() {
            return Err(StructureError::LengthMismatch {
                symbols: symbols.len(),
                positions: positions.len(),
            });
        }
        if let Some(bad) = symbols.iter().find(|s| !elements::is_known_symbol(s)) {
            return Err(StructureError::UnknownSymbol(bad.clone()));
        }
        Ok(Self {
            symbols,
            positions,
            cell: zero_cell(),
            pbc: [false; 3],
            fixed: Vec::new(),
        })
    }

    pub fn with_cell(mut self, cell: [Vector3<f64>; 3], pbc: [bool; 3]) -> Self {
        self.cell = cell;
        self.pbc = pbc;
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.positions
    }

    pub fn cell(&self) -> &[Vector3<f64>; 3] {
        &self.cell
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn atomic_numbers(&self) -> Vec<u8> {
        // Symbols are validated on construction.
        self.symbols
            .iter()
            .map(|s| elements::atomic_number(s).unwrap_or(0))
            .collect()
    }

    pub fn fixed_indices(&self) -> &[usize] {
        &self.fixed
    }

    pub fn is_fixed(&self, index: usize) -> bool {
        self.fixed.binary_search(&index).is_ok()
    }

    /// Adds the given atoms to the fixed set. Duplicates are ignored.
    pub fn fix_atoms(&mut self, indices: &[usize]) -> Result<(), StructureError> {
        let len = self.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(StructureError::IndexOutOfRange { index, len });
        }
        self.fixed.extend_from_slice(indices);
        self.fixed.sort_unstable();
        self.fixed.dedup();
        Ok(())
    }

    /// Fixes every atom strictly below `height` along z. Returns the number of atoms fixed.
    pub fn fix_below(&mut self, height: f64) -> usize {
        let below: Vec<usize> = self
            .positions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.z < height)
            .map(|(i, _)| i)
            .collect();
        let count = below.len();
        self.fixed.extend(below);
        self.fixed.sort_unstable();
        self.fixed.dedup();
        count
    }

    pub fn clear_constraints(&mut self) {
        self.fixed.clear();
    }

    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.positions.iter().map(|p| p.z).fold(None, |acc, z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        })
    }

    pub fn set_cubic_cell(&mut self, edge: f64) {
        self.cell = [
            Vector3::new(edge, 0.0, 0.0),
            Vector3::new(0.0, edge, 0.0),
            Vector3::new(0.0, 0.0, edge),
        ];
    }

    /// Lattice vectors as matrix columns, so that `cartesian = lattice * fractional`.
    pub fn lattice(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&self.cell)
    }

    /// Translates the atoms so that the center of their bounding box sits at the center
    /// of the cell. With a singular cell the bounding box is centered on the origin.
    pub fn center(&mut self) {
        if self.positions.is_empty() {
            return;
        }
        let lattice = self.lattice();
        match lattice.try_inverse() {
            Some(inverse) => {
                let fractional: Vec<Vector3<f64>> =
                    self.positions.iter().map(|p| inverse * p.coords).collect();
                let (lo, hi) = bounding_box(&fractional);
                let shift = Vector3::repeat(0.5) - (lo + hi) / 2.0;
                for (position, frac) in self.positions.iter_mut().zip(fractional) {
                    position.coords = lattice * (frac + shift);
                }
            }
            None => {
                let coords: Vec<Vector3<f64>> = self.positions.iter().map(|p| p.coords).collect();
                let (lo, hi) = bounding_box(&coords);
                let shift = -(lo + hi) / 2.0;
                for position in &mut self.positions {
                    position.coords += shift;
                }
            }
        }
    }

    /// Maximum per-atom Euclidean distance between two geometries of the same structure.
    ///
    /// Periodic images are not unwrapped: an atom that crossed a cell boundary shows up as
    /// a large displacement.
    pub fn max_displacement(&self, other: &Structure) -> Result<f64, StructureError> {
        if self.len() != other.len() {
            return Err(StructureError::AtomCountMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(self
            .positions
            .iter()
            .zip(&other.positions)
            .map(|(a, b)| (b - a).norm())
            .fold(0.0, f64::max))
    }

    /// Chemical formula in Hill order (C, H, then alphabetical; alphabetical without C).
    pub fn chemical_formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for symbol in &self.symbols {
            *counts.entry(symbol.as_str()).or_default() += 1;
        }

        let mut formula = String::new();
        let mut push = |symbol: &str, count: usize| {
            formula.push_str(symbol);
            if count > 1 {
                formula.push_str(&count.to_string());
            }
        };

        if let Some(c) = counts.remove("C") {
            push("C", c);
            if let Some(h) = counts.remove("H") {
                push("H", h);
            }
        }
        for (symbol, count) in counts {
            push(symbol, count);
        }
        formula
    }

    pub fn minimum_image(&self) -> MinimumImage {
        let lattice = self.lattice();
        MinimumImage {
            lattice,
            inverse: lattice.try_inverse(),
            pbc: self.pbc,
        }
    }
}

fn bounding_box(points: &[Vector3<f64>]) -> (Vector3<f64>, Vector3<f64>) {
    let mut lo = Vector3::repeat(f64::INFINITY);
    let mut hi = Vector3::repeat(f64::NEG_INFINITY);
    for p in points {
        lo = lo.inf(p);
        hi = hi.sup(p);
    }
    (lo, hi)
}

/// Precomputed minimum-image convention for one cell.
#[derive(Debug, Clone, Copy)]
pub struct MinimumImage {
    lattice: Matrix3<f64>,
    inverse: Option<Matrix3<f64>>,
    pbc: [bool; 3],
}

impl MinimumImage {
    /// Wraps a Cartesian separation vector to its nearest periodic image along the
    /// periodic axes. Non-periodic axes and singular cells leave the vector unchanged.
    pub fn apply(&self, delta: Vector3<f64>) -> Vector3<f64> {
        let Some(inverse) = self.inverse else {
            return delta;
        };
        if !self.pbc.iter().any(|&p| p) {
            return delta;
        }
        let mut frac = inverse * delta;
        for axis in 0..3 {
            if self.pbc[axis] {
                frac[axis] -= frac[axis].round();
            }
        }
        self.lattice * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn co_molecule() -> Structure {
        Structure::new(
            vec!["C".into(), "O".into()],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.13)],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_mismatched_lengths() {
        let result = Structure::new(vec!["H".into()], vec![]);
        assert_eq!(
            result,
            Err(StructureError::LengthMismatch {
                symbols: 1,
                positions: 0
            })
        );
    }

    #[test]
    fn new_rejects_unknown_symbols() {
        let result = Structure::new(vec!["Qq".into()], vec![Point3::origin()]);
        assert_eq!(result, Err(StructureError::UnknownSymbol("Qq".into())));
    }

    #[test]
    fn deserialization_validates_lengths() {
        let json = r#"{"symbols": ["H", "H"], "positions": [[0.0, 0.0, 0.0]]}"#;
        let result: Result<Structure, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn deserialization_applies_defaults_and_constraints() {
        let json = r#"{"symbols": ["Pt", "Pt"], "positions": [[0,0,0],[0,0,2]], "fixed": [1, 1]}"#;
        let structure: Structure = serde_json::from_str(json).unwrap();
        assert_eq!(structure.pbc(), [false; 3]);
        assert_eq!(structure.fixed_indices(), &[1]);
    }

    #[test]
    fn max_displacement_returns_largest_atom_shift() {
        let a = co_molecule();
        let mut b = a.clone();
        b.positions_mut()[1].z += 0.5;
        b.positions_mut()[0].x += 0.1;
        assert!(f64_approx_equal(a.max_displacement(&b).unwrap(), 0.5));
    }

    #[test]
    fn max_displacement_rejects_different_atom_counts() {
        let a = co_molecule();
        let b = Structure::new(vec!["H".into()], vec![Point3::origin()]).unwrap();
        assert!(matches!(
            a.max_displacement(&b),
            Err(StructureError::AtomCountMismatch { left: 2, right: 1 })
        ));
    }

    #[test]
    fn fix_below_fixes_only_atoms_under_height() {
        let mut slab = Structure::new(
            vec!["Cu".into(), "Cu".into(), "Cu".into()],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 2.0),
                Point3::new(0.0, 0.0, 4.0),
            ],
        )
        .unwrap();
        assert_eq!(slab.fix_below(2.0), 1);
        assert!(slab.is_fixed(0));
        assert!(!slab.is_fixed(1));
        slab.clear_constraints();
        assert!(slab.fixed_indices().is_empty());
    }

    #[test]
    fn fix_atoms_rejects_out_of_range_index() {
        let mut molecule = co_molecule();
        assert_eq!(
            molecule.fix_atoms(&[2]),
            Err(StructureError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn chemical_formula_uses_hill_order() {
        let methanol = Structure::new(
            vec!["O".into(), "H".into(), "C".into(), "H".into(), "H".into(), "H".into()],
            vec![Point3::origin(); 6],
        )
        .unwrap();
        assert_eq!(methanol.chemical_formula(), "CH4O");

        let water = Structure::new(
            vec!["O".into(), "H".into(), "H".into()],
            vec![Point3::origin(); 3],
        )
        .unwrap();
        assert_eq!(water.chemical_formula(), "H2O");
    }

    #[test]
    fn center_places_bounding_box_in_middle_of_cubic_cell() {
        let mut molecule = co_molecule();
        molecule.set_cubic_cell(10.0);
        molecule.center();
        let positions = molecule.positions();
        assert!(f64_approx_equal(positions[0].x, 5.0));
        assert!(f64_approx_equal(positions[0].z, 5.0 - 0.565));
        assert!(f64_approx_equal(positions[1].z, 5.0 + 0.565));
    }

    #[test]
    fn minimum_image_wraps_only_periodic_axes() {
        let mut molecule = co_molecule();
        molecule.set_cubic_cell(10.0);
        let molecule = molecule.clone().with_cell(*molecule.cell(), [true, true, false]);
        let mic = molecule.minimum_image();
        let wrapped = mic.apply(Vector3::new(9.0, -6.0, 9.0));
        assert!(f64_approx_equal(wrapped.x, -1.0));
        assert!(f64_approx_equal(wrapped.y, 4.0));
        assert!(f64_approx_equal(wrapped.z, 9.0));
    }

    #[test]
    fn z_range_of_empty_structure_is_none() {
        let empty = Structure::new(vec![], vec![]).unwrap();
        assert!(empty.z_range().is_none());
        assert_eq!(co_molecule().z_range(), Some((0.0, 1.13)));
    }
}
