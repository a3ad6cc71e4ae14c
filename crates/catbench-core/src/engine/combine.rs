use super::error::EngineError;
use indexmap::IndexMap;

/// Stoichiometric sum `sum(energy_i * coefficient_i)` over every role of a reaction.
///
/// # Errors
///
/// Returns [`EngineError::Internal`] when a role has a coefficient but no computed energy.
pub fn combine(
    energies: &IndexMap<String, f64>,
    coefficients: &IndexMap<String, f64>,
) -> Result<f64, EngineError> {
    coefficients.iter().try_fold(0.0, |sum, (role, coefficient)| {
        let energy = energies.get(role).ok_or_else(|| {
            EngineError::Internal(format!("No energy computed for structure '{role}'"))
        })?;
        Ok(sum + energy * coefficient)
    })
}
