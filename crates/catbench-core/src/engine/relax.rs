use super::error::EngineError;
use crate::core::io::extxyz::{ExtXyzFile, FrameMetadata};
use crate::core::models::structure::Structure;
use crate::core::optimize::{OptimizerKind, max_force};
use crate::core::potential::{Evaluation, Potential};
use nalgebra::Vector3;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Stopping criteria of one relaxation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxCriteria {
    /// Converged once the largest per-atom force on free atoms drops below this value.
    pub f_crit: f64,
    pub max_steps: usize,
}

/// Optional side outputs of a relaxation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelaxOptions {
    /// Human-readable step log. Wall time is only measured when this is set.
    pub log_path: Option<PathBuf>,
    /// Multi-frame extended XYZ trajectory, written once the relaxation finishes.
    pub trajectory_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxOutcome {
    pub energy: f64,
    /// Optimizer steps taken; equals `max_steps` when the cap was hit.
    pub steps: usize,
    pub structure: Structure,
    /// Wall time in seconds, zero when no log was requested.
    pub elapsed: f64,
    pub converged: bool,
}

/// Height below which atoms are fixed: `z_min + rate * (z_max - z_min)` of `reference`.
/// A zero rate disables the constraint.
pub fn fix_height(reference: &Structure, rate: f64) -> Option<f64> {
    if rate == 0.0 {
        return None;
    }
    let (z_min, z_max) = reference.z_range()?;
    Some(z_min + rate * (z_max - z_min))
}

/// Copy of `structure` with every atom below `height` fixed.
pub fn constrained(structure: &Structure, height: Option<f64>) -> Structure {
    let mut copy = structure.clone();
    if let Some(height) = height {
        copy.fix_below(height);
    }
    copy
}

struct RelaxLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
}

impl RelaxLog {
    fn open(path: Option<&Path>) -> Result<Self, EngineError> {
        let Some(path) = path else {
            return Ok(Self {
                writer: None,
                path: PathBuf::new(),
            });
        };
        let io_err = |source| EngineError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    fn write(&mut self, text: std::fmt::Arguments<'_>) -> Result<(), EngineError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_fmt(text).map_err(|source| EngineError::Io {
                path: self.path.to_string_lossy().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), EngineError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|source| EngineError::Io {
                path: self.path.to_string_lossy().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Evaluates `structure`, rejecting potential errors, mismatched force counts and non-finite
/// values.
pub(crate) fn evaluate_checked(
    potential: &dyn Potential,
    structure: &Structure,
    step: usize,
) -> Result<Evaluation, EngineError> {
    let evaluation = potential
        .evaluate(structure)
        .map_err(|source| EngineError::Potential {
            calculator: potential.name().to_string(),
            source,
        })?;
    if evaluation.forces.len() != structure.len() {
        return Err(EngineError::Internal(format!(
            "calculator '{}' returned {} forces for {} atoms",
            potential.name(),
            evaluation.forces.len(),
            structure.len()
        )));
    }
    if !evaluation.is_finite() {
        return Err(EngineError::NonFinite {
            calculator: potential.name().to_string(),
            step,
        });
    }
    Ok(evaluation)
}

/// Relaxes `structure` (respecting its fixed atoms) under `potential`.
///
/// Every iteration evaluates energy and forces, zeroes the forces on fixed atoms, checks
/// convergence, stops at the step cap, and otherwise applies one optimizer step.
///
/// # Errors
///
/// Returns an error when the potential fails or produces non-finite values, or when a
/// requested log or trajectory cannot be written.
pub fn relax(
    structure: &Structure,
    potential: &dyn Potential,
    optimizer: OptimizerKind,
    damping: f64,
    criteria: &RelaxCriteria,
    options: &RelaxOptions,
) -> Result<RelaxOutcome, EngineError> {
    let started = options.log_path.as_ref().map(|_| Instant::now());
    let seconds = |started: &Option<Instant>| {
        started
            .as_ref()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    };

    let mut log = RelaxLog::open(options.log_path.as_deref())?;
    log.write(format_args!(
        "######################\n##  MLP relax starts  ##\n######################\n\nStep 1. Relaxing\n"
    ))?;

    let mut current = structure.clone();
    let mut optimizer = optimizer.create(damping);
    let name = optimizer.name();
    let fixed: Vec<bool> = (0..current.len()).map(|i| current.is_fixed(i)).collect();
    let mut frames = Vec::new();
    let mut steps = 0;

    log.write(format_args!(
        "{:width$}  {:>4} {:>10} {:>15}  {:>12}\n",
        "",
        "Step",
        "Time",
        "Energy",
        "fmax",
        width = name.len()
    ))?;

    let (energy, converged) = loop {
        let mut evaluation = evaluate_checked(potential, &current, steps)?;
        for (force, &is_fixed) in evaluation.forces.iter_mut().zip(&fixed) {
            if is_fixed {
                *force = Vector3::zeros();
            }
        }
        let fmax = max_force(&evaluation.forces);
        log.write(format_args!(
            "{}: {:>4} {:>10.3} {:>15.6}  {:>12.6}\n",
            name,
            steps,
            seconds(&started),
            evaluation.energy,
            fmax
        ))?;
        if options.trajectory_path.is_some() {
            frames.push((
                current.clone(),
                FrameMetadata {
                    energy: Some(evaluation.energy),
                    forces: Some(evaluation.forces.clone()),
                    step: Some(steps),
                },
            ));
        }

        if fmax < criteria.f_crit {
            break (evaluation.energy, true);
        }
        if steps >= criteria.max_steps {
            break (evaluation.energy, false);
        }

        let displacement = optimizer.step(current.positions(), &evaluation.forces, evaluation.energy);
        for ((position, delta), &is_fixed) in current
            .positions_mut()
            .iter_mut()
            .zip(displacement)
            .zip(&fixed)
        {
            if !is_fixed {
                *position += delta;
            }
        }
        steps += 1;
    };

    if let Some(path) = &options.trajectory_path {
        ExtXyzFile::write_frames_to_path(&frames, path)?;
    }

    let elapsed = seconds(&started);
    log.write(format_args!(
        "Done!\n\nElapsed time: {elapsed} s\n\n###############################\n##  Relax terminated normally  ##\n###############################\n"
    ))?;
    log.finish()?;

    debug!(
        optimizer = name,
        steps, converged, energy, "Relaxation finished."
    );

    Ok(RelaxOutcome {
        energy,
        steps,
        structure: current,
        elapsed,
        converged,
    })
}
