use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResultsIoError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("JSON error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ResultsIoError + '_ {
    move |source| ResultsIoError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("snapshot"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// A document written to its `.tmp` sibling that has not replaced the target yet.
#[derive(Debug)]
#[must_use = "a staged snapshot does nothing until it is committed"]
pub struct StagedSnapshot {
    tmp: PathBuf,
    target: PathBuf,
}

impl StagedSnapshot {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staged file over the target.
    pub fn commit(self) -> Result<(), ResultsIoError> {
        fs::rename(&self.tmp, &self.target).map_err(io_error(&self.target))
    }

    /// Removes the staged file, leaving the target untouched.
    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp) {
            debug!(path = %self.tmp.display(), error = %e, "Could not remove staged snapshot.");
        }
    }
}

/// Serializes `value` as pretty-printed JSON into the `.tmp` sibling of `path`.
pub fn stage_json_snapshot<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<StagedSnapshot, ResultsIoError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| ResultsIoError::Json {
        path: path.to_string_lossy().to_string(),
        source,
    })?;
    let tmp = temporary_sibling(path);
    fs::write(&tmp, json).map_err(io_error(&tmp))?;
    Ok(StagedSnapshot {
        tmp,
        target: path.to_path_buf(),
    })
}

/// Writes `value` as pretty-printed JSON, replacing `path` atomically.
///
/// The document is first written to a `.tmp` sibling and then renamed over the target, so
/// readers never observe a half-written snapshot.
pub fn write_json_snapshot<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), ResultsIoError> {
    stage_json_snapshot(path, value)?.commit()
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ResultsIoError> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&content).map_err(|source| ResultsIoError::Json {
        path: path.to_string_lossy().to_string(),
        source,
    })
}
