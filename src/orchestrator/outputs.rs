//! Writes stack outputs to a JSON file after a run.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while writing the outputs file.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OutputsError {
    /// Raised when the file or its directory cannot be written.
    #[error("failed to write {path}: {message}")]
    Io {
        /// Path being written.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the outputs cannot be rendered.
    #[error("failed to render outputs: {0}")]
    Render(String),
}

/// Writes `outputs` as pretty-printed JSON keyed by stack name, creating
/// parent directories as needed.
///
/// # Errors
///
/// Returns [`OutputsError::Io`] when the path cannot be written.
pub fn write_outputs(
    path: &Utf8Path,
    outputs: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<(), OutputsError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let io_error = |target: &Utf8Path, err: std::io::Error| OutputsError::Io {
        path: target.to_path_buf(),
        message: err.to_string(),
    };
    let file_name = path.file_name().ok_or_else(|| OutputsError::Io {
        path: path.to_path_buf(),
        message: String::from("outputs path is missing a filename"),
    })?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| io_error(parent, err))?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| io_error(parent, err))?;
    let rendered =
        serde_json::to_string_pretty(outputs).map_err(|err| OutputsError::Render(err.to_string()))?;
    dir.write(file_name, rendered)
        .map_err(|err| io_error(path, err))
}

pub(super) fn write_outputs_best_effort(
    path: &Utf8Path,
    outputs: &BTreeMap<String, BTreeMap<String, String>>,
) {
    match write_outputs(path, outputs) {
        Ok(()) => info!(path = %path, stacks = outputs.len(), "wrote stack outputs"),
        Err(err) => warn!(path = %path, error = %err, "could not write stack outputs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn temp_path(tmp: &TempDir, relative: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().join(relative)).expect("utf-8 temp path")
    }

    #[rstest]
    fn outputs_are_written_keyed_by_stack() {
        let tmp = TempDir::new().expect("temp dir");
        let path = temp_path(&tmp, "out/outputs.json");
        let outputs = BTreeMap::from([(
            String::from("api"),
            BTreeMap::from([(String::from("Url"), String::from("https://api.example"))]),
        )]);

        write_outputs(&path, &outputs).expect("outputs written");

        let written: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&path).expect("read outputs"),
        )
        .expect("valid json");
        assert_eq!(
            written,
            serde_json::json!({"api": {"Url": "https://api.example"}})
        );
    }

    #[rstest]
    fn unwritable_paths_are_io_errors() {
        let tmp = TempDir::new().expect("temp dir");
        let blocker = temp_path(&tmp, "blocker");
        std::fs::write(&blocker, "file").expect("write blocker");

        let result = write_outputs(&blocker.join("outputs.json"), &BTreeMap::new());

        assert!(matches!(result, Err(OutputsError::Io { .. })));
    }
}
