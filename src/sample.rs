use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::artifact::is_plain_file_name;
use crate::error::{CleaningError, Result};

/// Pick the file to load from a downloaded artifact directory.
///
/// With a sample name, that file must exist directly inside `dir`. Without
/// one, regular files are sorted by name and the first is used so the choice
/// does not depend on the platform's directory listing order.
pub fn select_input_file(dir: &Path, sample: Option<&str>) -> Result<PathBuf> {
    match sample.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => {
            let not_found = || CleaningError::SampleNotFound {
                sample: name.to_string(),
                dir: dir.display().to_string(),
            };
            if !is_plain_file_name(name) {
                return Err(not_found());
            }
            let path = dir.join(name);
            if !path.is_file() {
                return Err(not_found());
            }
            Ok(path)
        }
        None => {
            let mut files = Vec::new();
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.push(entry.path());
                }
            }
            files.sort();
            debug!("Artifact directory {:?} holds {} files", dir, files.len());
            files
                .into_iter()
                .next()
                .ok_or_else(|| CleaningError::EmptyArtifact(dir.display().to_string()))
        }
    }
}
