use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::run_context::RunContext;

/// Secondary experiment log that keeps a copy of every produced file under
/// `<root>/<run_id>/<artifact_type>/`.
///
/// Mirroring is best effort: failures are logged and never reach the caller.
pub struct ExperimentMirror {
    root: PathBuf,
}

impl ExperimentMirror {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn destination(&self, ctx: &RunContext, artifact_type: &str, file: &Path) -> Option<PathBuf> {
        let name = file.file_name()?;
        Some(
            self.root
                .join(ctx.run_id.to_string())
                .join(artifact_type)
                .join(name),
        )
    }

    /// Copy `file` into the mirror. Returns the mirrored path on success.
    pub fn log_file(&self, ctx: &RunContext, artifact_type: &str, file: &Path) -> Option<PathBuf> {
        let Some(dest) = self.destination(ctx, artifact_type, file) else {
            warn!("Cannot mirror {:?}: no file name", file);
            return None;
        };
        let copied = dest
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(file, &dest));
        match copied {
            Ok(bytes) => {
                info!(bytes, "Mirrored {:?} to {:?}", file, dest);
                Some(dest)
            }
            Err(e) => {
                warn!("Failed to mirror {:?} to {:?}: {}", file, dest, e);
                None
            }
        }
    }
}
