//! The basic cleaning step.
//!
//! resolve → download → select file → load → price filter → geography filter
//! → write → mirror → publish. The first failure aborts the run.

use std::path::{Path, PathBuf};

use tracing::{info, info_span, warn};

use crate::artifact::{ArtifactManifest, ArtifactRef, ArtifactStore, PendingArtifact, RAW_DATA_TYPE};
use crate::error::Result;
use crate::filter::{filter_bounding_box, filter_price, PriceRange, NYC_BOUNDING_BOX};
use crate::mirror::ExperimentMirror;
use crate::run_context::RunContext;
use crate::sample::select_input_file;
use crate::table::Table;

/// Parameters of one cleaning run, as given on the command line.
#[derive(Debug, Clone)]
pub struct CleaningParams {
    pub input_artifact: ArtifactRef,
    pub output_artifact: String,
    pub output_type: String,
    pub output_description: String,
    pub price_range: PriceRange,
    pub sample: Option<String>,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct CleaningReport {
    pub input: ArtifactManifest,
    pub input_file: PathBuf,
    pub rows_loaded: usize,
    pub rows_after_price: usize,
    pub rows_written: usize,
    pub output_path: PathBuf,
    pub mirrored_to: Option<PathBuf>,
    pub output: ArtifactManifest,
}

pub struct CleaningStep<'a> {
    store: &'a dyn ArtifactStore,
    mirror: Option<&'a ExperimentMirror>,
    ctx: &'a RunContext,
    work_dir: PathBuf,
}

impl<'a> CleaningStep<'a> {
    pub fn new(store: &'a dyn ArtifactStore, ctx: &'a RunContext, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            mirror: None,
            ctx,
            work_dir: work_dir.into(),
        }
    }

    pub fn with_mirror(mut self, mirror: &'a ExperimentMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Directory that downloaded artifacts are materialized under.
    pub fn download_root(&self) -> PathBuf {
        self.work_dir.join("artifacts")
    }

    pub fn run(&self, params: &CleaningParams) -> Result<CleaningReport> {
        let span = info_span!("basic_cleaning", run_id = %self.ctx.run_id, input = %params.input_artifact);
        let _enter = span.enter();

        // Validates the output name before anything touches the store or disk
        let mut pending = PendingArtifact::new(
            params.output_artifact.as_str(),
            params.output_type.as_str(),
            params.output_description.as_str(),
        )?;

        let input = self.store.use_artifact(&params.input_artifact, RAW_DATA_TYPE)?;
        let local_dir = self.store.download(&input, &self.download_root())?;
        let input_file = select_input_file(&local_dir, params.sample.as_deref())?;
        info!("Downloaded input artifact to: {:?}", input_file);

        let mut table = Table::load_csv(&input_file)?;
        let rows_loaded = table.len();

        filter_price(&mut table, &params.price_range)?;
        let rows_after_price = table.len();
        filter_bounding_box(&mut table, &NYC_BOUNDING_BOX)?;
        if table.is_empty() {
            warn!(rows_loaded, "No rows left after filtering, publishing a header-only table");
        }

        let output_path = self.write_output(&table, &params.output_artifact)?;
        let rows_written = table.len();
        drop(table);

        let mirrored_to = self
            .mirror
            .and_then(|m| m.log_file(self.ctx, &params.output_type, &output_path));

        pending.add_file(&output_path)?;
        let output = self.store.log_artifact(pending)?;

        info!(
            rows_loaded,
            rows_after_price,
            rows_written,
            output = %output.reference(),
            "Data cleaned and saved to: {:?}",
            output_path
        );

        Ok(CleaningReport {
            input,
            input_file,
            rows_loaded,
            rows_after_price,
            rows_written,
            output_path,
            mirrored_to,
            output,
        })
    }

    fn write_output(&self, table: &Table, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.work_dir)?;
        let path = self.work_dir.join(Path::new(name));
        table.write_csv(&path)?;
        Ok(path)
    }
}
