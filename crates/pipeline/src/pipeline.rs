//! Pipeline orchestration: read → transform → write → import

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;
use synth_core::{
    EntitySet, PatientRecord, TransformContext, TransformReport, Transformed, Transformer,
    output_dir_for, read_entity_set, write_entity_set,
};

use crate::config::Config;
use crate::error::PipelineError;
use crate::import::{ImportContext, ImportReport, StagedImporter};
use crate::remote::RemoteStore;

/// Result of generating one synthetic patient on disk
#[derive(Debug, Clone)]
pub struct Generated {
    pub output_dir: PathBuf,
    pub transformed: Transformed,
}

/// Final summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub patient: PatientRecord,
    pub output_dir: PathBuf,
    pub transform: TransformReport,
    pub import: ImportReport,
}

/// Sequences the transformer and the staged importer for one run
pub struct Pipeline<S> {
    source_dir: PathBuf,
    output_dir: PathBuf,
    delimiter: u8,
    transformer: Transformer,
    store: S,
}

impl<S: RemoteStore> Pipeline<S> {
    pub fn new(config: &Config, transformer: Transformer, store: S) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            output_dir: config.output_dir.clone(),
            delimiter: config.csv_delimiter,
            transformer,
            store,
        }
    }

    /// Transform the template patient and write the result to a fresh folder
    ///
    /// Every source file is read before anything is written, so an input
    /// error aborts with no side effects.
    pub fn generate<R: Rng>(
        &self,
        display_name: &str,
        rng: R,
    ) -> Result<Generated, PipelineError> {
        let source = read_entity_set(&self.source_dir, self.delimiter)?;

        let mut ctx = TransformContext::new(rng);
        let transformed = self.transformer.transform(&source, display_name, &mut ctx)?;

        let output_dir = output_dir_for(&self.output_dir, &transformed.patient().display_name);
        write_entity_set(&output_dir, &transformed.set, self.delimiter)?;

        Ok(Generated {
            output_dir,
            transformed,
        })
    }

    /// Import a previously generated entity set
    pub async fn import_dir(&self, dir: &Path) -> Result<ImportReport, PipelineError> {
        let set = read_entity_set(dir, self.delimiter)?;
        self.import(&set).await
    }

    /// Import an in-memory entity set
    pub async fn import(&self, set: &EntitySet) -> Result<ImportReport, PipelineError> {
        let mut ctx = ImportContext::new();
        StagedImporter::new(&self.store).import(set, &mut ctx).await?;
        Ok(ctx.report)
    }

    /// Generate a synthetic patient and push it to the remote store
    pub async fn run<R: Rng>(
        &self,
        display_name: &str,
        rng: R,
    ) -> Result<PipelineReport, PipelineError> {
        let generated = self.generate(display_name, rng)?;
        tracing::info!(
            patient = %generated.transformed.patient().id,
            output_dir = %generated.output_dir.display(),
            "Generated synthetic patient, starting import"
        );

        let patient = generated.transformed.patient().clone();
        let import = match self.import(&generated.transformed.set).await {
            Ok(import) => import,
            Err(PipelineError::StageFailed(failed)) => {
                return Err(PipelineError::RunAborted {
                    patient,
                    output_dir: generated.output_dir,
                    transform: Box::new(generated.transformed.report),
                    failed,
                });
            }
            Err(e) => return Err(e),
        };

        Ok(PipelineReport {
            patient,
            output_dir: generated.output_dir,
            transform: generated.transformed.report,
            import,
        })
    }
}
