//! Pipeline error handling

use std::path::PathBuf;

use synth_core::{EntityKind, PatientRecord, SynthError, TransformReport};
use thiserror::Error;

use crate::import::ImportReport;
use crate::remote::RemoteError;

/// A stage had records and none of them succeeded
///
/// Carries the report gathered up to and including the failed stage so the
/// caller can still show what was created before the abort.
#[derive(Debug, Error)]
#[error(
    "{entity} stage failed: no record succeeded ({attempted} attempted, {dropped} dropped for unresolved parents)"
)]
pub struct StageFailed {
    pub entity: EntityKind,
    pub attempted: usize,
    pub dropped: usize,
    pub report: Box<ImportReport>,
}

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error(transparent)]
    StageFailed(#[from] StageFailed),

    /// Import aborted after the synthetic patient was already written
    #[error("Import of {} aborted: {failed}", output_dir.display())]
    RunAborted {
        patient: PatientRecord,
        output_dir: PathBuf,
        transform: Box<TransformReport>,
        #[source]
        failed: StageFailed,
    },

    #[error("Remote client setup failed: {0}")]
    Remote(#[from] RemoteError),
}
