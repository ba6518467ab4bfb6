//! synth-pipeline: pushes synthetic patients into the remote content store
//!
//! Exposes the orchestrator, the staged importer and the remote clients for
//! integration tests. The binary entrypoint is in `main.rs`.

pub mod config;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod remote;

pub use config::Config;
pub use error::{PipelineError, StageFailed};
pub use import::{ImportContext, ImportReport, RecordFailure, StageReport, StagedImporter};
pub use pipeline::{Generated, Pipeline, PipelineReport};
pub use remote::{HttpRemoteStore, MemoryStore, NaturalKey, RemoteError, RemoteId, RemoteStore};
