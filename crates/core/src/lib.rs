//! synth-core: Synthetic patient generation from a template patient
//!
//! This crate holds the pure half of the pipeline: the clinical record
//! types, delimited-file I/O, value and date randomizers, the identity
//! remapper and the record transformer. Nothing here touches the network.

pub mod date;
pub mod error;
pub mod records;
pub mod remap;
pub mod tabular;
pub mod transform;
pub mod value;

pub use date::{DateEncoding, DateShift, FallbackFormat, randomize_date};
pub use error::SynthError;
pub use records::{
    EntityKind, EntitySet, LabResultGroupRecord, LabResultRecord, MeasurementRecord,
    PatientRecord, PeriodicScoreRecord,
};
pub use remap::IdRemapper;
pub use tabular::{output_dir_for, read_entity_set, write_entity_set};
pub use transform::{
    StageCounts, TransformContext, TransformOptions, TransformReport, TransformWarning,
    Transformed, Transformer, WarningKind,
};
pub use value::{RandomizedValue, ValueKind, randomize_value};
