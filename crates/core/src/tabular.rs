//! Delimited-file reader and writer for entity sets

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SynthError;
use crate::records::{EntityKind, EntitySet};

/// Load all five entity files from `dir`
///
/// Every file must exist. A missing file or malformed row aborts the load.
pub fn read_entity_set(dir: &Path, delimiter: u8) -> Result<EntitySet, SynthError> {
    let set = EntitySet {
        patients: read_records(dir, EntityKind::Patient, delimiter)?,
        groups: read_records(dir, EntityKind::LabResultGroup, delimiter)?,
        lab_results: read_records(dir, EntityKind::LabResult, delimiter)?,
        measurements: read_records(dir, EntityKind::Measurement, delimiter)?,
        scores: read_records(dir, EntityKind::PeriodicScore, delimiter)?,
    };

    tracing::debug!(
        dir = %dir.display(),
        patients = set.patients.len(),
        groups = set.groups.len(),
        lab_results = set.lab_results.len(),
        measurements = set.measurements.len(),
        scores = set.scores.len(),
        "Loaded entity set"
    );

    Ok(set)
}

/// Write all five entity files into `dir`, creating it if needed
///
/// Refuses to write into a directory that already holds files.
pub fn write_entity_set(dir: &Path, set: &EntitySet, delimiter: u8) -> Result<(), SynthError> {
    if dir.is_dir() {
        let mut entries = fs::read_dir(dir).map_err(|e| SynthError::io(dir, e))?;
        if entries.next().is_some() {
            return Err(SynthError::OutputExists(dir.to_path_buf()));
        }
    }
    fs::create_dir_all(dir).map_err(|e| SynthError::io(dir, e))?;

    write_records(dir, EntityKind::Patient, &set.patients, delimiter)?;
    write_records(dir, EntityKind::LabResultGroup, &set.groups, delimiter)?;
    write_records(dir, EntityKind::LabResult, &set.lab_results, delimiter)?;
    write_records(dir, EntityKind::Measurement, &set.measurements, delimiter)?;
    write_records(dir, EntityKind::PeriodicScore, &set.scores, delimiter)?;

    tracing::info!(dir = %dir.display(), "Wrote entity set");
    Ok(())
}

/// Output folder for a synthetic patient, derived from its display name
pub fn output_dir_for(root: &Path, display_name: &str) -> PathBuf {
    let mut slug = String::with_capacity(display_name.len());
    for c in display_name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    root.join(if slug.is_empty() { "patient" } else { slug })
}

fn read_records<T: DeserializeOwned>(
    dir: &Path,
    kind: EntityKind,
    delimiter: u8,
) -> Result<Vec<T>, SynthError> {
    let path = dir.join(kind.file_name());
    let file = fs::File::open(&path).map_err(|e| SynthError::io(&path, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(file);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| SynthError::csv(&path, e))
}

fn write_records<T: Serialize>(
    dir: &Path,
    kind: EntityKind,
    records: &[T],
    delimiter: u8,
) -> Result<(), SynthError> {
    let path = dir.join(kind.file_name());
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(&path)
        .map_err(|e| SynthError::csv(&path, e))?;

    // serde only emits headers with the first row; empty files still need one
    if records.is_empty() {
        writer
            .write_record(header_for(kind))
            .map_err(|e| SynthError::csv(&path, e))?;
    }
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| SynthError::csv(&path, e))?;
    }
    writer.flush().map_err(|e| SynthError::io(&path, e))
}

fn header_for(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Patient => &["id", "displayName"],
        EntityKind::LabResultGroup => &["id", "name"],
        EntityKind::LabResult => &["id", "groupId", "patientId", "name", "unit"],
        EntityKind::Measurement => &["id", "labResultId", "timestamp", "value"],
        EntityKind::PeriodicScore => &["id", "patientId", "date", "score", "category"],
    }
}
