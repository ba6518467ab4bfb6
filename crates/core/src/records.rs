//! Clinical record types handled by the pipeline
//!
//! Field names serialize in camelCase so the CSV headers read
//! `id,groupId,patientId,...` for every entity file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five entity types, in remote import order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Patient,
    LabResultGroup,
    LabResult,
    Measurement,
    PeriodicScore,
}

impl EntityKind {
    /// All kinds in foreign-key dependency order
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Patient,
        EntityKind::LabResultGroup,
        EntityKind::LabResult,
        EntityKind::Measurement,
        EntityKind::PeriodicScore,
    ];

    /// Name of the delimited file holding this entity type
    pub fn file_name(self) -> &'static str {
        match self {
            EntityKind::Patient => "Patient.csv",
            EntityKind::LabResultGroup => "LabResultGroup.csv",
            EntityKind::LabResult => "LabResult.csv",
            EntityKind::Measurement => "Measurement.csv",
            EntityKind::PeriodicScore => "PeriodicScore.csv",
        }
    }

    /// Remote collection this entity type is stored in
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Patient => "patients",
            EntityKind::LabResultGroup => "lab_result_groups",
            EntityKind::LabResult => "lab_results",
            EntityKind::Measurement => "measurements",
            EntityKind::PeriodicScore => "periodic_scores",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Patient => "Patient",
            EntityKind::LabResultGroup => "LabResultGroup",
            EntityKind::LabResult => "LabResult",
            EntityKind::Measurement => "Measurement",
            EntityKind::PeriodicScore => "PeriodicScore",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: String,
    pub display_name: String,
}

/// Shared reference data, copied verbatim between generations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResultGroupRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResultRecord {
    pub id: String,
    pub group_id: String,
    pub patient_id: String,
    pub name: String,
    pub unit: String,
}

/// A single timestamped value for a lab result.
///
/// `value` is kept textual: it may be numeric, numeric with a `<`/`>`
/// prefix, or a sentinel token such as `negative`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub id: String,
    pub lab_result_id: String,
    pub timestamp: String,
    pub value: String,
}

/// A clinical rating taken on a schedule
///
/// Template files carry no `id` column; the transformer mints one for every
/// emitted score so each can be told apart remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicScoreRecord {
    #[serde(default)]
    pub id: String,
    pub patient_id: String,
    pub date: String,
    pub score: String,
    pub category: String,
}

/// All records belonging to one patient generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySet {
    pub patients: Vec<PatientRecord>,
    pub groups: Vec<LabResultGroupRecord>,
    pub lab_results: Vec<LabResultRecord>,
    pub measurements: Vec<MeasurementRecord>,
    pub scores: Vec<PeriodicScoreRecord>,
}

impl EntitySet {
    /// Number of records held for the given entity type
    pub fn len_of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Patient => self.patients.len(),
            EntityKind::LabResultGroup => self.groups.len(),
            EntityKind::LabResult => self.lab_results.len(),
            EntityKind::Measurement => self.measurements.len(),
            EntityKind::PeriodicScore => self.scores.len(),
        }
    }
}
