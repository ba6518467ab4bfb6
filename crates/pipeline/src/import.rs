//! Staged import of a transformed entity set into the remote store
//!
//! Stages run in foreign-key order (patient, groups, lab results,
//! measurements, scores). Each record goes through
//! `Pending → lookup → {Reused | Creating → {Created | Failed}}`; a record
//! whose parent never resolved remotely is dropped without a remote call.

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use synth_core::{EntityKind, EntitySet, IdRemapper};

use crate::error::StageFailed;
use crate::remote::{NaturalKey, RemoteError, RemoteId, RemoteStore};

/// Which remote call a record failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedCall {
    Lookup,
    Create,
}

/// One record that could not be imported
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub record: String,
    pub call: FailedCall,
    pub transient: bool,
    pub message: String,
}

/// Terminal state of one record
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Reused(RemoteId),
    Created(RemoteId),
    Failed(FailedCall, RemoteError),
    Dropped { parent: EntityKind, id: String },
}

impl RecordOutcome {
    fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Reused(_) => "reused",
            RecordOutcome::Created(_) => "created",
            RecordOutcome::Failed(..) => "failed",
            RecordOutcome::Dropped { .. } => "dropped",
        }
    }
}

/// Counts and failures for one entity type's stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub entity: EntityKind,
    /// Records that reached the remote store (lookup attempted)
    pub attempted: usize,
    pub created: usize,
    pub reused: usize,
    pub failed: usize,
    pub dropped: usize,
    pub errors: Vec<RecordFailure>,
}

impl StageReport {
    fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            attempted: 0,
            created: 0,
            reused: 0,
            failed: 0,
            dropped: 0,
            errors: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.reused
    }

    /// The stage had records and none succeeded, whether they failed
    /// remotely or were dropped for an unresolved parent
    pub fn is_fatal(&self) -> bool {
        self.attempted + self.dropped > 0 && self.succeeded() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub stages: Vec<StageReport>,
}

impl ImportReport {
    pub fn stage(&self, entity: EntityKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.entity == entity)
    }
}

/// Mutable state for one import run, passed explicitly through every stage
#[derive(Debug, Default)]
pub struct ImportContext {
    /// Local id → remote id, per entity kind
    pub remote_ids: IdRemapper,
    pub report: ImportReport,
}

impl ImportContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A record ready for the remote store, or the parent that blocks it
struct Planned {
    label: String,
    local_id: Option<String>,
    step: Result<(NaturalKey, JsonValue), (EntityKind, String)>,
}

/// Resolve a parent's remote id, or report which parent is missing
fn parent(
    ids: &IdRemapper,
    kind: EntityKind,
    local: &str,
) -> Result<String, (EntityKind, String)> {
    ids.get(kind, local)
        .map(str::to_string)
        .ok_or_else(|| (kind, local.to_string()))
}

/// Pushes entity sets into a [`RemoteStore`] stage by stage
pub struct StagedImporter<'a, S> {
    store: &'a S,
}

impl<'a, S: RemoteStore> StagedImporter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Import `set`, recording per-stage results in `ctx.report`
    ///
    /// Record-level failures are counted and skipped. A stage that had
    /// records but no success aborts the run before any later stage; entities
    /// already created stay in the remote store.
    pub async fn import(
        &self,
        set: &EntitySet,
        ctx: &mut ImportContext,
    ) -> Result<(), StageFailed> {
        for kind in EntityKind::ALL {
            let planned = plan_stage(kind, set, &ctx.remote_ids);
            let stage = self.run_stage(kind, planned, &mut ctx.remote_ids).await;

            tracing::info!(
                entity = %kind,
                attempted = stage.attempted,
                created = stage.created,
                reused = stage.reused,
                failed = stage.failed,
                dropped = stage.dropped,
                "Import stage finished"
            );

            let fatal = stage.is_fatal();
            let (attempted, dropped) = (stage.attempted, stage.dropped);
            ctx.report.stages.push(stage);

            if fatal {
                tracing::error!(
                    entity = %kind,
                    attempted,
                    dropped,
                    "Import stage had no successes, aborting"
                );
                return Err(StageFailed {
                    entity: kind,
                    attempted,
                    dropped,
                    report: Box::new(ctx.report.clone()),
                });
            }
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        kind: EntityKind,
        planned: Vec<Planned>,
        remote_ids: &mut IdRemapper,
    ) -> StageReport {
        let mut stage = StageReport::new(kind);

        for record in planned {
            let outcome = match record.step {
                Ok((key, payload)) => {
                    stage.attempted += 1;
                    self.resolve(kind, &record.label, &key, &payload).await
                }
                Err((parent, id)) => RecordOutcome::Dropped { parent, id },
            };

            metrics::counter!(
                "synth_import_records_total",
                "entity" => kind.collection(),
                "outcome" => outcome.label()
            )
            .increment(1);

            match outcome {
                RecordOutcome::Reused(remote) => {
                    stage.reused += 1;
                    if let Some(local) = &record.local_id {
                        remote_ids.insert(kind, local, remote.as_str());
                    }
                }
                RecordOutcome::Created(remote) => {
                    stage.created += 1;
                    if let Some(local) = &record.local_id {
                        remote_ids.insert(kind, local, remote.as_str());
                    }
                }
                RecordOutcome::Failed(call, err) => {
                    tracing::warn!(
                        entity = %kind,
                        record = %record.label,
                        call = ?call,
                        error = %err,
                        "Record import failed"
                    );
                    stage.failed += 1;
                    stage.errors.push(RecordFailure {
                        record: record.label,
                        call,
                        transient: err.is_transient(),
                        message: err.to_string(),
                    });
                }
                RecordOutcome::Dropped { parent, id } => {
                    tracing::debug!(
                        entity = %kind,
                        record = %record.label,
                        parent = %parent,
                        parent_id = %id,
                        "Dropping record with unresolved parent"
                    );
                    stage.dropped += 1;
                }
            }
        }

        stage
    }

    /// Lookup-before-create for a single record
    async fn resolve(
        &self,
        kind: EntityKind,
        label: &str,
        key: &NaturalKey,
        payload: &JsonValue,
    ) -> RecordOutcome {
        let collection = kind.collection();

        match self.store.lookup(collection, key).await {
            Ok(Some(remote)) => {
                tracing::debug!(
                    entity = %kind,
                    record = label,
                    remote = %remote,
                    "Reusing existing entity"
                );
                RecordOutcome::Reused(remote)
            }
            Ok(None) => match self.store.create(collection, payload).await {
                Ok(remote) => {
                    tracing::debug!(
                        entity = %kind,
                        record = label,
                        remote = %remote,
                        "Created entity"
                    );
                    RecordOutcome::Created(remote)
                }
                Err(e) => RecordOutcome::Failed(FailedCall::Create, e),
            },
            Err(e) => RecordOutcome::Failed(FailedCall::Lookup, e),
        }
    }
}

/// Build natural keys and payloads for one stage against the current remote ids
fn plan_stage(kind: EntityKind, set: &EntitySet, ids: &IdRemapper) -> Vec<Planned> {
    match kind {
        EntityKind::Patient => set
            .patients
            .iter()
            .map(|p| Planned {
                label: p.id.clone(),
                local_id: Some(p.id.clone()),
                step: Ok((
                    NaturalKey::external_id(&p.id),
                    json!({
                        "external_id": p.id,
                        "display_name": p.display_name,
                    }),
                )),
            })
            .collect(),
        EntityKind::LabResultGroup => set
            .groups
            .iter()
            .map(|g| Planned {
                label: g.id.clone(),
                local_id: Some(g.id.clone()),
                step: Ok((
                    NaturalKey::external_id(&g.id),
                    json!({
                        "external_id": g.id,
                        "name": g.name,
                    }),
                )),
            })
            .collect(),
        EntityKind::LabResult => set
            .lab_results
            .iter()
            .map(|l| {
                let step = parent(ids, EntityKind::Patient, &l.patient_id).and_then(|patient| {
                    let group = parent(ids, EntityKind::LabResultGroup, &l.group_id)?;
                    Ok((
                        NaturalKey::external_id(&l.id),
                        json!({
                            "external_id": l.id,
                            "name": l.name,
                            "unit": l.unit,
                            "patient": patient,
                            "group": group,
                        }),
                    ))
                });
                Planned {
                    label: l.id.clone(),
                    local_id: Some(l.id.clone()),
                    step,
                }
            })
            .collect(),
        EntityKind::Measurement => set
            .measurements
            .iter()
            .map(|m| Planned {
                label: m.id.clone(),
                local_id: Some(m.id.clone()),
                step: parent(ids, EntityKind::LabResult, &m.lab_result_id).map(|lab_result| {
                    (
                        NaturalKey::external_id(&m.id),
                        json!({
                            "external_id": m.id,
                            "lab_result": lab_result,
                            "timestamp": m.timestamp,
                            "value": m.value,
                        }),
                    )
                }),
            })
            .collect(),
        EntityKind::PeriodicScore => set
            .scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let step = parent(ids, EntityKind::Patient, &s.patient_id).map(|patient| {
                    // Files written before score ids existed only collapse exact duplicates
                    let key = if s.id.is_empty() {
                        NaturalKey::new()
                            .with("patient", patient.clone())
                            .with("date", s.date.clone())
                            .with("category", s.category.clone())
                            .with("score", s.score.clone())
                    } else {
                        NaturalKey::external_id(&s.id)
                    };
                    let mut payload = json!({
                        "patient": patient,
                        "date": s.date,
                        "score": s.score,
                        "category": s.category,
                    });
                    if !s.id.is_empty() {
                        payload["external_id"] = json!(s.id);
                    }
                    (key, payload)
                });
                Planned {
                    label: if s.id.is_empty() {
                        format!("row {}", i + 1)
                    } else {
                        s.id.clone()
                    },
                    local_id: None,
                    step,
                }
            })
            .collect(),
    }
}
