//! End-to-end transformation of a template patient read from disk.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use synth_core::{
    DateEncoding, EntityKind, EntitySet, StageCounts, TransformContext, Transformer,
    read_entity_set, value, write_entity_set,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TIMESTAMPS: [&str; 4] = [
    "2021-03-04",
    "04-03-2021",
    "04-03-202109:15",
    "2021-03-04 09:15:00",
];
const VALUES: [&str; 5] = ["4.2", "<0.5", "130", "negative", ">1000"];

/// Write the reference template patient: 2 groups, 5 lab results (3 in A,
/// 2 in B), 40 measurements plus one orphan, 10 periodic scores.
fn write_template(dir: &Path) {
    std::fs::write(dir.join("Patient.csv"), "id,displayName\np-0,Template Patient\n").unwrap();
    std::fs::write(dir.join("LabResultGroup.csv"), "id,name\nA,Haematology\nB,Chemistry\n")
        .unwrap();

    let mut lab_results = String::from("id,groupId,patientId,name,unit\n");
    for (i, group) in ["A", "A", "A", "B", "B"].iter().enumerate() {
        writeln!(lab_results, "lr-{i},{group},p-0,Test {i},mmol/L").unwrap();
    }
    std::fs::write(dir.join("LabResult.csv"), lab_results).unwrap();

    let mut measurements = String::from("id,labResultId,timestamp,value\n");
    for i in 0..40 {
        writeln!(
            measurements,
            "m-{i},lr-{},{},{}",
            i % 5,
            TIMESTAMPS[i % TIMESTAMPS.len()],
            VALUES[i % VALUES.len()]
        )
        .unwrap();
    }
    writeln!(measurements, "m-orphan,lr-99,2021-03-04,1.0").unwrap();
    std::fs::write(dir.join("Measurement.csv"), measurements).unwrap();

    let mut scores = String::from("patientId,date,score,category\n");
    for i in 0..10 {
        writeln!(scores, "p-0,{:02}-06-2021,{}.{:02},DAS28", i + 1, 2 + i % 4, i * 7).unwrap();
    }
    std::fs::write(dir.join("PeriodicScore.csv"), scores).unwrap();
}

fn comparison(value: &str) -> Option<char> {
    value.chars().next().filter(|c| matches!(c, '<' | '>'))
}

fn load_template() -> EntitySet {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path());
    read_entity_set(dir.path(), b',').unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_reference_scenario_counts() {
    let source = load_template();
    let mut ctx = TransformContext::new(StdRng::seed_from_u64(2024));
    let out = Transformer::default()
        .transform(&source, "Synthetic Sam", &mut ctx)
        .unwrap();

    assert_eq!(out.set.patients.len(), 1);
    assert_eq!(out.patient().display_name, "Synthetic Sam");
    assert_ne!(out.patient().id, "p-0");
    assert_eq!(out.set.groups, source.groups);
    assert_eq!(out.set.lab_results.len(), 5);
    assert_eq!(out.set.measurements.len(), 40);
    assert_eq!(out.set.scores.len(), 10);

    assert_eq!(
        out.report.counts(EntityKind::Measurement),
        StageCounts {
            source: 41,
            emitted: 40,
            dropped: 1
        }
    );
    assert!(out.report.warnings.is_empty(), "{:?}", out.report.warnings);
}

#[test]
fn test_referential_integrity() {
    let source = load_template();
    let mut ctx = TransformContext::new(StdRng::seed_from_u64(1));
    let out = Transformer::default()
        .transform(&source, "Synthetic Sam", &mut ctx)
        .unwrap();

    let patient_id = &out.patient().id;
    let lab_ids: HashSet<&str> = out.set.lab_results.iter().map(|l| l.id.as_str()).collect();
    let group_ids: HashSet<&str> = out.set.groups.iter().map(|g| g.id.as_str()).collect();
    let source_lab_ids: HashSet<&str> = source.lab_results.iter().map(|l| l.id.as_str()).collect();

    for lab in &out.set.lab_results {
        assert_eq!(&lab.patient_id, patient_id);
        assert!(group_ids.contains(lab.group_id.as_str()));
        assert!(!source_lab_ids.contains(lab.id.as_str()));
    }
    for measurement in &out.set.measurements {
        assert!(lab_ids.contains(measurement.lab_result_id.as_str()));
    }
    for score in &out.set.scores {
        assert_eq!(&score.patient_id, patient_id);
    }

    // Group membership survives re-identification: 3 in A, 2 in B
    let in_a = out.set.lab_results.iter().filter(|l| l.group_id == "A").count();
    assert_eq!(in_a, 3);
}

#[test]
fn test_values_and_dates_keep_their_shape() {
    let source = load_template();
    let mut ctx = TransformContext::new(StdRng::seed_from_u64(99));
    let transformer = Transformer::default();
    let out = transformer
        .transform(&source, "Synthetic Sam", &mut ctx)
        .unwrap();

    // Measurements are emitted in source order, skipping the orphan at the end
    for (before, after) in source.measurements.iter().zip(&out.set.measurements) {
        assert_eq!(
            DateEncoding::detect(&after.timestamp),
            DateEncoding::detect(&before.timestamp),
            "{} -> {}",
            before.timestamp,
            after.timestamp
        );
        if value::is_sentinel(&before.value) {
            assert_eq!(after.value, before.value);
        } else {
            assert_eq!(comparison(&after.value), comparison(&before.value));
            assert_eq!(after.value.contains('.'), before.value.contains('.'));
        }
    }

    let bound = transformer.options().score_date_bound.num_seconds();
    for (before, after) in source.scores.iter().zip(&out.set.scores) {
        let old: f64 = before.score.parse().unwrap();
        let new: f64 = after.score.parse().unwrap();
        assert!((new - old).abs() <= old * 0.05 + 0.005 + 1e-9, "{old} -> {new}");
        assert_eq!(after.score.len(), before.score.len());

        let encoding = DateEncoding::detect(&before.date).unwrap();
        assert_eq!(DateEncoding::detect(&after.date), Some(encoding));
        let shift = encoding.parse(&after.date).unwrap() - encoding.parse(&before.date).unwrap();
        assert!(shift.num_seconds().abs() <= bound);
        assert_eq!(after.category, before.category);
    }
}

#[test]
fn test_transformed_set_can_be_written_and_reloaded() {
    let source = load_template();
    let mut ctx = TransformContext::new(StdRng::seed_from_u64(3));
    let out = Transformer::default()
        .transform(&source, "Synthetic Sam", &mut ctx)
        .unwrap();

    let root = tempfile::tempdir().unwrap();
    let dir = synth_core::output_dir_for(root.path(), &out.patient().display_name);
    write_entity_set(&dir, &out.set, b',').unwrap();

    assert!(dir.ends_with("synthetic_sam"));
    assert_eq!(read_entity_set(&dir, b',').unwrap(), out.set);
}
