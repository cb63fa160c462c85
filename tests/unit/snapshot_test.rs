//! Unit tests for the snapshot projection and incremental apply.

use alertpipe::models::Rule;
use alertpipe::snapshot::{Snapshot, WorkingSet};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};

fn rule(id: &str, tenant: &str, severity: &str, source: &str, name: &str) -> Rule {
    Rule {
        rule_id: id.to_string(),
        tenant_id: tenant.to_string(),
        severity: severity.to_string(),
        source: source.to_string(),
        name: name.to_string(),
        is_enabled: true,
        version: 1,
        updated_at: Utc::now(),
    }
}

/// Index membership keyed by rule_id, independent of handle numbering.
fn membership(snapshot: &Snapshot) -> BTreeMap<(&'static str, String), BTreeSet<String>> {
    let mut projected = BTreeMap::new();
    for (field, index) in [
        ("severity", &snapshot.severity_index),
        ("source", &snapshot.source_index),
        ("name", &snapshot.name_index),
    ] {
        for (value, bucket) in index {
            projected.insert(
                (field, value.clone()),
                bucket
                    .iter()
                    .map(|h| snapshot.rules[h].rule_id.clone())
                    .collect(),
            );
        }
    }
    projected
}

// =============================================================================
// Full build
// =============================================================================

#[test]
fn empty_rule_set_builds_empty_snapshot() {
    let set = WorkingSet::build(Vec::<Rule>::new());
    assert!(set.snapshot().is_empty());
    set.snapshot().check_invariants().unwrap();
}

#[test]
fn disabled_rules_are_not_projected() {
    let mut disabled = rule("r2", "t1", "LOW", "db", "disk_full");
    disabled.is_enabled = false;

    let set = WorkingSet::build(vec![rule("r1", "t1", "HIGH", "api", "timeout"), disabled]);
    assert_eq!(set.snapshot().len(), 1);
    assert!(!set
        .snapshot()
        .rules
        .values()
        .any(|r| r.rule_id == "r2"));
}

#[test]
fn rebuilds_from_the_same_state_agree_up_to_renumbering() {
    let rules = vec![
        rule("r1", "t1", "HIGH", "api", "timeout"),
        rule("r2", "t2", "*", "*", "*"),
        rule("r3", "t1", "LOW", "db", "*"),
        rule("r4", "t3", "HIGH", "api", "latency"),
    ];
    let forward = WorkingSet::build(rules.clone());
    let reversed = WorkingSet::build(rules.into_iter().rev().collect::<Vec<_>>());

    assert_eq!(membership(forward.snapshot()), membership(reversed.snapshot()));
}

// =============================================================================
// Incremental apply
// =============================================================================

#[test]
fn created_then_disabled_round_trips_to_the_original_projection() {
    let mut set = WorkingSet::build(vec![rule("r1", "t1", "HIGH", "api", "timeout")]);
    let baseline = membership(set.snapshot());

    set.upsert(&rule("r9", "t9", "LOW", "db", "disk_full"));
    assert_eq!(set.snapshot().len(), 2);

    set.remove("r9");
    assert_eq!(membership(set.snapshot()), baseline);
    set.snapshot().check_invariants().unwrap();
}

#[test]
fn update_moves_field_entries_without_renumbering() {
    let mut set = WorkingSet::build(vec![
        rule("r1", "t1", "HIGH", "api", "timeout"),
        rule("r2", "t2", "HIGH", "api", "timeout"),
    ]);
    let handle_of = |set: &WorkingSet, id: &str| {
        set.snapshot()
            .rules
            .iter()
            .find(|(_, r)| r.rule_id == id)
            .map(|(h, _)| *h)
            .unwrap()
    };
    let r1_before = handle_of(&set, "r1");

    set.upsert(&rule("r1", "t1", "LOW", "worker", "oom"));

    assert_eq!(handle_of(&set, "r1"), r1_before);
    let snapshot = set.snapshot();
    snapshot.check_invariants().unwrap();
    assert!(snapshot.severity_index["HIGH"].len() == 1);
    assert!(snapshot.severity_index.contains_key("LOW"));
    assert!(snapshot.source_index.contains_key("worker"));
    assert!(snapshot.name_index.contains_key("oom"));
}

#[test]
fn reapplying_the_same_upsert_is_idempotent() {
    let mut set = WorkingSet::new();
    let r = rule("r1", "t1", "HIGH", "api", "timeout");
    set.upsert(&r);
    let once = membership(set.snapshot());
    set.upsert(&r);
    assert_eq!(membership(set.snapshot()), once);
    assert_eq!(set.snapshot().len(), 1);
}

// =============================================================================
// Serialization
// =============================================================================

#[test]
fn snapshot_round_trips_through_the_cache_encoding() {
    let set = WorkingSet::build(vec![
        rule("r1", "t1", "HIGH", "api", "timeout"),
        rule("r2", "t2", "*", "*", "*"),
    ]);
    let decoded = Snapshot::decode(&set.snapshot().encode().unwrap()).unwrap();
    assert_eq!(*set.snapshot(), decoded);
}

#[test]
fn foreign_schema_versions_are_rejected() {
    let mut snapshot = Snapshot::empty();
    snapshot.schema_version = 42;
    let bytes = serde_json::to_vec(&snapshot).unwrap();
    assert!(Snapshot::decode(&bytes).is_err());
}

#[test]
fn truncated_blob_is_rejected() {
    let set = WorkingSet::build(vec![rule("r1", "t1", "HIGH", "api", "timeout")]);
    let bytes = set.snapshot().encode().unwrap();
    assert!(Snapshot::decode(&bytes[..bytes.len() / 2]).is_err());
}
