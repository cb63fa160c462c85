//! Unit tests for match semantics and the hot-swapped index handle.

use alertpipe::matcher::reload::IndexHandle;
use alertpipe::matcher::MatchIndex;
use alertpipe::models::Rule;
use alertpipe::snapshot::WorkingSet;
use chrono::Utc;
use pretty_assertions::assert_eq;
use rstest::rstest;

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

fn index(rules: Vec<Rule>) -> MatchIndex {
    MatchIndex::from_snapshot(WorkingSet::build(rules).snapshot())
}

// =============================================================================
// Exact and wildcard semantics
// =============================================================================

#[rstest]
#[case("HIGH", "api", "timeout", true)]
#[case("LOW", "api", "timeout", false)]
#[case("HIGH", "db", "timeout", false)]
#[case("HIGH", "api", "latency", false)]
fn exact_rule_matches_iff_all_fields_equal(
    #[case] severity: &str,
    #[case] source: &str,
    #[case] name: &str,
    #[case] expected: bool,
) {
    let index = index(vec![rule("r1", "t1", "HIGH", "api", "timeout")]);
    let matched = index.match_alert(severity, source, name);
    assert_eq!(!matched.is_empty(), expected);
}

#[test]
fn all_wildcard_rule_matches_any_alert() {
    let index = index(vec![rule("r4", "t3", "*", "*", "*")]);
    for (severity, source, name) in [
        ("LOW", "db", "disk_full"),
        ("HIGH", "api", "timeout"),
        ("whatever", "anything", "at_all"),
    ] {
        let matched = index.match_alert(severity, source, name);
        assert_eq!(matched["t3"], vec!["r4".to_string()]);
    }
}

#[test]
fn empty_rule_set_matches_nothing() {
    let index = MatchIndex::empty();
    assert!(index.match_alert("HIGH", "api", "timeout").is_empty());
}

#[test]
fn unknown_field_values_without_wildcards_match_nothing() {
    let index = index(vec![rule("r1", "t1", "HIGH", "api", "timeout")]);
    assert!(index.match_alert("UNSEEN", "api", "timeout").is_empty());
}

// =============================================================================
// Tenant grouping
// =============================================================================

#[test]
fn one_entry_per_tenant_with_all_matched_rules() {
    let index = index(vec![
        rule("r1", "t1", "HIGH", "api", "timeout"),
        rule("r2", "t1", "HIGH", "api", "*"),
        rule("r3", "t2", "HIGH", "api", "timeout"),
    ]);
    let matched = index.match_alert("HIGH", "api", "timeout");

    assert_eq!(matched.len(), 2);
    let mut t1_rules = matched["t1"].clone();
    t1_rules.sort();
    assert_eq!(t1_rules, vec!["r1".to_string(), "r2".to_string()]);
    assert_eq!(matched["t2"], vec!["r3".to_string()]);
}

// =============================================================================
// Hot swap
// =============================================================================

#[test]
fn swapped_index_changes_subsequent_matches_only() {
    let handle = IndexHandle::new();

    // Simulates the disable flowing through builder and cache: the handle
    // starts with the rule present, then swaps to a projection without it.
    let with_rule = WorkingSet::build(vec![rule("r1", "t1", "HIGH", "api", "timeout")]);
    handle.swap(MatchIndex::from_snapshot(with_rule.snapshot()));

    let before = handle.load();
    assert!(!before.match_alert("HIGH", "api", "timeout").is_empty());

    handle.swap(MatchIndex::empty());

    // The held reference still answers from the old projection; a fresh
    // load sees the new one. Neither blocks the other.
    assert!(!before.match_alert("HIGH", "api", "timeout").is_empty());
    assert!(handle.load().match_alert("HIGH", "api", "timeout").is_empty());
}
