//! Rule matching over the snapshot's inverted indexes.
//!
//! A [`MatchIndex`] is an immutable, query-optimized view of one snapshot.
//! Matching an alert intersects three per-field posting lists; the smallest
//! list drives the intersection and the other two are probed through hashed
//! sets. The live index is swapped atomically on reload, never mutated.

pub mod reload;
pub mod runner;

use std::collections::{HashMap, HashSet};

use crate::models::WILDCARD;
use crate::snapshot::{RuleInt, RuleRef, Snapshot};

/// Posting lists for one categorical field.
///
/// Lists are sorted and deduplicated at build time. The wildcard bucket is
/// kept separate so the exact/wildcard union can be merged lazily per query.
#[derive(Debug, Default)]
struct FieldIndex {
    exact: HashMap<String, Vec<RuleInt>>,
    wildcard: Vec<RuleInt>,
}

impl FieldIndex {
    fn from_buckets(buckets: &std::collections::BTreeMap<String, std::collections::BTreeSet<RuleInt>>) -> Self {
        let mut index = FieldIndex::default();
        for (value, bucket) in buckets {
            // BTreeSet iteration is already sorted and unique.
            let list: Vec<RuleInt> = bucket.iter().copied().collect();
            if value.as_str() == WILDCARD {
                index.wildcard = list;
            } else {
                index.exact.insert(value.clone(), list);
            }
        }
        index
    }

    /// Union of the exact-value bucket and the wildcard bucket, deduplicated.
    /// A handle sitting in both buckets is counted once.
    fn postings(&self, value: &str) -> Vec<RuleInt> {
        let exact = self.exact.get(value).map(Vec::as_slice).unwrap_or(&[]);
        let mut merged = Vec::with_capacity(exact.len() + self.wildcard.len());

        let (mut i, mut j) = (0, 0);
        while i < exact.len() && j < self.wildcard.len() {
            match exact[i].cmp(&self.wildcard[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(exact[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(self.wildcard[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(exact[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&exact[i..]);
        merged.extend_from_slice(&self.wildcard[j..]);
        merged
    }
}

/// Immutable, query-optimized view of one snapshot.
pub struct MatchIndex {
    severity: FieldIndex,
    source: FieldIndex,
    name: FieldIndex,
    rules: HashMap<RuleInt, RuleRef>,
}

impl MatchIndex {
    /// Builds the query view from a decoded snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            severity: FieldIndex::from_buckets(&snapshot.severity_index),
            source: FieldIndex::from_buckets(&snapshot.source_index),
            name: FieldIndex::from_buckets(&snapshot.name_index),
            rules: snapshot
                .rules
                .iter()
                .map(|(handle, rule)| (*handle, rule.clone()))
                .collect(),
        }
    }

    /// An index over zero rules; every alert matches nothing.
    pub fn empty() -> Self {
        Self::from_snapshot(&Snapshot::empty())
    }

    /// Number of indexed rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Computes all rules matching `(severity, source, name)`, grouped by
    /// tenant. Returns an empty map when nothing matched.
    pub fn match_alert(
        &self,
        severity: &str,
        source: &str,
        name: &str,
    ) -> HashMap<String, Vec<String>> {
        let lists = [
            self.severity.postings(severity),
            self.source.postings(source),
            self.name.postings(name),
        ];

        if lists.iter().any(Vec::is_empty) {
            return HashMap::new();
        }

        // Bucket cardinalities vary widely; drive from the smallest list and
        // probe the other two through hashed sets.
        let smallest = lists
            .iter()
            .enumerate()
            .min_by_key(|(_, list)| list.len())
            .map(|(position, _)| position)
            .unwrap_or(0);

        let probes: Vec<HashSet<RuleInt>> = lists
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != smallest)
            .map(|(_, list)| list.iter().copied().collect())
            .collect();

        let mut matched: HashMap<String, Vec<String>> = HashMap::new();
        for handle in &lists[smallest] {
            if !probes.iter().all(|set| set.contains(handle)) {
                continue;
            }
            if let Some(rule) = self.rules.get(handle) {
                matched
                    .entry(rule.tenant_id.clone())
                    .or_default()
                    .push(rule.rule_id.clone());
            }
        }
        matched
    }
}
