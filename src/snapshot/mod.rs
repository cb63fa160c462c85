//! Compact projection of all enabled rules.
//!
//! The snapshot is a value object: three inverted indexes keyed by field
//! value (including the `*` wildcard bucket), plus the `ruleInt → rule`
//! table. It is immutable once published; changes produce a new value.

pub mod builder;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::models::Rule;

/// Snapshot blob schema version; readers reject anything else.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Dense integer handle for a rule within one snapshot. Internal only:
/// handles are stable within a builder lifetime but renumber on full rebuild.
pub type RuleInt = u32;

/// What a matched handle resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub rule_id: String,
    pub tenant_id: String,
}

/// The published projection of all enabled rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub severity_index: BTreeMap<String, BTreeSet<RuleInt>>,
    pub source_index: BTreeMap<String, BTreeSet<RuleInt>>,
    pub name_index: BTreeMap<String, BTreeSet<RuleInt>>,
    pub rules: BTreeMap<RuleInt, RuleRef>,
}

impl Snapshot {
    /// An empty snapshot (no enabled rules).
    pub fn empty() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            severity_index: BTreeMap::new(),
            source_index: BTreeMap::new(),
            name_index: BTreeMap::new(),
            rules: BTreeMap::new(),
        }
    }

    /// Serializes for the cache blob key.
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a cache blob, rejecting unknown schema versions.
    pub fn decode(bytes: &[u8]) -> PipelineResult<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(PipelineError::UnknownSchema(snapshot.schema_version));
        }
        Ok(snapshot)
    }

    /// Number of indexed rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks the structural invariants: every handle in any index resolves
    /// in `rules`, and every rule appears in exactly one bucket per index.
    pub fn check_invariants(&self) -> PipelineResult<()> {
        for (field, index) in [
            ("severity", &self.severity_index),
            ("source", &self.source_index),
            ("name", &self.name_index),
        ] {
            let mut seen: BTreeSet<RuleInt> = BTreeSet::new();
            for (value, bucket) in index {
                for handle in bucket {
                    if !self.rules.contains_key(handle) {
                        return Err(PipelineError::Internal(format!(
                            "snapshot {} index bucket '{}' references unknown handle {}",
                            field, value, handle
                        )));
                    }
                    if !seen.insert(*handle) {
                        return Err(PipelineError::Internal(format!(
                            "snapshot {} index lists handle {} in more than one bucket",
                            field, handle
                        )));
                    }
                }
            }
            if seen.len() != self.rules.len() {
                return Err(PipelineError::Internal(format!(
                    "snapshot {} index covers {} handles, expected {}",
                    field,
                    seen.len(),
                    self.rules.len()
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Working set
// =============================================================================

/// The builder's mutable working copy of a snapshot.
///
/// Keeps the reverse `rule_id → handle` map and the next free handle, neither
/// of which is part of the published value. Handles start at 1 and are
/// preserved across UPDATE so an in-place apply never renumbers.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    snapshot: Snapshot,
    handles: BTreeMap<String, RuleInt>,
    next_handle: RuleInt,
}

impl WorkingSet {
    /// An empty working set.
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::empty(),
            handles: BTreeMap::new(),
            next_handle: 1,
        }
    }

    /// Builds the full projection from a consistent read of the rule store.
    pub fn build(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut set = Self::new();
        for rule in rules {
            if rule.is_enabled {
                set.upsert(&rule);
            }
        }
        set
    }

    /// The current value; encode and publish this.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Adds a rule or replaces its field-value entries in place.
    ///
    /// On replace, the old `(handle → field value)` entries are removed
    /// before the new ones are inserted; the handle itself is preserved.
    pub fn upsert(&mut self, rule: &Rule) {
        let handle = match self.handles.get(&rule.rule_id) {
            Some(&existing) => {
                self.unindex(existing);
                existing
            }
            None => {
                let handle = self.next_handle;
                self.next_handle += 1;
                self.handles.insert(rule.rule_id.clone(), handle);
                handle
            }
        };

        self.snapshot
            .severity_index
            .entry(rule.severity.clone())
            .or_default()
            .insert(handle);
        self.snapshot
            .source_index
            .entry(rule.source.clone())
            .or_default()
            .insert(handle);
        self.snapshot
            .name_index
            .entry(rule.name.clone())
            .or_default()
            .insert(handle);
        self.snapshot.rules.insert(
            handle,
            RuleRef {
                rule_id: rule.rule_id.clone(),
                tenant_id: rule.tenant_id.clone(),
            },
        );
    }

    /// Removes a rule from all indexes and the handle table.
    /// Removing an unknown rule is a no-op (DELETE after DISABLE, replays).
    pub fn remove(&mut self, rule_id: &str) {
        if let Some(handle) = self.handles.remove(rule_id) {
            self.unindex(handle);
            self.snapshot.rules.remove(&handle);
        }
    }

    fn unindex(&mut self, handle: RuleInt) {
        for index in [
            &mut self.snapshot.severity_index,
            &mut self.snapshot.source_index,
            &mut self.snapshot.name_index,
        ] {
            index.retain(|_, bucket| {
                bucket.remove(&handle);
                !bucket.is_empty()
            });
        }
    }
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self::new()
    }
}
