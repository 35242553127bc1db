//! Memory Backend Module
//!
//! Two-table in-process adapter: primary records plus `(pattern, identity)` rows.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::cache::Identity;
use crate::error::Result;
use crate::storage::{
    check_batch, CommitOutcome, RecordRef, RowLookup, StorageBackend,
    StoredRecord, WriteBatch, WriteOp,
};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<Identity, StoredRecord>,
    by_key: HashMap<String, BTreeSet<Identity>>,
    by_numeric_id: HashMap<i64, Identity>,
    /// pattern -> identities
    index: HashMap<String, BTreeSet<Identity>>,
    /// identity -> patterns, the reverse of `index`
    patterns_of: HashMap<Identity, BTreeSet<String>>,
}

impl Tables {
    fn upsert(&mut self, record: StoredRecord) -> bool {
        let identity = record.identity.clone();
        let created = match self.records.insert(identity.clone(), record.clone()) {
            Some(previous) => {
                if previous.numeric_id != record.numeric_id {
                    if let Some(old_id) = previous.numeric_id {
                        self.by_numeric_id.remove(&old_id);
                    }
                }
                false
            }
            None => true,
        };

        self.by_key
            .entry(record.string_key.clone())
            .or_default()
            .insert(identity.clone());
        if let Some(id) = record.numeric_id {
            self.by_numeric_id.insert(id, identity);
        }
        created
    }

    fn replace_patterns(&mut self, identity: &Identity, patterns: BTreeSet<String>) {
        self.clear_patterns(identity);
        for pattern in &patterns {
            self.index
                .entry(pattern.clone())
                .or_default()
                .insert(identity.clone());
        }
        if !patterns.is_empty() {
            self.patterns_of.insert(identity.clone(), patterns);
        }
    }

    fn clear_patterns(&mut self, identity: &Identity) {
        let Some(old) = self.patterns_of.remove(identity) else {
            return;
        };
        for pattern in old {
            if let Some(identities) = self.index.get_mut(&pattern) {
                identities.remove(identity);
                if identities.is_empty() {
                    self.index.remove(&pattern);
                }
            }
        }
    }

    fn delete(&mut self, identity: &Identity) -> Option<RecordRef> {
        let record = self.records.remove(identity)?;
        if let Some(identities) = self.by_key.get_mut(&record.string_key) {
            identities.remove(identity);
            if identities.is_empty() {
                self.by_key.remove(&record.string_key);
            }
        }
        if let Some(id) = record.numeric_id {
            self.by_numeric_id.remove(&id);
        }
        self.clear_patterns(identity);
        Some(record.summary())
    }
}

impl RowLookup for Tables {
    fn record(&self, identity: &Identity) -> Result<Option<StoredRecord>> {
        Ok(self.records.get(identity).cloned())
    }

    fn id_owner(&self, numeric_id: i64) -> Result<Option<Identity>> {
        Ok(self.by_numeric_id.get(&numeric_id).cloned())
    }
}

// == Memory Backend ==
/// Relational-style adapter held entirely in memory.
///
/// Each commit runs under one write lock, which is the transaction boundary.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn find_by_identity(&self, identity: &Identity) -> Result<Option<StoredRecord>> {
        Ok(self.tables.read().records.get(identity).cloned())
    }

    fn find_by_key(&self, key: &str) -> Result<Vec<StoredRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .by_key
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|identity| tables.records.get(identity).cloned())
            .collect())
    }

    fn find_by_numeric_id(&self, numeric_id: i64) -> Result<Option<StoredRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .by_numeric_id
            .get(&numeric_id)
            .and_then(|identity| tables.records.get(identity))
            .cloned())
    }

    fn find_identities_by_patterns(
        &self,
        patterns: &BTreeSet<String>,
    ) -> Result<BTreeSet<Identity>> {
        let tables = self.tables.read();
        Ok(patterns
            .iter()
            .filter_map(|pattern| tables.index.get(pattern))
            .flatten()
            .cloned()
            .collect())
    }

    fn patterns_for(&self, identity: &Identity) -> Result<BTreeSet<String>> {
        Ok(self
            .tables
            .read()
            .patterns_of
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
        let mut tables = self.tables.write();
        check_batch(&batch, &*tables)?;

        let mut outcome = CommitOutcome::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Upsert(record) => {
                    let summary = record.summary();
                    if tables.upsert(record) {
                        outcome.created.push(summary);
                    }
                }
                WriteOp::ReplacePatterns { identity, patterns } => {
                    tables.replace_patterns(&identity, patterns);
                }
                WriteOp::Delete(identity) => {
                    outcome.removed.extend(tables.delete(&identity));
                }
                WriteOp::RequireUnchanged(_) => {}
                WriteOp::DeleteIfExpired { identity, now } => {
                    let expired = tables
                        .records
                        .get(&identity)
                        .is_some_and(|record| record.is_expired_at(now));
                    if expired {
                        outcome.removed.extend(tables.delete(&identity));
                    }
                }
            }
        }
        Ok(outcome)
    }

    fn truncate_all(&self) -> Result<Vec<RecordRef>> {
        let tables = std::mem::take(&mut *self.tables.write());
        Ok(tables.records.values().map(StoredRecord::summary).collect())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<RecordRef>> {
        let mut tables = self.tables.write();
        let expired: Vec<Identity> = tables
            .records
            .values()
            .filter(|record| record.is_expired_at(now))
            .map(|record| record.identity.clone())
            .collect();

        Ok(expired
            .iter()
            .filter_map(|identity| tables.delete(identity))
            .collect())
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.tables.read().records.len())
    }

    fn pattern_row_count(&self) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .patterns_of
            .values()
            .map(BTreeSet::len)
            .sum())
    }
}
