//! Storage Module
//!
//! The transactional backend contract the engine writes through, and its adapters.
//!
//! A backend holds two logical tables: primary records keyed by identity, and
//! pattern-index rows `(pattern, identity)`. Every mutation reaches the backend as a
//! [`WriteBatch`] that commits all-or-nothing.

mod kv;
mod memory;

pub use kv::{KvBackend, KvOp, KvStore, MemoryKvStore};
pub use memory::MemoryBackend;

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{entry, ttl_from_millis, Identity};
use crate::error::{CacheError, Result};

// == Stored Record ==
/// One primary-table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub identity: Identity,
    pub string_key: String,
    pub numeric_id: Option<i64>,
    /// Encoded value
    pub value: Vec<u8>,
    /// Type tag the value was encoded with
    pub value_type: String,
    /// Encoded parameter list
    pub parameters: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// Zero or negative means the record never expires
    pub ttl_ms: i64,
}

impl StoredRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        entry::is_expired_at(self.created_at, ttl_from_millis(self.ttl_ms), now)
    }

    pub fn summary(&self) -> RecordRef {
        RecordRef {
            identity: self.identity.clone(),
            numeric_id: self.numeric_id,
        }
    }
}

/// Identity and id of a record a commit created or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub identity: Identity,
    pub numeric_id: Option<i64>,
}

impl RecordRef {
    /// Lookup handles the record carries: its string key, plus its numeric id if any.
    pub fn handle_count(&self) -> u64 {
        1 + u64::from(self.numeric_id.is_some())
    }
}

// == Write Batch ==
/// One statement inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert the record, or replace the row with the same identity
    Upsert(StoredRecord),
    /// Delete every pattern row of `identity`, then insert `patterns`
    ReplacePatterns {
        identity: Identity,
        patterns: BTreeSet<String>,
    },
    /// Delete the record and all of its pattern rows
    Delete(Identity),
    /// Same as `Delete`, but only if the record is still expired at `now`
    DeleteIfExpired {
        identity: Identity,
        now: DateTime<Utc>,
    },
    /// Rejects the batch with `Conflict` unless the row still equals this record
    RequireUnchanged(StoredRecord),
}

/// Ordered statements committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_record(mut self, record: StoredRecord) -> Self {
        self.ops.push(WriteOp::Upsert(record));
        self
    }

    pub fn replace_pattern_index(mut self, identity: Identity, patterns: BTreeSet<String>) -> Self {
        self.ops.push(WriteOp::ReplacePatterns { identity, patterns });
        self
    }

    pub fn delete_by_identity(mut self, identity: Identity) -> Self {
        self.ops.push(WriteOp::Delete(identity));
        self
    }

    pub fn delete_if_expired(mut self, identity: Identity, now: DateTime<Utc>) -> Self {
        self.ops.push(WriteOp::DeleteIfExpired { identity, now });
        self
    }

    pub fn require_unchanged(mut self, expected: StoredRecord) -> Self {
        self.ops.push(WriteOp::RequireUnchanged(expected));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// What a committed batch changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    /// Records that did not exist before the commit
    pub created: Vec<RecordRef>,
    /// Records the commit deleted
    pub removed: Vec<RecordRef>,
}

// == Storage Backend Trait ==
/// Transactional CRUD over the record and pattern-index tables.
///
/// Reads return rows whether or not they have expired; expiry is the caller's decision.
pub trait StorageBackend: Send + Sync {
    fn find_by_identity(&self, identity: &Identity) -> Result<Option<StoredRecord>>;

    /// Every record carrying `key` as its string key, in unspecified order.
    fn find_by_key(&self, key: &str) -> Result<Vec<StoredRecord>>;

    fn find_by_numeric_id(&self, numeric_id: i64) -> Result<Option<StoredRecord>>;

    /// Union of the identities indexed under any of `patterns`.
    fn find_identities_by_patterns(&self, patterns: &BTreeSet<String>)
        -> Result<BTreeSet<Identity>>;

    /// Pattern rows currently held for `identity`.
    fn patterns_for(&self, identity: &Identity) -> Result<BTreeSet<String>>;

    /// Applies every op of `batch` or none of them.
    ///
    /// Rejects the whole batch with `Storage` if, after applying it, a numeric id would
    /// belong to two records or a pattern row would reference a missing record, and with
    /// `Conflict` if a `RequireUnchanged` precondition fails.
    fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome>;

    /// Empties both tables. Returns the records it removed.
    fn truncate_all(&self) -> Result<Vec<RecordRef>>;

    /// Deletes every record expired at `now`, with its pattern rows.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<RecordRef>>;

    fn record_count(&self) -> Result<usize>;

    fn pattern_row_count(&self) -> Result<usize>;
}

// == Constraint Checking ==
/// Committed-state reads an adapter exposes to the batch checker.
pub(crate) trait RowLookup {
    fn record(&self, identity: &Identity) -> Result<Option<StoredRecord>>;
    fn id_owner(&self, numeric_id: i64) -> Result<Option<Identity>>;
}

/// Replays `batch` over an overlay of the committed state and rejects it if any
/// constraint or precondition breaks. Nothing is written.
pub(crate) fn check_batch(batch: &WriteBatch, committed: &impl RowLookup) -> Result<()> {
    let mut rows: HashMap<Identity, Option<StoredRecord>> = HashMap::new();
    let mut owners: HashMap<i64, Option<Identity>> = HashMap::new();

    fn row_of(
        rows: &HashMap<Identity, Option<StoredRecord>>,
        committed: &impl RowLookup,
        identity: &Identity,
    ) -> Result<Option<StoredRecord>> {
        match rows.get(identity) {
            Some(overlay) => Ok(overlay.clone()),
            None => committed.record(identity),
        }
    }

    fn owner_of(
        owners: &HashMap<i64, Option<Identity>>,
        committed: &impl RowLookup,
        numeric_id: i64,
    ) -> Result<Option<Identity>> {
        match owners.get(&numeric_id) {
            Some(overlay) => Ok(overlay.clone()),
            None => committed.id_owner(numeric_id),
        }
    }

    fn remove_row(
        rows: &mut HashMap<Identity, Option<StoredRecord>>,
        owners: &mut HashMap<i64, Option<Identity>>,
        row: &StoredRecord,
    ) {
        if let Some(id) = row.numeric_id {
            owners.insert(id, None);
        }
        rows.insert(row.identity.clone(), None);
    }

    for op in batch.ops() {
        match op {
            WriteOp::Upsert(record) => {
                let previous = row_of(&rows, committed, &record.identity)?;
                if let Some(old_id) = previous.and_then(|row| row.numeric_id) {
                    if Some(old_id) != record.numeric_id {
                        owners.insert(old_id, None);
                    }
                }
                if let Some(id) = record.numeric_id {
                    match owner_of(&owners, committed, id)? {
                        Some(owner) if owner != record.identity => {
                            return Err(CacheError::Storage(format!(
                                "numeric id {} already belongs to '{}'",
                                id, owner
                            )));
                        }
                        _ => {
                            owners.insert(id, Some(record.identity.clone()));
                        }
                    }
                }
                rows.insert(record.identity.clone(), Some(record.clone()));
            }
            WriteOp::ReplacePatterns { identity, .. } => {
                if row_of(&rows, committed, identity)?.is_none() {
                    return Err(CacheError::Storage(format!(
                        "pattern rows reference missing record '{}'",
                        identity
                    )));
                }
            }
            WriteOp::Delete(identity) => {
                if let Some(row) = row_of(&rows, committed, identity)? {
                    remove_row(&mut rows, &mut owners, &row);
                }
            }
            WriteOp::DeleteIfExpired { identity, now } => {
                if let Some(row) = row_of(&rows, committed, identity)? {
                    if row.is_expired_at(*now) {
                        remove_row(&mut rows, &mut owners, &row);
                    }
                }
            }
            WriteOp::RequireUnchanged(expected) => {
                if row_of(&rows, committed, &expected.identity)?.as_ref() != Some(expected) {
                    return Err(CacheError::Conflict(format!(
                        "record '{}' changed concurrently",
                        expected.identity
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Picks the most recently written record among candidates sharing a string key.
pub fn latest(records: impl IntoIterator<Item = StoredRecord>) -> Option<StoredRecord> {
    records
        .into_iter()
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identity.cmp(&b.identity))
        })
}
