//! Key-Value Backend Module
//!
//! Maps the record and pattern tables onto a flat key-value store with prefixed keys,
//! the layout a remote store such as Redis would use:
//!
//! ```text
//! value:{identity}     -> record (JSON)
//! primary:{key}        -> identities carrying that string key (JSON array)
//! longkey:{id}         -> identity owning the numeric id
//! param:{pattern}      -> identities indexed under the pattern (JSON array)
//! patterns:{identity}  -> patterns held by the identity (JSON array)
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::Identity;
use crate::error::Result;
use crate::storage::{
    check_batch, CommitOutcome, RecordRef, RowLookup, StorageBackend,
    StoredRecord, WriteBatch, WriteOp,
};

const VALUE_PREFIX: &str = "value:";
const PRIMARY_KEY_PREFIX: &str = "primary:";
const LONG_KEY_PREFIX: &str = "longkey:";
const PARAM_PREFIX: &str = "param:";
const PATTERNS_PREFIX: &str = "patterns:";

// == KV Store Trait ==
/// A single write against a key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Set(String, Vec<u8>),
    Remove(String),
}

/// Minimal key-value store the adapter needs.
///
/// `apply` must be atomic: all ops become visible together or not at all.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
    fn apply(&self, ops: Vec<KvOp>) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

// == Memory KV Store ==
/// Ordered in-process key-value store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply(&self, ops: Vec<KvOp>) -> Result<()> {
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                KvOp::Set(key, value) => {
                    entries.insert(key, value);
                }
                KvOp::Remove(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

// == Transaction Overlay ==
/// Buffered writes over a store; reads see the buffer first.
struct Overlay<'a, S: KvStore> {
    store: &'a S,
    changes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a, S: KvStore> Overlay<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            changes: BTreeMap::new(),
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.changes.get(key) {
            Some(change) => Ok(change.clone()),
            None => self.store.get(key),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&mut self, key: String, value: &T) -> Result<()> {
        self.changes.insert(key, Some(serde_json::to_vec(value)?));
        Ok(())
    }

    fn remove(&mut self, key: String) {
        self.changes.insert(key, None);
    }

    /// Adds or removes `identity` from a JSON set, dropping the key when the set empties.
    fn update_set(&mut self, key: String, identity: &Identity, insert: bool) -> Result<()> {
        let mut members: BTreeSet<Identity> = self.get_json(&key)?.unwrap_or_default();
        if insert {
            members.insert(identity.clone());
        } else {
            members.remove(identity);
        }
        if members.is_empty() {
            self.remove(key);
            Ok(())
        } else {
            self.set_json(key, &members)
        }
    }

    fn into_ops(self) -> Vec<KvOp> {
        self.changes
            .into_iter()
            .map(|(key, change)| match change {
                Some(value) => KvOp::Set(key, value),
                None => KvOp::Remove(key),
            })
            .collect()
    }
}

fn value_key(identity: &Identity) -> String {
    format!("{}{}", VALUE_PREFIX, identity)
}

fn primary_key(key: &str) -> String {
    format!("{}{}", PRIMARY_KEY_PREFIX, key)
}

fn long_key(numeric_id: i64) -> String {
    format!("{}{}", LONG_KEY_PREFIX, numeric_id)
}

fn param_key(pattern: &str) -> String {
    format!("{}{}", PARAM_PREFIX, pattern)
}

fn patterns_key(identity: &Identity) -> String {
    format!("{}{}", PATTERNS_PREFIX, identity)
}

impl<S: KvStore> RowLookup for Overlay<'_, S> {
    fn record(&self, identity: &Identity) -> Result<Option<StoredRecord>> {
        self.get_json(&value_key(identity))
    }

    fn id_owner(&self, numeric_id: i64) -> Result<Option<Identity>> {
        self.get_json(&long_key(numeric_id))
    }
}

impl<S: KvStore> Overlay<'_, S> {
    fn upsert(&mut self, record: &StoredRecord) -> Result<bool> {
        let previous: Option<StoredRecord> = self.get_json(&value_key(&record.identity))?;
        if let Some(old_id) = previous.as_ref().and_then(|p| p.numeric_id) {
            if Some(old_id) != record.numeric_id {
                self.remove(long_key(old_id));
            }
        }

        self.set_json(value_key(&record.identity), record)?;
        self.update_set(primary_key(&record.string_key), &record.identity, true)?;
        if let Some(id) = record.numeric_id {
            self.set_json(long_key(id), &record.identity)?;
        }
        Ok(previous.is_none())
    }

    fn replace_patterns(&mut self, identity: &Identity, patterns: &BTreeSet<String>) -> Result<()> {
        self.clear_patterns(identity)?;
        for pattern in patterns {
            self.update_set(param_key(pattern), identity, true)?;
        }
        if !patterns.is_empty() {
            self.set_json(patterns_key(identity), patterns)?;
        }
        Ok(())
    }

    fn clear_patterns(&mut self, identity: &Identity) -> Result<()> {
        let held: BTreeSet<String> = self.get_json(&patterns_key(identity))?.unwrap_or_default();
        for pattern in &held {
            self.update_set(param_key(pattern), identity, false)?;
        }
        self.remove(patterns_key(identity));
        Ok(())
    }

    fn delete(&mut self, identity: &Identity) -> Result<Option<RecordRef>> {
        let Some(record) = self.get_json::<StoredRecord>(&value_key(identity))? else {
            return Ok(None);
        };
        self.remove(value_key(identity));
        self.update_set(primary_key(&record.string_key), identity, false)?;
        if let Some(id) = record.numeric_id {
            self.remove(long_key(id));
        }
        self.clear_patterns(identity)?;
        Ok(Some(record.summary()))
    }
}

// == KV Backend ==
/// Storage adapter over any [`KvStore`].
///
/// Commits are serialized by a local lock and flushed with one atomic `apply`.
#[derive(Debug, Default)]
pub struct KvBackend<S: KvStore> {
    store: S,
    commit_lock: Mutex<()>,
}

impl<S: KvStore> KvBackend<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Overlay::new(&self.store).get_json(key)
    }

    fn record_at(&self, identity: &Identity) -> Result<Option<StoredRecord>> {
        self.read_json(&value_key(identity))
    }
}

impl<S: KvStore> StorageBackend for KvBackend<S> {
    fn find_by_identity(&self, identity: &Identity) -> Result<Option<StoredRecord>> {
        self.record_at(identity)
    }

    fn find_by_key(&self, key: &str) -> Result<Vec<StoredRecord>> {
        let identities: BTreeSet<Identity> =
            self.read_json(&primary_key(key))?.unwrap_or_default();
        let mut records = Vec::with_capacity(identities.len());
        for identity in &identities {
            records.extend(self.record_at(identity)?);
        }
        Ok(records)
    }

    fn find_by_numeric_id(&self, numeric_id: i64) -> Result<Option<StoredRecord>> {
        match self.read_json::<Identity>(&long_key(numeric_id))? {
            Some(identity) => self.record_at(&identity),
            None => Ok(None),
        }
    }

    fn find_identities_by_patterns(
        &self,
        patterns: &BTreeSet<String>,
    ) -> Result<BTreeSet<Identity>> {
        let mut found = BTreeSet::new();
        for pattern in patterns {
            let members: BTreeSet<Identity> =
                self.read_json(&param_key(pattern))?.unwrap_or_default();
            found.extend(members);
        }
        Ok(found)
    }

    fn patterns_for(&self, identity: &Identity) -> Result<BTreeSet<String>> {
        Ok(self
            .read_json(&patterns_key(identity))?
            .unwrap_or_default())
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
        let _guard = self.commit_lock.lock();
        let mut overlay = Overlay::new(&self.store);
        check_batch(&batch, &overlay)?;

        let mut outcome = CommitOutcome::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Upsert(record) => {
                    if overlay.upsert(&record)? {
                        outcome.created.push(record.summary());
                    }
                }
                WriteOp::ReplacePatterns { identity, patterns } => {
                    overlay.replace_patterns(&identity, &patterns)?;
                }
                WriteOp::Delete(identity) => {
                    outcome.removed.extend(overlay.delete(&identity)?);
                }
                WriteOp::RequireUnchanged(_) => {}
                WriteOp::DeleteIfExpired { identity, now } => {
                    let expired = overlay
                        .get_json::<StoredRecord>(&value_key(&identity))?
                        .is_some_and(|record| record.is_expired_at(now));
                    if expired {
                        outcome.removed.extend(overlay.delete(&identity)?);
                    }
                }
            }
        }

        self.store.apply(overlay.into_ops())?;
        Ok(outcome)
    }

    fn truncate_all(&self) -> Result<Vec<RecordRef>> {
        let _guard = self.commit_lock.lock();
        let mut removed = Vec::new();
        for (_, bytes) in self.store.scan_prefix(VALUE_PREFIX)? {
            let record: StoredRecord = serde_json::from_slice(&bytes)?;
            removed.push(record.summary());
        }
        self.store.clear()?;
        Ok(removed)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<RecordRef>> {
        let _guard = self.commit_lock.lock();
        let mut overlay = Overlay::new(&self.store);
        let mut removed = Vec::new();

        for (_, bytes) in self.store.scan_prefix(VALUE_PREFIX)? {
            let record: StoredRecord = serde_json::from_slice(&bytes)?;
            if record.is_expired_at(now) {
                removed.extend(overlay.delete(&record.identity)?);
            }
        }

        self.store.apply(overlay.into_ops())?;
        Ok(removed)
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.store.scan_prefix(VALUE_PREFIX)?.len())
    }

    fn pattern_row_count(&self) -> Result<usize> {
        let mut rows = 0;
        for (_, bytes) in self.store.scan_prefix(PATTERNS_PREFIX)? {
            let held: BTreeSet<String> = serde_json::from_slice(&bytes)?;
            rows += held.len();
        }
        Ok(rows)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{backend_contract, patterns, record};

    #[test]
    fn test_kv_backend_contract() {
        backend_contract(&KvBackend::new(MemoryKvStore::new()));
    }

    #[test]
    fn test_key_layout() {
        let backend = KvBackend::new(MemoryKvStore::new());
        let item = record("user", Some(5), 0);
        backend
            .commit(
                WriteBatch::new()
                    .upsert_record(item.clone())
                    .replace_pattern_index(item.identity.clone(), patterns(&["L0:org=acme"])),
            )
            .unwrap();

        let store = backend.store();
        assert!(store.get("value:user:5").unwrap().is_some());
        assert!(store.get("primary:user").unwrap().is_some());
        assert!(store.get("longkey:5").unwrap().is_some());
        assert!(store.get("param:L0:org=acme").unwrap().is_some());
        assert!(store.get("patterns:user:5").unwrap().is_some());
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let backend = KvBackend::new(MemoryKvStore::new());
        let owner = record("owner", Some(1), 0);
        backend
            .commit(WriteBatch::new().upsert_record(owner))
            .unwrap();
        let before = backend.store().len();

        let result = backend.commit(
            WriteBatch::new()
                .upsert_record(record("other", None, 0))
                .upsert_record(record("thief", Some(1), 0)),
        );

        assert!(result.is_err());
        assert_eq!(backend.store().len(), before);
        assert!(backend.find_by_key("other").unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_every_key() {
        let backend = KvBackend::new(MemoryKvStore::new());
        let item = record("k", Some(9), 0);
        backend
            .commit(
                WriteBatch::new()
                    .upsert_record(item.clone())
                    .replace_pattern_index(item.identity.clone(), patterns(&["L0:a=1", "L1:b=2"])),
            )
            .unwrap();

        backend
            .commit(WriteBatch::new().delete_by_identity(item.identity))
            .unwrap();

        assert!(backend.store().is_empty());
    }
}
