//! Cache Engine Module
//!
//! Orchestrates identity resolution, pattern generation, the storage transaction and the
//! statistics for every put, get, link and invalidate.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::patterns::{drop_most_specific, exact_pattern, generate_patterns, sorted};
use crate::cache::{ttl_from_millis, CachedItem, CacheStatistics, Identity, SearchParameter};
use crate::codec::{JsonSerializer, Serializer};
use crate::error::{CacheError, Result};
use crate::storage::{latest, CommitOutcome, StorageBackend, StoredRecord, WriteBatch};

/// Attempts for a parameter link racing other writers on the same record.
const LINK_ATTEMPTS: usize = 3;

// == Settings ==
/// Engine-level settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSettings {
    /// TTL applied when a caller passes none; zero or negative never expires
    pub default_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::minutes(5),
        }
    }
}

// == Degraded Search Result ==
/// Items found by a degrading search, with the parameters that finally matched.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradedSearch<T> {
    pub items: Vec<CachedItem<T>>,
    /// Empty when nothing matched at any depth
    pub matched: Vec<SearchParameter>,
}

// == Cache Engine ==
/// Hierarchical multi-key cache over a pluggable storage backend.
///
/// The engine holds no lock of its own. Atomicity of each mutation comes from the
/// backend committing one [`WriteBatch`].
#[derive(Debug)]
pub struct CacheEngine<B: StorageBackend, S: Serializer = JsonSerializer> {
    backend: B,
    serializer: S,
    stats: Arc<CacheStatistics>,
    settings: CacheSettings,
}

impl<B: StorageBackend> CacheEngine<B, JsonSerializer> {
    /// Creates an engine with the JSON codec.
    pub fn new(backend: B, settings: CacheSettings) -> Self {
        Self::with_serializer(backend, JsonSerializer::new(), settings)
    }
}

impl<B: StorageBackend, S: Serializer> CacheEngine<B, S> {
    pub fn with_serializer(backend: B, serializer: S, settings: CacheSettings) -> Self {
        Self {
            backend,
            serializer,
            stats: Arc::new(CacheStatistics::new()),
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Live counters, shared with any tier wrapped around this engine.
    pub fn stats(&self) -> &Arc<CacheStatistics> {
        &self.stats
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    // == Put ==
    /// Stores `value` under `(key, numeric_id)`, indexed by `parameters`.
    ///
    /// Replaces value, parameters, TTL and timestamp if the identity already exists. The
    /// record upsert and the pattern-index replacement commit together. `ttl` of None
    /// uses the default TTL.
    pub fn put<T: Serialize + 'static>(
        &self,
        key: &str,
        numeric_id: Option<i64>,
        parameters: &[SearchParameter],
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<Identity> {
        let identity = Identity::resolve(key, numeric_id)?;
        let encoded = self.serializer.encode(value)?;
        let parameter_bytes = self.serializer.encode_parameters(parameters)?;
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        let now = Utc::now();

        let existing = self.backend.find_by_identity(&identity)?;
        let mut batch = WriteBatch::new();

        if let Some(id) = numeric_id {
            if let Some(owner) = self.backend.find_by_numeric_id(id)? {
                if owner.identity != identity {
                    if !owner.is_expired_at(now) {
                        return Err(CacheError::Conflict(format!(
                            "numeric id {} already belongs to key '{}'",
                            id, owner.string_key
                        )));
                    }
                    batch = batch.delete_if_expired(owner.identity, now);
                }
            }
        }

        let record = StoredRecord {
            identity: identity.clone(),
            string_key: key.to_string(),
            numeric_id,
            value: encoded.bytes,
            value_type: encoded.type_tag,
            parameters: parameter_bytes,
            created_at: now,
            ttl_ms: ttl.num_milliseconds(),
        };
        let batch = batch
            .upsert_record(record)
            .replace_pattern_index(identity.clone(), generate_patterns(parameters));

        let outcome = self.backend.commit(batch)?;
        self.apply_outcome(&outcome);

        debug!(
            identity = %identity,
            update = existing.is_some(),
            parameters = parameters.len(),
            "put"
        );
        Ok(identity)
    }

    // == Point Lookups ==
    /// Returns the live value stored under `key`.
    ///
    /// A key-only record wins; otherwise the most recently written record with that key.
    pub fn get<T: DeserializeOwned + 'static>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get_item(key)?.map(|item| item.value))
    }

    pub fn get_by_id<T: DeserializeOwned + 'static>(&self, numeric_id: i64) -> Result<Option<T>> {
        Ok(self.get_item_by_id(numeric_id)?.map(|item| item.value))
    }

    pub fn get_with_id<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
        numeric_id: i64,
    ) -> Result<Option<T>> {
        Ok(self.get_item_with_id(key, numeric_id)?.map(|item| item.value))
    }

    /// Like [`get`](Self::get), returning the whole item.
    pub fn get_item<T: DeserializeOwned + 'static>(&self, key: &str) -> Result<Option<CachedItem<T>>> {
        let found = self.find_for_key(key)?;
        self.resolve_point(found)
    }

    pub fn get_item_by_id<T: DeserializeOwned + 'static>(
        &self,
        numeric_id: i64,
    ) -> Result<Option<CachedItem<T>>> {
        let found = self.backend.find_by_numeric_id(numeric_id)?;
        self.resolve_point(found)
    }

    pub fn get_item_with_id<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
        numeric_id: i64,
    ) -> Result<Option<CachedItem<T>>> {
        let identity = Identity::resolve(key, Some(numeric_id))?;
        let found = self.backend.find_by_identity(&identity)?;
        self.resolve_point(found)
    }

    // == Parameter Search ==
    /// Returns every live item whose index shares at least one pattern with `parameters`.
    ///
    /// Counts one hit for a non-empty result and one miss otherwise.
    pub fn search<T: DeserializeOwned + 'static>(
        &self,
        parameters: &[SearchParameter],
    ) -> Result<Vec<T>> {
        Ok(self
            .search_items(parameters)?
            .into_iter()
            .map(|item| item.value)
            .collect())
    }

    pub fn search_items<T: DeserializeOwned + 'static>(
        &self,
        parameters: &[SearchParameter],
    ) -> Result<Vec<CachedItem<T>>> {
        let items = if parameters.is_empty() {
            Vec::new()
        } else {
            self.load_live(&generate_patterns(parameters))?
        };
        self.record_lookup(!items.is_empty());
        Ok(items)
    }

    /// Searches for items indexed under the full level-ordered chain of `parameters`,
    /// dropping the most specific level after each empty round.
    ///
    /// `[region=us (L0), tier=gold (L1), zone=a (L2)]` tries the whole chain, then
    /// `region>tier`, then `region`. Counts once, whatever the number of rounds.
    pub fn search_with_degradation<T: DeserializeOwned + 'static>(
        &self,
        parameters: &[SearchParameter],
    ) -> Result<DegradedSearch<T>> {
        let mut current = sorted(parameters);

        while let Some(pattern) = exact_pattern(&current) {
            let items = self.load_live(&BTreeSet::from([pattern]))?;
            if !items.is_empty() {
                debug!(depth = current.len(), found = items.len(), "degraded search matched");
                self.record_lookup(true);
                return Ok(DegradedSearch {
                    items,
                    matched: current,
                });
            }
            current = drop_most_specific(&current);
        }

        self.record_lookup(false);
        Ok(DegradedSearch {
            items: Vec::new(),
            matched: Vec::new(),
        })
    }

    /// Parameter search restricted to items stored under `key`.
    ///
    /// With no parameters this is a plain key lookup.
    pub fn get_for_key<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
        parameters: &[SearchParameter],
    ) -> Result<Vec<T>> {
        if key.is_empty() {
            return Err(CacheError::empty_key());
        }
        if parameters.is_empty() {
            return Ok(self.get(key)?.into_iter().collect());
        }

        let items: Vec<T> = self
            .load_live::<T>(&generate_patterns(parameters))?
            .into_iter()
            .filter(|item| item.string_key == key)
            .map(|item| item.value)
            .collect();
        self.record_lookup(!items.is_empty());
        Ok(items)
    }

    // == Link ==
    /// Attaches a numeric id to the key-only record stored under `key`.
    ///
    /// The record moves to its new identity `key:id`: the old record and its pattern rows
    /// are deleted and the new ones written in the same commit. Value, parameters,
    /// creation time and TTL are kept.
    pub fn link_id(&self, key: &str, numeric_id: i64) -> Result<Identity> {
        let old_identity = Identity::resolve(key, None)?;
        let now = Utc::now();

        let record = match self.backend.find_by_identity(&old_identity)? {
            Some(record) if !record.is_expired_at(now) => record,
            _ => {
                let linked = self
                    .backend
                    .find_by_key(key)?
                    .into_iter()
                    .find(|r| r.numeric_id.is_some() && !r.is_expired_at(now));
                return Err(match linked {
                    Some(r) => CacheError::Conflict(format!(
                        "key '{}' is already linked to id {}",
                        key,
                        r.numeric_id.unwrap_or_default()
                    )),
                    None => CacheError::NotFound(format!("no cached item for key '{}'", key)),
                });
            }
        };

        let mut batch = WriteBatch::new();
        if let Some(owner) = self.backend.find_by_numeric_id(numeric_id)? {
            if !owner.is_expired_at(now) {
                return Err(CacheError::Conflict(format!(
                    "numeric id {} already belongs to key '{}'",
                    numeric_id, owner.string_key
                )));
            }
            batch = batch.delete_if_expired(owner.identity, now);
        }

        let parameters = self.serializer.decode_parameters(&record.parameters)?;
        let new_identity = Identity::resolve(key, Some(numeric_id))?;
        let record_snapshot = record.clone();
        let moved = StoredRecord {
            identity: new_identity.clone(),
            numeric_id: Some(numeric_id),
            ..record
        };

        let batch = batch
            .require_unchanged(record_snapshot)
            .delete_by_identity(old_identity.clone())
            .upsert_record(moved)
            .replace_pattern_index(new_identity.clone(), generate_patterns(&parameters));
        let outcome = self.backend.commit(batch)?;
        self.apply_outcome(&outcome);

        debug!(from = %old_identity, to = %new_identity, "linked numeric id");
        Ok(new_identity)
    }

    /// Adds `parameters` to the record found by `key`.
    ///
    /// Returns false when every parameter was already present (nothing is written).
    pub fn link_parameters(&self, key: &str, parameters: &[SearchParameter]) -> Result<bool> {
        if key.is_empty() {
            return Err(CacheError::empty_key());
        }
        self.with_link_retry(|| {
            let record = self
                .live(self.find_for_key(key)?)
                .ok_or_else(|| CacheError::NotFound(format!("no cached item for key '{}'", key)))?;
            self.merge_parameters(record, parameters)
        })
    }

    /// Adds `parameters` to the record owning `numeric_id`.
    pub fn link_parameters_by_id(
        &self,
        numeric_id: i64,
        parameters: &[SearchParameter],
    ) -> Result<bool> {
        self.with_link_retry(|| {
            let record = self
                .live(self.backend.find_by_numeric_id(numeric_id)?)
                .ok_or_else(|| {
                    CacheError::NotFound(format!("no cached item for id {}", numeric_id))
                })?;
            self.merge_parameters(record, parameters)
        })
    }

    /// Re-runs a read-merge-write when another writer changed the record in between.
    fn with_link_retry(&self, mut attempt: impl FnMut() -> Result<bool>) -> Result<bool> {
        let mut tries = 1;
        loop {
            match attempt() {
                Err(CacheError::Conflict(reason)) if tries < LINK_ATTEMPTS => {
                    debug!(attempt = tries, %reason, "retrying parameter link");
                    tries += 1;
                }
                result => return result,
            }
        }
    }

    fn merge_parameters(&self, record: StoredRecord, additions: &[SearchParameter]) -> Result<bool> {
        if additions.is_empty() {
            return Err(CacheError::Validation(
                "parameters to link cannot be empty".to_string(),
            ));
        }

        let mut merged = self.serializer.decode_parameters(&record.parameters)?;
        let before = merged.len();
        for parameter in additions {
            if !merged.contains(parameter) {
                merged.push(parameter.clone());
            }
        }
        if merged.len() == before {
            debug!(identity = %record.identity, "link parameters: nothing new");
            return Ok(false);
        }

        let identity = record.identity.clone();
        let updated = StoredRecord {
            parameters: self.serializer.encode_parameters(&merged)?,
            ..record.clone()
        };
        let batch = WriteBatch::new()
            .require_unchanged(record)
            .upsert_record(updated)
            .replace_pattern_index(identity.clone(), generate_patterns(&merged));
        let outcome = self.backend.commit(batch)?;
        self.apply_outcome(&outcome);

        debug!(identity = %identity, added = merged.len() - before, "linked parameters");
        Ok(true)
    }

    // == Get Or Compute ==
    /// Returns the cached value for `key`, or computes, stores and returns it.
    ///
    /// A supplier result of None is returned without caching. Concurrent misses on the
    /// same key each run the supplier; wrap the engine in
    /// [`SingleFlight`](crate::cache::SingleFlight) to coalesce them.
    pub fn get_or_compute<T, F>(&self, key: &str, supplier: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce() -> anyhow::Result<Option<T>>,
    {
        self.get_or_compute_with(key, None, &[], None, supplier)
    }

    /// Full form of [`get_or_compute`](Self::get_or_compute): the computed value is stored
    /// with the given id, parameters and TTL.
    pub fn get_or_compute_with<T, F>(
        &self,
        key: &str,
        numeric_id: Option<i64>,
        parameters: &[SearchParameter],
        ttl: Option<Duration>,
        supplier: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce() -> anyhow::Result<Option<T>>,
    {
        let cached = match numeric_id {
            Some(id) => self.get_with_id(key, id)?,
            None => self.get(key)?,
        };
        if cached.is_some() {
            return Ok(cached);
        }

        let Some(computed) = supplier().map_err(CacheError::Supplier)? else {
            return Ok(None);
        };
        self.put(key, numeric_id, parameters, &computed, ttl)?;
        Ok(Some(computed))
    }

    /// Id-only cache-aside. A computed value cannot be stored without a string key, so a
    /// miss that produces a value fails with `Validation`.
    pub fn get_or_compute_by_id<T, F>(&self, numeric_id: i64, supplier: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce() -> anyhow::Result<Option<T>>,
    {
        if let Some(value) = self.get_by_id(numeric_id)? {
            return Ok(Some(value));
        }
        match supplier().map_err(CacheError::Supplier)? {
            Some(_) => Err(CacheError::Validation(format!(
                "cannot cache a value for id {} without a string key",
                numeric_id
            ))),
            None => Ok(None),
        }
    }

    /// Parameter cache-aside. Computed results are returned but not stored.
    pub fn get_or_compute_by_parameters<T, F>(
        &self,
        parameters: &[SearchParameter],
        supplier: F,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce() -> anyhow::Result<Vec<T>>,
    {
        let cached = self.search(parameters)?;
        if !cached.is_empty() {
            return Ok(cached);
        }
        supplier().map_err(CacheError::Supplier)
    }

    // == Invalidate ==
    /// Removes every record stored under `key`, with their pattern rows.
    pub fn invalidate(&self, key: &str) -> Result<Vec<Identity>> {
        if key.is_empty() {
            return Err(CacheError::empty_key());
        }
        let identities = self
            .backend
            .find_by_key(key)?
            .into_iter()
            .map(|record| record.identity);
        self.delete_identities(identities)
    }

    pub fn invalidate_by_id(&self, numeric_id: i64) -> Result<Vec<Identity>> {
        let identities = self
            .backend
            .find_by_numeric_id(numeric_id)?
            .map(|record| record.identity);
        self.delete_identities(identities)
    }

    pub fn invalidate_with_id(&self, key: &str, numeric_id: i64) -> Result<Vec<Identity>> {
        let identity = Identity::resolve(key, Some(numeric_id))?;
        self.delete_identities([identity])
    }

    /// Removes every item whose index shares a pattern with `parameters`.
    pub fn invalidate_by_parameters(&self, parameters: &[SearchParameter]) -> Result<Vec<Identity>> {
        if parameters.is_empty() {
            return Ok(Vec::new());
        }
        let identities = self
            .backend
            .find_identities_by_patterns(&generate_patterns(parameters))?;
        self.delete_identities(identities)
    }

    /// Empties both tables and zeroes the statistics.
    ///
    /// Stored totals drop by exactly the records truncated, so a put committing
    /// alongside stays counted.
    pub fn invalidate_all(&self) -> Result<()> {
        let removed = self.backend.truncate_all()?;
        self.apply_outcome(&CommitOutcome {
            created: Vec::new(),
            removed,
        });
        self.stats.reset_activity();
        info!("invalidated all cached items");
        Ok(())
    }

    /// Deletes every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.backend.purge_expired(Utc::now())?;
        for record in &removed {
            self.stats.remove_stored(1, record.handle_count());
            self.stats.record_eviction();
        }
        Ok(removed.len())
    }

    // == Internals ==
    fn delete_identities(
        &self,
        identities: impl IntoIterator<Item = Identity>,
    ) -> Result<Vec<Identity>> {
        let batch = identities
            .into_iter()
            .fold(WriteBatch::new(), WriteBatch::delete_by_identity);
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = self.backend.commit(batch)?;
        self.apply_outcome(&outcome);
        let removed: Vec<Identity> = outcome.removed.into_iter().map(|r| r.identity).collect();
        debug!(removed = removed.len(), "invalidated");
        Ok(removed)
    }

    fn find_for_key(&self, key: &str) -> Result<Option<StoredRecord>> {
        if key.is_empty() {
            return Err(CacheError::empty_key());
        }
        let mut records = self.backend.find_by_key(key)?;
        if let Some(pos) = records.iter().position(|r| r.numeric_id.is_none()) {
            return Ok(Some(records.swap_remove(pos)));
        }
        Ok(latest(records))
    }

    fn live(&self, found: Option<StoredRecord>) -> Option<StoredRecord> {
        let now = Utc::now();
        found.filter(|record| !record.is_expired_at(now))
    }

    /// Turns a point-lookup row into a hit or a miss, expiring it lazily.
    fn resolve_point<T: DeserializeOwned + 'static>(
        &self,
        found: Option<StoredRecord>,
    ) -> Result<Option<CachedItem<T>>> {
        let now = Utc::now();
        match found {
            None => {
                self.stats.record_miss();
                Ok(None)
            }
            Some(record) if record.is_expired_at(now) => {
                let outcome = self
                    .backend
                    .commit(WriteBatch::new().delete_if_expired(record.identity.clone(), now))?;
                if outcome.removed.is_empty() {
                    warn!(identity = %record.identity, "expired record changed before lazy delete");
                } else {
                    self.stats.record_eviction();
                }
                self.apply_outcome(&outcome);
                self.stats.record_miss();
                Ok(None)
            }
            Some(record) => {
                let item = self.decode(record)?;
                self.stats.record_hit();
                Ok(Some(item))
            }
        }
    }

    /// Loads the live items indexed under any of `patterns`, in identity order.
    fn load_live<T: DeserializeOwned + 'static>(
        &self,
        patterns: &BTreeSet<String>,
    ) -> Result<Vec<CachedItem<T>>> {
        let now = Utc::now();
        let mut items = Vec::new();
        for identity in self.backend.find_identities_by_patterns(patterns)? {
            if let Some(record) = self.backend.find_by_identity(&identity)? {
                if !record.is_expired_at(now) {
                    items.push(self.decode(record)?);
                }
            }
        }
        Ok(items)
    }

    fn decode<T: DeserializeOwned + 'static>(&self, record: StoredRecord) -> Result<CachedItem<T>> {
        Ok(CachedItem {
            value: self.serializer.decode(&record.value, &record.value_type)?,
            parameters: self.serializer.decode_parameters(&record.parameters)?,
            string_key: record.string_key,
            numeric_id: record.numeric_id,
            created_at: record.created_at,
            ttl: ttl_from_millis(record.ttl_ms),
        })
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }

    fn apply_outcome(&self, outcome: &CommitOutcome) {
        for record in &outcome.created {
            self.stats.add_stored(1, record.handle_count());
        }
        for record in &outcome.removed {
            self.stats.remove_stored(1, record.handle_count());
        }
    }
}
