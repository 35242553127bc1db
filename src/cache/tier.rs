//! Tiered Cache Module
//!
//! A bounded local tier (L1) in front of a [`CacheEngine`] (L2).
//!
//! Writes go through to L2 synchronously and then populate L1. Reads try L1 first and
//! promote L2 hits. Parameter searches always go to L2, the only tier holding the pattern
//! index. L1 capacity eviction never touches L2; explicit invalidation clears both.
//!
//! Every L2 write is bracketed by [`LocalTier::begin_write`] and
//! [`LocalTier::finish_write`], which advance the tier's write epoch. An item read or
//! written in L2 is copied into L1 only if the epoch did not move meanwhile, so a row
//! superseded by a concurrent put, link or invalidation never lands in L1.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::engine::DegradedSearch;
use crate::cache::entry::is_expired_at;
use crate::cache::{
    CacheEngine, CacheStatistics, CachedItem, Identity, LruTracker, SearchParameter,
    SingleFlight, StatisticsSnapshot,
};
use crate::codec::{JsonSerializer, Serializer};
use crate::error::{CacheError, Result};
use crate::storage::StorageBackend;

// == Tier Settings ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierSettings {
    /// When false every call goes straight to L2
    pub enabled: bool,
    pub max_entries: usize,
    /// Upper bound on how long an entry stays in L1, whatever its own TTL
    pub ttl: Duration,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::seconds(60),
        }
    }
}

// == Tier Lookup ==
/// Which tier answered a point lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum TierLookup<T> {
    L1Hit(CachedItem<T>),
    /// Found in L2 and promoted into L1
    L2Hit(CachedItem<T>),
    Miss,
}

impl<T> TierLookup<T> {
    pub fn is_hit(&self) -> bool {
        !matches!(self, TierLookup::Miss)
    }

    pub fn into_item(self) -> Option<CachedItem<T>> {
        match self {
            TierLookup::L1Hit(item) | TierLookup::L2Hit(item) => Some(item),
            TierLookup::Miss => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        self.into_item().map(|item| item.value)
    }
}

// == Local Tier ==
#[derive(Debug, Clone)]
struct LocalEntry<T> {
    item: CachedItem<T>,
    stored_at: DateTime<Utc>,
}

/// Capacity-bounded, LRU-ordered map of items by identity, with key and id handles.
#[derive(Debug)]
pub struct LocalTier<T> {
    max_entries: usize,
    ttl: Duration,
    entries: HashMap<Identity, LocalEntry<T>>,
    /// Identity a key lookup resolved to
    by_key: HashMap<String, Identity>,
    by_id: HashMap<i64, Identity>,
    lru: LruTracker<Identity>,
    /// Advanced when any L2 write begins or ends
    epoch: u64,
}

impl<T: Clone> LocalTier<T> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            entries: HashMap::new(),
            by_key: HashMap::new(),
            by_id: HashMap::new(),
            lru: LruTracker::new(),
            epoch: 0,
        }
    }

    // == Write Epoch ==
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Marks the start of an L2 write. Returns the ticket for `finish_write`.
    pub fn begin_write(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Marks the end of the write opened with `ticket`.
    ///
    /// Returns true when no other write began or ended in between.
    pub fn finish_write(&mut self, ticket: u64) -> bool {
        let alone = self.epoch == ticket;
        self.epoch += 1;
        alone
    }

    pub fn get(&mut self, identity: &Identity) -> Option<CachedItem<T>> {
        let now = Utc::now();
        let expired = self.entries.get(identity)?.is_expired_at(now, self.ttl);
        if expired {
            self.remove(identity);
            return None;
        }
        self.lru.touch(identity);
        self.entries.get(identity).map(|entry| entry.item.clone())
    }

    pub fn get_by_key(&mut self, key: &str) -> Option<CachedItem<T>> {
        let identity = self.by_key.get(key)?.clone();
        self.get(&identity)
    }

    pub fn get_by_id(&mut self, numeric_id: i64) -> Option<CachedItem<T>> {
        let identity = self.by_id.get(&numeric_id)?.clone();
        self.get(&identity)
    }

    /// Stores `item`, evicting least recently used entries beyond capacity.
    ///
    /// With `key_handle` set, later key lookups resolve to this item. Returns the
    /// identities evicted to make room.
    pub fn insert(&mut self, identity: Identity, item: CachedItem<T>, key_handle: bool) -> Vec<Identity> {
        if self.max_entries == 0 {
            return Vec::new();
        }

        if key_handle {
            self.by_key.insert(item.string_key.clone(), identity.clone());
        }
        if let Some(id) = item.numeric_id {
            self.by_id.insert(id, identity.clone());
        }
        self.entries.insert(
            identity.clone(),
            LocalEntry {
                item,
                stored_at: Utc::now(),
            },
        );
        self.lru.touch(&identity);

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries {
            let Some(oldest) = self.lru.evict_oldest() else {
                break;
            };
            self.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    pub fn remove(&mut self, identity: &Identity) -> bool {
        let Some(entry) = self.entries.remove(identity) else {
            return false;
        };
        self.lru.remove(identity);
        if self.by_key.get(&entry.item.string_key) == Some(identity) {
            self.by_key.remove(&entry.item.string_key);
        }
        if let Some(id) = entry.item.numeric_id {
            if self.by_id.get(&id) == Some(identity) {
                self.by_id.remove(&id);
            }
        }
        true
    }

    /// Drops the key handle and every entry stored under `key`.
    pub fn remove_key(&mut self, key: &str) {
        self.by_key.remove(key);
        let stale: Vec<Identity> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.item.string_key == key)
            .map(|(identity, _)| identity.clone())
            .collect();
        for identity in stale {
            self.remove(&identity);
        }
    }

    pub fn remove_id(&mut self, numeric_id: i64) {
        if let Some(identity) = self.by_id.remove(&numeric_id) {
            self.remove(&identity);
        }
    }

    /// Drops every entry reachable through `key` or `numeric_id`.
    pub fn remove_handles(&mut self, key: &str, numeric_id: Option<i64>) {
        self.remove_key(key);
        if let Some(id) = numeric_id {
            self.remove_id(id);
        }
    }

    pub fn remove_all(&mut self, identities: &[Identity]) {
        for identity in identities {
            self.remove(identity);
        }
    }

    /// Drops entries past their own TTL or the tier bound. Returns how many.
    pub fn purge_expired(&mut self) -> usize {
        let now = Utc::now();
        let expired: Vec<Identity> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now, self.ttl))
            .map(|(identity, _)| identity.clone())
            .collect();
        for identity in &expired {
            self.remove(identity);
        }
        expired.len()
    }

    /// Empties the tier. The write epoch keeps counting.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_key.clear();
        self.by_id.clear();
        self.lru.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.contains_key(identity)
    }
}

impl<T> LocalEntry<T> {
    fn is_expired_at(&self, now: DateTime<Utc>, bound: Duration) -> bool {
        self.item.is_expired() || is_expired_at(self.stored_at, bound, now)
    }
}

// == Tiered Cache ==
/// Two-tier read path over one engine, for values of a single type `T`.
#[derive(Debug)]
pub struct TieredCache<T, B: StorageBackend, S: Serializer = JsonSerializer> {
    engine: CacheEngine<B, S>,
    local: Option<Mutex<LocalTier<T>>>,
    flight: SingleFlight,
}

impl<T, B, S> TieredCache<T, B, S>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
    B: StorageBackend,
    S: Serializer,
{
    pub fn new(engine: CacheEngine<B, S>, settings: TierSettings) -> Self {
        let local = settings
            .enabled
            .then(|| Mutex::new(LocalTier::new(settings.max_entries, settings.ttl)));
        Self {
            engine,
            local,
            flight: SingleFlight::new(),
        }
    }

    pub fn engine(&self) -> &CacheEngine<B, S> {
        &self.engine
    }

    pub fn stats(&self) -> &CacheStatistics {
        self.engine.stats()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.engine.stats().snapshot()
    }

    /// Entries currently held in L1.
    pub fn local_len(&self) -> usize {
        self.local.as_ref().map_or(0, |local| local.lock().len())
    }

    pub fn l1_enabled(&self) -> bool {
        self.local.is_some()
    }

    // == Put ==
    /// Writes through to L2, then stores the item in L1.
    ///
    /// L1 is left untouched when the L2 write fails. When another write overlapped this
    /// one, the key's L1 entries are dropped instead, since either write may have reached
    /// L2 last.
    pub fn put(
        &self,
        key: &str,
        numeric_id: Option<i64>,
        parameters: &[SearchParameter],
        value: T,
        ttl: Option<Duration>,
    ) -> Result<Identity> {
        let ticket = self.begin_write();
        let identity = match self.engine.put(key, numeric_id, parameters, &value, ttl) {
            Ok(identity) => identity,
            Err(e) => {
                self.finish_write(ticket, |_, _| {});
                self.count_l2_error(&e);
                return Err(e);
            }
        };
        self.stats().record_l2_put();

        let ttl = ttl.unwrap_or(self.engine.settings().default_ttl);
        self.finish_write(ticket, |local, alone| {
            if !alone {
                debug!(key, "overlapping writes, dropping L1 copy");
                local.remove_handles(key, numeric_id);
                return;
            }
            if numeric_id.is_some() {
                // a key-only record may still win key lookups
                local.by_key.remove(key);
            }
            let item = CachedItem::new(key, numeric_id, value, parameters.to_vec(), ttl);
            let evicted = local.insert(identity.clone(), item, numeric_id.is_none());
            self.stats().record_l1_put();
            self.count_l1_evictions(&evicted);
        });
        Ok(identity)
    }

    // == Point Lookups ==
    pub fn lookup(&self, key: &str) -> Result<TierLookup<T>> {
        if let Some(item) = self.local_get(|local| local.get_by_key(key)) {
            return Ok(TierLookup::L1Hit(item));
        }
        let observed = self.epoch();
        let found = self.engine.get_item(key);
        self.promote(observed, found, true)
    }

    pub fn lookup_by_id(&self, numeric_id: i64) -> Result<TierLookup<T>> {
        if let Some(item) = self.local_get(|local| local.get_by_id(numeric_id)) {
            return Ok(TierLookup::L1Hit(item));
        }
        let observed = self.epoch();
        let found = self.engine.get_item_by_id(numeric_id);
        self.promote(observed, found, false)
    }

    pub fn lookup_with_id(&self, key: &str, numeric_id: i64) -> Result<TierLookup<T>> {
        let identity = Identity::resolve(key, Some(numeric_id))?;
        if let Some(item) = self.local_get(|local| local.get(&identity)) {
            return Ok(TierLookup::L1Hit(item));
        }
        let observed = self.epoch();
        let found = self.engine.get_item_with_id(key, numeric_id);
        self.promote(observed, found, false)
    }

    pub fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.lookup(key)?.into_value())
    }

    pub fn get_by_id(&self, numeric_id: i64) -> Result<Option<T>> {
        Ok(self.lookup_by_id(numeric_id)?.into_value())
    }

    pub fn get_with_id(&self, key: &str, numeric_id: i64) -> Result<Option<T>> {
        Ok(self.lookup_with_id(key, numeric_id)?.into_value())
    }

    // == Search ==
    pub fn search(&self, parameters: &[SearchParameter]) -> Result<Vec<CachedItem<T>>> {
        self.engine.search_items(parameters)
    }

    pub fn search_with_degradation(
        &self,
        parameters: &[SearchParameter],
    ) -> Result<DegradedSearch<T>> {
        self.engine.search_with_degradation(parameters)
    }

    pub fn get_for_key(&self, key: &str, parameters: &[SearchParameter]) -> Result<Vec<T>> {
        self.engine.get_for_key(key, parameters)
    }

    // == Link ==
    pub fn link_id(&self, key: &str, numeric_id: i64) -> Result<Identity> {
        self.write_l2(
            || self.engine.link_id(key, numeric_id),
            |local, _| local.remove_handles(key, Some(numeric_id)),
        )
    }

    pub fn link_parameters(&self, key: &str, parameters: &[SearchParameter]) -> Result<bool> {
        self.write_l2(
            || self.engine.link_parameters(key, parameters),
            |local, changed| {
                if *changed {
                    local.remove_key(key);
                }
            },
        )
    }

    pub fn link_parameters_by_id(
        &self,
        numeric_id: i64,
        parameters: &[SearchParameter],
    ) -> Result<bool> {
        self.write_l2(
            || self.engine.link_parameters_by_id(numeric_id, parameters),
            |local, changed| {
                if *changed {
                    local.remove_id(numeric_id);
                }
            },
        )
    }

    // == Get Or Compute ==
    /// Cache-aside through both tiers. Concurrent misses on one key run `supplier` once.
    pub fn get_or_compute<F>(&self, key: &str, supplier: F) -> Result<Option<T>>
    where
        F: FnOnce() -> anyhow::Result<Option<T>>,
    {
        self.flight.run(key, || -> Result<Option<T>> {
            if let Some(value) = self.get(key)? {
                return Ok(Some(value));
            }
            let Some(computed) = supplier().map_err(CacheError::Supplier)? else {
                return Ok(None);
            };
            self.put(key, None, &[], computed.clone(), None)?;
            Ok(Some(computed))
        })
    }

    // == Invalidate ==
    /// Removes `key` from both tiers.
    pub fn invalidate(&self, key: &str) -> Result<Vec<Identity>> {
        self.write_l2(
            || self.engine.invalidate(key),
            |local, removed| {
                local.remove_key(key);
                local.remove_all(removed);
            },
        )
    }

    pub fn invalidate_by_id(&self, numeric_id: i64) -> Result<Vec<Identity>> {
        self.write_l2(
            || self.engine.invalidate_by_id(numeric_id),
            |local, removed| {
                local.remove_all(removed);
                local.remove_id(numeric_id);
            },
        )
    }

    pub fn invalidate_with_id(&self, key: &str, numeric_id: i64) -> Result<Vec<Identity>> {
        let identity = Identity::resolve(key, Some(numeric_id))?;
        self.write_l2(
            || self.engine.invalidate_with_id(key, numeric_id),
            |local, removed| {
                local.remove(&identity);
                local.remove_all(removed);
            },
        )
    }

    pub fn invalidate_by_parameters(&self, parameters: &[SearchParameter]) -> Result<Vec<Identity>> {
        self.write_l2(
            || self.engine.invalidate_by_parameters(parameters),
            |local, removed| local.remove_all(removed),
        )
    }

    pub fn invalidate_all(&self) -> Result<()> {
        self.write_l2(|| self.engine.invalidate_all(), |local, _| local.clear())
    }

    /// Purges expired entries from both tiers. Returns how many L2 records were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.engine.purge_expired()?;
        let local = self.local.as_ref().map_or(0, |local| local.lock().purge_expired());
        if local > 0 {
            debug!(removed = local, "purged expired L1 entries");
        }
        Ok(removed)
    }

    // == Internals ==
    fn local_get(
        &self,
        read: impl FnOnce(&mut LocalTier<T>) -> Option<CachedItem<T>>,
    ) -> Option<CachedItem<T>> {
        let local = self.local.as_ref()?;
        match read(&mut local.lock()) {
            Some(item) => {
                self.stats().record_l1_hit();
                self.stats().record_hit();
                Some(item)
            }
            None => {
                self.stats().record_l1_miss();
                None
            }
        }
    }

    /// Copies an L2 hit into L1 unless a write moved the epoch past `observed`.
    fn promote(
        &self,
        observed: u64,
        found: Result<Option<CachedItem<T>>>,
        key_handle: bool,
    ) -> Result<TierLookup<T>> {
        let found = found.inspect_err(|e| self.count_l2_error(e))?;
        let Some(item) = found else {
            self.stats().record_l2_miss();
            return Ok(TierLookup::Miss);
        };
        self.stats().record_l2_hit();

        if let Some(local) = &self.local {
            let identity = item.identity()?;
            let mut local = local.lock();
            if local.epoch() == observed {
                let evicted = local.insert(identity, item.clone(), key_handle);
                self.count_l1_evictions(&evicted);
            } else {
                debug!(identity = %identity, "write during L2 read, not promoting");
            }
        }
        Ok(TierLookup::L2Hit(item))
    }

    fn epoch(&self) -> u64 {
        self.local.as_ref().map_or(0, |local| local.lock().epoch())
    }

    fn begin_write(&self) -> u64 {
        self.local.as_ref().map_or(0, |local| local.lock().begin_write())
    }

    /// Closes the write opened with `ticket` and hands `settle` the tier under the same lock.
    fn finish_write(&self, ticket: u64, settle: impl FnOnce(&mut LocalTier<T>, bool)) {
        if let Some(local) = &self.local {
            let mut local = local.lock();
            let alone = local.finish_write(ticket);
            settle(&mut local, alone);
        }
    }

    /// Runs an L2 write inside an epoch bracket, then lets `evict` drop what it replaced.
    fn write_l2<R>(
        &self,
        write: impl FnOnce() -> Result<R>,
        evict: impl FnOnce(&mut LocalTier<T>, &R),
    ) -> Result<R> {
        let ticket = self.begin_write();
        let result = write();
        self.finish_write(ticket, |local, _| {
            if let Ok(done) = &result {
                evict(local, done);
            }
        });
        result
    }

    fn count_l2_error(&self, error: &CacheError) {
        if error.is_backend_failure() {
            self.stats().record_l2_error();
            warn!(error = %error, "L2 operation failed");
        }
    }

    fn count_l1_evictions(&self, evicted: &[Identity]) {
        for identity in evicted {
            debug!(identity = %identity, "L1 capacity eviction");
            self.stats().record_l1_eviction();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::storage::MemoryBackend;
    use std::thread::sleep;

    fn tiered(max_entries: usize) -> TieredCache<String, MemoryBackend> {
        let engine = CacheEngine::new(MemoryBackend::new(), CacheSettings::default());
        TieredCache::new(
            engine,
            TierSettings {
                max_entries,
                ..TierSettings::default()
            },
        )
    }

    fn p(name: &str, value: &str, level: i32) -> SearchParameter {
        SearchParameter::new(name, value, level)
    }

    #[test]
    fn test_put_then_get_hits_l1() {
        let cache = tiered(10);
        cache.put("k", None, &[], "v".to_string(), None).unwrap();

        assert!(matches!(cache.lookup("k").unwrap(), TierLookup::L1Hit(_)));
        let snap = cache.statistics();
        assert_eq!(snap.l1.hits, 1);
        assert_eq!(snap.l2.puts, 1);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.requests, 1);
    }

    #[test]
    fn test_l2_hit_promotes_into_l1() {
        let cache = tiered(10);
        cache
            .engine()
            .put("k", Some(3), &[], &"v".to_string(), None)
            .unwrap();

        assert!(matches!(cache.lookup_by_id(3).unwrap(), TierLookup::L2Hit(_)));
        assert!(matches!(cache.lookup_by_id(3).unwrap(), TierLookup::L1Hit(_)));

        let snap = cache.statistics();
        assert_eq!(snap.l1.misses, 1);
        assert_eq!(snap.l2.hits, 1);
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.requests, 2);
    }

    #[test]
    fn test_l1_eviction_keeps_l2_copy() {
        let cache = tiered(2);
        for key in ["a", "b", "c"] {
            cache.put(key, None, &[], key.to_string(), None).unwrap();
        }

        assert_eq!(cache.local_len(), 2);
        assert_eq!(cache.statistics().l1.evictions, 1);
        assert!(matches!(cache.lookup("a").unwrap(), TierLookup::L2Hit(_)));
        assert_eq!(cache.engine().backend().record_count().unwrap(), 3);
    }

    #[test]
    fn test_invalidate_clears_both_tiers() {
        let cache = tiered(10);
        cache.put("k", Some(1), &[p("g", "x", 0)], "v".to_string(), None).unwrap();
        cache.put("j", None, &[p("g", "x", 0)], "w".to_string(), None).unwrap();

        cache.invalidate_by_id(1).unwrap();
        assert!(matches!(cache.lookup_by_id(1).unwrap(), TierLookup::Miss));

        cache.invalidate_by_parameters(&[p("g", "x", 0)]).unwrap();
        assert!(matches!(cache.lookup("j").unwrap(), TierLookup::Miss));
        assert_eq!(cache.local_len(), 0);
    }

    #[test]
    fn test_link_id_drops_stale_l1_entry() {
        let cache = tiered(10);
        cache.put("k", None, &[], "v".to_string(), None).unwrap();
        cache.link_id("k", 9).unwrap();

        assert_eq!(cache.get_by_id(9).unwrap().as_deref(), Some("v"));
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(cache.engine().backend().record_count().unwrap(), 1);
    }

    #[test]
    fn test_local_ttl_bound() {
        let engine = CacheEngine::new(MemoryBackend::new(), CacheSettings::default());
        let cache: TieredCache<String, _> = TieredCache::new(
            engine,
            TierSettings {
                ttl: Duration::milliseconds(30),
                ..TierSettings::default()
            },
        );
        cache.put("k", None, &[], "v".to_string(), None).unwrap();
        sleep(std::time::Duration::from_millis(60));

        assert!(matches!(cache.lookup("k").unwrap(), TierLookup::L2Hit(_)));
    }

    #[test]
    fn test_disabled_tier_goes_to_l2() {
        let engine = CacheEngine::new(MemoryBackend::new(), CacheSettings::default());
        let cache: TieredCache<String, _> = TieredCache::new(
            engine,
            TierSettings {
                enabled: false,
                ..TierSettings::default()
            },
        );
        cache.put("k", None, &[], "v".to_string(), None).unwrap();

        assert!(!cache.l1_enabled());
        assert!(matches!(cache.lookup("k").unwrap(), TierLookup::L2Hit(_)));
        assert_eq!(cache.statistics().l1.misses, 0);
    }

    #[test]
    fn test_get_or_compute_through_tiers() {
        let cache = tiered(10);
        let value = cache.get_or_compute("k", || Ok(Some("fresh".to_string()))).unwrap();
        assert_eq!(value.as_deref(), Some("fresh"));
        assert!(matches!(cache.lookup("k").unwrap(), TierLookup::L1Hit(_)));
    }

    #[test]
    fn test_search_reads_l2() {
        let cache = tiered(10);
        cache.put("k", None, &[p("region", "us", 0)], "v".to_string(), None).unwrap();
        let found = cache.search(&[p("region", "us", 0)]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "v");
    }

    #[test]
    fn test_write_epoch_detects_overlap() {
        let mut local: LocalTier<u32> = LocalTier::new(4, Duration::seconds(60));
        let first = local.begin_write();
        assert!(local.finish_write(first));

        let slow = local.begin_write();
        let fast = local.begin_write();
        assert!(local.finish_write(fast));
        assert!(!local.finish_write(slow));

        let observed = local.epoch();
        local.clear();
        assert_eq!(local.epoch(), observed);
    }

    #[test]
    fn test_l2_error_counts_backend_failures_only() {
        let cache = tiered(10);
        cache.put("a", Some(1), &[], "v".to_string(), None).unwrap();

        assert!(matches!(
            cache.put("b", Some(1), &[], "w".to_string(), None),
            Err(CacheError::Conflict(_))
        ));
        assert!(matches!(cache.lookup(""), Err(CacheError::Validation(_))));
        assert_eq!(cache.statistics().l2.errors, 0);
    }

    #[test]
    fn test_local_tier_handles() {
        let mut local: LocalTier<u32> = LocalTier::new(4, Duration::seconds(60));
        let item = CachedItem::new("k", Some(2), 7, Vec::new(), Duration::zero());
        let identity = item.identity().unwrap();
        local.insert(identity.clone(), item, false);

        assert!(local.get_by_key("k").is_none());
        assert_eq!(local.get_by_id(2).map(|i| i.value), Some(7));
        local.remove_key("k");
        assert!(!local.contains(&identity));
        assert!(local.is_empty());
    }
}
