//! Single-Flight Module
//!
//! Per-key mutual exclusion so concurrent misses on one key run a supplier once.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheEngine;
use crate::codec::Serializer;
use crate::error::Result;
use crate::storage::StorageBackend;

// == Single Flight ==
/// Serializes work per key. Callers on different keys never wait on each other.
///
/// A key's lock is dropped from the map once nobody holds or waits on it.
#[derive(Debug, Default)]
pub struct SingleFlight {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` while holding the lock for `key`.
    pub fn run<R>(&self, key: &str, work: impl FnOnce() -> R) -> R {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            work()
        };

        drop(lock);
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// [`CacheEngine::get_or_compute`] with concurrent misses on `key` coalesced: the
    /// first caller runs the supplier and the rest read what it stored.
    pub fn get_or_compute<T, B, S, F>(
        &self,
        engine: &CacheEngine<B, S>,
        key: &str,
        supplier: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
        B: StorageBackend,
        S: Serializer,
        F: FnOnce() -> anyhow::Result<Option<T>>,
    {
        self.run(key, || engine.get_or_compute(key, supplier))
    }

    /// Keys with a live lock.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::storage::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrent_misses_run_supplier_once() {
        let engine = CacheEngine::new(MemoryBackend::new(), CacheSettings::default());
        let flight = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let value = flight
                        .get_or_compute(&engine, "report", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(Some(42u32))
                        })
                        .unwrap();
                    assert_eq!(value, Some(42));
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[test]
    fn test_run_releases_lock() {
        let flight = SingleFlight::new();
        assert_eq!(flight.run("a", || 1 + 1), 2);
        assert_eq!(flight.run("a", || 3), 3);
        assert_eq!(flight.in_flight(), 0);
    }
}
