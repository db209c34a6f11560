//! A hash map under one global lock, used as a reclamation client.
//!
//! The lock makes the map itself trivially correct, which is exactly the
//! point: it is the low-contention baseline workload. Values still live
//! in engine-tracked allocations and are retired on overwrite and on
//! removal, so the reclamation path is exercised without any interference
//! from data-structure races. Every operation is framed by a pin around
//! the critical section.

#![warn(missing_docs, rust_2018_idioms)]

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

use smr_core::{Smr, SmrGuard, Tracked};

/// A map from keys to engine-tracked values behind a single mutex.
pub struct Map<K, V> {
    inner: Mutex<HashMap<K, *mut Tracked<V>>>,
}

// Values are handed to whichever thread ends up freeing them.
unsafe impl<K: Send, V: Send> Send for Map<K, V> {}
unsafe impl<K: Send, V: Send> Sync for Map<K, V> {}

impl<K, V> Map<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + 'static,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Map {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts `value` under `key` if the key is vacant; returns whether
    /// it was inserted.
    pub fn insert<H: Smr>(&self, key: K, value: V, smr: &H) -> bool {
        let guard = smr.pin();
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, guard.alloc(value));
        true
    }

    /// Inserts or overwrites, returning the previous value if any. The
    /// displaced node is retired.
    pub fn put<H: Smr>(&self, key: K, value: V, smr: &H) -> Option<V> {
        let guard = smr.pin();
        let mut map = self.inner.lock().unwrap();
        let node = guard.alloc(value);
        let old = map.insert(key, node)?;
        unsafe {
            let previous = (*old).clone();
            guard.retire(old);
            Some(previous)
        }
    }

    /// Overwrites only a present key, returning the previous value. The
    /// displaced node is retired.
    pub fn replace<H: Smr>(&self, key: K, value: V, smr: &H) -> Option<V> {
        let guard = smr.pin();
        let mut map = self.inner.lock().unwrap();
        let slot = map.get_mut(&key)?;
        let old = *slot;
        *slot = guard.alloc(value);
        unsafe {
            let previous = (*old).clone();
            guard.retire(old);
            Some(previous)
        }
    }

    /// Removes `key`, returning its value. The unlinked node is retired.
    pub fn remove<H: Smr>(&self, key: &K, smr: &H) -> Option<V> {
        let guard = smr.pin();
        let mut map = self.inner.lock().unwrap();
        let node = map.remove(key)?;
        unsafe {
            let value = (*node).clone();
            guard.retire(node);
            Some(value)
        }
    }

    /// Returns a copy of the value under `key`.
    pub fn get<H: Smr>(&self, key: &K, smr: &H) -> Option<V> {
        let _guard = smr.pin();
        let map = self.inner.lock().unwrap();
        let node = *map.get(key)?;
        unsafe { Some((*node).clone()) }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for Map<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Drop for Map<K, V> {
    fn drop(&mut self) {
        for (_, node) in self.inner.get_mut().unwrap().drain() {
            unsafe { drop(Box::from_raw(node)) };
        }
    }
}

impl<K, V> fmt::Debug for Map<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Map { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::Map;

    #[test]
    fn round_trip_on_ibr() {
        let collector = smr_ibr::Collector::new();
        let handle = collector.register();
        let map = Map::new();

        assert!(map.insert(1u64, 10u64, &handle));
        assert!(!map.insert(1, 11, &handle));
        assert_eq!(map.get(&1, &handle), Some(10));

        assert_eq!(map.put(1, 12, &handle), Some(10));
        assert_eq!(map.put(2, 20, &handle), None);
        assert_eq!(map.replace(2, 21, &handle), Some(20));
        assert_eq!(map.replace(9, 90, &handle), None);

        assert_eq!(map.remove(&1, &handle), Some(12));
        assert_eq!(map.remove(&1, &handle), None);
        assert_eq!(map.get(&1, &handle), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn overwrites_and_removals_reclaim_their_nodes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROPPED: AtomicUsize = AtomicUsize::new(0);

        #[derive(Clone)]
        struct Value;

        impl Drop for Value {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::Relaxed);
            }
        }

        let collector = smr_hyaline::Collector::new();
        {
            let handle = collector.register();
            let map = Map::new();
            for i in 0..50u64 {
                map.put(i % 10, Value, &handle);
            }
            for i in 0..10u64 {
                map.remove(&i, &handle);
            }
        }
        unsafe { collector.drain_all() };
        assert_eq!(collector.leaked(), 0);
        // 50 stored values, 40 overwrite returns, 10 removal returns.
        assert_eq!(DROPPED.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn concurrent_mixed_workload() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        const THREADS: usize = 8;
        const OPS: usize = 10_000;

        let collector = smr_ibr::Collector::new();
        let map = Map::new();

        crossbeam_utils::thread::scope(|scope| {
            for t in 0..THREADS {
                let collector = &collector;
                let map = &map;
                scope.spawn(move |_| {
                    let handle = collector.register();
                    let mut rng = SmallRng::seed_from_u64(t as u64);
                    for _ in 0..OPS {
                        let key = rng.gen_range(0..100u64);
                        match rng.gen_range(0..3) {
                            0 => drop(map.put(key, key, &handle)),
                            1 => drop(map.remove(&key, &handle)),
                            _ => drop(map.get(&key, &handle)),
                        }
                    }
                });
            }
        })
        .unwrap();

        drop(map);
        unsafe { collector.drain_all() };
        assert_eq!(collector.leaked(), 0);
    }
}
