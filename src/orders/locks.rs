//! Per-position critical sections

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Position slot of one strategy on one coin
///
/// Trading keys share the slot: a signal without a key may act on any keyed
/// position of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub strategy_id: i64,
    pub coin_id: i64,
}

impl PositionKey {
    pub fn new(strategy_id: i64, coin_id: i64) -> Self {
        Self { strategy_id, coin_id }
    }
}

/// One async mutex per key, created on first use
///
/// Mutexes are never removed; the key space is bounded by strategies x coins.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { locks: DashMap::new() }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let mutex = self.mutex_for(key);
        mutex.lock_owned().await
    }

    fn mutex_for(&self, key: &K) -> Arc<Mutex<()>> {
        if let Some(mutex) = self.locks.get(key) {
            return mutex.value().clone();
        }
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}
