//! A URI-keyed map split into independently locked shards.
//!
//! Mutations lock only the shard owning the key, so writers for different
//! resources rarely contend. Whole-map reads visit shards one at a time and
//! never hold two locks at once.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use crate::uri::ResourceUri;

pub const DEFAULT_SHARDS: usize = 16;

pub struct ShardedMap<V> {
    shards: Vec<RwLock<HashMap<ResourceUri, V>>>,
}

impl<V> ShardedMap<V> {
    pub fn new(shards: usize) -> Self {
        let n = shards.max(1);
        Self {
            shards: (0..n).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &ResourceUri) -> &RwLock<HashMap<ResourceUri, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub fn insert(&self, key: ResourceUri, value: V) -> Option<V> {
        self.shard(&key).write().unwrap().insert(key, value)
    }

    pub fn remove(&self, key: &ResourceUri) -> Option<V> {
        self.shard(key).write().unwrap().remove(key)
    }

    pub fn contains_key(&self, key: &ResourceUri) -> bool {
        self.shard(key).read().unwrap().contains_key(key)
    }

    /// Read one value under its shard's read lock.
    pub fn with<R>(&self, key: &ResourceUri, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.shard(key).read().unwrap().get(key).map(f)
    }

    /// Mutate one value under its shard's write lock.
    pub fn with_mut<R>(&self, key: &ResourceUri, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.shard(key).write().unwrap().get_mut(key).map(f)
    }

    /// Insert-or-update under a single write lock.
    pub fn upsert(&self, key: ResourceUri, insert: impl FnOnce() -> V, update: impl FnOnce(&mut V)) {
        let mut shard = self.shard(&key).write().unwrap();
        match shard.get_mut(&key) {
            Some(existing) => update(existing),
            None => {
                shard.insert(key, insert());
            }
        }
    }

    /// Visit every entry, shard by shard.
    pub fn for_each(&self, mut f: impl FnMut(&ResourceUri, &V)) {
        for shard in &self.shards {
            let guard = shard.read().unwrap();
            for (k, v) in guard.iter() {
                f(k, v);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}
