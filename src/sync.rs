//! Shared access to one tree from several threads.
//!
//! `DeepDict` has no internal synchronization. `SharedDeepDict` puts the whole
//! tree behind a single reader-writer lock, so every access (including
//! vivifying lookups) is one critical section.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::key::{DictKey, Key};
use crate::node::Value;
use crate::{DeepDict, Item};

/// A cloneable handle to a tree guarded by one `RwLock`.
pub struct SharedDeepDict<K, V> {
    inner: Arc<RwLock<DeepDict<K, V>>>,
}

impl<K, V> Clone for SharedDeepDict<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: DictKey, V> SharedDeepDict<K, V> {
    pub fn new() -> Self {
        Self::from_tree(DeepDict::new())
    }

    pub fn with_config(config: Config) -> Self {
        Self::from_tree(DeepDict::with_config(config))
    }

    pub fn from_tree(tree: DeepDict<K, V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Runs `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&DeepDict<K, V>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Runs `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut DeepDict<K, V>) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Stores a leaf at `key`, returning what it displaced.
    pub fn set(&self, key: impl Into<Key<K>>, value: V) -> Result<Option<Item<K, V>>> {
        self.inner.write().set(key, value)
    }

    /// Clone of the leaf at `key` (strict lookup).
    pub fn get_cloned(&self, key: impl Into<Key<K>>) -> Result<V>
    where
        V: Clone,
    {
        match self.inner.read().lookup(key)? {
            Value::Leaf(v) => Ok(v.clone()),
            Value::Node(_) => Err(Error::expected_leaf()),
        }
    }

    pub fn contains(&self, key: impl Into<Key<K>>) -> bool {
        self.inner.read().contains(key)
    }

    pub fn remove(&self, key: impl Into<Key<K>>) -> Result<Item<K, V>> {
        self.inner.write().remove(key)
    }

    /// The tree, if this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<DeepDict<K, V>, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl<K: DictKey, V> Default for SharedDeepDict<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
