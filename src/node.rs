//! Borrowed views of nodes and values.

use std::fmt;

use crate::error::Result;
use crate::iter::{AddressedItems, Containers, Items, Keys, Values};
use crate::key::{DictKey, Key};
use crate::{DeepDict, Lock, NodeId, Slot};

/// Read-only view of one node of a [`DeepDict`].
pub struct NodeRef<'a, K, V> {
    tree: &'a DeepDict<K, V>,
    id: NodeId,
}

impl<K, V> Clone for NodeRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeRef<'_, K, V> {}

/// A value stored in a node: a leaf or a nested container.
pub enum Value<'a, K, V> {
    Leaf(&'a V),
    Node(NodeRef<'a, K, V>),
}

impl<K, V> Clone for Value<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Value<'_, K, V> {}

impl<'a, K, V> Value<'a, K, V> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Value::Leaf(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn as_leaf(&self) -> Option<&'a V> {
        match *self {
            Value::Leaf(v) => Some(v),
            Value::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeRef<'a, K, V>> {
        match *self {
            Value::Leaf(_) => None,
            Value::Node(n) => Some(n),
        }
    }
}

impl<'a, K: DictKey, V> NodeRef<'a, K, V> {
    #[inline]
    pub(crate) fn new(tree: &'a DeepDict<K, V>, id: NodeId) -> Self {
        Self { tree, id }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The tree this node belongs to.
    #[inline]
    pub fn tree(&self) -> &'a DeepDict<K, V> {
        self.tree
    }

    pub fn key(&self) -> Option<&'a K> {
        self.tree.key_of(self.id)
    }

    pub fn parent(&self) -> Option<NodeRef<'a, K, V>> {
        self.tree.parent(self.id).map(|p| NodeRef::new(self.tree, p))
    }

    pub fn root(&self) -> NodeRef<'a, K, V> {
        NodeRef::new(self.tree, self.tree.root_of(self.id))
    }

    pub fn depth(&self) -> usize {
        self.tree.depth(self.id)
    }

    pub fn is_root(&self) -> bool {
        self.tree.is_root(self.id)
    }

    pub fn is_locked(&self) -> bool {
        self.tree.is_locked(self.id)
    }

    pub fn lock_state(&self) -> Lock {
        self.tree.lock_state(self.id)
    }

    pub fn address(&self) -> Vec<&'a K> {
        self.tree.address(self.id)
    }

    pub fn len(&self) -> usize {
        self.tree.len(self.id)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immediate entry under `key`, like a plain map lookup.
    pub fn get(&self, key: &K) -> Option<Value<'a, K, V>> {
        let tree = self.tree;
        tree.nodes.get(self.id).slot(key).map(|slot| match slot {
            Slot::Leaf(v) => Value::Leaf(v),
            Slot::Child(c) => Value::Node(NodeRef::new(tree, *c)),
        })
    }

    /// Strict path lookup relative to this node.
    pub fn lookup(&self, key: impl Into<Key<K>>) -> Result<Value<'a, K, V>> {
        self.tree.lookup_in(self.id, key)
    }

    pub fn contains(&self, key: impl Into<Key<K>>) -> bool {
        self.tree.contains_in(self.id, key)
    }

    pub fn items(&self, deep: bool) -> Items<'a, K, V> {
        self.tree.items(self.id, deep)
    }

    pub fn keys(&self, deep: bool) -> Keys<'a, K, V> {
        self.tree.keys(self.id, deep)
    }

    pub fn values(&self, deep: bool) -> Values<'a, K, V> {
        self.tree.values(self.id, deep)
    }

    pub fn addressed_items(&self) -> AddressedItems<'a, K, V> {
        self.tree.addressed_items(self.id)
    }

    pub fn containers(&self, inclusive: bool, deep: bool) -> Containers<'a, K, V> {
        self.tree.containers(self.id, inclusive, deep)
    }
}

/// Structural equality of two subtrees: same keys, equal leaves, containers
/// matching recursively. Entry order and bookkeeping are ignored.
fn deep_eq<K: DictKey, V: PartialEq>(a: NodeRef<'_, K, V>, b: NodeRef<'_, K, V>) -> bool {
    let mut stack = vec![(a, b)];
    while let Some((a, b)) = stack.pop() {
        if a.len() != b.len() {
            return false;
        }
        for (key, va) in a.items(false) {
            match (va, b.get(key)) {
                (Value::Leaf(x), Some(Value::Leaf(y))) => {
                    if x != y {
                        return false;
                    }
                }
                (Value::Node(x), Some(Value::Node(y))) => stack.push((x, y)),
                _ => return false,
            }
        }
    }
    true
}

impl<K: DictKey, V: PartialEq> PartialEq for NodeRef<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        deep_eq(*self, *other)
    }
}

impl<K: DictKey, V: PartialEq> PartialEq for Value<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Leaf(a), Value::Leaf(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl<K: DictKey, V: fmt::Debug> fmt::Debug for NodeRef<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.items(false)).finish()
    }
}

impl<K: DictKey, V: fmt::Debug> fmt::Debug for Value<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Leaf(v) => fmt::Debug::fmt(v, f),
            Value::Node(n) => fmt::Debug::fmt(n, f),
        }
    }
}
