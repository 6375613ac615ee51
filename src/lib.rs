//! # deepdict-rs
//!
//! An auto-vivifying, path-addressable nested map.
//!
//! Every level of a [`DeepDict`] is an ordered key/value map and a node in a
//! tree: it knows its parent, its root, its depth and the key it is stored
//! under. Accessing a missing key on an unlocked node grows a new empty level;
//! locking a node turns it back into a plain map that reports missing keys.
//!
//! ## Example
//!
//! ```rust
//! use deepdict_rs::DeepDict;
//!
//! let mut d: DeepDict<String, u64> = DeepDict::new();
//! d.set(["a", "b", "c"], 1).unwrap();
//!
//! assert_eq!(d.lookup(["a", "b", "c"]).unwrap().as_leaf(), Some(&1));
//!
//! let b = d.node_id(["a", "b"]).unwrap();
//! assert_eq!(d.depth(b), 2);
//! assert_eq!(d.root_of(b), d.root_id());
//!
//! d.lock(d.root_id());
//! assert!(d.set(["a", "x", "y"], 2).unwrap_err().is_key_not_found());
//! ```

#![forbid(unsafe_code)]

mod config;
mod error;
mod iter;
#[cfg(feature = "serde")]
mod json;
mod key;
mod node;
mod sync;

pub use config::{Config, DEFAULT_MAX_DEPTH};
pub use error::{AddressError, Error, Result};
pub use iter::{AddressedItems, Addresses, Containers, Items, Keys, Values};
pub use key::{DictKey, Key};
pub use node::{NodeRef, Value};
pub use sync::SharedDeepDict;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, trace};

// =============================================================================
// Handles and lock state
// =============================================================================

/// Non-owning handle to a node of one [`DeepDict`].
///
/// Handles stay valid until the node is removed from its tree. A handle to a
/// freed node is rejected (the generation no longer matches), and so is a
/// handle minted by another tree (the arena id no longer matches). Clones and
/// detached subtrees get arenas of their own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    arena: u32,
    index: u32,
    generation: u32,
}

/// Explicit lock setting of a node.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Lock {
    /// Use the parent's effective state (unlocked at the root).
    #[default]
    Inherit,
    Locked,
    Unlocked,
}

/// Levels an operation hangs below the container at the end of its path.
enum Growth<'k, K> {
    /// Only a leaf.
    Leaf,
    /// An empty level under the key, if it is missing.
    Vivify(&'k K),
    /// A whole tree of the given height.
    Tree(usize),
}

/// An owned value moved into or out of a tree.
pub enum Item<K, V> {
    Leaf(V),
    Tree(DeepDict<K, V>),
}

impl<K, V> Item<K, V> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Item::Leaf(_))
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Item::Tree(_))
    }

    pub fn into_leaf(self) -> Option<V> {
        match self {
            Item::Leaf(v) => Some(v),
            Item::Tree(_) => None,
        }
    }

    pub fn into_tree(self) -> Option<DeepDict<K, V>> {
        match self {
            Item::Leaf(_) => None,
            Item::Tree(t) => Some(t),
        }
    }
}

impl<K, V> From<DeepDict<K, V>> for Item<K, V> {
    fn from(tree: DeepDict<K, V>) -> Self {
        Item::Tree(tree)
    }
}

impl<K: DictKey, V: fmt::Debug> fmt::Debug for Item<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Leaf(v) => f.debug_tuple("Leaf").field(v).finish(),
            Item::Tree(t) => f.debug_tuple("Tree").field(t).finish(),
        }
    }
}

impl<K: DictKey, V: PartialEq> PartialEq for Item<K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Leaf(a), Item::Leaf(b)) => a == b,
            (Item::Tree(a), Item::Tree(b)) => a == b,
            _ => false,
        }
    }
}

// =============================================================================
// Node storage
// =============================================================================

#[derive(Clone)]
pub(crate) enum Slot<V> {
    Leaf(V),
    Child(NodeId),
}

#[derive(Clone)]
pub(crate) struct Node<K, V> {
    /// Entries in insertion order.
    pub(crate) entries: Vec<(K, Slot<V>)>,
    /// Key -> position in `entries`.
    index: HashMap<K, usize>,
    pub(crate) parent: Option<NodeId>,
    /// Root designation, propagated eagerly when the node joins a tree.
    pub(crate) root: Option<NodeId>,
    /// Key under which the node is stored in its parent.
    pub(crate) key: Option<K>,
    pub(crate) lock: Lock,
}

impl<K: DictKey, V> Node<K, V> {
    fn new(parent: Option<NodeId>, root: Option<NodeId>, key: Option<K>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            parent,
            root,
            key,
            lock: Lock::Inherit,
        }
    }

    #[inline]
    pub(crate) fn slot(&self, key: &K) -> Option<&Slot<V>> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    #[inline]
    fn slot_mut(&mut self, key: &K) -> Option<&mut Slot<V>> {
        let pos = *self.index.get(key)?;
        Some(&mut self.entries[pos].1)
    }

    /// Stores `slot` under `key`, keeping the original position of an existing
    /// entry. Returns the displaced slot.
    fn put(&mut self, key: K, slot: Slot<V>) -> Option<Slot<V>> {
        if let Some(&pos) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[pos].1, slot));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, slot));
        None
    }

    fn remove(&mut self, key: &K) -> Option<Slot<V>> {
        let pos = self.index.remove(key)?;
        let (_, slot) = self.entries.remove(pos);
        for (k, _) in &self.entries[pos..] {
            if let Some(i) = self.index.get_mut(k) {
                *i -= 1;
            }
        }
        Some(slot)
    }

    fn take_entries(&mut self) -> Vec<(K, Slot<V>)> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }
}

struct ArenaSlot<K, V> {
    generation: u32,
    node: Option<Node<K, V>>,
}

static NEXT_ARENA: AtomicU32 = AtomicU32::new(0);

fn next_arena_id() -> u32 {
    NEXT_ARENA.fetch_add(1, Ordering::Relaxed)
}

/// Slot arena owning every node of a tree, with a free list of vacated slots.
pub(crate) struct NodeArena<K, V> {
    /// Stamped into every handle this arena hands out.
    id: u32,
    slots: Vec<ArenaSlot<K, V>>,
    free: Vec<u32>,
    live: usize,
}

impl<K, V> NodeArena<K, V> {
    fn new() -> Self {
        Self {
            id: next_arena_id(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// The same slot and generation, addressed in this arena.
    #[inline]
    fn rebase(&self, id: NodeId) -> NodeId {
        NodeId {
            arena: self.id,
            ..id
        }
    }

    #[inline]
    fn check_arena(&self, id: NodeId) {
        if id.arena != self.id {
            foreign_handle(id);
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none());
            slot.node = Some(node);
            return NodeId {
                arena: self.id,
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).expect("node arena exceeds u32 slots");
        self.slots.push(ArenaSlot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            arena: self.id,
            index,
            generation: 0,
        }
    }

    /// Takes the node out of the arena; its handle becomes stale.
    fn release(&mut self, id: NodeId) -> Node<K, V> {
        self.check_arena(id);
        let slot = &mut self.slots[id.index as usize];
        assert_eq!(slot.generation, id.generation, "stale NodeId {id:?}");
        let node = slot.node.take().expect("live slot holds a node");
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        node
    }

    #[inline]
    fn contains(&self, id: NodeId) -> bool {
        id.arena == self.id
            && self
                .slots
                .get(id.index as usize)
                .is_some_and(|s| s.generation == id.generation && s.node.is_some())
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> &Node<K, V> {
        self.check_arena(id);
        match self.slots.get(id.index as usize) {
            Some(ArenaSlot {
                generation,
                node: Some(node),
            }) if *generation == id.generation => node,
            _ => panic!("stale NodeId {id:?}"),
        }
    }

    #[inline]
    fn get_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        self.check_arena(id);
        match self.slots.get_mut(id.index as usize) {
            Some(ArenaSlot {
                generation,
                node: Some(node),
            }) if *generation == id.generation => node,
            _ => panic!("stale NodeId {id:?}"),
        }
    }

    fn live(&self) -> usize {
        self.live
    }
}

#[cold]
#[inline(never)]
fn foreign_handle(id: NodeId) -> ! {
    panic!("NodeId {id:?} belongs to another tree")
}

impl<K: Clone, V: Clone> Clone for NodeArena<K, V> {
    /// Copies every node into a fresh arena, re-addressing the handles they
    /// hold.
    fn clone(&self) -> Self {
        let mut out = Self {
            id: next_arena_id(),
            slots: Vec::with_capacity(self.slots.len()),
            free: self.free.clone(),
            live: self.live,
        };
        for slot in &self.slots {
            let node = slot.node.as_ref().map(|node| {
                let mut node = node.clone();
                node.parent = node.parent.map(|p| out.rebase(p));
                node.root = node.root.map(|r| out.rebase(r));
                for (_, s) in &mut node.entries {
                    if let Slot::Child(c) = s {
                        *c = out.rebase(*c);
                    }
                }
                node
            });
            out.slots.push(ArenaSlot {
                generation: slot.generation,
                node,
            });
        }
        out
    }
}

// =============================================================================
// DeepDict
// =============================================================================

/// A tree of ordered maps addressed by keys or key paths.
///
/// Features:
/// - Auto-vivification of missing levels on unlocked nodes
/// - Tri-state locks inherited down the tree
/// - Parent/root/depth/address introspection through [`NodeId`] handles
/// - Deep, restartable traversal of leaves and containers
///
/// Methods taking a [`NodeId`] panic if the handle does not belong to a live
/// node of this tree.
pub struct DeepDict<K, V> {
    pub(crate) nodes: NodeArena<K, V>,
    root: NodeId,
    config: Config,
}

impl<K: Clone, V: Clone> Clone for DeepDict<K, V> {
    fn clone(&self) -> Self {
        let nodes = self.nodes.clone();
        let root = nodes.rebase(self.root);
        Self {
            nodes,
            root,
            config: self.config.clone(),
        }
    }
}

impl<K: DictKey, V> DeepDict<K, V> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut nodes = NodeArena::new();
        let mut root = Node::new(None, None, None);
        if config.locked {
            root.lock = Lock::Locked;
        }
        let root = nodes.alloc(root);
        Self {
            nodes,
            root,
            config,
        }
    }

    /// Builds a tree from `(path, value)` pairs, vivifying levels as needed.
    ///
    /// Nested input is flattened to paths first, or built bottom-up with
    /// [`attach`](Self::attach) for ready-made subtrees.
    pub fn try_from_iter<I, P>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, V)>,
        P: Into<Key<K>>,
    {
        let mut tree = Self::new();
        tree.try_extend(iter)?;
        Ok(tree)
    }

    /// Sets every `(path, value)` pair, stopping at the first error.
    pub fn try_extend<I, P>(&mut self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = (P, V)>,
        P: Into<Key<K>>,
    {
        for (path, value) in iter {
            self.set(path, value)?;
        }
        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// Borrowed view of the root.
    #[inline]
    pub fn root(&self) -> NodeRef<'_, K, V> {
        NodeRef::new(self, self.root)
    }

    /// Borrowed view of any node.
    #[inline]
    pub fn node(&self, id: NodeId) -> NodeRef<'_, K, V> {
        assert!(self.nodes.contains(id), "stale NodeId {id:?}");
        NodeRef::new(self, id)
    }

    /// `true` if `id` refers to a live node of this tree.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Number of nodes in the tree, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.live()
    }

    /// Number of immediate entries of a node.
    pub fn len(&self, id: NodeId) -> usize {
        self.nodes.get(id).entries.len()
    }

    pub fn is_empty(&self, id: NodeId) -> bool {
        self.len(id) == 0
    }
}

// =============================================================================
// Hierarchy introspection and locks
// =============================================================================

impl<K: DictKey, V> DeepDict<K, V> {
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).parent
    }

    /// Key under which the node is stored in its parent; `None` for the root.
    pub fn key_of(&self, id: NodeId) -> Option<&K> {
        self.nodes.get(id).key.as_ref()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.nodes.get(id).parent.is_none()
    }

    /// The designated root of the node's tree.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        loop {
            let node = self.nodes.get(cur);
            match (node.root, node.parent) {
                (_, None) => return cur,
                (Some(root), _) => return root,
                (None, Some(parent)) => cur = parent,
            }
        }
    }

    /// Distance from the root (the root is at depth 0).
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.nodes.get(id).parent;
        while let Some(p) = cur {
            depth += 1;
            cur = self.nodes.get(p).parent;
        }
        depth
    }

    /// Keys leading from the root down to the node.
    pub fn address(&self, id: NodeId) -> Vec<&K> {
        let mut out = Vec::new();
        let mut cur = self.nodes.get(id);
        while let (Some(key), Some(parent)) = (cur.key.as_ref(), cur.parent) {
            out.push(key);
            cur = self.nodes.get(parent);
        }
        out.reverse();
        out
    }

    /// Explicit lock setting of the node.
    pub fn lock_state(&self, id: NodeId) -> Lock {
        self.nodes.get(id).lock
    }

    /// Effective lock state: the nearest explicit setting walking up from the
    /// node, unlocked if none is found.
    pub fn is_locked(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            let node = self.nodes.get(cur);
            match node.lock {
                Lock::Locked => return true,
                Lock::Unlocked => return false,
                Lock::Inherit => match node.parent {
                    Some(p) => cur = p,
                    None => return false,
                },
            }
        }
    }

    /// Missing keys under this node (and inheriting descendants) are reported
    /// instead of vivified.
    pub fn lock(&mut self, id: NodeId) {
        self.set_locked(id, true);
    }

    pub fn unlock(&mut self, id: NodeId) {
        self.set_locked(id, false);
    }

    pub fn set_locked(&mut self, id: NodeId, locked: bool) {
        let lock = if locked { Lock::Locked } else { Lock::Unlocked };
        self.nodes.get_mut(id).lock = lock;
        debug!(node = ?id, ?lock, "lock state changed");
    }

    /// Containers below (and optionally including) a node, depth-first
    /// pre-order. With `deep == false` only direct children are produced.
    pub fn containers(&self, id: NodeId, inclusive: bool, deep: bool) -> Containers<'_, K, V> {
        Containers::new(self, id, inclusive, deep)
    }

    /// Immediate `(key, value)` pairs, or every leaf pair when `deep`.
    pub fn items(&self, id: NodeId, deep: bool) -> Items<'_, K, V> {
        Items::new(self, id, deep)
    }

    pub fn keys(&self, id: NodeId, deep: bool) -> Keys<'_, K, V> {
        Keys::new(self.items(id, deep))
    }

    pub fn values(&self, id: NodeId, deep: bool) -> Values<'_, K, V> {
        Values::new(self.items(id, deep))
    }

    /// Every leaf below a node with its path relative to that node.
    pub fn addressed_items(&self, id: NodeId) -> AddressedItems<'_, K, V> {
        AddressedItems::new(self, id)
    }

    pub fn addresses(&self, id: NodeId) -> Addresses<'_, K, V> {
        Addresses::new(self.addressed_items(id))
    }

    fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max = max.max(depth);
            for (_, slot) in &self.nodes.get(id).entries {
                if let Slot::Child(c) = slot {
                    stack.push((*c, depth + 1));
                }
            }
        }
        max
    }
}

// =============================================================================
// Strict lookup
// =============================================================================

impl<K: DictKey, V> DeepDict<K, V> {
    /// Walks `path` without creating anything; every segment must be a
    /// container.
    fn walk(&self, from: NodeId, path: &[K]) -> Result<NodeId> {
        let mut cur = from;
        for seg in path {
            match self.nodes.get(cur).slot(seg) {
                Some(Slot::Child(c)) => cur = *c,
                Some(Slot::Leaf(_)) => return Err(Error::not_a_container(seg)),
                None => return Err(Error::key_not_found(seg)),
            }
        }
        Ok(cur)
    }

    fn value_at(&self, node: NodeId, key: &K) -> Option<Value<'_, K, V>> {
        self.nodes.get(node).slot(key).map(|slot| match slot {
            Slot::Leaf(v) => Value::Leaf(v),
            Slot::Child(c) => Value::Node(NodeRef::new(self, *c)),
        })
    }

    /// Strict lookup from the root. Never creates levels; missing keys are
    /// `KeyNotFound` whatever the lock state.
    pub fn lookup(&self, key: impl Into<Key<K>>) -> Result<Value<'_, K, V>> {
        self.lookup_in(self.root, key)
    }

    pub fn lookup_in(&self, node: NodeId, key: impl Into<Key<K>>) -> Result<Value<'_, K, V>> {
        let key = key.into();
        let (last, init) = split_path(&key)?;
        let parent = self.walk(node, init)?;
        self.value_at(parent, last)
            .ok_or_else(|| Error::key_not_found(last))
    }

    pub fn contains(&self, key: impl Into<Key<K>>) -> bool {
        self.contains_in(self.root, key)
    }

    pub fn contains_in(&self, node: NodeId, key: impl Into<Key<K>>) -> bool {
        self.lookup_in(node, key).is_ok()
    }

    /// Handle of the container stored at `key` (strict).
    pub fn node_id(&self, key: impl Into<Key<K>>) -> Result<NodeId> {
        self.node_id_in(self.root, key)
    }

    pub fn node_id_in(&self, node: NodeId, key: impl Into<Key<K>>) -> Result<NodeId> {
        match self.lookup_in(node, key)? {
            Value::Node(n) => Ok(n.id()),
            Value::Leaf(_) => Err(Error::expected_container()),
        }
    }

    /// Mutable access to an existing leaf (strict).
    pub fn get_leaf_mut(&mut self, key: impl Into<Key<K>>) -> Result<&mut V> {
        self.get_leaf_mut_in(self.root, key)
    }

    pub fn get_leaf_mut_in(&mut self, node: NodeId, key: impl Into<Key<K>>) -> Result<&mut V> {
        let key = key.into();
        let (last, init) = split_path(&key)?;
        let parent = self.walk(node, init)?;
        match self.nodes.get_mut(parent).slot_mut(last) {
            Some(Slot::Leaf(v)) => Ok(v),
            Some(Slot::Child(_)) => Err(Error::expected_leaf()),
            None => Err(Error::key_not_found(last)),
        }
    }
}

// =============================================================================
// Missing-key policy and vivifying access
// =============================================================================

impl<K: DictKey, V> DeepDict<K, V> {
    /// Creates an empty child of `parent` under `key`, unless the parent is
    /// locked or the child would be too deep. `parent_depth` is the depth of
    /// `parent`.
    fn vivify(&mut self, parent: NodeId, key: &K, parent_depth: usize) -> Result<NodeId> {
        if self.is_locked(parent) {
            debug!(node = ?parent, ?key, "refusing to vivify under locked node");
            return Err(Error::key_not_found(key));
        }
        if parent_depth + 1 > self.config.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        let root = self.root_of(parent);
        let child = self
            .nodes
            .alloc(Node::new(Some(parent), Some(root), Some(key.clone())));
        self.nodes
            .get_mut(parent)
            .put(key.clone(), Slot::Child(child));
        trace!(parent = ?parent, ?key, depth = parent_depth + 1, "vivified level");
        Ok(child)
    }

    /// Follows the existing part of `path` below `from` without creating
    /// anything. Returns the deepest container reached and how many segments
    /// it consumed.
    fn existing_prefix(&self, from: NodeId, path: &[K]) -> Result<(NodeId, usize)> {
        let mut cur = from;
        for (i, seg) in path.iter().enumerate() {
            match self.nodes.get(cur).slot(seg) {
                Some(Slot::Child(c)) => cur = *c,
                Some(Slot::Leaf(_)) => return Err(Error::not_a_container(seg)),
                None => return Ok((cur, i)),
            }
        }
        Ok((cur, path.len()))
    }

    /// Walks `path`, creating missing levels where the governing node allows
    /// it. Returns the final container and its depth.
    ///
    /// Lock and depth are checked for the whole operation (including what
    /// `growth` hangs below the final container) before the first level is
    /// created, so a failed call leaves the tree as it was.
    fn descend(
        &mut self,
        from: NodeId,
        path: &[K],
        growth: Growth<'_, K>,
    ) -> Result<(NodeId, usize)> {
        let base = self.depth(from);
        let (mut cur, found) = self.existing_prefix(from, path)?;
        let missing = &path[found..];
        if let Some(first) = missing.first() {
            if self.is_locked(cur) {
                debug!(node = ?cur, key = ?first, "refusing to vivify under locked node");
                return Err(Error::key_not_found(first));
            }
        }

        let end = base + path.len();
        let deepest = match growth {
            Growth::Leaf => end,
            Growth::Vivify(last) => {
                let creates_last = !missing.is_empty()
                    || (self.nodes.get(cur).slot(last).is_none() && !self.is_locked(cur));
                end + usize::from(creates_last)
            }
            Growth::Tree(height) => end + 1 + height,
        };
        if deepest > self.config.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.config.max_depth,
            });
        }

        let mut depth = base + found;
        for seg in missing {
            cur = self.vivify(cur, seg, depth)?;
            depth += 1;
        }
        Ok((cur, depth))
    }

    /// Resolves `key` below `node`, creating every missing level on the way
    /// and returning the container at the end of the path.
    ///
    /// A locked node reports its first missing key as `KeyNotFound`; a leaf in
    /// the middle of the path is an address error. A leaf at its end is a
    /// type mismatch, since only containers have handles; use
    /// [`get_in`](Self::get_in) to read whatever the key holds.
    pub fn resolve_missing(&mut self, node: NodeId, key: impl Into<Key<K>>) -> Result<NodeId> {
        let key = key.into();
        let (last, init) = split_path(&key)?;
        let (parent, depth) = self.descend(node, init, Growth::Vivify(last))?;
        match self.nodes.get(parent).slot(last) {
            Some(Slot::Child(c)) => Ok(*c),
            Some(Slot::Leaf(_)) => Err(Error::expected_container()),
            None => self.vivify(parent, last, depth),
        }
    }

    /// Looks up `key` from the root, auto-vivifying missing levels.
    pub fn get(&mut self, key: impl Into<Key<K>>) -> Result<Value<'_, K, V>> {
        let root = self.root;
        self.get_in(root, key)
    }

    /// Looks up `key` below `node`. Missing levels (including the last one)
    /// are created as empty containers when the governing node is unlocked.
    pub fn get_in(&mut self, node: NodeId, key: impl Into<Key<K>>) -> Result<Value<'_, K, V>> {
        let key = key.into();
        let (last, init) = split_path(&key)?;
        let (parent, depth) = self.descend(node, init, Growth::Vivify(last))?;
        if self.nodes.get(parent).slot(last).is_none() {
            self.vivify(parent, last, depth)?;
        }
        self.value_at(parent, last)
            .ok_or_else(|| Error::key_not_found(last))
    }
}

// =============================================================================
// Assignment, splicing and removal
// =============================================================================

impl<K: DictKey, V> DeepDict<K, V> {
    /// Stores a leaf at `key` (from the root), returning what it displaced.
    pub fn set(&mut self, key: impl Into<Key<K>>, value: V) -> Result<Option<Item<K, V>>> {
        let root = self.root;
        self.set_in(root, key, value)
    }

    pub fn set_in(
        &mut self,
        node: NodeId,
        key: impl Into<Key<K>>,
        value: V,
    ) -> Result<Option<Item<K, V>>> {
        self.place(node, key.into(), Item::Leaf(value))
            .map(|(_, old)| old)
    }

    /// Moves a standalone tree under `key` (from the root). The tree's root
    /// becomes a container of this tree; whatever `key` held before is dropped.
    pub fn attach(&mut self, key: impl Into<Key<K>>, tree: DeepDict<K, V>) -> Result<NodeId> {
        let root = self.root;
        self.attach_in(root, key, tree)
    }

    pub fn attach_in(
        &mut self,
        node: NodeId,
        key: impl Into<Key<K>>,
        tree: DeepDict<K, V>,
    ) -> Result<NodeId> {
        let (placed, _) = self.place(node, key.into(), Item::Tree(tree))?;
        placed.ok_or_else(Error::expected_container)
    }

    /// Stores a leaf or splices a tree at `key` below `node`.
    pub fn insert_in(
        &mut self,
        node: NodeId,
        key: impl Into<Key<K>>,
        item: Item<K, V>,
    ) -> Result<Option<Item<K, V>>> {
        self.place(node, key.into(), item).map(|(_, old)| old)
    }

    fn place(
        &mut self,
        node: NodeId,
        key: Key<K>,
        item: Item<K, V>,
    ) -> Result<(Option<NodeId>, Option<Item<K, V>>)> {
        let (last, init) = split_path(&key)?;
        let growth = match &item {
            Item::Leaf(_) => Growth::Leaf,
            Item::Tree(tree) => Growth::Tree(tree.height()),
        };
        let (parent, _) = self.descend(node, init, growth)?;
        // A path may only add entries where the layout is open; a single key is
        // a plain map insert.
        if matches!(key, Key::Path(_))
            && self.nodes.get(parent).slot(last).is_none()
            && self.is_locked(parent)
        {
            debug!(node = ?parent, key = ?last, "refusing new entry under locked node");
            return Err(Error::key_not_found(last));
        }

        let (slot, placed) = match item {
            Item::Leaf(v) => (Slot::Leaf(v), None),
            Item::Tree(tree) => {
                let id = self.splice(tree, parent, last.clone());
                (Slot::Child(id), Some(id))
            }
        };

        let old = self.nodes.get_mut(parent).put(last.clone(), slot);
        Ok((placed, old.map(|old| self.take_slot(old))))
    }

    /// Removes the entry at `key` (from the root). Never vivifies.
    pub fn remove(&mut self, key: impl Into<Key<K>>) -> Result<Item<K, V>> {
        let root = self.root;
        self.remove_in(root, key)
    }

    /// Removes the entry at `key` below `node`. A removed container comes back
    /// as a standalone tree.
    pub fn remove_in(&mut self, node: NodeId, key: impl Into<Key<K>>) -> Result<Item<K, V>> {
        let key = key.into();
        let (last, init) = split_path(&key)?;
        let parent = self.walk(node, init)?;
        let slot = self
            .nodes
            .get_mut(parent)
            .remove(last)
            .ok_or_else(|| Error::key_not_found(last))?;
        Ok(self.take_slot(slot))
    }

    /// Removes every entry of a node, freeing its descendants.
    pub fn clear(&mut self, id: NodeId) {
        let mut entries = self.nodes.get_mut(id).take_entries();
        while let Some((_, slot)) = entries.pop() {
            if let Slot::Child(c) = slot {
                entries.extend(self.nodes.release(c).entries);
            }
        }
    }

    fn take_slot(&mut self, slot: Slot<V>) -> Item<K, V> {
        match slot {
            Slot::Leaf(v) => Item::Leaf(v),
            Slot::Child(c) => Item::Tree(self.detach(c)),
        }
    }

    /// Moves the subtree at `id` (already unlinked from its parent's entries)
    /// into a tree of its own.
    fn detach(&mut self, id: NodeId) -> DeepDict<K, V> {
        let mut top = self.nodes.release(id);
        top.parent = None;
        top.root = None;
        top.key = None;

        let mut nodes = NodeArena::new();
        let root = transplant(&mut self.nodes, &mut nodes, top, None);
        debug!(node = ?id, nodes = nodes.live(), "detached subtree");
        DeepDict {
            nodes,
            root,
            config: self.config.clone(),
        }
    }

    /// Moves every node of `tree` into this arena under `parent`, returning the
    /// new handle of its root. The caller links the handle into `parent`.
    fn splice(&mut self, mut tree: DeepDict<K, V>, parent: NodeId, key: K) -> NodeId {
        let root = self.root_of(parent);
        let mut top = tree.nodes.release(tree.root);
        top.parent = Some(parent);
        top.root = Some(root);
        top.key = Some(key);
        let id = transplant(&mut tree.nodes, &mut self.nodes, top, Some(root));
        trace!(parent = ?parent, node = ?id, "spliced tree");
        id
    }
}

/// Allocates `top` in `dst` and moves all of its descendants from `src`,
/// rewriting child handles and root designations. With `root == None` the new
/// top node is the root of `dst`.
fn transplant<K: DictKey, V>(
    src: &mut NodeArena<K, V>,
    dst: &mut NodeArena<K, V>,
    top: Node<K, V>,
    root: Option<NodeId>,
) -> NodeId {
    let mut pending: Vec<(NodeId, NodeId, usize)> = Vec::new();
    let top_id = adopt(dst, top, &mut pending);
    let root = root.unwrap_or(top_id);

    while let Some((old, new_parent, pos)) = pending.pop() {
        let mut node = src.release(old);
        node.parent = Some(new_parent);
        node.root = Some(root);
        let id = adopt(dst, node, &mut pending);
        dst.get_mut(new_parent).entries[pos].1 = Slot::Child(id);
    }
    top_id
}

fn adopt<K, V>(
    dst: &mut NodeArena<K, V>,
    node: Node<K, V>,
    pending: &mut Vec<(NodeId, NodeId, usize)>,
) -> NodeId {
    let id = dst.alloc(node);
    for (pos, (_, slot)) in dst.get(id).entries.iter().enumerate() {
        if let Slot::Child(old) = slot {
            pending.push((*old, id, pos));
        }
    }
    id
}

fn split_path<K>(key: &Key<K>) -> Result<(&K, &[K])> {
    key.segments()?
        .split_last()
        .ok_or_else(|| AddressError::EmptyPath.into())
}

// =============================================================================
// Std traits
// =============================================================================

impl<K: DictKey, V> Default for DeepDict<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DictKey, V: PartialEq> PartialEq for DeepDict<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.root() == other.root()
    }
}

impl<K: DictKey, V: Eq> Eq for DeepDict<K, V> {}

impl<K: DictKey, V: fmt::Debug> fmt::Debug for DeepDict<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.root(), f)
    }
}


#[cfg(test)]
mod proptests;
