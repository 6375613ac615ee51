//! Traversal iterators. All of them walk depth-first, pre-order, following each
//! node's insertion order, with an explicit stack.

use crate::key::DictKey;
use crate::node::{NodeRef, Value};
use crate::{DeepDict, NodeId, Slot};

/// `(key, value)` pairs of a node. Shallow iteration yields containers as
/// values; deep iteration descends into them and yields only leaves.
pub struct Items<'a, K, V> {
    tree: &'a DeepDict<K, V>,
    deep: bool,
    /// (node, next entry position)
    stack: Vec<(NodeId, usize)>,
}

impl<'a, K: DictKey, V> Items<'a, K, V> {
    pub(crate) fn new(tree: &'a DeepDict<K, V>, id: NodeId, deep: bool) -> Self {
        Self {
            tree,
            deep,
            stack: vec![(id, 0)],
        }
    }
}

impl<'a, K: DictKey, V> Iterator for Items<'a, K, V> {
    type Item = (&'a K, Value<'a, K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        loop {
            let (id, pos) = self.stack.last_mut()?;
            let node = tree.nodes.get(*id);
            let Some((key, slot)) = node.entries.get(*pos) else {
                self.stack.pop();
                continue;
            };
            *pos += 1;
            match slot {
                Slot::Leaf(v) => return Some((key, Value::Leaf(v))),
                Slot::Child(c) if self.deep => self.stack.push((*c, 0)),
                Slot::Child(c) => return Some((key, Value::Node(NodeRef::new(tree, *c)))),
            }
        }
    }
}

/// Every leaf below a node, paired with its path relative to that node.
pub struct AddressedItems<'a, K, V> {
    tree: &'a DeepDict<K, V>,
    stack: Vec<(NodeId, usize)>,
    /// Keys leading to the node on top of `stack`.
    path: Vec<&'a K>,
}

impl<'a, K: DictKey, V> AddressedItems<'a, K, V> {
    pub(crate) fn new(tree: &'a DeepDict<K, V>, id: NodeId) -> Self {
        Self {
            tree,
            stack: vec![(id, 0)],
            path: Vec::new(),
        }
    }
}

impl<'a, K: DictKey, V> Iterator for AddressedItems<'a, K, V> {
    type Item = (Vec<&'a K>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        loop {
            let (id, pos) = self.stack.last_mut()?;
            let node = tree.nodes.get(*id);
            let Some((key, slot)) = node.entries.get(*pos) else {
                self.stack.pop();
                self.path.pop();
                continue;
            };
            *pos += 1;
            match slot {
                Slot::Leaf(v) => {
                    let mut address = Vec::with_capacity(self.path.len() + 1);
                    address.extend_from_slice(&self.path);
                    address.push(key);
                    return Some((address, v));
                }
                Slot::Child(c) => {
                    self.stack.push((*c, 0));
                    self.path.push(key);
                }
            }
        }
    }
}

/// Container nodes below (and optionally including) a node.
pub struct Containers<'a, K, V> {
    tree: &'a DeepDict<K, V>,
    deep: bool,
    /// (node, whether its children are still to be produced)
    stack: Vec<(NodeId, bool)>,
}

impl<'a, K: DictKey, V> Containers<'a, K, V> {
    pub(crate) fn new(tree: &'a DeepDict<K, V>, id: NodeId, inclusive: bool, deep: bool) -> Self {
        let mut it = Self {
            tree,
            deep,
            stack: Vec::new(),
        };
        if inclusive {
            it.stack.push((id, true));
        } else {
            it.push_children(id, deep);
        }
        it
    }

    fn push_children(&mut self, id: NodeId, expand: bool) {
        let tree = self.tree;
        for (_, slot) in tree.nodes.get(id).entries.iter().rev() {
            if let Slot::Child(c) = slot {
                self.stack.push((*c, expand));
            }
        }
    }
}

impl<'a, K: DictKey, V> Iterator for Containers<'a, K, V> {
    type Item = NodeRef<'a, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let (id, expand) = self.stack.pop()?;
        if expand {
            self.push_children(id, self.deep);
        }
        Some(NodeRef::new(self.tree, id))
    }
}

/// Keys projected from [`Items`].
pub struct Keys<'a, K, V>(Items<'a, K, V>);

impl<'a, K: DictKey, V> Keys<'a, K, V> {
    pub(crate) fn new(items: Items<'a, K, V>) -> Self {
        Self(items)
    }
}

impl<'a, K: DictKey, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }
}

/// Values projected from [`Items`].
pub struct Values<'a, K, V>(Items<'a, K, V>);

impl<'a, K: DictKey, V> Values<'a, K, V> {
    pub(crate) fn new(items: Items<'a, K, V>) -> Self {
        Self(items)
    }
}

impl<'a, K: DictKey, V> Iterator for Values<'a, K, V> {
    type Item = Value<'a, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
}

/// Leaf addresses projected from [`AddressedItems`].
pub struct Addresses<'a, K, V>(AddressedItems<'a, K, V>);

impl<'a, K: DictKey, V> Addresses<'a, K, V> {
    pub(crate) fn new(items: AddressedItems<'a, K, V>) -> Self {
        Self(items)
    }
}

impl<'a, K: DictKey, V> Iterator for Addresses<'a, K, V> {
    type Item = Vec<&'a K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(path, _)| path)
    }
}
