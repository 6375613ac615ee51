use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

fn validate_tree<K: DictKey, V>(t: &DeepDict<K, V>) {
    let root = t.root_id();
    let root_node = t.nodes.get(root);
    assert!(root_node.parent.is_none(), "root must not have a parent");
    assert!(root_node.key.is_none(), "root must not have a key");

    let mut reachable = 0usize;
    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
    while let Some((id, depth)) = stack.pop() {
        reachable += 1;
        let node = t.nodes.get(id);
        assert!(depth <= t.config().max_depth, "node deeper than max_depth");
        assert_eq!(t.depth(id), depth, "depth must match distance from root");
        assert_eq!(
            node.index.len(),
            node.entries.len(),
            "index must cover every entry"
        );

        for (pos, (key, slot)) in node.entries.iter().enumerate() {
            assert_eq!(node.index.get(key), Some(&pos), "stale index position");
            if let Slot::Child(c) = slot {
                let child = t.nodes.get(*c);
                assert_eq!(child.parent, Some(id), "parent handle mismatch");
                assert_eq!(child.key.as_ref(), Some(key), "key_in_parent mismatch");
                assert_eq!(child.root, Some(root), "root designation not propagated");
                stack.push((*c, depth + 1));
            }
        }
    }

    assert_eq!(
        reachable,
        t.node_count(),
        "every live node must be reachable from the root"
    );
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ModelEntry {
    Leaf(u64),
    Node,
}

#[derive(Debug, PartialEq)]
enum Failure {
    Missing,
    Address,
}

type Outcome<T> = std::result::Result<T, Failure>;

/// Flat model: every non-root node and leaf keyed by its full address. Only the
/// root's lock is ever set, so one flag governs vivification everywhere.
#[derive(Default)]
struct Model {
    entries: BTreeMap<Vec<u8>, ModelEntry>,
    locked: bool,
}

impl Model {
    fn walk(&self, init: &[u8]) -> Outcome<()> {
        for i in 1..=init.len() {
            match self.entries.get(&init[..i]) {
                Some(ModelEntry::Node) => {}
                Some(ModelEntry::Leaf(_)) => return Err(Failure::Address),
                None => return Err(Failure::Missing),
            }
        }
        Ok(())
    }

    fn descend(&mut self, init: &[u8]) -> Outcome<()> {
        for i in 1..=init.len() {
            match self.entries.get(&init[..i]) {
                Some(ModelEntry::Node) => {}
                Some(ModelEntry::Leaf(_)) => return Err(Failure::Address),
                None if self.locked => return Err(Failure::Missing),
                None => {
                    self.entries.insert(init[..i].to_vec(), ModelEntry::Node);
                }
            }
        }
        Ok(())
    }

    fn remove_subtree(&mut self, path: &[u8]) -> Option<ModelEntry> {
        let old = self.entries.remove(path)?;
        let doomed: Vec<Vec<u8>> = self
            .entries
            .range(path.to_vec()..)
            .take_while(|(k, _)| k.starts_with(path))
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            self.entries.remove(&k);
        }
        Some(old)
    }

    fn set(&mut self, path: &[u8], v: u64) -> Outcome<Option<ModelEntry>> {
        self.descend(&path[..path.len() - 1])?;
        if self.locked && !self.entries.contains_key(path) {
            return Err(Failure::Missing);
        }
        let old = self.remove_subtree(path);
        self.entries.insert(path.to_vec(), ModelEntry::Leaf(v));
        Ok(old)
    }

    fn get(&mut self, path: &[u8]) -> Outcome<ModelEntry> {
        self.descend(&path[..path.len() - 1])?;
        match self.entries.get(path) {
            Some(e) => Ok(*e),
            None if self.locked => Err(Failure::Missing),
            None => {
                self.entries.insert(path.to_vec(), ModelEntry::Node);
                Ok(ModelEntry::Node)
            }
        }
    }

    fn lookup(&self, path: &[u8]) -> Outcome<ModelEntry> {
        self.walk(&path[..path.len() - 1])?;
        self.entries.get(path).copied().ok_or(Failure::Missing)
    }

    fn remove(&mut self, path: &[u8]) -> Outcome<ModelEntry> {
        self.walk(&path[..path.len() - 1])?;
        self.remove_subtree(path).ok_or(Failure::Missing)
    }
}

fn failure(e: Error) -> Failure {
    if e.is_key_not_found() {
        Failure::Missing
    } else if e.is_address_error() {
        Failure::Address
    } else {
        panic!("unexpected error: {e:?}")
    }
}

fn value_entry(v: Value<'_, u8, u64>) -> ModelEntry {
    match v {
        Value::Leaf(x) => ModelEntry::Leaf(*x),
        Value::Node(_) => ModelEntry::Node,
    }
}

fn item_entry(item: Item<u8, u64>) -> ModelEntry {
    match item {
        Item::Leaf(x) => ModelEntry::Leaf(x),
        Item::Tree(t) => {
            validate_tree(&t);
            ModelEntry::Node
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Set(Vec<u8>, u64),
    Get(Vec<u8>),
    Lookup(Vec<u8>),
    Remove(Vec<u8>),
    Lock,
    Unlock,
}

fn path_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A tiny alphabet keeps leaf/container collisions frequent.
    prop::collection::vec(0u8..3, 1..=4)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let path = path_strategy();
    let op = prop_oneof![
        40 => (path.clone(), any::<u64>()).prop_map(|(p, v)| Op::Set(p, v)),
        15 => path.clone().prop_map(Op::Get),
        15 => path.clone().prop_map(Op::Lookup),
        20 => path.clone().prop_map(Op::Remove),
        5 => Just(Op::Lock),
        5 => Just(Op::Unlock),
    ];
    prop::collection::vec(op, 0..=400)
}

fn set_ops_strategy() -> impl Strategy<Value = Vec<(Vec<u8>, u64)>> {
    prop::collection::vec((path_strategy(), any::<u64>()), 0..=200)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_with_flat_model(ops in ops_strategy()) {
        let mut t: DeepDict<u8, u64> = DeepDict::new();
        let mut m = Model::default();
        let root = t.root_id();

        for op in ops {
            match op {
                Op::Set(path, v) => {
                    let got = t
                        .set(path.clone(), v)
                        .map(|old| old.map(item_entry))
                        .map_err(failure);
                    prop_assert_eq!(got, m.set(&path, v));
                }
                Op::Get(path) => {
                    let got = t.get(path.clone()).map(value_entry).map_err(failure);
                    prop_assert_eq!(got, m.get(&path));
                }
                Op::Lookup(path) => {
                    let got = t.lookup(path.clone()).map(value_entry).map_err(failure);
                    prop_assert_eq!(got, m.lookup(&path));
                }
                Op::Remove(path) => {
                    let got = t.remove(path.clone()).map(item_entry).map_err(failure);
                    prop_assert_eq!(got, m.remove(&path));
                }
                Op::Lock => {
                    t.lock(root);
                    m.locked = true;
                }
                Op::Unlock => {
                    t.unlock(root);
                    m.locked = false;
                }
            }
        }

        validate_tree(&t);

        let got: BTreeMap<Vec<u8>, u64> = t
            .addressed_items(root)
            .map(|(p, v)| (p.into_iter().copied().collect(), *v))
            .collect();
        let expected: BTreeMap<Vec<u8>, u64> = m
            .entries
            .iter()
            .filter_map(|(k, e)| match e {
                ModelEntry::Leaf(v) => Some((k.clone(), *v)),
                ModelEntry::Node => None,
            })
            .collect();
        prop_assert_eq!(got, expected);

        let model_nodes = m.entries.values().filter(|e| **e == ModelEntry::Node).count();
        prop_assert_eq!(t.node_count(), model_nodes + 1);
        prop_assert_eq!(t.containers(root, false, true).count(), model_nodes);
    }

    #[test]
    fn prop_detach_attach_roundtrip(sets in set_ops_strategy()) {
        let mut t: DeepDict<u8, u64> = DeepDict::new();
        for (path, v) in sets {
            // Collisions with existing leaves are expected and ignored.
            let _ = t.set(path, v);
        }
        let original = t.clone();
        let root = t.root_id();

        let top: Vec<u8> = t
            .items(root, false)
            .filter(|(_, v)| v.is_node())
            .map(|(k, _)| *k)
            .collect();
        for key in top {
            let sub = t.remove(key).unwrap().into_tree().unwrap();
            validate_tree(&sub);
            let id = t.attach(key, sub).unwrap();
            prop_assert_eq!(t.parent(id), Some(root));
            prop_assert_eq!(t.root_of(id), root);
        }

        validate_tree(&t);
        prop_assert_eq!(&t, &original);
        prop_assert_eq!(t.node_count(), original.node_count());
    }
}

/// Calls `f` with every ordering of `items` (iterative Heap's algorithm).
fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    let mut perm = items.to_vec();
    let mut counters = vec![0usize; perm.len()];
    f(perm.clone());

    let mut i = 1;
    while i < perm.len() {
        if counters[i] < i {
            let j = if i % 2 == 0 { 0 } else { counters[i] };
            perm.swap(j, i);
            f(perm.clone());
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

#[test]
fn permutations_are_complete_and_distinct() {
    let mut seen = std::collections::HashSet::new();
    for_each_permutation(&[1u8, 2, 3, 4], |p| {
        assert!(seen.insert(p));
    });
    assert_eq!(seen.len(), 24);
}

#[test]
fn exhaustive_set_order_small_set() {
    let paths: Vec<Vec<u8>> = vec![
        vec![1],
        vec![2, 3],
        vec![2, 4],
        vec![5, 6, 7],
        vec![5, 8],
    ];

    let mut reference: Option<DeepDict<u8, u64>> = None;
    for_each_permutation(&paths, |perm| {
        let mut t: DeepDict<u8, u64> = DeepDict::new();
        for p in perm {
            let v = u64::from(*p.last().unwrap());
            assert_eq!(t.set(p, v).unwrap(), None);
        }
        validate_tree(&t);
        assert_eq!(t.node_count(), 4);
        match &reference {
            Some(r) => assert_eq!(&t, r),
            None => reference = Some(t),
        }
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let paths: Vec<Vec<u8>> = vec![vec![1], vec![2, 3], vec![2, 4], vec![5, 6, 7], vec![5, 8]];

    let mut base: DeepDict<u8, u64> = DeepDict::new();
    for p in &paths {
        base.set(p.clone(), 0).unwrap();
    }

    for_each_permutation(&paths, |perm| {
        let mut t = base.clone();
        for p in perm {
            assert!(t.remove(p).unwrap().is_leaf());
            validate_tree(&t);
        }
        assert_eq!(t.items(t.root_id(), true).count(), 0);
        // Emptied containers stay in place.
        assert_eq!(t.node_count(), 4);
    });
}
