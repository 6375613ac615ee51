//! JSON construction and serde support.

use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::key::DictKey;
use crate::node::{NodeRef, Value};
use crate::{DeepDict, NodeId};

impl DeepDict<String, Json> {
    /// Builds a tree from a JSON object. Nested objects become containers,
    /// everything else (arrays included) is stored as a leaf.
    pub fn from_json(json: Json) -> Result<Self> {
        let map = match json {
            Json::Object(map) => map,
            other => {
                return Err(Error::TypeMismatch {
                    expected: "object",
                    found: json_kind(&other),
                })
            }
        };
        let mut tree = Self::new();
        let mut pending: Vec<(NodeId, Map<String, Json>)> = vec![(tree.root_id(), map)];
        while let Some((id, map)) = pending.pop() {
            for (key, value) in map {
                match value {
                    Json::Object(inner) => {
                        let child = tree.resolve_missing(id, key)?;
                        pending.push((child, inner));
                    }
                    leaf => {
                        tree.set_in(id, key, leaf)?;
                    }
                }
            }
        }
        Ok(tree)
    }

    /// Renders the tree as nested JSON objects.
    pub fn to_json(&self) -> Json {
        node_to_json(self.root())
    }
}

fn node_to_json(node: NodeRef<'_, String, Json>) -> Json {
    let map = node
        .items(false)
        .map(|(k, v)| {
            let v = match v {
                Value::Leaf(leaf) => leaf.clone(),
                Value::Node(n) => node_to_json(n),
            };
            (k.clone(), v)
        })
        .collect();
    Json::Object(map)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

impl<K: DictKey + Serialize, V: Serialize> Serialize for NodeRef<'_, K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.items(false))
    }
}

impl<K: DictKey + Serialize, V: Serialize> Serialize for Value<'_, K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Leaf(v) => v.serialize(serializer),
            Value::Node(n) => n.serialize(serializer),
        }
    }
}

impl<K: DictKey + Serialize, V: Serialize> Serialize for DeepDict<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.root().serialize(serializer)
    }
}
