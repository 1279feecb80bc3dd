//! Entity identity keys and node deduplication.
//!
//! A [`ReferenceKey`] names a byte store (a filesystem, an opened archive);
//! a [`DataKey`] names a position within it. Equal [`EntityKey`] pairs denote
//! the same bytes and resolve to the same node through an [`IdentityMap`].

use crate::graph::Node;
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static ANONYMOUS_STORES: AtomicU64 = AtomicU64::new(0);

/// Identity of a byte store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReferenceKey(Arc<str>);

impl ReferenceKey {
    /// The local filesystem.
    pub fn filesystem() -> Self {
        ReferenceKey(Arc::from("fs"))
    }

    /// A store with a caller-chosen stable name.
    pub fn named(name: &str) -> Self {
        ReferenceKey(Arc::from(format!("name:{}", name)))
    }

    /// A store with no stable identity; never equal to any other key.
    pub fn anonymous() -> Self {
        let id = ANONYMOUS_STORES.fetch_add(1, Ordering::Relaxed);
        ReferenceKey(Arc::from(format!("anon:{}", id)))
    }

    /// The store opened by decoding the entity at `parent` as `format`.
    ///
    /// Deterministic: decoding the same entity twice yields equal keys.
    pub fn nested(parent: &EntityKey, format: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(parent.reference.0.as_bytes());
        hasher.update([0]);
        hasher.update(parent.data.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(format.as_bytes());
        let digest = hasher.finalize();
        ReferenceKey(Arc::from(format!("{}:{}", format, hex::encode(&digest[..12]))))
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position within a byte store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DataKey {
    /// Slash-separated logical path.
    Path(String),
    /// Byte offset.
    Offset(u64),
    /// Named stream (decompressed payload, compound-file stream).
    Stream(String),
    /// Folder implied by the paths of a store's entries.
    Folder(String),
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKey::Path(path) => write!(f, "path:{}", path),
            DataKey::Offset(offset) => write!(f, "offset:0x{:X}", offset),
            DataKey::Stream(name) => write!(f, "stream:{}", name),
            DataKey::Folder(path) => write!(f, "folder:{}", path),
        }
    }
}

/// `(ReferenceKey, DataKey)` identity pair of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityKey {
    /// Store holding the entity.
    pub reference: ReferenceKey,
    /// Position within the store.
    pub data: DataKey,
}

impl EntityKey {
    /// Create a key pair.
    pub fn new(reference: ReferenceKey, data: DataKey) -> Self {
        Self { reference, data }
    }

    /// Key for a path within `reference`.
    pub fn path(reference: ReferenceKey, path: impl Into<String>) -> Self {
        Self::new(reference, DataKey::Path(path.into()))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.reference, self.data)
    }
}

/// Session-wide table mapping entity keys to their nodes.
#[derive(Default)]
pub struct IdentityMap {
    nodes: RwLock<HashMap<EntityKey, Node>>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Node already registered for `key`.
    pub fn get(&self, key: &EntityKey) -> Option<Node> {
        self.nodes.read().get(key).cloned()
    }

    /// Node for `key`, creating it with `create` on first use.
    pub fn get_or_create(&self, key: &EntityKey, create: impl FnOnce() -> Node) -> Node {
        if let Some(node) = self.get(key) {
            return node;
        }
        self.nodes
            .write()
            .entry(key.clone())
            .or_insert_with(create)
            .clone()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether no key is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MemoryGraph, NodeFactory};

    #[test]
    fn test_nested_keys_are_deterministic() {
        let parent = EntityKey::path(ReferenceKey::filesystem(), "/tmp/a.zip");
        let a = ReferenceKey::nested(&parent, "zip");
        let b = ReferenceKey::nested(&parent, "zip");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("zip:"));

        let other = EntityKey::path(ReferenceKey::filesystem(), "/tmp/b.zip");
        assert_ne!(a, ReferenceKey::nested(&other, "zip"));
    }

    #[test]
    fn test_anonymous_keys_differ() {
        assert_ne!(ReferenceKey::anonymous(), ReferenceKey::anonymous());
    }

    #[test]
    fn test_identity_map_dedup() {
        let graph = MemoryGraph::new();
        let map = IdentityMap::new();
        let key = EntityKey::path(ReferenceKey::named("store"), "a/b");

        let first = map.get_or_create(&key, || graph.create_blank());
        let second = map.get_or_create(&key, || graph.create_blank());
        assert!(first.same_as(&second));
        assert_eq!(graph.len(), 1);

        let same_path_other_store = EntityKey::path(ReferenceKey::named("other"), "a/b");
        let third = map.get_or_create(&same_path_other_store, || graph.create_blank());
        assert!(!first.same_as(&third));
    }
}
