//! Secondary indices from node attributes to node ids.
//!
//! Indices are derived state. [`NodeIndex`] is only ever mutated together
//! with the node map, under the same write lock, so membership always mirrors
//! the store.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::geo::Continent;
use crate::node::{Node, NodeId, NodeType, OwnerId};

/// One attribute value -> ids mapping. Empty buckets are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeIndex<K: Eq + Hash> {
    buckets: HashMap<K, HashSet<NodeId>>,
}

impl<K: Eq + Hash> Default for AttributeIndex<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> AttributeIndex<K> {
    pub fn insert(&mut self, key: K, id: NodeId) {
        self.buckets.entry(key).or_default().insert(id);
    }

    pub fn remove(&mut self, key: &K, id: &NodeId) {
        if let Some(ids) = self.buckets.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&HashSet<NodeId>> {
        self.buckets.get(key)
    }

    pub fn contains(&self, key: &K, id: &NodeId) -> bool {
        self.buckets.get(key).is_some_and(|ids| ids.contains(id))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// All secondary indices over the node store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIndex {
    pub country: AttributeIndex<String>,
    pub continent: AttributeIndex<Continent>,
    pub asn: AttributeIndex<u32>,
    pub node_type: AttributeIndex<NodeType>,
    pub owner: AttributeIndex<OwnerId>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build indices for a full node set from scratch.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut index = Self::new();
        for node in nodes {
            index.insert(node);
        }
        index
    }

    pub fn insert(&mut self, node: &Node) {
        let id = &node.id;
        self.country
            .insert(node.geo.country_code.to_ascii_uppercase(), id.clone());
        self.continent.insert(node.continent, id.clone());
        if let Some(asn) = node.geo.asn {
            self.asn.insert(asn, id.clone());
        }
        self.node_type.insert(node.node_type, id.clone());
        self.owner.insert(node.owner_id.clone(), id.clone());
    }

    pub fn remove(&mut self, node: &Node) {
        let id = &node.id;
        self.country
            .remove(&node.geo.country_code.to_ascii_uppercase(), id);
        self.continent.remove(&node.continent, id);
        if let Some(asn) = node.geo.asn {
            self.asn.remove(&asn, id);
        }
        self.node_type.remove(&node.node_type, id);
        self.owner.remove(&node.owner_id, id);
    }

    pub fn by_country(&self, country_code: &str) -> Option<&HashSet<NodeId>> {
        self.country.get(&country_code.to_ascii_uppercase())
    }

    pub fn by_continent(&self, continent: Continent) -> Option<&HashSet<NodeId>> {
        self.continent.get(&continent)
    }

    pub fn by_asn(&self, asn: u32) -> Option<&HashSet<NodeId>> {
        self.asn.get(&asn)
    }

    pub fn by_type(&self, node_type: NodeType) -> Option<&HashSet<NodeId>> {
        self.node_type.get(&node_type)
    }

    pub fn by_owner(&self, owner: &OwnerId) -> Option<&HashSet<NodeId>> {
        self.owner.get(owner)
    }

    /// True if `node` is present in every index matching its attributes.
    pub fn is_indexed(&self, node: &Node) -> bool {
        let id = &node.id;
        self.country
            .contains(&node.geo.country_code.to_ascii_uppercase(), id)
            && self.continent.contains(&node.continent, id)
            && node.geo.asn.is_none_or(|asn| self.asn.contains(&asn, id))
            && self.node_type.contains(&node.node_type, id)
            && self.owner.contains(&node.owner_id, id)
    }

    /// True if `id` appears in no index at all.
    pub fn is_absent(&self, id: &NodeId) -> bool {
        fn absent<K: Eq + Hash>(index: &AttributeIndex<K>, id: &NodeId) -> bool {
            index.buckets.values().all(|ids| !ids.contains(id))
        }
        absent(&self.country, id)
            && absent(&self.continent, id)
            && absent(&self.asn, id)
            && absent(&self.node_type, id)
            && absent(&self.owner, id)
    }
}
