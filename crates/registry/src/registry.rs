//! Relay registry service with Arc-per-node pattern for minimal lock contention.

use std::collections::HashSet;
use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, broadcast};
use tracing::{debug, trace, warn};

use crate::credits::CreditPolicy;
use crate::events::{EventEmitter, RegistryEvent};
use crate::geo::{Continent, GeoInfo, GeoLookup};
use crate::index::NodeIndex;
use crate::leaderboard::{self, LeaderboardEntry};
use crate::metrics::RegistryMetrics;
use crate::node::{
    Node, NodeDescriptor, NodeId, NodeSummary, NodeType, OwnerId, RequestOutcome, TlsFingerprint,
    current_unix_timestamp,
};
use crate::select::{self, SelectionQuery};
use crate::stats::NetworkStats;
use crate::store::{NodeStore, NodeStoreError};

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub credits: CreditPolicy,
    /// Consecutive failed health checks before a node is marked offline.
    pub health_check_failure_threshold: u32,
    /// Broadcast channel capacity for registry events.
    pub event_channel_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            credits: CreditPolicy::default(),
            health_check_failure_threshold: 3,
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct NodeEntry {
    /// Registration sequence; orders hydrated index lookups.
    seq: u64,
    node: Arc<Mutex<Node>>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: LinkedHashMap<NodeId, NodeEntry>,
    index: NodeIndex,
    next_seq: u64,
}

impl Inner {
    fn entry(&self, id: &NodeId) -> Option<Arc<Mutex<Node>>> {
        self.nodes.get(id).map(|entry| Arc::clone(&entry.node))
    }

    fn snapshot(&self) -> Vec<Node> {
        self.nodes
            .values()
            .map(|entry| entry.node.lock().clone())
            .collect()
    }

    /// Clone the nodes behind `ids`, in registration order.
    fn hydrate(&self, ids: &HashSet<NodeId>) -> Vec<Node> {
        let mut entries: Vec<&NodeEntry> = ids.iter().filter_map(|id| self.nodes.get(id)).collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
            .into_iter()
            .map(|entry| entry.node.lock().clone())
            .collect()
    }
}

/// Registry of relay nodes.
///
/// The node map and every secondary index sit under one `RwLock`, so
/// membership changes are atomic for readers. Each node lives behind its own
/// mutex: per-node updates take the map lock only long enough to clone the
/// `Arc`, then serialize on the node.
///
/// Full scans copy each node under its own mutex. A scan is consistent per
/// node, but may straddle concurrent updates to different nodes.
pub struct RelayRegistry {
    config: RegistryConfig,
    inner: RwLock<Inner>,
    geo: Arc<dyn GeoLookup>,
    dirty: Arc<Notify>,
    events: EventEmitter,
    metrics: RegistryMetrics,
    stats: RwLock<Option<NetworkStats>>,
    leaderboard: RwLock<Vec<LeaderboardEntry>>,
}

impl std::fmt::Debug for RelayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRegistry")
            .field("config", &self.config)
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

impl RelayRegistry {
    pub fn new(config: RegistryConfig, geo: Arc<dyn GeoLookup>) -> Self {
        Self {
            events: EventEmitter::new(config.event_channel_capacity),
            config,
            inner: RwLock::new(Inner::default()),
            geo,
            dirty: Arc::new(Notify::new()),
            metrics: RegistryMetrics::default(),
            stats: RwLock::new(None),
            leaderboard: RwLock::new(Vec::new()),
        }
    }

    pub fn with_defaults(geo: Arc<dyn GeoLookup>) -> Self {
        Self::new(RegistryConfig::default(), geo)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a node, replacing any record with the same id.
    ///
    /// Enrichment failures degrade to unknown geography; registration itself
    /// never fails.
    pub fn register(&self, descriptor: NodeDescriptor) -> Node {
        let id = descriptor.id.clone().unwrap_or_else(NodeId::random);

        let geo = match self.geo.lookup(&descriptor.host) {
            Ok(geo) => geo,
            Err(err) => {
                warn!(%id, host = %descriptor.host, %err, "geo enrichment failed, using unknown location");
                self.metrics.inc_geo_lookup_failures();
                GeoInfo::unknown()
            }
        };

        let node = Node::from_descriptor(id.clone(), descriptor, geo, current_unix_timestamp());
        let owner_id = node.owner_id.clone();

        let (replaced, count) = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;

            let replaced = match inner.nodes.remove(&id) {
                Some(old) => {
                    inner.index.remove(&old.node.lock());
                    true
                }
                None => false,
            };

            inner.index.insert(&node);
            debug_assert!(inner.index.is_indexed(&node));
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.nodes.insert(
                id.clone(),
                NodeEntry {
                    seq,
                    node: Arc::new(Mutex::new(node.clone())),
                },
            );

            (replaced, inner.nodes.len())
        };

        debug!(
            %id,
            %owner_id,
            country = %node.geo.country_code,
            asn = ?node.geo.asn,
            node_type = %node.node_type,
            score = node.score,
            replaced,
            "node registered"
        );
        self.metrics.inc_registrations();
        self.metrics.set_node_count(count);
        self.events.registered(id, owner_id);
        self.mark_dirty();

        node
    }

    /// Remove a node from every index and the store. False for unknown ids.
    pub fn unregister(&self, id: &NodeId) -> bool {
        let count = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;

            let Some(entry) = inner.entry(id) else {
                trace!(%id, "unregister for unknown node");
                return false;
            };
            inner.index.remove(&entry.lock());
            inner.nodes.remove(id);
            debug_assert!(inner.index.is_absent(id));
            inner.nodes.len()
        };

        debug!(%id, "node unregistered");
        self.metrics.inc_unregistrations();
        self.metrics.set_node_count(count);
        self.events.unregistered(id.clone());
        self.mark_dirty();
        true
    }

    /// Liveness report. Touches only `online` and `last_seen`.
    pub fn heartbeat(&self, id: &NodeId, online: bool) -> bool {
        let Some(entry) = self.entry(id) else {
            trace!(%id, "heartbeat for unknown node");
            return false;
        };

        let changed = entry.lock().set_online(online, current_unix_timestamp());
        if changed {
            debug!(%id, online, "node liveness changed");
            self.events.liveness_changed(id.clone(), online);
        }
        self.mark_dirty();
        true
    }

    /// Fold one relayed request into the node's metrics, credits and score.
    pub fn record_request(&self, id: &NodeId, outcome: &RequestOutcome) -> bool {
        let Some(entry) = self.entry(id) else {
            trace!(%id, "outcome for unknown node");
            return false;
        };

        let (old_score, new_score, reward) = {
            let mut node = entry.lock();
            let old_score = node.score;
            let reward =
                node.apply_outcome(outcome, &self.config.credits, current_unix_timestamp());
            (old_score, node.score, reward)
        };

        trace!(
            %id,
            success = outcome.success,
            latency_ms = outcome.latency_ms,
            bytes = outcome.bytes_transferred,
            reward,
            score = new_score,
            "request recorded"
        );
        if let Some(message) = outcome.error_message.as_deref() {
            trace!(%id, error = message, "relay reported failure");
        }

        self.metrics.record_request(outcome.success, outcome.latency_ms);
        self.events.score_changed(id.clone(), old_score, new_score);
        self.mark_dirty();
        true
    }

    /// Record an active probe result. A pass brings the node online; enough
    /// consecutive failures take it offline.
    pub fn record_health_check(&self, id: &NodeId, passed: bool) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };

        let (changed, online, failures) = {
            let mut node = entry.lock();
            let changed = node.apply_health_check(
                passed,
                self.config.health_check_failure_threshold,
                current_unix_timestamp(),
            );
            (changed, node.online, node.health_check_failures)
        };

        if changed {
            debug!(%id, online, failures, "node liveness changed by health check");
            self.events.liveness_changed(id.clone(), online);
        }
        self.mark_dirty();
        true
    }

    pub fn set_fingerprint(&self, id: &NodeId, fingerprint: Option<TlsFingerprint>) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };

        let (old_score, new_score) = {
            let mut node = entry.lock();
            let old_score = node.score;
            node.set_fingerprint(fingerprint);
            (old_score, node.score)
        };

        self.events.score_changed(id.clone(), old_score, new_score);
        self.mark_dirty();
        true
    }

    /// Mark online nodes not seen within `max_age_secs` as offline.
    pub fn sweep_stale(&self, max_age_secs: u64) -> usize {
        let now = current_unix_timestamp();
        let entries: Vec<(NodeId, Arc<Mutex<Node>>)> = self
            .inner
            .read()
            .nodes
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.node)))
            .collect();

        let mut swept = 0;
        for (id, entry) in entries {
            let mut node = entry.lock();
            if node.online && now.saturating_sub(node.last_seen) >= max_age_secs {
                node.online = false;
                drop(node);
                swept += 1;
                self.events.liveness_changed(id, false);
            }
        }

        if swept > 0 {
            debug!(count = swept, max_age_secs, "marked stale nodes offline");
            self.mark_dirty();
        }
        swept
    }

    fn entry(&self, id: &NodeId) -> Option<Arc<Mutex<Node>>> {
        self.inner.read().entry(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<Node> {
        self.entry(id).map(|entry| entry.lock().clone())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.read().nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.read().nodes.keys().cloned().collect()
    }

    /// Copy of every node, in registration order.
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.read().snapshot()
    }

    pub fn online_nodes(&self) -> Vec<Node> {
        self.inner
            .read()
            .nodes
            .values()
            .filter_map(|entry| {
                let node = entry.node.lock();
                node.online.then(|| node.clone())
            })
            .collect()
    }

    pub fn by_country(&self, country_code: &str) -> Vec<Node> {
        let inner = self.inner.read();
        inner
            .index
            .by_country(country_code)
            .map(|ids| inner.hydrate(ids))
            .unwrap_or_default()
    }

    pub fn by_continent(&self, continent: Continent) -> Vec<Node> {
        let inner = self.inner.read();
        inner
            .index
            .by_continent(continent)
            .map(|ids| inner.hydrate(ids))
            .unwrap_or_default()
    }

    pub fn by_asn(&self, asn: u32) -> Vec<Node> {
        let inner = self.inner.read();
        inner
            .index
            .by_asn(asn)
            .map(|ids| inner.hydrate(ids))
            .unwrap_or_default()
    }

    pub fn by_type(&self, node_type: NodeType) -> Vec<Node> {
        let inner = self.inner.read();
        inner
            .index
            .by_type(node_type)
            .map(|ids| inner.hydrate(ids))
            .unwrap_or_default()
    }

    pub fn by_owner(&self, owner: &OwnerId) -> Vec<Node> {
        let inner = self.inner.read();
        inner
            .index
            .by_owner(owner)
            .map(|ids| inner.hydrate(ids))
            .unwrap_or_default()
    }

    /// Rank and return nodes matching `query`.
    ///
    /// Candidates are narrowed through the smallest index bucket among the
    /// supplied attribute filters before the full filter runs.
    pub fn select(&self, query: &SelectionQuery) -> Vec<Node> {
        let candidates = {
            let inner = self.inner.read();

            let mut buckets: Vec<Option<&HashSet<NodeId>>> = Vec::new();
            if let Some(country) = &query.country {
                buckets.push(inner.index.by_country(country));
            }
            if let Some(continent) = query.continent {
                buckets.push(inner.index.by_continent(continent));
            }
            if let Some(asn) = query.asn {
                buckets.push(inner.index.by_asn(asn));
            }
            if let Some(node_type) = query.node_type {
                buckets.push(inner.index.by_type(node_type));
            }

            if buckets.is_empty() {
                inner.snapshot()
            } else if buckets.iter().any(Option::is_none) {
                Vec::new()
            } else {
                buckets
                    .into_iter()
                    .flatten()
                    .min_by_key(|ids| ids.len())
                    .map(|ids| inner.hydrate(ids))
                    .unwrap_or_default()
            }
        };

        let pool = candidates.len();
        let selected = select::select(candidates, query);
        trace!(pool, selected = selected.len(), count = query.count, "selection");
        selected
    }

    /// [`Self::select`], reduced to the public view handed to clients.
    pub fn select_summaries(&self, query: &SelectionQuery) -> Vec<NodeSummary> {
        self.select(query).iter().map(NodeSummary::from).collect()
    }

    /// Full scan; the result is cached for [`Self::stats`].
    pub fn recompute_stats(&self) -> NetworkStats {
        let nodes = self.nodes();
        let stats = NetworkStats::compute(&nodes, current_unix_timestamp());
        self.metrics.set_online_count(stats.online_nodes);
        *self.stats.write() = Some(stats.clone());
        stats
    }

    /// Last computed stats, computing them once if none exist yet.
    pub fn stats(&self) -> NetworkStats {
        if let Some(stats) = self.stats.read().as_ref() {
            return stats.clone();
        }
        self.recompute_stats()
    }

    /// Build the contributor leaderboard; the result is cached.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let nodes = self.nodes();
        let board = leaderboard::build(&nodes, limit);
        *self.leaderboard.write() = board.clone();
        board
    }

    /// Result of the last [`Self::leaderboard`] call.
    pub fn cached_leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.read().clone()
    }

    /// Replace the registry contents with the store's node set.
    ///
    /// Scores are recomputed and indices rebuilt from scratch.
    pub fn load_from_store<S>(&self, store: &S) -> Result<usize, NodeStoreError>
    where
        S: NodeStore + ?Sized,
    {
        let mut loaded = store.load_all()?;
        for node in &mut loaded {
            node.refresh_score();
        }

        let next_seq = loaded.len() as u64;
        let mut nodes: LinkedHashMap<NodeId, NodeEntry> =
            LinkedHashMap::with_capacity(loaded.len());
        for (seq, node) in (0u64..).zip(loaded) {
            let id = node.id.clone();
            let entry = NodeEntry {
                seq,
                node: Arc::new(Mutex::new(node)),
            };
            // The kept record moves to the back so map order and seq agree.
            if nodes.remove(&id).is_some() {
                warn!(%id, "duplicate node id in store, keeping the last record");
            }
            nodes.insert(id, entry);
        }

        let snapshot: Vec<Node> = nodes
            .values()
            .map(|entry| entry.node.lock().clone())
            .collect();
        let index = NodeIndex::from_nodes(&snapshot);

        let count = nodes.len();
        {
            let mut inner = self.inner.write();
            inner.nodes = nodes;
            inner.index = index;
            inner.next_seq = next_seq;
        }
        *self.stats.write() = None;
        self.leaderboard.write().clear();

        self.metrics.set_node_count(count);
        debug!(count, "loaded nodes from store");
        Ok(count)
    }

    /// Write every node to `store` and flush it.
    pub fn save_to_store<S>(&self, store: &S) -> Result<usize, NodeStoreError>
    where
        S: NodeStore + ?Sized,
    {
        let nodes = self.nodes();
        let count = nodes.len();

        store.save_all(&nodes)?;
        store.flush()?;

        debug!(count, "saved nodes to store");
        Ok(count)
    }

    /// True if the maintained indices equal a rebuild from the current nodes.
    pub fn indices_consistent(&self) -> bool {
        let inner = self.inner.read();
        let nodes = inner.snapshot();
        NodeIndex::from_nodes(&nodes) == inner.index
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub(crate) fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }

    /// Signalled after every mutation.
    pub(crate) fn dirty(&self) -> Arc<Notify> {
        Arc::clone(&self.dirty)
    }

    fn mark_dirty(&self) {
        self.dirty.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::geo::StaticGeoLookup;
    use crate::node::OwnerId;
    use crate::store::MemoryNodeStore;
    use crate::test_utils::test_node;

    fn geo(country: &str, asn: Option<u32>) -> GeoInfo {
        let mut geo = GeoInfo::unknown();
        geo.country_code = country.to_string();
        geo.country_name = country.to_string();
        geo.asn = asn;
        geo
    }

    fn registry() -> RelayRegistry {
        let lookup = StaticGeoLookup::new()
            .with_entry("us.example", geo("US", Some(701)))
            .with_entry("us2.example", geo("US", Some(7922)))
            .with_entry("de.example", geo("DE", Some(3320)))
            .with_entry("jp.example", geo("JP", None));
        RelayRegistry::with_defaults(Arc::new(lookup))
    }

    fn descriptor(id: &str, owner: &str, host: &str) -> NodeDescriptor {
        NodeDescriptor::new(OwnerId::from(owner), host, 8080, NodeType::Residential)
            .with_id(id)
            .with_bandwidth(50.0)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry();
        let node = registry.register(descriptor("n1", "alice", "us.example"));

        assert_eq!(node.geo.country_code, "US");
        assert_eq!(node.continent, Continent::NorthAmerica);
        assert_eq!(node.public_key.len(), 64);
        assert!(node.score > 0.0);

        assert_eq!(registry.node_count(), 1);
        assert_eq!(registry.get(&NodeId::from("n1")), Some(node));
        assert_eq!(registry.by_country("us").len(), 1);
        assert_eq!(registry.by_asn(701).len(), 1);
        assert_eq!(registry.by_owner(&OwnerId::from("alice")).len(), 1);
        assert_eq!(registry.by_type(NodeType::Residential).len(), 1);
        assert!(registry.indices_consistent());
    }

    #[test]
    fn test_register_assigns_id() {
        let registry = registry();
        let node = registry.register(NodeDescriptor::new(
            OwnerId::from("alice"),
            "de.example",
            1,
            NodeType::Mobile,
        ));

        assert_eq!(node.id.as_str().len(), 32);
        assert!(registry.contains(&node.id));
    }

    #[test]
    fn test_geo_failure_degrades() {
        let registry = registry();
        let node = registry.register(descriptor("n1", "alice", "nowhere.example"));

        assert_eq!(node.geo.country_code, "XX");
        assert_eq!(node.continent, Continent::Unknown);
        assert_eq!(node.geo.asn, None);
        assert_eq!(registry.by_country("XX").len(), 1);
        assert_eq!(registry.by_continent(Continent::Unknown).len(), 1);
    }

    #[test]
    fn test_registration_receipt() {
        let registry = registry();
        let receipt = registry
            .register(NodeDescriptor::new(
                OwnerId::from("alice"),
                "nowhere.example",
                443,
                NodeType::Datacenter,
            ))
            .receipt();

        assert!(registry.contains(&receipt.node_id));
        assert_eq!(receipt.public_key.len(), 64);
        assert!(receipt.public_key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(receipt.geo.country_code, "XX");
        assert_eq!(receipt.geo.asn, None);

        let stored = registry.get(&receipt.node_id).unwrap();
        assert_eq!(stored.public_key, receipt.public_key);
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = registry();
        registry.register(descriptor("n1", "alice", "us.example"));
        registry.record_request(&NodeId::from("n1"), &RequestOutcome::success(50, 10));

        let node = registry.register(descriptor("n1", "bob", "de.example"));
        assert_eq!(node.total_requests, 0);
        assert_eq!(registry.node_count(), 1);
        assert!(registry.by_country("US").is_empty());
        assert!(registry.by_owner(&OwnerId::from("alice")).is_empty());
        assert_eq!(registry.by_country("DE").len(), 1);
        assert!(registry.indices_consistent());
    }

    #[test]
    fn test_unregister() {
        let registry = registry();
        registry.register(descriptor("n1", "alice", "us.example"));
        registry.register(descriptor("n2", "alice", "us.example"));

        assert!(registry.unregister(&NodeId::from("n1")));
        assert!(!registry.unregister(&NodeId::from("n1")));
        assert!(!registry.contains(&NodeId::from("n1")));
        assert_eq!(registry.by_country("US").len(), 1);
        assert!(registry.indices_consistent());

        assert!(registry.unregister(&NodeId::from("n2")));
        assert!(registry.by_country("US").is_empty());
        assert!(registry.by_asn(701).is_empty());
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let registry = registry();
        let id = NodeId::from("ghost");

        assert!(!registry.heartbeat(&id, true));
        assert!(!registry.record_request(&id, &RequestOutcome::success(10, 10)));
        assert!(!registry.record_health_check(&id, false));
        assert!(!registry.set_fingerprint(&id, None));
        assert_eq!(registry.get(&id), None);
        assert_eq!(registry.node_count(), 0);
    }

    #[test]
    fn test_heartbeat_touches_liveness_only() {
        let registry = registry();
        let before = registry.register(descriptor("n1", "alice", "us.example"));

        assert!(registry.heartbeat(&before.id, false));
        let after = registry.get(&before.id).unwrap();
        assert!(!after.online);
        assert_eq!(after.score, before.score);
        assert_eq!(after.total_requests, 0);
        assert_eq!(registry.online_nodes().len(), 0);

        registry.heartbeat(&before.id, true);
        assert_eq!(registry.online_nodes().len(), 1);
    }

    #[test]
    fn test_record_request_updates_metrics() {
        let registry = registry();
        let id = registry.register(descriptor("n1", "alice", "us.example")).id;

        registry.record_request(&id, &RequestOutcome::success(150, 1024 * 1024));
        registry.record_request(&id, &RequestOutcome::failure(900, "timeout"));

        let node = registry.get(&id).unwrap();
        assert_eq!(node.total_requests, 2);
        assert_eq!(node.successful_requests, 1);
        assert_eq!(node.failed_requests, 1);
        assert_eq!(node.consecutive_failures, 1);
        assert_eq!(node.success_rate, 0.5);
        assert_eq!(node.bytes_served, 1024 * 1024);
        assert_eq!(node.latency.min, 150);
        assert_eq!(node.latency.max, 900);
        assert!(node.credits_earned > 0.0);
    }

    #[test]
    fn test_health_check_threshold() {
        let registry = registry();
        let id = registry.register(descriptor("n1", "alice", "us.example")).id;

        registry.record_health_check(&id, false);
        registry.record_health_check(&id, false);
        assert!(registry.get(&id).unwrap().online);

        registry.record_health_check(&id, false);
        let node = registry.get(&id).unwrap();
        assert!(!node.online);
        assert_eq!(node.health_check_failures, 3);
        assert!(node.last_health_check.is_some());

        registry.record_health_check(&id, true);
        let node = registry.get(&id).unwrap();
        assert!(node.online);
        assert_eq!(node.health_check_failures, 0);
    }

    #[test]
    fn test_set_fingerprint_rescores() {
        let registry = registry();
        let node = registry.register(descriptor("n1", "alice", "us.example"));

        registry.set_fingerprint(
            &node.id,
            Some(TlsFingerprint {
                hash: "771,4865-4866".to_string(),
                client: "chrome".to_string(),
            }),
        );
        let updated = registry.get(&node.id).unwrap();
        assert_eq!(updated.score, node.score + 3.0);

        registry.set_fingerprint(&node.id, None);
        assert_eq!(registry.get(&node.id).unwrap().score, node.score);
    }

    #[test]
    fn test_sweep_stale() {
        let registry = registry();
        let old = registry.register(descriptor("old", "alice", "us.example")).id;
        let fresh = registry.register(descriptor("fresh", "alice", "us.example")).id;

        if let Some(entry) = registry.entry(&old) {
            entry.lock().last_seen -= 600;
        }

        assert_eq!(registry.sweep_stale(300), 1);
        assert!(!registry.get(&old).unwrap().online);
        assert!(registry.get(&fresh).unwrap().online);

        // Already offline nodes are not counted again.
        assert_eq!(registry.sweep_stale(300), 0);
    }

    #[test]
    fn test_select_narrows_by_index() {
        let registry = registry();
        registry.register(descriptor("us-a", "alice", "us.example"));
        registry.register(descriptor("us-b", "alice", "us2.example"));
        registry.register(descriptor("de-a", "bob", "de.example"));

        let query = SelectionQuery {
            country: Some("US".to_string()),
            asn: Some(7922),
            ..Default::default()
        };
        let ids: Vec<_> = registry.select(&query).into_iter().map(|n| n.id).collect();
        assert_eq!(ids, [NodeId::from("us-b")]);

        let query = SelectionQuery {
            country: Some("FR".to_string()),
            ..Default::default()
        };
        assert!(registry.select(&query).is_empty());
    }

    #[test]
    fn test_select_ties_in_registration_order() {
        let registry = registry();
        for id in ["c", "a", "b"] {
            registry.register(descriptor(id, "alice", "us.example"));
        }

        let query = SelectionQuery {
            country: Some("US".to_string()),
            ..Default::default()
        };
        let ids: Vec<_> = registry
            .select_summaries(&query)
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, [NodeId::from("c"), NodeId::from("a"), NodeId::from("b")]);
    }

    #[test]
    fn test_stats_cached_until_recompute() {
        let registry = registry();
        registry.register(descriptor("n1", "alice", "us.example"));
        assert_eq!(registry.stats().total_nodes, 1);

        registry.register(descriptor("n2", "alice", "de.example"));
        assert_eq!(registry.stats().total_nodes, 1);
        assert_eq!(registry.recompute_stats().total_nodes, 2);
        assert_eq!(registry.stats().total_nodes, 2);
    }

    #[test]
    fn test_leaderboard_cached() {
        let registry = registry();
        assert!(registry.cached_leaderboard().is_empty());

        let id = registry.register(descriptor("n1", "alice", "us.example")).id;
        registry.record_request(&id, &RequestOutcome::success(10, 1024));

        let board = registry.leaderboard(10);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].owner_id, OwnerId::from("alice"));
        assert_eq!(registry.cached_leaderboard(), board);
    }

    #[test]
    fn test_load_and_save_store() {
        let store = MemoryNodeStore::with_nodes(vec![
            test_node("a", "US", Some(701)),
            test_node("b", "DE", None),
        ]);

        let registry = registry();
        assert_eq!(registry.load_from_store(&store).unwrap(), 2);
        assert_eq!(registry.node_ids(), [NodeId::from("a"), NodeId::from("b")]);
        assert!(registry.indices_consistent());
        assert!(registry.get(&NodeId::from("a")).unwrap().score > 0.0);

        // Registration after load orders after the loaded nodes.
        registry.register(descriptor("c", "alice", "us.example"));
        let query = SelectionQuery::default();
        let ids: Vec<_> = registry.select(&query).into_iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), 3);

        let out = MemoryNodeStore::new();
        assert_eq!(registry.save_to_store(&out).unwrap(), 3);
        assert_eq!(out.count().unwrap(), 3);
    }

    #[test]
    fn test_load_duplicate_keeps_last_in_order() {
        let store = MemoryNodeStore::with_nodes(vec![
            test_node("a", "DE", Some(701)),
            test_node("b", "US", Some(701)),
            test_node("a", "US", Some(701)),
        ]);

        let registry = registry();
        assert_eq!(registry.load_from_store(&store).unwrap(), 2);
        assert_eq!(registry.node_ids(), [NodeId::from("b"), NodeId::from("a")]);
        assert_eq!(registry.get(&NodeId::from("a")).unwrap().geo.country_code, "US");
        assert!(registry.by_country("DE").is_empty());
        assert!(registry.indices_consistent());

        // Equal scores: the full scan and the index path agree on order.
        let ids = |query: &SelectionQuery| -> Vec<NodeId> {
            registry.select(query).into_iter().map(|n| n.id).collect()
        };
        let all = ids(&SelectionQuery::default());
        let us = ids(&SelectionQuery {
            country: Some("US".to_string()),
            ..Default::default()
        });
        assert_eq!(all, [NodeId::from("b"), NodeId::from("a")]);
        assert_eq!(us, all);
    }

    #[tokio::test]
    async fn test_events() {
        let registry = registry();
        let mut rx = registry.subscribe();

        let id = registry.register(descriptor("n1", "alice", "us.example")).id;
        registry.heartbeat(&id, false);
        registry.unregister(&id);

        assert!(matches!(rx.recv().await.unwrap(), RegistryEvent::Registered { .. }));
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::WentOffline { id: id.clone() });
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::Unregistered { id });
    }

    #[test]
    fn test_concurrent_record_request() {
        let registry = Arc::new(registry());
        let id = registry.register(descriptor("n1", "alice", "us.example")).id;

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let outcome = if (t + i) % 4 == 0 {
                            RequestOutcome::failure(300, "reset")
                        } else {
                            RequestOutcome::success(100, 512)
                        };
                        registry.record_request(&id, &outcome);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let node = registry.get(&id).unwrap();
        assert_eq!(node.total_requests, 2_000);
        assert_eq!(
            node.total_requests,
            node.successful_requests + node.failed_requests
        );
        assert_eq!(node.latency_window.len(), 100);
    }

    #[test]
    fn test_concurrent_register_unregister() {
        let registry = Arc::new(registry());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..100 {
                        let id = format!("t{t}-n{i}");
                        registry.register(descriptor(&id, "alice", "us.example"));
                        if i % 2 == 0 {
                            registry.unregister(&NodeId::from(id.as_str()));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.node_count(), 200);
        assert!(registry.indices_consistent());
        assert_eq!(registry.by_owner(&OwnerId::from("alice")).len(), 200);
    }
}
