//! Relay node records and the inbound shapes that create and update them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credits::{CreditPolicy, credits_per_hour};
use crate::geo::{Continent, GeoInfo};
use crate::latency::{LatencyStats, LatencyWindow};
use crate::score::compute_score;

/// Opaque relay node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random 128-bit hex identifier.
    pub fn random() -> Self {
        Self(hex::encode(rand::random::<[u8; 16]>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of the contributor operating one or more nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Connection type of the relay's uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Residential,
    Mobile,
    Datacenter,
    Isp,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::Mobile => "mobile",
            Self::Datacenter => "datacenter",
            Self::Isp => "isp",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "residential" => Ok(Self::Residential),
            "mobile" => Ok(Self::Mobile),
            "datacenter" => Ok(Self::Datacenter),
            "isp" => Ok(Self::Isp),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}

/// TLS fingerprint the relay presents, and the client it imitates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsFingerprint {
    pub hash: String,
    pub client: String,
}

/// Registration request from a node operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Assigned by the registry when absent.
    #[serde(default)]
    pub id: Option<NodeId>,
    pub owner_id: OwnerId,
    pub host: String,
    pub port: u16,
    pub bandwidth_mbps: f64,
    pub node_type: NodeType,
    pub version: String,
    /// Generated by the registry when absent.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Uptime percentage; defaults to 100.
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub tls_fingerprint: Option<TlsFingerprint>,
}

impl NodeDescriptor {
    pub fn new(
        owner_id: impl Into<OwnerId>,
        host: impl Into<String>,
        port: u16,
        node_type: NodeType,
    ) -> Self {
        Self {
            id: None,
            owner_id: owner_id.into(),
            host: host.into(),
            port,
            bandwidth_mbps: 0.0,
            node_type,
            version: String::new(),
            public_key: None,
            uptime: None,
            tls_fingerprint: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_bandwidth(mut self, mbps: f64) -> Self {
        self.bandwidth_mbps = mbps;
        self
    }

    pub fn with_uptime(mut self, uptime: f64) -> Self {
        self.uptime = Some(uptime);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: TlsFingerprint) -> Self {
        self.tls_fingerprint = Some(fingerprint);
        self
    }
}

/// Result of one relayed request, reported by the routing client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub success: bool,
    pub latency_ms: u64,
    /// Bytes sent to the client through the relay.
    pub bytes_transferred: u64,
    #[serde(default)]
    pub bytes_received: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl RequestOutcome {
    pub fn success(latency_ms: u64, bytes_transferred: u64) -> Self {
        Self {
            success: true,
            latency_ms,
            bytes_transferred,
            ..Default::default()
        }
    }

    pub fn failure(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            latency_ms,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Authoritative record of one registered relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub owner_id: OwnerId,
    pub public_key: String,
    pub registered_at: u64,
    pub version: String,

    pub host: String,
    pub port: u16,

    pub geo: GeoInfo,
    pub continent: Continent,
    pub node_type: NodeType,

    pub bandwidth_mbps: f64,
    pub uptime: f64,
    pub latency: LatencyStats,
    pub latency_window: LatencyWindow,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub consecutive_failures: u32,

    pub bytes_served: u64,
    pub bytes_received: u64,

    pub credits_earned: f64,
    pub credits_per_hour: f64,

    pub online: bool,
    pub last_seen: u64,
    pub last_health_check: Option<u64>,
    pub health_check_failures: u32,

    pub tls_fingerprint: Option<TlsFingerprint>,

    /// Derived from the fields above; recomputed on load.
    #[serde(skip)]
    pub score: f64,
}

impl Node {
    /// Build a fresh record for a registration. The score is computed.
    pub fn from_descriptor(id: NodeId, descriptor: NodeDescriptor, geo: GeoInfo, now: u64) -> Self {
        let public_key = descriptor
            .public_key
            .unwrap_or_else(|| hex::encode(rand::random::<[u8; 32]>()));

        let mut node = Self {
            id,
            owner_id: descriptor.owner_id,
            public_key,
            registered_at: now,
            version: descriptor.version,
            host: descriptor.host,
            port: descriptor.port,
            continent: geo.continent(),
            geo,
            node_type: descriptor.node_type,
            bandwidth_mbps: descriptor.bandwidth_mbps.max(0.0),
            uptime: descriptor.uptime.unwrap_or(100.0).clamp(0.0, 100.0),
            latency: LatencyStats::default(),
            latency_window: LatencyWindow::new(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            success_rate: 0.0,
            consecutive_failures: 0,
            bytes_served: 0,
            bytes_received: 0,
            credits_earned: 0.0,
            credits_per_hour: 0.0,
            online: true,
            last_seen: now,
            last_health_check: None,
            health_check_failures: 0,
            tls_fingerprint: descriptor.tls_fingerprint,
            score: 0.0,
        };
        node.refresh_score();
        node
    }

    /// Apply one request outcome: counters, traffic, latency window, credits,
    /// score and liveness, in that order.
    pub(crate) fn apply_outcome(
        &mut self,
        outcome: &RequestOutcome,
        policy: &CreditPolicy,
        now: u64,
    ) -> f64 {
        self.total_requests += 1;
        if outcome.success {
            self.successful_requests += 1;
            self.consecutive_failures = 0;
        } else {
            self.failed_requests += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        self.success_rate = self.successful_requests as f64 / self.total_requests as f64;

        self.bytes_served = self.bytes_served.saturating_add(outcome.bytes_transferred);
        self.bytes_received = self.bytes_received.saturating_add(outcome.bytes_received);

        self.latency_window.push(outcome.latency_ms);
        self.latency = self.latency_window.stats();

        let reward = policy.reward(outcome.bytes_transferred, self.success_rate);
        self.credits_earned += reward;
        self.credits_per_hour = credits_per_hour(self.credits_earned, self.registered_at, now);

        self.refresh_score();
        self.last_seen = now;

        reward
    }

    /// Update liveness. Returns true if the online flag changed.
    pub(crate) fn set_online(&mut self, online: bool, now: u64) -> bool {
        let changed = self.online != online;
        self.online = online;
        self.last_seen = now;
        changed
    }

    /// Record a health probe. Returns true if the online flag changed.
    pub(crate) fn apply_health_check(&mut self, passed: bool, failure_threshold: u32, now: u64) -> bool {
        self.last_health_check = Some(now);
        let was_online = self.online;
        if passed {
            self.health_check_failures = 0;
            self.online = true;
            self.last_seen = now;
        } else {
            self.health_check_failures = self.health_check_failures.saturating_add(1);
            if self.health_check_failures >= failure_threshold {
                self.online = false;
            }
        }
        was_online != self.online
    }

    pub(crate) fn set_fingerprint(&mut self, fingerprint: Option<TlsFingerprint>) {
        self.tls_fingerprint = fingerprint;
        self.refresh_score();
    }

    pub(crate) fn refresh_score(&mut self) {
        self.score = compute_score(self);
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary::from(self)
    }

    /// What the operator gets back from a registration.
    pub fn receipt(&self) -> RegistrationReceipt {
        RegistrationReceipt::from(self)
    }
}

/// Public view of a node handed to routing clients.
///
/// Carries no owner or credit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub public_key: String,
    pub country_code: String,
    pub country_name: String,
    pub continent: Continent,
    pub region: Option<String>,
    pub city: Option<String>,
    pub asn: Option<u32>,
    pub as_org: Option<String>,
    pub node_type: NodeType,
    pub score: f64,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            host: node.host.clone(),
            port: node.port,
            public_key: node.public_key.clone(),
            country_code: node.geo.country_code.clone(),
            country_name: node.geo.country_name.clone(),
            continent: node.continent,
            region: node.geo.region.clone(),
            city: node.geo.city.clone(),
            asn: node.geo.asn,
            as_org: node.geo.as_org.clone(),
            node_type: node.node_type,
            score: node.score,
        }
    }
}

/// Returned to the operator after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    pub node_id: NodeId,
    pub public_key: String,
    pub geo: GeoInfo,
}

impl From<&Node> for RegistrationReceipt {
    fn from(node: &Node) -> Self {
        Self {
            node_id: node.id.clone(),
            public_key: node.public_key.clone(),
            geo: node.geo.clone(),
        }
    }
}

pub(crate) fn current_unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
