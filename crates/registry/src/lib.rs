//! Registry, scoring and selection engine for contributor-operated relay nodes.
//!
//! [`RelayRegistry`] owns every node record behind an Arc-per-node map with
//! secondary indices, folds request outcomes into latency percentiles,
//! credits and a score, and answers diversity-aware selection queries.
//! [`spawn_persistence`] writes the node set behind it to a [`NodeStore`].

pub mod credits;
pub mod events;
pub mod geo;
pub mod index;
pub mod latency;
pub mod leaderboard;
mod metrics;
pub mod node;
pub mod persist;
pub mod registry;
pub mod score;
pub mod select;
pub mod stats;
pub mod store;

pub use credits::CreditPolicy;
pub use events::{EventEmitter, RegistryEvent};
pub use geo::{Continent, GeoError, GeoInfo, GeoLookup, StaticGeoLookup, UNKNOWN_COUNTRY};
pub use index::{AttributeIndex, NodeIndex};
pub use latency::{LATENCY_WINDOW_CAPACITY, LatencyStats, LatencyWindow};
pub use leaderboard::LeaderboardEntry;
pub use node::{
    Node, NodeDescriptor, NodeId, NodeSummary, NodeType, OwnerId, RegistrationReceipt,
    RequestOutcome, TlsFingerprint,
};
pub use persist::{PersistenceConfig, PersistenceHandle, spawn_persistence};
pub use registry::{RegistryConfig, RelayRegistry};
pub use score::compute_score;
pub use select::{DEFAULT_SELECTION_COUNT, SelectionQuery};
pub use stats::{AsnCount, CountryCount, NetworkStats};
pub use store::{FileNodeStore, MemoryNodeStore, NodeStore, NodeStoreError};
