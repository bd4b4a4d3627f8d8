//! Registry events and non-blocking broadcast emitter.

use tokio::sync::broadcast;

use crate::node::{NodeId, OwnerId};

/// Registry lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Registered {
        id: NodeId,
        owner_id: OwnerId,
    },
    Unregistered {
        id: NodeId,
    },
    WentOnline {
        id: NodeId,
    },
    WentOffline {
        id: NodeId,
    },
    ScoreChanged {
        id: NodeId,
        old_score: f64,
        new_score: f64,
    },
}

impl RegistryEvent {
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Registered { id, .. }
            | Self::Unregistered { id }
            | Self::WentOnline { id }
            | Self::WentOffline { id }
            | Self::ScoreChanged { id, .. } => id,
        }
    }

    pub fn is_liveness_event(&self) -> bool {
        matches!(self, Self::WentOnline { .. } | Self::WentOffline { .. })
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<RegistryEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: RegistryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tx.subscribe()
    }

    pub fn registered(&self, id: NodeId, owner_id: OwnerId) {
        self.emit(RegistryEvent::Registered { id, owner_id });
    }

    pub fn unregistered(&self, id: NodeId) {
        self.emit(RegistryEvent::Unregistered { id });
    }

    pub fn liveness_changed(&self, id: NodeId, online: bool) {
        if online {
            self.emit(RegistryEvent::WentOnline { id });
        } else {
            self.emit(RegistryEvent::WentOffline { id });
        }
    }

    /// Emits only when the score actually moved.
    pub fn score_changed(&self, id: NodeId, old_score: f64, new_score: f64) {
        if old_score != new_score {
            self.emit(RegistryEvent::ScoreChanged {
                id,
                old_score,
                new_score,
            });
        }
    }
}
