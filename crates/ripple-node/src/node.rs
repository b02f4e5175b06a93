//! Broadcast Node - value store, topology and propagation for one node.
//!
//! Accepting a value and propagating it are two separate control paths. The
//! accept path marks the value seen and queues one obligation per neighbor;
//! the engine's workers deliver them later. The queue is the only handoff.

use std::sync::Arc;

use ripple_protocols::{
    BroadcastValue, NodeId, Obligation, PropagationEngine, PropagationStats, Result, TopologyMap,
    Transport,
};
use ripple_store::ValueStore;
use ripple_topology::Topology;
use tracing::{debug, info};

use crate::config::NodeConfig;

/// State and propagation machinery owned by a single node.
#[derive(Debug)]
pub struct BroadcastNode {
    id: NodeId,
    store: ValueStore,
    topology: Topology,
    engine: PropagationEngine,
}

impl BroadcastNode {
    /// Create a node and start its propagation workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, config: &NodeConfig) -> Self {
        let id = transport.node_id().to_string();
        let engine = PropagationEngine::start(transport, config.propagation.clone());

        Self {
            id,
            store: ValueStore::new(),
            topology: Topology::new(),
            engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Accept a broadcast value.
    ///
    /// Returns true if the value was new. A new value is queued for every
    /// neighbor known right now; later topology changes do not touch it.
    /// Waits if the propagation queue is full.
    ///
    /// Not cancel-safe: the value is marked seen before its obligations are
    /// queued, so dropping the future part way loses the remaining fan-out.
    /// Run it to completion, on its own task if the caller may give up.
    pub async fn accept(&self, value: BroadcastValue) -> Result<bool> {
        if !self.store.add_if_new(value) {
            debug!(node = %self.id, value, "Duplicate broadcast ignored");
            return Ok(false);
        }

        let neighbors = self.topology.neighbors_of(&self.id);
        debug!(node = %self.id, value, fanout = neighbors.len(), "Accepted new broadcast");

        for neighbor in neighbors {
            self.engine.enqueue(Obligation::new(value, neighbor)).await?;
        }

        Ok(true)
    }

    /// Every value accepted so far.
    pub fn read(&self) -> Vec<BroadcastValue> {
        self.store.snapshot()
    }

    /// Install a new topology, replacing the old one entirely.
    pub fn set_topology(&self, topology: TopologyMap) {
        self.topology.replace(topology);
        info!(
            node = %self.id,
            neighbors = ?self.topology.neighbors_of(&self.id),
            "Topology updated"
        );
    }

    /// This node's current neighbors.
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.topology.neighbors_of(&self.id)
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn propagation_stats(&self) -> PropagationStats {
        self.engine.stats()
    }
}
