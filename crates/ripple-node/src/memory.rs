//! In-memory network - several nodes in one process.
//!
//! Requests are delivered by calling the destination's [`Router`] directly.
//! Every request runs on its own task, so a handler keeps going after the
//! sender stops waiting. Nodes can be cut off and healed to simulate
//! partitions: requests to an unreachable node fail straight away.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use ripple_protocols::{Error, NodeId, Payload, Result, TopologyMap, Transport};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::node::BroadcastNode;
use crate::router::Router;

/// Source id used for requests injected from outside the network.
pub const CLIENT_ID: &str = "c0";

/// A set of nodes wired together in memory.
#[derive(Debug)]
pub struct MemoryNetwork {
    config: NodeConfig,
    routers: RwLock<HashMap<NodeId, Router>>,
    unreachable: RwLock<HashSet<NodeId>>,
}

impl MemoryNetwork {
    pub fn new(config: NodeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            routers: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
        })
    }

    /// Start a node and attach it to the network.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_node(self: &Arc<Self>, id: impl Into<NodeId>) -> Router {
        let id = id.into();
        let transport = Arc::new(MemoryTransport {
            id: id.clone(),
            network: Arc::downgrade(self),
        });
        let node = Arc::new(BroadcastNode::start(transport, &self.config));
        let router = Router::new(node);

        if self.routers.write().insert(id.clone(), router.clone()).is_some() {
            warn!(node = %id, "Replaced existing node");
        }
        debug!(node = %id, "Node joined");
        router
    }

    pub fn router(&self, id: &str) -> Option<Router> {
        self.routers.read().get(id).cloned()
    }

    pub fn node(&self, id: &str) -> Option<Arc<BroadcastNode>> {
        self.router(id).map(|router| Arc::clone(router.node()))
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.routers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop every request addressed to `id` until [`heal`](Self::heal) is called.
    pub fn set_unreachable(&self, id: &str) {
        info!(node = %id, "Node cut off");
        self.unreachable.write().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        info!(node = %id, "Node healed");
        self.unreachable.write().remove(id);
    }

    pub fn is_reachable(&self, id: &str) -> bool {
        !self.unreachable.read().contains(id)
    }

    /// Install `topology` on every node.
    pub fn set_topology(&self, topology: TopologyMap) {
        let routers: Vec<_> = self.routers.read().values().cloned().collect();
        for router in routers {
            router.node().set_topology(topology.clone());
        }
    }

    /// Send a client request to `dest` and return its reply.
    pub async fn client_request(&self, dest: &str, payload: Payload) -> Result<Option<Payload>> {
        let router = self
            .router(dest)
            .ok_or_else(|| Error::Transport(format!("unknown node {dest}")))?;
        router.handle(CLIENT_ID, payload).await
    }
}

/// [`Transport`] handed to each node of a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    id: NodeId,
    network: Weak<MemoryNetwork>,
}

impl MemoryTransport {
    fn route(&self, dest: &str) -> Result<Option<Router>> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| Error::Transport("network shut down".to_string()))?;
        if !network.is_reachable(dest) {
            return Ok(None);
        }
        network
            .router(dest)
            .map(Some)
            .ok_or_else(|| Error::Transport(format!("unknown node {dest}")))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn node_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, dest: &str, payload: Payload) -> Result<()> {
        if let Some(router) = self.route(dest)? {
            let src = self.id.clone();
            tokio::spawn(async move {
                if let Err(e) = router.handle(&src, payload).await {
                    debug!(src = %src, error = %e, "Fire-and-forget message failed");
                }
            });
        }
        Ok(())
    }

    async fn request(&self, dest: &str, payload: Payload, timeout: Duration) -> Result<Payload> {
        let Some(router) = self.route(dest)? else {
            return Err(Error::Transport(format!("{dest} is unreachable")));
        };

        // `handle` is not cancel-safe; the deadline only bounds our wait.
        let src = self.id.clone();
        let handler = tokio::spawn(async move { router.handle(&src, payload).await });

        match tokio::time::timeout(timeout, handler).await {
            Ok(Ok(Ok(Some(Payload::Error { code, text })))) => Err(Error::Rejected { code, text }),
            Ok(Ok(Ok(Some(reply)))) => Ok(reply),
            Ok(Ok(Ok(None))) => Err(Error::Transport(format!("{dest} sent no reply"))),
            Ok(Ok(Err(e))) => Err(Error::Rejected {
                code: e.code().as_u32(),
                text: e.to_string(),
            }),
            Ok(Err(e)) => Err(Error::Transport(format!("{dest} handler failed: {e}"))),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_protocols::{BroadcastValue, PropagationConfig};

    fn config() -> NodeConfig {
        NodeConfig::default().with_propagation(PropagationConfig::default().with_workers(4))
    }

    fn mesh(ids: &[&str]) -> TopologyMap {
        ids.iter()
            .map(|id| {
                let others: Vec<NodeId> = ids.iter().filter(|o| *o != id).map(|o| o.to_string()).collect();
                (id.to_string(), others)
            })
            .collect()
    }

    fn network(ids: &[&str]) -> Arc<MemoryNetwork> {
        network_with(config(), ids)
    }

    fn network_with(config: NodeConfig, ids: &[&str]) -> Arc<MemoryNetwork> {
        let network = MemoryNetwork::new(config);
        for id in ids {
            network.add_node(*id);
        }
        network
    }

    fn has(network: &MemoryNetwork, id: &str, value: BroadcastValue) -> bool {
        network
            .node(id)
            .is_some_and(|node| node.store().contains(&value))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(120), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    async fn broadcast(network: &MemoryNetwork, dest: &str, message: BroadcastValue) {
        let reply = network
            .client_request(dest, Payload::Broadcast { message })
            .await
            .unwrap();
        assert_eq!(reply, Some(Payload::BroadcastOk));
    }

    #[tokio::test(start_paused = true)]
    async fn value_reaches_every_node_once() {
        let ids = ["n1", "n2", "n3"];
        let network = network(&ids);
        network.set_topology(mesh(&ids));

        broadcast(&network, "n1", 42).await;
        eventually(|| ids.iter().all(|id| has(&network, id, 42))).await;

        for id in ids {
            let reply = network.client_request(id, Payload::Read).await.unwrap();
            assert_eq!(reply, Some(Payload::ReadOk { messages: vec![42] }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn relays_stop_once_acknowledged() {
        let ids = ["n1", "n2", "n3"];
        let network = network(&ids);
        network.set_topology(mesh(&ids));

        broadcast(&network, "n1", 1).await;
        eventually(|| ids.iter().all(|id| has(&network, id, 1))).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        // n1 relays to two neighbors; whoever accepts first relays onward too.
        let stats = network.node("n1").unwrap().propagation_stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_node_catches_up_after_heal() {
        let network = network(&["n1", "n2", "n3"]);
        let mut topology = TopologyMap::new();
        topology.insert("n1".into(), vec!["n2".into(), "n3".into()]);
        network.set_topology(topology);
        network.set_unreachable("n2");

        broadcast(&network, "n1", 9).await;
        eventually(|| has(&network, "n3", 9)).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!has(&network, "n2", 9));
        assert!(network.node("n1").unwrap().propagation_stats().failed_attempts > 0);

        network.heal("n2");
        eventually(|| has(&network, "n2", 9)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn topology_change_applies_to_later_values_only() {
        let network = network(&["n1", "n2"]);
        network.set_topology(TopologyMap::from([("n1".to_string(), Vec::new())]));
        broadcast(&network, "n1", 1).await;

        network.set_topology(TopologyMap::from([("n1".to_string(), vec!["n2".to_string()])]));
        broadcast(&network, "n1", 2).await;

        eventually(|| has(&network, "n2", 2)).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(network.node("n2").unwrap().read(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_to_unknown_nodes_fail() {
        let network = network(&["n1"]);
        let err = network.client_request("n9", Payload::Read).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_request_fails_until_healed() {
        let network = network(&["n1", "n2"]);
        network.set_unreachable("n2");

        let transport = MemoryTransport {
            id: "n1".into(),
            network: Arc::downgrade(&network),
        };
        let started = tokio::time::Instant::now();
        let err = transport
            .request("n2", Payload::Read, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(5));

        network.heal("n2");
        let reply = transport
            .request("n2", Payload::Read, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply, Payload::ReadOk { messages: vec![] });
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_survives_sender_timeout() {
        // n2 has one worker and a one-slot queue, and its first neighbor is
        // down: accepting the relay from n1 blocks in enqueue far longer than
        // n1's attempt timeout.
        let config = NodeConfig::default().with_propagation(
            PropagationConfig::default()
                .with_workers(1)
                .with_queue_capacity(1)
                .with_attempt_timeout(Duration::from_secs(1)),
        );
        let network = network_with(config, &["n1", "n2", "n3", "n4", "n5"]);
        network.set_topology(TopologyMap::from([
            ("n1".to_string(), vec!["n2".to_string()]),
            ("n2".to_string(), vec!["n3".to_string(), "n4".to_string(), "n5".to_string()]),
        ]));
        network.set_unreachable("n3");

        broadcast(&network, "n1", 1).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(has(&network, "n2", 1));
        assert!(!has(&network, "n3", 1));

        network.heal("n3");
        eventually(|| ["n3", "n4", "n5"].iter().all(|id| has(&network, id, 1))).await;
        assert_eq!(network.node("n2").unwrap().propagation_stats().enqueued, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn generated_ids_are_unique_across_nodes() {
        let network = network(&["n1", "n2"]);
        let mut ids = HashSet::new();
        for dest in ["n1", "n2", "n1", "n2"] {
            match network.client_request(dest, Payload::Generate).await.unwrap() {
                Some(Payload::GenerateOk { id }) => assert!(ids.insert(id)),
                other => panic!("unexpected reply: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn node_ids_are_sorted() {
        let network = network(&["n3", "n1", "n2"]);
        assert_eq!(network.node_ids(), vec!["n1", "n2", "n3"]);
    }
}
