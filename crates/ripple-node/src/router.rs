//! Request Router - maps inbound payloads onto node operations.

use std::sync::Arc;

use ripple_protocols::{Error, Payload, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::node::BroadcastNode;

/// Dispatches inbound payloads to a [`BroadcastNode`] and builds the replies.
#[derive(Debug, Clone)]
pub struct Router {
    node: Arc<BroadcastNode>,
}

impl Router {
    pub fn new(node: Arc<BroadcastNode>) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Arc<BroadcastNode> {
        &self.node
    }

    /// Handle one inbound payload from `src`.
    ///
    /// Returns the reply payload, or `None` for payloads that are themselves
    /// replies and must not be answered.
    pub async fn handle(&self, src: &str, payload: Payload) -> Result<Option<Payload>> {
        match payload {
            Payload::Broadcast { message } => {
                // Reply as soon as the value is accepted; relaying happens in the background.
                self.node.accept(message).await?;
                Ok(Some(Payload::BroadcastOk))
            }

            Payload::Read => Ok(Some(Payload::ReadOk {
                messages: self.node.read(),
            })),

            Payload::Topology { topology } => {
                self.node.set_topology(topology);
                Ok(Some(Payload::TopologyOk))
            }

            Payload::Generate => Ok(Some(Payload::GenerateOk {
                id: Uuid::new_v4().to_string(),
            })),

            Payload::Init { node_id, .. } => {
                if node_id != self.node.id() {
                    warn!(
                        node = self.node.id(),
                        requested = %node_id,
                        "Ignoring re-init with a different node id"
                    );
                }
                Ok(Some(Payload::InitOk))
            }

            Payload::BroadcastOk | Payload::InitOk | Payload::Error { .. } => {
                debug!(from = src, kind = payload.kind(), "Dropping unsolicited reply");
                Ok(None)
            }

            other => Err(Error::NotSupported(other.kind().to_string())),
        }
    }
}
