//! The messaging transport the propagation engine relies on.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Payload;

/// Point-to-point messaging between nodes.
///
/// Implementations own framing, message ids and reply correlation. The
/// engine only ever issues [`request`](Self::request).
#[async_trait]
pub trait Transport: Send + Sync {
    /// This node's identifier.
    fn node_id(&self) -> &str;

    /// Deliver `payload` to `dest` without waiting for a reply.
    async fn send(&self, dest: &str, payload: Payload) -> Result<()>;

    /// Deliver `payload` to `dest` and wait up to `timeout` for its reply.
    ///
    /// Errors:
    /// - [`Error::Timeout`](crate::Error::Timeout) when no reply arrives in time
    /// - [`Error::Transport`](crate::Error::Transport) when delivery itself failed
    /// - [`Error::Rejected`](crate::Error::Rejected) when `dest` replied with an `error` body
    async fn request(&self, dest: &str, payload: Payload, timeout: Duration) -> Result<Payload>;
}
