//! Ripple Protocols - wire messages and reliable propagation
//!
//! This crate holds everything that travels between ripple nodes and the
//! machinery that makes sure it arrives.
//!
//! # Overview
//!
//! ## Messages
//!
//! The [`message`] module models the line-delimited JSON protocol spoken with
//! the test harness and with neighbor nodes: an [`Envelope`] addressed from
//! `src` to `dest`, carrying a [`Body`] whose [`Payload`] is tagged by `type`.
//!
//! ## Transport
//!
//! [`Transport`] is the only thing the engine needs from the outside world:
//! fire-and-forget [`send`](Transport::send) and a deadline-bounded
//! [`request`](Transport::request) that tells timeouts, delivery failures and
//! explicit rejections apart.
//!
//! ## Propagation
//!
//! The [`PropagationEngine`] runs a fixed pool of workers draining a bounded
//! queue of [`Obligation`]s. Each worker retries its obligation with capped
//! exponential [`Backoff`] until the destination acknowledges:
//!
//! - **At-least-once per edge**: no attempt limit, delivery is retried forever
//! - **Backpressure**: a full queue stalls the producer instead of dropping work
//! - **Isolation**: an unreachable neighbor pins one worker, never the pool
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_protocols::{Obligation, PropagationConfig, PropagationEngine};
//!
//! let engine = PropagationEngine::start(transport, PropagationConfig::default());
//! engine.enqueue(Obligation::new(42, "n2")).await?;
//! ```

pub mod backoff;
pub mod error;
pub mod message;
pub mod propagation;
pub mod transport;

pub use backoff::Backoff;
pub use error::{Error, ErrorCode, Result};
pub use message::{Body, Envelope, MsgId, Payload};
pub use propagation::{Obligation, PropagationConfig, PropagationEngine, PropagationStats};
pub use transport::Transport;

pub use ripple_store::BroadcastValue;
pub use ripple_topology::{NodeId, TopologyMap};
