//! Ripple Node - fault-tolerant broadcast
//!
//! A node accepts broadcast values, remembers each one once, and relays new
//! values to its configured neighbors until every neighbor has acknowledged.
//! Callers get their `broadcast_ok` as soon as the value is accepted
//! locally; propagation continues in the background.
//!
//! # Architecture
//!
//! - **Node**: owns the value store, the topology table and the propagation engine
//! - **Router**: turns inbound payloads into node operations and reply payloads
//! - **Stdio**: the harness transport, one JSON message per line on stdin/stdout
//! - **Memory**: an in-process network of nodes for simulation and tests
//! - **Config**: engine tuning read from the environment
//!
//! # Example
//!
//! ```no_run
//! use ripple_node::NodeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     ripple_node::stdio::run(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod node;
pub mod router;
pub mod stdio;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use memory::MemoryNetwork;
pub use node::BroadcastNode;
pub use router::Router;
