//! Ripple Topology Table
//!
//! Maps each node to the neighbors it relays broadcasts to.
//!
//! The topology is pushed in by an external controller and is never computed
//! or merged locally. Every update replaces the whole table: a reader sees
//! either the previous table or the new one, never a mix of the two.

mod table;

pub use table::{Topology, TopologyMap};

/// Opaque node identifier assigned by the harness (e.g. `"n1"`).
pub type NodeId = String;
