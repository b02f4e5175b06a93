//! Neighbor table with whole-table replacement.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::NodeId;

/// A complete topology: node -> neighbor list.
pub type TopologyMap = HashMap<NodeId, Vec<NodeId>>;

/// Thread-safe, wholesale-replaceable topology.
///
/// The current table sits behind an `Arc`, so a replace is a pointer swap
/// under the write lock and readers never observe a half-written map.
#[derive(Debug, Default)]
pub struct Topology {
    table: RwLock<Arc<TopologyMap>>,
}

impl Topology {
    /// Create an empty topology. Every node has no neighbors until the first replace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topology from an initial table.
    pub fn from_map(map: TopologyMap) -> Self {
        Self {
            table: RwLock::new(Arc::new(map)),
        }
    }

    /// Discard the current table and install `map` in full.
    pub fn replace(&self, map: TopologyMap) {
        let map = Arc::new(map);
        *self.table.write() = map;
    }

    /// Neighbors of `node`, copied out of the table.
    ///
    /// A node missing from the table has no neighbors; that is not an error.
    pub fn neighbors_of(&self, node: &str) -> Vec<NodeId> {
        self.table.read().get(node).cloned().unwrap_or_default()
    }

    /// The current table as a whole.
    pub fn snapshot(&self) -> Arc<TopologyMap> {
        Arc::clone(&self.table.read())
    }

    /// Number of nodes with an entry in the table.
    pub fn node_count(&self) -> usize {
        self.table.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn map(entries: &[(&str, &[&str])]) -> TopologyMap {
        entries
            .iter()
            .map(|(node, neighbors)| {
                (
                    node.to_string(),
                    neighbors.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn empty_topology_has_no_neighbors() {
        let topology = Topology::new();
        assert!(topology.neighbors_of("n1").is_empty());
        assert_eq!(topology.node_count(), 0);
    }

    #[test]
    fn neighbors_follow_the_table() {
        let topology = Topology::from_map(map(&[("A", &["B", "C"]), ("B", &["A"]), ("C", &["A"])]));
        assert_eq!(topology.neighbors_of("A"), vec!["B", "C"]);
        assert_eq!(topology.neighbors_of("B"), vec!["A"]);
        assert!(topology.neighbors_of("D").is_empty());
    }

    #[test]
    fn replace_drops_old_entries() {
        let topology = Topology::from_map(map(&[("A", &["B"]), ("B", &["A"])]));
        topology.replace(map(&[("A", &["C"])]));

        assert_eq!(topology.neighbors_of("A"), vec!["C"]);
        assert!(topology.neighbors_of("B").is_empty());
        assert_eq!(topology.node_count(), 1);
    }

    #[test]
    fn returned_neighbors_are_a_copy() {
        let topology = Topology::from_map(map(&[("A", &["B"])]));
        let mut neighbors = topology.neighbors_of("A");
        neighbors.push("Z".to_string());

        assert_eq!(topology.neighbors_of("A"), vec!["B"]);
    }

    #[test]
    fn old_snapshot_survives_replace() {
        let topology = Topology::from_map(map(&[("A", &["B"])]));
        let before = topology.snapshot();
        topology.replace(map(&[("A", &["C"])]));

        assert_eq!(before["A"], vec!["B"]);
        assert_eq!(topology.snapshot()["A"], vec!["C"]);
    }

    #[test]
    fn readers_never_see_mixed_tables() {
        let old = map(&[("A", &["B", "C"])]);
        let new = map(&[("A", &["D", "E", "F"])]);
        let old_neighbors = old["A"].clone();
        let new_neighbors = new["A"].clone();

        let topology = Arc::new(Topology::from_map(old.clone()));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let topology = Arc::clone(&topology);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..5_000 {
                    if i % 2 == 0 {
                        topology.replace(new.clone());
                    } else {
                        topology.replace(old.clone());
                    }
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let topology = Arc::clone(&topology);
                let done = Arc::clone(&done);
                let old_neighbors = old_neighbors.clone();
                let new_neighbors = new_neighbors.clone();
                thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let seen = topology.neighbors_of("A");
                        assert!(
                            seen == old_neighbors || seen == new_neighbors,
                            "mixed neighbor list: {:?}",
                            seen
                        );
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn replace_installs_exactly_the_given_map(
            entries in proptest::collection::hash_map(
                "[a-e]",
                proptest::collection::vec("[a-e]", 0..5),
                0..5,
            )
        ) {
            let topology = Topology::from_map(map(&[("z", &["y"])]));
            topology.replace(entries.clone());

            prop_assert_eq!(topology.node_count(), entries.len());
            for (node, neighbors) in &entries {
                prop_assert_eq!(&topology.neighbors_of(node), neighbors);
            }
            if !entries.contains_key("z") {
                prop_assert!(topology.neighbors_of("z").is_empty());
            }
        }
    }
}
