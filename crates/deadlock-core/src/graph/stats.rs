//! Summary statistics and a text rendering of the graph store.
//!
//! # Statistics Provided
//!
//! - **processes** / **resources**: live entity counts.
//! - **pending_requests**: number of request edges.
//! - **assigned_instances**: instances held across all assignment edges.
//! - **total_instances** / **available_instances**: pool totals over live
//!   resources; `available + assigned == total` always holds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::store::GraphStore;

/// Summary statistics for a [`GraphStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub processes: usize,
    pub resources: usize,
    pub pending_requests: usize,
    pub assigned_instances: u64,
    pub total_instances: u64,
    pub available_instances: u64,
}

impl GraphStats {
    #[must_use]
    pub fn from_store(store: &GraphStore) -> Self {
        let (total_instances, available_instances) =
            store.resources().fold((0_u64, 0_u64), |(total, avail), r| {
                (
                    total + u64::from(r.total_instances),
                    avail + u64::from(r.available_instances),
                )
            });

        Self {
            processes: store.process_count(),
            resources: store.resource_count(),
            pending_requests: store.pending_request_count(),
            assigned_instances: store.assigned_instance_count(),
            total_instances,
            available_instances,
        }
    }
}

impl GraphStore {
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        GraphStats::from_store(self)
    }
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processes={} resources={} requests={} assigned={}/{}",
            self.processes,
            self.resources,
            self.pending_requests,
            self.assigned_instances,
            self.total_instances
        )
    }
}

impl fmt::Display for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resource Allocation Graph")?;
        writeln!(
            f,
            "Processes: {}, Resources: {}",
            self.process_count(),
            self.resource_count()
        )?;

        writeln!(f, "-- processes --")?;
        for p in self.processes() {
            writeln!(
                f,
                "  {}: {} (priority={}, state={})",
                p.id,
                p.name,
                p.priority,
                p.state.as_str()
            )?;
        }

        writeln!(f, "-- resources --")?;
        for r in self.resources() {
            writeln!(
                f,
                "  {}: {} (total={}, available={})",
                r.id, r.name, r.total_instances, r.available_instances
            )?;
        }

        writeln!(f, "-- requests --")?;
        let mut any = false;
        for p in self.processes() {
            for rid in self.requested_resources(p.id) {
                writeln!(f, "  {} --requests--> {rid}", p.id)?;
                any = true;
            }
        }
        if !any {
            writeln!(f, "  (none)")?;
        }

        writeln!(f, "-- assignments --")?;
        any = false;
        for p in self.processes() {
            for rid in self.held_resources(p.id) {
                writeln!(
                    f,
                    "  {rid} --assigned--> {} [{}]",
                    p.id,
                    self.held_count(p.id, rid)
                )?;
                any = true;
            }
        }
        if !any {
            writeln!(f, "  (none)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_edges_and_pool() {
        let mut store = GraphStore::default();
        let p = store.add_process("worker", 10).expect("add");
        let q = store.add_process("reader", 10).expect("add");
        let r = store.add_resource("disk", 3).expect("add");
        store.allocate(p, r).expect("allocate");
        store.request(q, r).expect("request");

        let stats = store.stats();
        assert_eq!(stats.processes, 2);
        assert_eq!(stats.resources, 1);
        assert_eq!(stats.pending_requests, 1);
        assert_eq!(stats.assigned_instances, 1);
        assert_eq!(stats.available_instances + stats.assigned_instances, stats.total_instances);
    }

    #[test]
    fn rendering_lists_edges() {
        let mut store = GraphStore::default();
        let p = store.add_process("worker", 10).expect("add");
        let r = store.add_resource("disk", 1).expect("add");
        store.allocate(p, r).expect("allocate");

        let text = store.to_string();
        assert!(text.contains("P0: worker (priority=10, state=RUNNING)"));
        assert!(text.contains("R0 --assigned--> P0 [1]"));
        assert!(text.contains("-- requests --\n  (none)"));
    }
}
