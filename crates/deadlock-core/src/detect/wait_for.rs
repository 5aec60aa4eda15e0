//! Wait-for graph: the allocation graph with resources collapsed out.
//!
//! An edge `P1 → P2` exists iff `P1` requests some resource currently held
//! by `P2`. A process requesting a resource it already holds gets a
//! self-loop. For single-instance resources a cycle here is equivalent to a
//! cycle in the full allocation graph, at a fraction of the node count.

#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::instrument;

use crate::graph::{GraphStore, ProcessId};

/// Process-to-process wait relation derived from a [`GraphStore`].
#[derive(Debug, Clone)]
pub struct WaitForGraph {
    /// Nodes are live processes, inserted in ascending id order.
    pub graph: DiGraph<ProcessId, ()>,
    /// Mapping from process id to petgraph `NodeIndex`.
    pub node_map: HashMap<ProcessId, NodeIndex>,
}

impl WaitForGraph {
    /// Collapse the store's request/assignment relations into wait edges.
    #[must_use]
    #[instrument(skip(store))]
    pub fn from_store(store: &GraphStore) -> Self {
        let mut graph = DiGraph::<ProcessId, ()>::with_capacity(store.process_count(), 0);
        let mut node_map: HashMap<ProcessId, NodeIndex> =
            HashMap::with_capacity(store.process_count());

        for pid in store.process_ids() {
            node_map.insert(pid, graph.add_node(pid));
        }

        for waiter in store.process_ids() {
            for rid in store.requested_resources(waiter) {
                for holder in store.holders(rid) {
                    let (a, b) = (node_map[&waiter], node_map[&holder]);
                    // Several shared resources collapse into one edge.
                    if !graph.contains_edge(a, b) {
                        graph.add_edge(a, b, ());
                    }
                }
            }
        }

        Self { graph, node_map }
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether `waiter` waits on a resource held by `holder`.
    #[must_use]
    pub fn waits_for(&self, waiter: ProcessId, holder: ProcessId) -> bool {
        match (self.node_map.get(&waiter), self.node_map.get(&holder)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Whether any wait cycle exists.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// First cycle found by an iterative DFS in ascending id order.
    ///
    /// The returned path starts at the revisited process and follows wait
    /// edges; the closing edge runs from the last entry back to the first.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<ProcessId>> {
        let n = self.graph.node_count();
        // 0 = unvisited, 1 = on path, 2 = finished
        let mut state = vec![0_u8; n];
        let mut path: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();

        for start in self.sorted_nodes() {
            if state[start.index()] != 0 {
                continue;
            }
            state[start.index()] = 1;
            path.push((start, self.sorted_successors(start), 0));

            while let Some((node, successors, next)) = path.last_mut() {
                let node = *node;
                let Some(&succ) = successors.get(*next) else {
                    state[node.index()] = 2;
                    path.pop();
                    continue;
                };
                *next += 1;

                match state[succ.index()] {
                    1 => {
                        let from = path.iter().position(|(n, _, _)| *n == succ)?;
                        return Some(path[from..].iter().map(|(n, _, _)| self.graph[*n]).collect());
                    }
                    0 => {
                        state[succ.index()] = 1;
                        path.push((succ, self.sorted_successors(succ), 0));
                    }
                    _ => {}
                }
            }
        }
        None
    }

    /// Processes in each wait cycle, grouped by strongly connected component.
    ///
    /// Each group is sorted ascending; groups are sorted by their first
    /// member. Self-waiting processes form a one-element group.
    #[must_use]
    pub fn cyclic_components(&self) -> Vec<Vec<ProcessId>> {
        let mut components: Vec<Vec<ProcessId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| self.graph.contains_edge(node, node))
            })
            .map(|component| {
                let mut ids: Vec<ProcessId> =
                    component.into_iter().map(|idx| self.graph[idx]).collect();
                ids.sort_unstable();
                ids
            })
            .collect();

        components.sort_unstable();
        components
    }

    fn sorted_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        nodes.sort_unstable_by_key(|&idx| self.graph[idx]);
        nodes
    }

    fn sorted_successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        next.sort_unstable_by_key(|&idx| self.graph[idx]);
        next.dedup();
        next
    }
}
