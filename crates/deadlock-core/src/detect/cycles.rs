//! Three-color DFS cycle detection over the resource allocation graph.
//!
//! # Edge Direction
//!
//! A process node points at every resource it is requesting; a resource
//! node points at every process currently holding one of its instances.
//! A cycle therefore alternates process and resource nodes, and each
//! process on it waits for a resource held by the next.
//!
//! # Determinism
//!
//! Start nodes are scanned in ascending process id, and successors are
//! visited in ascending id at every branch point. Two runs over the same
//! graph yield the same cycles in the same order.
//!
//! # Sweep Coverage
//!
//! In [`DetectionMode::AllCycles`] the sweep records a cycle, retires the
//! nodes on the abandoned DFS path as finished, and continues from the next
//! unvisited start process. A finished node is never revisited, so cycles
//! that overlap a previously explored subgraph are not enumerated. The
//! deadlock verdict is unaffected; only the cycle list is partial.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, trace};

use crate::graph::{GraphStore, NodeRef, ProcessId, ResourceId};

/// Upper bound on cycles recorded in one [`DeadlockResult`].
pub const MAX_RECORDED_CYCLES: usize = 32;

/// How far a detection sweep goes after the first cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Stop at the first cycle found.
    #[default]
    FirstCycle,
    /// Keep scanning unvisited start processes after each cycle.
    AllCycles,
}

/// A closed alternating walk of process and resource nodes.
///
/// The closing edge runs from the last node back to the first; no node
/// repeats within `nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub nodes: Vec<NodeRef>,
}

impl Cycle {
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Process members in cycle order.
    pub fn processes(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.nodes.iter().filter_map(|n| n.as_process())
    }

    /// Resource members in cycle order.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.nodes.iter().filter_map(|n| n.as_resource())
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

/// Outcome of a detection sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockResult {
    pub deadlock_detected: bool,
    pub cycles: Vec<Cycle>,
    /// Union of process members across `cycles`, ascending.
    pub deadlocked_processes: Vec<ProcessId>,
    /// Union of resource members across `cycles`, ascending.
    pub deadlocked_resources: Vec<ResourceId>,
}

impl DeadlockResult {
    fn from_cycles(cycles: Vec<Cycle>) -> Self {
        let processes: BTreeSet<ProcessId> = cycles.iter().flat_map(Cycle::processes).collect();
        let resources: BTreeSet<ResourceId> = cycles.iter().flat_map(Cycle::resources).collect();
        Self {
            deadlock_detected: !cycles.is_empty(),
            cycles,
            deadlocked_processes: processes.into_iter().collect(),
            deadlocked_resources: resources.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    #[must_use]
    pub fn deadlocked_process_count(&self) -> usize {
        self.deadlocked_processes.len()
    }

    #[must_use]
    pub fn deadlocked_resource_count(&self) -> usize {
        self.deadlocked_resources.len()
    }

    /// How many processes the deadlock reaches; zero without a deadlock.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.deadlock_detected {
            self.deadlocked_processes.len()
        } else {
            0
        }
    }

    #[must_use]
    pub fn contains_process(&self, pid: ProcessId) -> bool {
        self.deadlocked_processes.binary_search(&pid).is_ok()
    }

    #[must_use]
    pub fn contains_resource(&self, rid: ResourceId) -> bool {
        self.deadlocked_resources.binary_search(&rid).is_ok()
    }
}

impl fmt::Display for DeadlockResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Deadlock: {}",
            if self.deadlock_detected { "YES" } else { "NO" }
        )?;
        if !self.deadlock_detected {
            return Ok(());
        }
        writeln!(f, "Cycles: {}", self.cycles.len())?;
        for (i, cycle) in self.cycles.iter().enumerate() {
            writeln!(f, "  {}. {cycle}", i + 1)?;
        }
        writeln!(f, "Deadlocked processes: {}", self.deadlocked_processes.len())?;
        write!(f, "Deadlocked resources: {}", self.deadlocked_resources.len())
    }
}

/// Detect a deadlock, stopping at the first cycle.
#[must_use]
pub fn detect_deadlock(store: &GraphStore) -> DeadlockResult {
    detect_with_mode(store, DetectionMode::FirstCycle)
}

/// Detect a deadlock, recording every cycle the sweep reaches.
#[must_use]
pub fn detect_all_cycles(store: &GraphStore) -> DeadlockResult {
    detect_with_mode(store, DetectionMode::AllCycles)
}

/// Run a detection sweep in the given mode.
///
/// Never fails: an empty graph, or one with no pending requests, simply
/// reports no deadlock.
#[must_use]
#[instrument(skip(store))]
pub fn detect_with_mode(store: &GraphStore, mode: DetectionMode) -> DeadlockResult {
    let mut dfs = Dfs::new(store);
    let mut cycles = Vec::new();

    for pid in store.process_ids() {
        if !store.has_pending_requests(pid) {
            continue;
        }
        let start = NodeRef::Process(pid);
        if dfs.color(start) != Color::White {
            continue;
        }
        if let Some(cycle) = dfs.run(start) {
            trace!(%cycle, "cycle recorded");
            if cycles.len() < MAX_RECORDED_CYCLES {
                cycles.push(cycle);
            }
            if mode == DetectionMode::FirstCycle {
                break;
            }
            dfs.retire_path();
        }
    }

    let result = DeadlockResult::from_cycles(cycles);
    if result.deadlock_detected {
        info!(
            cycles = result.cycle_count(),
            processes = result.deadlocked_process_count(),
            resources = result.deadlocked_resource_count(),
            "deadlock detected"
        );
    }
    result
}

/// Search for a cycle reachable from a single process, with fresh colors.
#[must_use]
pub fn cycle_from(store: &GraphStore, pid: ProcessId) -> Option<Cycle> {
    if !store.contains_process(pid) {
        return None;
    }
    Dfs::new(store).run(NodeRef::Process(pid))
}

/// Whether `pid` lies on a cycle found by an all-cycles sweep.
#[must_use]
pub fn is_process_deadlocked(store: &GraphStore, pid: ProcessId) -> bool {
    store.contains_process(pid) && detect_all_cycles(store).contains_process(pid)
}

/// Whether `rid` lies on a cycle found by an all-cycles sweep.
#[must_use]
pub fn is_resource_in_deadlock(store: &GraphStore, rid: ResourceId) -> bool {
    store.contains_resource(rid) && detect_all_cycles(store).contains_resource(rid)
}

// ---------------------------------------------------------------------------
// Iterative DFS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

struct Frame {
    node: NodeRef,
    successors: Vec<NodeRef>,
    next: usize,
}

/// DFS state shared across start nodes of one sweep.
struct Dfs<'a> {
    store: &'a GraphStore,
    colors: HashMap<NodeRef, Color>,
    stack: Vec<Frame>,
}

impl<'a> Dfs<'a> {
    fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            colors: HashMap::with_capacity(store.process_count() + store.resource_count()),
            stack: Vec::new(),
        }
    }

    fn color(&self, node: NodeRef) -> Color {
        self.colors.get(&node).copied().unwrap_or(Color::White)
    }

    fn successors(&self, node: NodeRef) -> Vec<NodeRef> {
        match node {
            NodeRef::Process(pid) => self
                .store
                .requested_resources(pid)
                .map(NodeRef::Resource)
                .collect(),
            NodeRef::Resource(rid) => self.store.holders(rid).map(NodeRef::Process).collect(),
        }
    }

    fn push(&mut self, node: NodeRef) {
        self.colors.insert(node, Color::Gray);
        let successors = self.successors(node);
        self.stack.push(Frame {
            node,
            successors,
            next: 0,
        });
    }

    /// Explore from `start`. On a back edge, return the path suffix from the
    /// revisited node and leave the stack in place.
    fn run(&mut self, start: NodeRef) -> Option<Cycle> {
        self.push(start);

        while let Some(frame) = self.stack.last_mut() {
            let Some(&next) = frame.successors.get(frame.next) else {
                let node = frame.node;
                self.stack.pop();
                self.colors.insert(node, Color::Black);
                continue;
            };
            frame.next += 1;

            match self.color(next) {
                Color::Gray => {
                    let from = self.stack.iter().position(|f| f.node == next)?;
                    let nodes = self.stack[from..].iter().map(|f| f.node).collect();
                    return Some(Cycle { nodes });
                }
                Color::White => {
                    trace!(node = %next, "visit");
                    self.push(next);
                }
                Color::Black => {}
            }
        }
        None
    }

    /// Mark every node left on the stack as finished and clear it.
    fn retire_path(&mut self) {
        for frame in self.stack.drain(..) {
            self.colors.insert(frame.node, Color::Black);
        }
    }
}
