//! The resource allocation graph store.
//!
//! # Layout
//!
//! Processes and resources live in fixed-capacity slot arenas. The two edge
//! relations are dense tables indexed by `(process slot, resource slot)`:
//!
//! - **requests**: one bit per pair in a [`FixedBitSet`]; set while the
//!   process is asking for one unit of the resource.
//! - **assignments**: instance count per pair; the number of units of the
//!   resource the process currently holds.
//!
//! Dense tables keep edge-existence checks O(1) for the detector's inner
//! loops, matching the small bounded entity counts this store targets.
//!
//! # Invariants
//!
//! Between operations, for every live resource `r`:
//!
//! ```text
//! available(r) + Σ_p assigned(p, r) == total(r)
//! ```
//!
//! and every live process is `Waiting` iff it has a pending request
//! (`Blocked` and `Terminated` excepted). Table entries for dead slots are
//! always zero.

use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::DeadlockError;
use crate::graph::ids::{ProcessId, ResourceId};

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Waiting,
    Blocked,
    Terminated,
}

impl ProcessState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Blocked => "BLOCKED",
            Self::Terminated => "TERMINATED",
        }
    }
}

/// A live process record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    /// Higher is more important.
    pub priority: i32,
    pub state: ProcessState,
}

/// A live resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub total_instances: u32,
    pub available_instances: u32,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

impl<T> Slot<T> {
    const fn empty() -> Self {
        Self {
            generation: 0,
            entry: None,
        }
    }
}

/// Owns every process/resource record and both edge relations.
///
/// The store has no internal locking. Callers sharing it across threads
/// must serialize access to the whole store.
#[derive(Debug, Clone)]
pub struct GraphStore {
    processes: Vec<Slot<Process>>,
    resources: Vec<Slot<Resource>>,
    requests: FixedBitSet,
    assignments: Vec<u32>,
    process_count: usize,
    resource_count: usize,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl GraphStore {
    /// Create an empty store with the capacities from `config`.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        let max_p = config.max_processes;
        let max_r = config.max_resources;
        Self {
            processes: (0..max_p).map(|_| Slot::empty()).collect(),
            resources: (0..max_r).map(|_| Slot::empty()).collect(),
            requests: FixedBitSet::with_capacity(max_p * max_r),
            assignments: vec![0; max_p * max_r],
            process_count: 0,
            resource_count: 0,
        }
    }

    /// Drop every entity and edge. Slot generations are bumped so handles
    /// issued before the reset are rejected afterwards.
    pub fn reset(&mut self) {
        for slot in &mut self.processes {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        for slot in &mut self.resources {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.requests.clear();
        self.assignments.fill(0);
        self.process_count = 0;
        self.resource_count = 0;
        debug!("graph store reset");
    }

    #[must_use]
    pub fn process_capacity(&self) -> usize {
        self.processes.len()
    }

    #[must_use]
    pub fn resource_capacity(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub const fn process_count(&self) -> usize {
        self.process_count
    }

    #[must_use]
    pub const fn resource_count(&self) -> usize {
        self.resource_count
    }

    // -----------------------------------------------------------------------
    // Processes
    // -----------------------------------------------------------------------

    /// Add a process in the lowest free slot, in state `Running`.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::CapacityExceeded`] when every process slot is taken.
    pub fn add_process(&mut self, name: &str, priority: i32) -> Result<ProcessId, DeadlockError> {
        let slot = self
            .processes
            .iter()
            .position(|s| s.entry.is_none())
            .ok_or(DeadlockError::CapacityExceeded {
                kind: "process",
                capacity: self.processes.len(),
            })?;

        let id = ProcessId::new(to_u32(slot), self.processes[slot].generation);
        self.clear_process_row(slot);
        self.processes[slot].entry = Some(Process {
            id,
            name: name.to_string(),
            priority,
            state: ProcessState::Running,
        });
        self.process_count += 1;
        debug!(process = %id, name, priority, "process added");
        Ok(id)
    }

    /// Remove a process, releasing everything it holds and cancelling its
    /// requests. The slot becomes free for reuse.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::UnknownProcess`] when `pid` is not live.
    pub fn remove_process(&mut self, pid: ProcessId) -> Result<(), DeadlockError> {
        self.process(pid)?;
        let released = self.release_all(pid);
        let slot = pid.slot();
        self.clear_process_row(slot);

        let entry = &mut self.processes[slot];
        entry.entry = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.process_count -= 1;
        debug!(process = %pid, released, "process removed");
        self.debug_check();
        Ok(())
    }

    /// Look up a live process.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::UnknownProcess`] when `pid` is out of range, inactive,
    /// or from an earlier generation of its slot.
    pub fn process(&self, pid: ProcessId) -> Result<&Process, DeadlockError> {
        self.processes
            .get(pid.slot())
            .filter(|s| s.generation == pid.generation())
            .and_then(|s| s.entry.as_ref())
            .ok_or(DeadlockError::UnknownProcess(pid))
    }

    fn process_mut(&mut self, pid: ProcessId) -> Result<&mut Process, DeadlockError> {
        self.processes
            .get_mut(pid.slot())
            .filter(|s| s.generation == pid.generation())
            .and_then(|s| s.entry.as_mut())
            .ok_or(DeadlockError::UnknownProcess(pid))
    }

    #[must_use]
    pub fn contains_process(&self, pid: ProcessId) -> bool {
        self.process(pid).is_ok()
    }

    /// Overwrite a process state directly. Used by recovery to mark a
    /// preempted process `Blocked`.
    ///
    /// `Waiting` requires a pending request and `Running` requires none.
    /// `Blocked` is always accepted.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::UnknownProcess`] when `pid` is not live.
    /// - [`DeadlockError::InvalidArgument`] for `Terminated`, which only
    ///   removal produces, or when the state disagrees with the process's
    ///   pending requests.
    pub fn set_process_state(
        &mut self,
        pid: ProcessId,
        state: ProcessState,
    ) -> Result<(), DeadlockError> {
        self.process(pid)?;
        let pending = self.has_pending_slot(pid.slot());
        let allowed = match state {
            ProcessState::Waiting => pending,
            ProcessState::Running => !pending,
            ProcessState::Blocked => true,
            ProcessState::Terminated => false,
        };
        if !allowed {
            return Err(DeadlockError::InvalidArgument(format!(
                "{pid} cannot be set {} with pending requests = {pending}",
                state.as_str()
            )));
        }
        self.process_mut(pid)?.state = state;
        debug!(process = %pid, state = state.as_str(), "process state set");
        Ok(())
    }

    /// Live processes in ascending id order.
    pub fn processes(&self) -> impl Iterator<Item = &Process> + '_ {
        self.processes.iter().filter_map(|s| s.entry.as_ref())
    }

    /// Live process ids in ascending order.
    pub fn process_ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.processes().map(|p| p.id)
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    /// Add a resource with `instances` units, all available.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::InvalidArgument`] when `instances` is not positive.
    /// - [`DeadlockError::CapacityExceeded`] when every resource slot is taken.
    pub fn add_resource(&mut self, name: &str, instances: i64) -> Result<ResourceId, DeadlockError> {
        let instances = u32::try_from(instances)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                DeadlockError::InvalidArgument(format!(
                    "resource instances must be positive, got {instances}"
                ))
            })?;

        let slot = self
            .resources
            .iter()
            .position(|s| s.entry.is_none())
            .ok_or(DeadlockError::CapacityExceeded {
                kind: "resource",
                capacity: self.resources.len(),
            })?;

        let id = ResourceId::new(to_u32(slot), self.resources[slot].generation);
        self.clear_resource_column(slot);
        self.resources[slot].entry = Some(Resource {
            id,
            name: name.to_string(),
            total_instances: instances,
            available_instances: instances,
        });
        self.resource_count += 1;
        debug!(resource = %id, name, instances, "resource added");
        Ok(id)
    }

    /// Remove an idle resource. Pending requests for it are cancelled.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::UnknownResource`] when `rid` is not live.
    /// - [`DeadlockError::ResourceBusy`] when any process holds an instance.
    pub fn remove_resource(&mut self, rid: ResourceId) -> Result<(), DeadlockError> {
        self.resource(rid)?;
        let holders = self.holders(rid).count();
        if holders > 0 {
            return Err(DeadlockError::ResourceBusy {
                resource: rid,
                holders,
            });
        }

        let requesters: Vec<ProcessId> = self.requesters(rid).collect();
        let r = rid.slot();
        self.clear_resource_column(r);
        for pid in requesters {
            self.refresh_state(pid.slot());
        }

        let entry = &mut self.resources[r];
        entry.entry = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.resource_count -= 1;
        debug!(resource = %rid, "resource removed");
        self.debug_check();
        Ok(())
    }

    /// Look up a live resource.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::UnknownResource`] when `rid` is not live.
    pub fn resource(&self, rid: ResourceId) -> Result<&Resource, DeadlockError> {
        self.resources
            .get(rid.slot())
            .filter(|s| s.generation == rid.generation())
            .and_then(|s| s.entry.as_ref())
            .ok_or(DeadlockError::UnknownResource(rid))
    }

    fn resource_mut(&mut self, rid: ResourceId) -> Result<&mut Resource, DeadlockError> {
        self.resources
            .get_mut(rid.slot())
            .filter(|s| s.generation == rid.generation())
            .and_then(|s| s.entry.as_mut())
            .ok_or(DeadlockError::UnknownResource(rid))
    }

    #[must_use]
    pub fn contains_resource(&self, rid: ResourceId) -> bool {
        self.resource(rid).is_ok()
    }

    /// Live resources in ascending id order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.resources.iter().filter_map(|s| s.entry.as_ref())
    }

    /// Live resource ids in ascending order.
    pub fn resource_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources().map(|r| r.id)
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Record that `pid` is asking for one unit of `rid`. Idempotent.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::UnknownProcess`] / [`DeadlockError::UnknownResource`]
    /// when either id is not live.
    pub fn request(&mut self, pid: ProcessId, rid: ResourceId) -> Result<(), DeadlockError> {
        self.resource(rid)?;
        self.process(pid)?;
        let cell = self.cell(pid.slot(), rid.slot());
        if self.requests.contains(cell) {
            trace!(process = %pid, resource = %rid, "request already pending");
            return Ok(());
        }
        self.requests.insert(cell);
        self.process_mut(pid)?.state = ProcessState::Waiting;
        debug!(process = %pid, resource = %rid, "request added");
        Ok(())
    }

    /// Withdraw a pending request.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::UnknownProcess`] / [`DeadlockError::UnknownResource`]
    ///   when either id is not live.
    /// - [`DeadlockError::NotRequesting`] when no such request is pending.
    pub fn cancel_request(&mut self, pid: ProcessId, rid: ResourceId) -> Result<(), DeadlockError> {
        self.resource(rid)?;
        self.process(pid)?;
        let cell = self.cell(pid.slot(), rid.slot());
        if !self.requests.contains(cell) {
            return Err(DeadlockError::NotRequesting {
                process: pid,
                resource: rid,
            });
        }
        self.requests.set(cell, false);
        self.refresh_state(pid.slot());
        debug!(process = %pid, resource = %rid, "request cancelled");
        Ok(())
    }

    /// Grant one unit of `rid` to `pid`, consuming any pending request for
    /// the pair.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::UnknownProcess`] / [`DeadlockError::UnknownResource`]
    ///   when either id is not live.
    /// - [`DeadlockError::ResourceUnavailable`] when no instance is free.
    pub fn allocate(&mut self, pid: ProcessId, rid: ResourceId) -> Result<(), DeadlockError> {
        self.process(pid)?;
        let resource = self.resource_mut(rid)?;
        if resource.available_instances == 0 {
            return Err(DeadlockError::ResourceUnavailable(rid));
        }
        resource.available_instances -= 1;

        let cell = self.cell(pid.slot(), rid.slot());
        self.requests.set(cell, false);
        self.assignments[cell] += 1;

        let slot = pid.slot();
        if !self.has_pending_slot(slot) {
            if let Some(process) = self.processes[slot].entry.as_mut() {
                process.state = ProcessState::Running;
            }
        }
        debug!(process = %pid, resource = %rid, held = self.assignments[cell], "instance allocated");
        self.debug_check();
        Ok(())
    }

    /// Return one held unit of `rid` to the pool.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::UnknownProcess`] / [`DeadlockError::UnknownResource`]
    ///   when either id is not live.
    /// - [`DeadlockError::NotHolding`] when `pid` holds no instance of `rid`.
    pub fn release(&mut self, pid: ProcessId, rid: ResourceId) -> Result<(), DeadlockError> {
        self.process(pid)?;
        self.resource(rid)?;
        let cell = self.cell(pid.slot(), rid.slot());
        if self.assignments[cell] == 0 {
            return Err(DeadlockError::NotHolding {
                process: pid,
                resource: rid,
            });
        }
        self.assignments[cell] -= 1;
        self.resource_mut(rid)?.available_instances += 1;
        debug!(process = %pid, resource = %rid, "instance released");
        self.debug_check();
        Ok(())
    }

    /// Release every instance `pid` holds. Returns the number of instances
    /// released; a stale or idle process releases nothing.
    pub fn release_all(&mut self, pid: ProcessId) -> u32 {
        if self.process(pid).is_err() {
            return 0;
        }
        let p = pid.slot();
        let mut released = 0;
        for r in 0..self.resources.len() {
            let cell = self.cell(p, r);
            let held = std::mem::take(&mut self.assignments[cell]);
            if held == 0 {
                continue;
            }
            if let Some(resource) = self.resources[r].entry.as_mut() {
                resource.available_instances += held;
            }
            released += held;
        }
        if released > 0 {
            debug!(process = %pid, released, "released all instances");
        }
        released
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn is_requesting(&self, pid: ProcessId, rid: ResourceId) -> bool {
        self.contains_process(pid)
            && self.contains_resource(rid)
            && self.requests.contains(self.cell(pid.slot(), rid.slot()))
    }

    #[must_use]
    pub fn is_holding(&self, pid: ProcessId, rid: ResourceId) -> bool {
        self.held_count(pid, rid) > 0
    }

    /// Instances of `rid` currently held by `pid`.
    #[must_use]
    pub fn held_count(&self, pid: ProcessId, rid: ResourceId) -> u32 {
        if !self.contains_process(pid) || !self.contains_resource(rid) {
            return 0;
        }
        self.assignments[self.cell(pid.slot(), rid.slot())]
    }

    /// Total instances held by `pid` across all resources.
    #[must_use]
    pub fn held_instances(&self, pid: ProcessId) -> u32 {
        if !self.contains_process(pid) {
            return 0;
        }
        let p = pid.slot();
        (0..self.resources.len())
            .map(|r| self.assignments[self.cell(p, r)])
            .sum()
    }

    #[must_use]
    pub fn has_pending_requests(&self, pid: ProcessId) -> bool {
        self.contains_process(pid) && self.has_pending_slot(pid.slot())
    }

    /// Resources `pid` is requesting, ascending.
    pub fn requested_resources(&self, pid: ProcessId) -> impl Iterator<Item = ResourceId> + '_ {
        let row = self.contains_process(pid).then_some(pid.slot());
        row.into_iter().flat_map(move |p| {
            (0..self.resources.len())
                .filter(move |&r| self.requests.contains(self.cell(p, r)))
                .filter_map(|r| self.resource_id_at(r))
        })
    }

    /// Resources `pid` holds at least one instance of, ascending.
    pub fn held_resources(&self, pid: ProcessId) -> impl Iterator<Item = ResourceId> + '_ {
        let row = self.contains_process(pid).then_some(pid.slot());
        row.into_iter().flat_map(move |p| {
            (0..self.resources.len())
                .filter(move |&r| self.assignments[self.cell(p, r)] > 0)
                .filter_map(|r| self.resource_id_at(r))
        })
    }

    /// Processes holding at least one instance of `rid`, ascending.
    pub fn holders(&self, rid: ResourceId) -> impl Iterator<Item = ProcessId> + '_ {
        let column = self.contains_resource(rid).then_some(rid.slot());
        column.into_iter().flat_map(move |r| {
            (0..self.processes.len())
                .filter(move |&p| self.assignments[self.cell(p, r)] > 0)
                .filter_map(|p| self.process_id_at(p))
        })
    }

    /// Processes with a pending request for `rid`, ascending.
    pub fn requesters(&self, rid: ResourceId) -> impl Iterator<Item = ProcessId> + '_ {
        let column = self.contains_resource(rid).then_some(rid.slot());
        column.into_iter().flat_map(move |r| {
            (0..self.processes.len())
                .filter(move |&p| self.requests.contains(self.cell(p, r)))
                .filter_map(|p| self.process_id_at(p))
        })
    }

    /// Total pending request edges.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.requests.count_ones(..)
    }

    /// Total assigned instances across all pairs.
    #[must_use]
    pub fn assigned_instance_count(&self) -> u64 {
        self.assignments.iter().map(|&n| u64::from(n)).sum()
    }

    /// Verify the accounting identity and the state/request agreement.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::Corrupted`] describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), DeadlockError> {
        for (r, slot) in self.resources.iter().enumerate() {
            let assigned: u64 = (0..self.processes.len())
                .map(|p| u64::from(self.assignments[self.cell(p, r)]))
                .sum();
            match &slot.entry {
                Some(resource) => {
                    let total = u64::from(resource.available_instances) + assigned;
                    if total != u64::from(resource.total_instances) {
                        return Err(DeadlockError::Corrupted(format!(
                            "{}: available {} + assigned {assigned} != total {}",
                            resource.id, resource.available_instances, resource.total_instances
                        )));
                    }
                }
                None if assigned > 0 => {
                    return Err(DeadlockError::Corrupted(format!(
                        "free resource slot {r} still has {assigned} assigned instance(s)"
                    )));
                }
                None => {}
            }
        }

        for (p, slot) in self.processes.iter().enumerate() {
            let pending = self.has_pending_slot(p);
            match &slot.entry {
                Some(process) => {
                    let consistent = match process.state {
                        ProcessState::Waiting => pending,
                        ProcessState::Running => !pending,
                        ProcessState::Blocked | ProcessState::Terminated => true,
                    };
                    if !consistent {
                        return Err(DeadlockError::Corrupted(format!(
                            "{} is {} with pending requests = {pending}",
                            process.id,
                            process.state.as_str()
                        )));
                    }
                }
                None if pending => {
                    return Err(DeadlockError::Corrupted(format!(
                        "free process slot {p} still has pending requests"
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn cell(&self, p: usize, r: usize) -> usize {
        p * self.resources.len() + r
    }

    fn process_id_at(&self, slot: usize) -> Option<ProcessId> {
        self.processes[slot].entry.as_ref().map(|p| p.id)
    }

    fn resource_id_at(&self, slot: usize) -> Option<ResourceId> {
        self.resources[slot].entry.as_ref().map(|r| r.id)
    }

    fn has_pending_slot(&self, p: usize) -> bool {
        (0..self.resources.len()).any(|r| self.requests.contains(self.cell(p, r)))
    }

    /// Revert a waiting process to running once its last request is gone.
    fn refresh_state(&mut self, p: usize) {
        if self.has_pending_slot(p) {
            return;
        }
        if let Some(process) = self.processes[p].entry.as_mut() {
            if process.state == ProcessState::Waiting {
                process.state = ProcessState::Running;
            }
        }
    }

    fn clear_process_row(&mut self, p: usize) {
        for r in 0..self.resources.len() {
            let cell = self.cell(p, r);
            self.requests.set(cell, false);
            self.assignments[cell] = 0;
        }
    }

    fn clear_resource_column(&mut self, r: usize) {
        for p in 0..self.processes.len() {
            let cell = self.cell(p, r);
            self.requests.set(cell, false);
            self.assignments[cell] = 0;
        }
    }

    fn debug_check(&self) {
        debug_assert!(
            self.check_invariants().is_ok(),
            "graph invariant violated: {:?}",
            self.check_invariants()
        );
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn to_u32(slot: usize) -> u32 {
    slot as u32
}
