#![allow(clippy::module_name_repetitions)]

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::RecoveryConfig;
use crate::detect::{DeadlockResult, detect_deadlock};
use crate::error::DeadlockError;
use crate::events::{EventSink, NoopSink, RecoveryEvent};
use crate::graph::{GraphStore, ProcessId, ProcessState, ResourceId};
use crate::recovery::victim::{best_candidate, is_critical_process};
use crate::recovery::{Recovery, RecoveryStrategy, SelectionCriteria};

/// One operation applied to the graph during recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub process: ProcessId,
    /// Set when the action targeted a single resource.
    pub resource: Option<ResourceId>,
    pub strategy: RecoveryStrategy,
    pub description: String,
    pub success: bool,
}

/// Log and totals of one recovery call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub success: bool,
    pub actions: Vec<RecoveryAction>,
    pub processes_terminated: u32,
    /// Resource instances released by terminations, preemptions, and
    /// rollbacks.
    pub resources_preempted: u32,
    pub iterations: u32,
    pub summary: String,
}

impl RecoveryResult {
    fn no_deadlock() -> Self {
        Self {
            success: true,
            summary: "No deadlock to recover from".to_string(),
            ..Self::default()
        }
    }
}

impl fmt::Display for RecoveryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Success: {}", if self.success { "YES" } else { "NO" })?;
        writeln!(f, "Processes terminated: {}", self.processes_terminated)?;
        writeln!(f, "Resources preempted: {}", self.resources_preempted)?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        write!(f, "Summary: {}", self.summary)?;
        if !self.actions.is_empty() {
            f.write_str("\nActions taken:")?;
            for (i, action) in self.actions.iter().enumerate() {
                write!(f, "\n  {}. {}", i + 1, action.description)?;
            }
        }
        Ok(())
    }
}

/// Rough cost of applying a strategy, without touching the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryEstimate {
    /// 0-100 likelihood that the strategy clears the deadlock by itself.
    pub feasibility: u8,
    pub estimated_terminations: usize,
    pub estimated_resources_freed: u32,
}

/// Applies recovery plans to a [`GraphStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryEngine {
    config: RecoveryConfig,
}

impl RecoveryEngine {
    #[must_use]
    pub const fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Recover using the configured strategy.
    ///
    /// # Errors
    ///
    /// See [`Self::recover_with_sink`].
    pub fn recover(
        &self,
        store: &mut GraphStore,
        deadlock: &DeadlockResult,
    ) -> Result<RecoveryResult, DeadlockError> {
        self.recover_with_sink(store, deadlock, &mut NoopSink)
    }

    /// Recover using the configured strategy, publishing events to `sink`.
    ///
    /// A result without a deadlock is a successful no-op. Single-victim
    /// strategies score candidates with the criteria the strategy implies,
    /// falling back to the configured `selection`.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::NoVictimFound`] when no deadlocked process is still
    /// live.
    #[instrument(skip(self, store, deadlock, sink), fields(strategy = %self.config.strategy))]
    pub fn recover_with_sink(
        &self,
        store: &mut GraphStore,
        deadlock: &DeadlockResult,
        sink: &mut dyn EventSink,
    ) -> Result<RecoveryResult, DeadlockError> {
        if !deadlock.deadlock_detected {
            return Ok(RecoveryResult::no_deadlock());
        }

        let strategy = self.config.strategy;
        let criteria = strategy.implied_criteria().unwrap_or(self.config.selection);
        let plan = match strategy {
            RecoveryStrategy::TerminateAll => Recovery::TerminateAll,
            RecoveryStrategy::TerminateOne
            | RecoveryStrategy::TerminateLowest
            | RecoveryStrategy::TerminateYoungest
            | RecoveryStrategy::TerminateOldest => Recovery::TerminateOne { criteria },
            RecoveryStrategy::PreemptResources => Recovery::PreemptResources {
                criteria,
                resources: None,
            },
            RecoveryStrategy::Rollback => {
                return self.run(
                    store,
                    deadlock,
                    Job::RollbackVictim(criteria),
                    Scoring::SpareCritical,
                    strategy,
                    sink,
                );
            }
        };

        self.run(
            store,
            deadlock,
            Job::Plan(&plan),
            Scoring::SpareCritical,
            strategy,
            sink,
        )
    }

    /// Terminate victims chosen by the configured criteria until detection
    /// reports no deadlock, bounded by `max_iterations`. Actions carry the
    /// configured strategy when it is a single-victim termination.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::RecoveryBoundExceeded`] when the bound is hit with a
    /// deadlock still present.
    pub fn resolve(&self, store: &mut GraphStore) -> Result<RecoveryResult, DeadlockError> {
        let criteria = self
            .config
            .strategy
            .implied_criteria()
            .unwrap_or(self.config.selection);
        let plan = Recovery::TerminateIterative {
            criteria,
            max_iterations: self.config.max_iterations,
        };
        let strategy = match self.config.strategy {
            configured @ (RecoveryStrategy::TerminateOne
            | RecoveryStrategy::TerminateLowest
            | RecoveryStrategy::TerminateYoungest
            | RecoveryStrategy::TerminateOldest) => configured,
            _ => plan.strategy(),
        };
        let deadlock = detect_deadlock(store);
        self.run(
            store,
            &deadlock,
            Job::Plan(&plan),
            Scoring::SpareCritical,
            strategy,
            &mut NoopSink,
        )
    }

    /// Apply an explicit plan.
    ///
    /// # Errors
    ///
    /// See [`Self::execute_with_sink`].
    pub fn execute(
        &self,
        store: &mut GraphStore,
        deadlock: &DeadlockResult,
        plan: &Recovery,
    ) -> Result<RecoveryResult, DeadlockError> {
        self.execute_with_sink(store, deadlock, plan, &mut NoopSink)
    }

    /// Apply an explicit plan, publishing events to `sink`.
    ///
    /// `deadlock` must come from a detection on the current graph; it is
    /// never recomputed, except by `TerminateIterative`, which detects on
    /// every round. Without a deadlock every plan other than `Rollback` and
    /// `TerminateIterative` is a successful no-op.
    ///
    /// Victims are scored exactly as [`super::select_victim`] scores them;
    /// `preserve_critical` applies only to the configured strategy.
    ///
    /// # Errors
    ///
    /// - [`DeadlockError::NoVictimFound`] when no deadlocked process is
    ///   still live.
    /// - [`DeadlockError::UnknownProcess`] when a rollback target is not live.
    /// - [`DeadlockError::RecoveryBoundExceeded`] when iterative termination
    ///   runs out of iterations; the error carries the partial result.
    #[instrument(skip(self, store, deadlock, sink), fields(strategy = %plan.strategy()))]
    pub fn execute_with_sink(
        &self,
        store: &mut GraphStore,
        deadlock: &DeadlockResult,
        plan: &Recovery,
        sink: &mut dyn EventSink,
    ) -> Result<RecoveryResult, DeadlockError> {
        self.run(
            store,
            deadlock,
            Job::Plan(plan),
            Scoring::Pure,
            plan.strategy(),
            sink,
        )
    }

    /// Choose a victim among the deadlocked processes, honouring
    /// `preserve_critical`.
    ///
    /// # Errors
    ///
    /// [`DeadlockError::NoVictimFound`] when no deadlocked process is live.
    pub fn select_victim(
        &self,
        store: &GraphStore,
        deadlock: &DeadlockResult,
        criteria: SelectionCriteria,
    ) -> Result<ProcessId, DeadlockError> {
        self.choose(
            store,
            &deadlock.deadlocked_processes,
            criteria,
            Scoring::SpareCritical,
        )
        .map(|(pid, _)| pid)
        .ok_or(DeadlockError::NoVictimFound)
    }

    fn choose(
        &self,
        store: &GraphStore,
        candidates: &[ProcessId],
        criteria: SelectionCriteria,
        scoring: Scoring,
    ) -> Option<(ProcessId, i64)> {
        if scoring == Scoring::SpareCritical && self.config.preserve_critical {
            let threshold = self.config.critical_priority_threshold;
            let spared = candidates
                .iter()
                .copied()
                .filter(|&pid| !is_critical_process(store, pid, threshold));
            if let Some(pick) = best_candidate(store, spared, criteria) {
                return Some(pick);
            }
        }
        best_candidate(store, candidates.iter().copied(), criteria)
    }

    fn run(
        &self,
        store: &mut GraphStore,
        deadlock: &DeadlockResult,
        job: Job<'_>,
        scoring: Scoring,
        strategy: RecoveryStrategy,
        sink: &mut dyn EventSink,
    ) -> Result<RecoveryResult, DeadlockError> {
        let always_runs = matches!(
            job,
            Job::Plan(Recovery::Rollback { .. } | Recovery::TerminateIterative { .. })
        );
        if !always_runs && !deadlock.deadlock_detected {
            return Ok(RecoveryResult::no_deadlock());
        }

        sink.publish(RecoveryEvent::RecoveryStarted {
            strategy,
            deadlocked_processes: deadlock.deadlocked_process_count(),
        });

        let mut pass = Pass {
            store,
            sink,
            strategy,
            scoring,
            result: RecoveryResult::default(),
        };
        let outcome = match job {
            Job::Plan(Recovery::TerminateAll) => self.terminate_all(&mut pass, deadlock),
            Job::Plan(Recovery::TerminateOne { criteria }) => {
                self.terminate_one(&mut pass, &deadlock.deadlocked_processes, *criteria)
            }
            Job::Plan(Recovery::TerminateIterative {
                criteria,
                max_iterations,
            }) => self.terminate_iterative(&mut pass, *criteria, *max_iterations),
            Job::Plan(Recovery::PreemptResources {
                criteria,
                resources,
            }) => self.preempt(&mut pass, deadlock, *criteria, resources.as_deref()),
            Job::Plan(Recovery::Rollback { process }) => pass.rollback(*process),
            Job::RollbackVictim(criteria) => self
                .pick(&mut pass, &deadlock.deadlocked_processes, criteria)
                .and_then(|victim| pass.rollback(victim)),
        };

        let outcome = outcome.map(|()| pass.result);
        match &outcome {
            Ok(result) => {
                pass.sink.publish(RecoveryEvent::RecoveryCompleted {
                    success: result.success,
                    iterations: result.iterations,
                });
                info!(
                    success = result.success,
                    terminated = result.processes_terminated,
                    preempted = result.resources_preempted,
                    iterations = result.iterations,
                    "recovery finished"
                );
            }
            Err(err) => {
                pass.sink.publish(RecoveryEvent::RecoveryCompleted {
                    success: false,
                    iterations: err.partial_recovery().map_or(0, |p| p.iterations),
                });
                warn!(%err, "recovery failed");
            }
        }
        outcome
    }

    fn terminate_all(
        &self,
        pass: &mut Pass<'_>,
        deadlock: &DeadlockResult,
    ) -> Result<(), DeadlockError> {
        let cap = self.config.max_terminations;
        for &pid in &deadlock.deadlocked_processes {
            if cap > 0 && pass.result.processes_terminated >= cap {
                break;
            }
            if !pass.store.contains_process(pid) {
                continue;
            }
            pass.terminate(pid, None)?;
        }

        let terminated = pass.result.processes_terminated;
        if terminated == 0 {
            warn!("no live deadlocked process to terminate");
            return Err(DeadlockError::NoVictimFound);
        }
        pass.result.success = true;
        pass.result.summary = format!("Terminated {terminated} deadlocked processes");
        Ok(())
    }

    fn terminate_one(
        &self,
        pass: &mut Pass<'_>,
        candidates: &[ProcessId],
        criteria: SelectionCriteria,
    ) -> Result<(), DeadlockError> {
        let victim = self.pick(pass, candidates, criteria)?;
        let (name, released) = pass.terminate(victim, Some(criteria))?;
        pass.result.success = true;
        pass.result.summary = format!("Terminated {victim} ({name}), released {released} resources");
        Ok(())
    }

    fn terminate_iterative(
        &self,
        pass: &mut Pass<'_>,
        criteria: SelectionCriteria,
        max_iterations: u32,
    ) -> Result<(), DeadlockError> {
        let bound = match (max_iterations, self.config.max_terminations) {
            (0, cap) | (cap, 0) => cap,
            (iterations, cap) => iterations.min(cap),
        };

        let mut iterations = 0;
        loop {
            let detection = detect_deadlock(pass.store);
            if !detection.deadlock_detected {
                pass.result.success = true;
                pass.result.iterations = iterations;
                pass.result.summary = format!(
                    "Deadlock resolved after {iterations} iterations, {} processes terminated",
                    pass.result.processes_terminated
                );
                return Ok(());
            }

            if bound > 0 && iterations >= bound {
                warn!(iterations, "recovery bound reached with deadlock present");
                let mut partial = std::mem::take(&mut pass.result);
                partial.iterations = iterations;
                partial.summary = format!(
                    "Not resolved after {iterations} iterations, {} processes terminated",
                    partial.processes_terminated
                );
                return Err(DeadlockError::RecoveryBoundExceeded {
                    iterations,
                    partial: Box::new(partial),
                });
            }

            let victim = self.pick(pass, &detection.deadlocked_processes, criteria)?;
            pass.terminate(victim, Some(criteria))?;
            iterations += 1;
        }
    }

    fn preempt(
        &self,
        pass: &mut Pass<'_>,
        deadlock: &DeadlockResult,
        criteria: SelectionCriteria,
        resources: Option<&[ResourceId]>,
    ) -> Result<(), DeadlockError> {
        let victim = self.pick(pass, &deadlock.deadlocked_processes, criteria)?;
        let name = pass.store.process(victim)?.name.clone();

        let preempted = match resources {
            Some(list) => {
                let mut total = 0;
                for &rid in list {
                    total += pass.preempt_one(victim, rid)?;
                }
                total
            }
            None => {
                let released = pass.store.release_all(victim);
                pass.sink.publish(RecoveryEvent::ResourcePreempted {
                    process: victim,
                    resource: None,
                    instances: released,
                });
                pass.record(
                    victim,
                    None,
                    format!("Preempted all {released} resources from {victim} ({name})"),
                );
                released
            }
        };

        pass.store.set_process_state(victim, ProcessState::Blocked)?;
        pass.result.resources_preempted += preempted;
        pass.result.success = preempted > 0;
        pass.result.summary =
            format!("Preempted {preempted} resource instance(s) from {victim} ({name})");
        if preempted == 0 {
            warn!(process = %victim, "victim held nothing to preempt");
        }
        Ok(())
    }

    fn pick(
        &self,
        pass: &mut Pass<'_>,
        candidates: &[ProcessId],
        criteria: SelectionCriteria,
    ) -> Result<ProcessId, DeadlockError> {
        let Some((process, score)) = self.choose(pass.store, candidates, criteria, pass.scoring)
        else {
            warn!(%criteria, candidates = candidates.len(), "no victim found");
            return Err(DeadlockError::NoVictimFound);
        };
        pass.sink.publish(RecoveryEvent::VictimSelected {
            process,
            criteria,
            score,
        });
        Ok(process)
    }
}

/// What one recovery call does.
#[derive(Debug, Clone, Copy)]
enum Job<'p> {
    Plan(&'p Recovery),
    /// Roll back a victim chosen by the given criteria.
    RollbackVictim(SelectionCriteria),
}

/// Whether victim choice honours `preserve_critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scoring {
    Pure,
    SpareCritical,
}

/// Mutable state threaded through one recovery call.
struct Pass<'a> {
    store: &'a mut GraphStore,
    sink: &'a mut dyn EventSink,
    strategy: RecoveryStrategy,
    scoring: Scoring,
    result: RecoveryResult,
}

impl Pass<'_> {
    fn record(&mut self, process: ProcessId, resource: Option<ResourceId>, description: String) {
        self.result.actions.push(RecoveryAction {
            process,
            resource,
            strategy: self.strategy,
            description,
            success: true,
        });
    }

    /// Remove `pid`, returning its name and the instances it released.
    fn terminate(
        &mut self,
        pid: ProcessId,
        criteria: Option<SelectionCriteria>,
    ) -> Result<(String, u32), DeadlockError> {
        let name = self.store.process(pid)?.name.clone();
        let released = self.store.release_all(pid);
        self.store.remove_process(pid)?;

        self.sink.publish(RecoveryEvent::ProcessTerminated {
            process: pid,
            released,
        });
        let description = match criteria {
            Some(criteria) => format!("Terminated process {pid} ({name}) using {criteria} criteria"),
            None => format!("Terminated process {pid} ({name})"),
        };
        self.record(pid, None, description);
        self.result.processes_terminated += 1;
        self.result.resources_preempted += released;
        Ok((name, released))
    }

    /// Take every instance of `rid` away from `pid`. Resources it does not
    /// hold are skipped.
    fn preempt_one(&mut self, pid: ProcessId, rid: ResourceId) -> Result<u32, DeadlockError> {
        let held = self.store.held_count(pid, rid);
        if held == 0 {
            return Ok(0);
        }
        for _ in 0..held {
            self.store.release(pid, rid)?;
        }
        self.sink.publish(RecoveryEvent::ResourcePreempted {
            process: pid,
            resource: Some(rid),
            instances: held,
        });
        self.record(pid, Some(rid), format!("Preempted {rid} from {pid}"));
        Ok(held)
    }

    fn rollback(&mut self, pid: ProcessId) -> Result<(), DeadlockError> {
        let name = self.store.process(pid)?.name.clone();
        let released = self.store.release_all(pid);
        let pending: Vec<ResourceId> = self.store.requested_resources(pid).collect();
        for &rid in &pending {
            self.store.cancel_request(pid, rid)?;
        }
        self.store.set_process_state(pid, ProcessState::Running)?;

        self.sink.publish(RecoveryEvent::ProcessRolledBack {
            process: pid,
            released,
            cancelled: pending.len(),
        });
        self.record(
            pid,
            None,
            format!("Rolled back {pid} ({name}), released {released} resources"),
        );
        self.result.resources_preempted += released;
        self.result.success = true;
        self.result.summary = format!("Process {pid} rolled back, {released} resources released");
        Ok(())
    }
}

/// Recover with [`RecoveryConfig::default`].
///
/// # Errors
///
/// See [`RecoveryEngine::recover_with_sink`].
pub fn recover_default(
    store: &mut GraphStore,
    deadlock: &DeadlockResult,
) -> Result<RecoveryResult, DeadlockError> {
    RecoveryEngine::default().recover(store, deadlock)
}

/// Suggest a strategy for `deadlock`.
///
/// Small deadlocks get single-victim termination. Large ones (more than
/// five processes) get preemption when some member holds several
/// instances.
#[must_use]
pub fn recommend_strategy(store: &GraphStore, deadlock: &DeadlockResult) -> RecoveryStrategy {
    if !deadlock.deadlock_detected {
        return RecoveryStrategy::TerminateLowest;
    }
    match deadlock.deadlocked_process_count() {
        1 => RecoveryStrategy::TerminateOne,
        2..=5 => RecoveryStrategy::TerminateLowest,
        _ if deadlock
            .deadlocked_processes
            .iter()
            .any(|&pid| store.held_instances(pid) > 1) =>
        {
            RecoveryStrategy::PreemptResources
        }
        _ => RecoveryStrategy::TerminateLowest,
    }
}

/// Estimate what `strategy` would cost on `deadlock` without applying it.
#[must_use]
pub fn analyze_recovery_option(
    store: &GraphStore,
    deadlock: &DeadlockResult,
    strategy: RecoveryStrategy,
) -> RecoveryEstimate {
    let (feasibility, estimated_terminations, estimated_resources_freed) = match strategy {
        RecoveryStrategy::TerminateAll => (
            100,
            deadlock.deadlocked_process_count(),
            deadlock
                .deadlocked_processes
                .iter()
                .map(|&pid| store.held_instances(pid))
                .sum::<u32>(),
        ),
        RecoveryStrategy::TerminateOne
        | RecoveryStrategy::TerminateLowest
        | RecoveryStrategy::TerminateYoungest
        | RecoveryStrategy::TerminateOldest => (70, 1, 0),
        RecoveryStrategy::PreemptResources => (50, 0, 1),
        RecoveryStrategy::Rollback => (60, 0, 0),
    };
    RecoveryEstimate {
        feasibility,
        estimated_terminations,
        estimated_resources_freed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect_all_cycles;

    /// Two processes each holding one resource and requesting the other's.
    fn pair(p1: i32, p2: i32) -> (GraphStore, ProcessId, ProcessId) {
        let mut store = GraphStore::default();
        let a = store.add_process("A", p1).expect("add");
        let b = store.add_process("B", p2).expect("add");
        let r1 = store.add_resource("R1", 1).expect("add");
        let r2 = store.add_resource("R2", 1).expect("add");
        store.allocate(a, r1).expect("allocate");
        store.allocate(b, r2).expect("allocate");
        store.request(a, r2).expect("request");
        store.request(b, r1).expect("request");
        (store, a, b)
    }

    fn ring(priorities: &[i32]) -> (GraphStore, Vec<ProcessId>, Vec<ResourceId>) {
        let mut store = GraphStore::default();
        let n = priorities.len();
        let ps: Vec<ProcessId> = priorities
            .iter()
            .enumerate()
            .map(|(i, &prio)| store.add_process(&format!("P{i}"), prio).expect("add"))
            .collect();
        let rs: Vec<ResourceId> = (0..n)
            .map(|i| store.add_resource(&format!("R{i}"), 1).expect("add"))
            .collect();
        for i in 0..n {
            store.allocate(ps[i], rs[i]).expect("allocate");
        }
        for i in 0..n {
            store.request(ps[i], rs[(i + 1) % n]).expect("request");
        }
        (store, ps, rs)
    }

    fn engine(strategy: RecoveryStrategy) -> RecoveryEngine {
        RecoveryEngine::new(RecoveryConfig {
            strategy,
            ..RecoveryConfig::default()
        })
    }

    #[test]
    fn no_deadlock_is_a_noop() {
        let mut store = GraphStore::default();
        store.add_process("idle", 10).expect("add");
        let result = recover_default(&mut store, &DeadlockResult::default()).expect("recover");
        assert!(result.success);
        assert!(result.actions.is_empty());
        assert_eq!(result.summary, "No deadlock to recover from");
        assert_eq!(store.process_count(), 1);
    }

    #[test]
    fn default_terminates_lowest_priority() {
        let (mut store, a, b) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        let mut events: Vec<RecoveryEvent> = Vec::new();
        let result = RecoveryEngine::default()
            .recover_with_sink(&mut store, &deadlock, &mut events)
            .expect("recover");

        assert!(result.success);
        assert_eq!(result.processes_terminated, 1);
        assert_eq!(result.resources_preempted, 1);
        assert_eq!(result.actions[0].process, a);
        assert_eq!(result.actions[0].strategy, RecoveryStrategy::TerminateLowest);
        assert!(!store.contains_process(a));
        assert!(store.contains_process(b));
        assert!(!detect_deadlock(&store).deadlock_detected);

        assert!(matches!(events.first(), Some(RecoveryEvent::RecoveryStarted { .. })));
        assert!(events.contains(&RecoveryEvent::VictimSelected {
            process: a,
            criteria: SelectionCriteria::LowestPriority,
            score: 70,
        }));
        assert_eq!(
            events.last(),
            Some(&RecoveryEvent::RecoveryCompleted {
                success: true,
                iterations: 0
            })
        );
    }

    #[test]
    fn terminate_all_removes_every_member() {
        let (mut store, ps, rs) = ring(&[10, 20, 30]);
        let deadlock = detect_deadlock(&store);
        let result = engine(RecoveryStrategy::TerminateAll)
            .recover(&mut store, &deadlock)
            .expect("recover");

        assert!(result.success);
        assert_eq!(result.processes_terminated, 3);
        assert_eq!(result.summary, "Terminated 3 deadlocked processes");
        assert!(ps.iter().all(|&p| !store.contains_process(p)));
        for rid in rs {
            let resource = store.resource(rid).expect("resource");
            assert_eq!(resource.available_instances, resource.total_instances);
        }
        store.check_invariants().expect("invariants");
    }

    #[test]
    fn max_terminations_caps_terminate_all() {
        let (mut store, ps, _) = ring(&[10, 20, 30]);
        let deadlock = detect_deadlock(&store);
        let engine = RecoveryEngine::new(RecoveryConfig {
            strategy: RecoveryStrategy::TerminateAll,
            max_terminations: 1,
            ..RecoveryConfig::default()
        });
        let result = engine.recover(&mut store, &deadlock).expect("recover");
        assert_eq!(result.processes_terminated, 1);
        assert!(!store.contains_process(ps[0]));
        assert!(store.contains_process(ps[1]));
    }

    #[test]
    fn critical_processes_are_spared() {
        let (mut store, a, b) = pair(95, 40);
        let deadlock = detect_deadlock(&store);
        let result = engine(RecoveryStrategy::TerminateOldest)
            .recover(&mut store, &deadlock)
            .expect("recover");
        // Oldest would be A, but A is critical.
        assert_eq!(result.actions[0].process, b);
        assert!(store.contains_process(a));

        let (mut store, a, _) = pair(95, 99);
        let deadlock = detect_deadlock(&store);
        let result = engine(RecoveryStrategy::TerminateOldest)
            .recover(&mut store, &deadlock)
            .expect("recover");
        assert_eq!(result.actions[0].process, a);
    }

    #[test]
    fn iterative_resolves_ring() {
        let (mut store, ps, _) = ring(&[30, 60, 90]);
        let deadlock = detect_deadlock(&store);
        let plan = Recovery::TerminateIterative {
            criteria: SelectionCriteria::LowestPriority,
            max_iterations: 10,
        };
        let result = RecoveryEngine::default()
            .execute(&mut store, &deadlock, &plan)
            .expect("recover");

        assert!(result.success);
        assert!(result.iterations <= 3);
        assert_eq!(result.iterations, 1);
        assert!(!store.contains_process(ps[0]));
        assert!(!detect_all_cycles(&store).deadlock_detected);
    }

    #[test]
    fn iterative_bound_returns_partial_result() {
        // Two disjoint rings need two terminations.
        let mut store = GraphStore::default();
        for ring_no in 0..2 {
            let a = store.add_process(&format!("a{ring_no}"), 10).expect("add");
            let b = store.add_process(&format!("b{ring_no}"), 20).expect("add");
            let r1 = store.add_resource("x", 1).expect("add");
            let r2 = store.add_resource("y", 1).expect("add");
            store.allocate(a, r1).expect("allocate");
            store.allocate(b, r2).expect("allocate");
            store.request(a, r2).expect("request");
            store.request(b, r1).expect("request");
        }
        let plan = Recovery::TerminateIterative {
            criteria: SelectionCriteria::LowestPriority,
            max_iterations: 1,
        };
        let err = RecoveryEngine::default()
            .execute(&mut store, &DeadlockResult::default(), &plan)
            .expect_err("bound");

        assert_eq!(err.code(), crate::ErrorCode::RecoveryBoundExceeded);
        let partial = err.partial_recovery().expect("partial");
        assert_eq!(partial.processes_terminated, 1);
        assert_eq!(partial.iterations, 1);
        assert!(!partial.success);
        assert_eq!(store.process_count(), 3);
    }

    #[test]
    fn resolve_uses_configured_bound() {
        let (mut store, _, _) = ring(&[10, 20, 30, 40]);
        let result = RecoveryEngine::default().resolve(&mut store).expect("resolve");
        assert!(result.success);
        assert_eq!(store.process_count(), 3);
    }

    #[test]
    fn preempt_blocks_victim() {
        let (mut store, a, b) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        let mut events: Vec<RecoveryEvent> = Vec::new();
        let result = engine(RecoveryStrategy::PreemptResources)
            .recover_with_sink(&mut store, &deadlock, &mut events)
            .expect("recover");

        assert!(result.success);
        assert_eq!(result.resources_preempted, 1);
        assert_eq!(store.held_instances(a), 0);
        assert_eq!(store.process(a).expect("live").state, ProcessState::Blocked);
        assert!(store.is_requesting(a, store.requested_resources(a).next().expect("pending")));
        assert!(store.contains_process(b));
        assert!(events.iter().any(|e| matches!(
            e,
            RecoveryEvent::ResourcePreempted {
                resource: None,
                instances: 1,
                ..
            }
        )));
        store.check_invariants().expect("invariants");
    }

    #[test]
    fn preempt_subset_skips_unheld() {
        let (mut store, ps, rs) = ring(&[10, 20, 30]);
        let deadlock = detect_deadlock(&store);
        let plan = Recovery::PreemptResources {
            criteria: SelectionCriteria::LowestPriority,
            resources: Some(vec![rs[1], rs[0]]),
        };
        let result = RecoveryEngine::default()
            .execute(&mut store, &deadlock, &plan)
            .expect("preempt");

        assert_eq!(result.resources_preempted, 1);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].resource, Some(rs[0]));
        assert_eq!(result.actions[0].description, format!("Preempted {} from {}", rs[0], ps[0]));
    }

    #[test]
    fn rollback_resets_process() {
        let (mut store, a, _) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        let plan = Recovery::Rollback { process: a };
        let result = RecoveryEngine::default()
            .execute(&mut store, &deadlock, &plan)
            .expect("rollback");

        assert!(result.success);
        let process = store.process(a).expect("still live");
        assert_eq!(process.state, ProcessState::Running);
        assert_eq!(store.held_instances(a), 0);
        assert!(!store.has_pending_requests(a));
        assert!(!detect_deadlock(&store).deadlock_detected);
    }

    #[test]
    fn rollback_of_unknown_process_fails() {
        let (mut store, a, _) = pair(30, 70);
        store.remove_process(a).expect("remove");
        let err = RecoveryEngine::default()
            .execute(&mut store, &DeadlockResult::default(), &Recovery::Rollback { process: a })
            .expect_err("stale");
        assert_eq!(err, DeadlockError::UnknownProcess(a));
    }

    #[test]
    fn stale_deadlock_has_no_victim() {
        let (mut store, a, b) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        store.remove_process(a).expect("remove");
        store.remove_process(b).expect("remove");
        let err = RecoveryEngine::default()
            .recover(&mut store, &deadlock)
            .expect_err("stale");
        assert_eq!(err, DeadlockError::NoVictimFound);
    }

    #[test]
    fn recommendation_by_size() {
        let (store, _, _) = pair(30, 70);
        assert_eq!(
            recommend_strategy(&store, &DeadlockResult::default()),
            RecoveryStrategy::TerminateLowest
        );
        assert_eq!(
            recommend_strategy(&store, &detect_deadlock(&store)),
            RecoveryStrategy::TerminateLowest
        );

        let mut store = GraphStore::default();
        let p = store.add_process("self", 10).expect("add");
        let r = store.add_resource("r", 1).expect("add");
        store.allocate(p, r).expect("allocate");
        store.request(p, r).expect("request");
        assert_eq!(
            recommend_strategy(&store, &detect_deadlock(&store)),
            RecoveryStrategy::TerminateOne
        );

        let (store, _, _) = ring(&[10; 6]);
        assert_eq!(
            recommend_strategy(&store, &detect_deadlock(&store)),
            RecoveryStrategy::TerminateLowest
        );
    }

    #[test]
    fn analysis_constants() {
        let (store, _, _) = ring(&[10, 20, 30]);
        let deadlock = detect_deadlock(&store);
        let all = analyze_recovery_option(&store, &deadlock, RecoveryStrategy::TerminateAll);
        assert_eq!(
            all,
            RecoveryEstimate {
                feasibility: 100,
                estimated_terminations: 3,
                estimated_resources_freed: 3,
            }
        );
        let one = analyze_recovery_option(&store, &deadlock, RecoveryStrategy::TerminateYoungest);
        assert_eq!((one.feasibility, one.estimated_terminations), (70, 1));
        assert_eq!(
            analyze_recovery_option(&store, &deadlock, RecoveryStrategy::PreemptResources)
                .feasibility,
            50
        );
        assert_eq!(
            analyze_recovery_option(&store, &deadlock, RecoveryStrategy::Rollback).feasibility,
            60
        );
    }

    #[test]
    fn result_display_lists_actions() {
        let (mut store, _, _) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        let result = recover_default(&mut store, &deadlock).expect("recover");
        let text = result.to_string();
        assert!(text.starts_with("Success: YES\n"));
        assert!(text.contains("Actions taken:\n  1. Terminated process P0 (A) using Lowest Priority criteria"));
    }

    /// A (priority 50) holds one instance, B (priority 95) holds two.
    fn uneven_pair() -> (GraphStore, ProcessId, ProcessId) {
        let mut store = GraphStore::default();
        let a = store.add_process("A", 50).expect("add");
        let b = store.add_process("B", 95).expect("add");
        let r1 = store.add_resource("R1", 1).expect("add");
        let r2 = store.add_resource("R2", 2).expect("add");
        store.allocate(a, r1).expect("allocate");
        store.allocate(b, r2).expect("allocate");
        store.allocate(b, r2).expect("allocate");
        store.request(a, r2).expect("request");
        store.request(b, r1).expect("request");
        (store, a, b)
    }

    #[test]
    fn explicit_plan_scores_like_select_victim() {
        let (mut store, a, b) = uneven_pair();
        let deadlock = detect_deadlock(&store);
        let criteria = SelectionCriteria::MostResources;
        assert_eq!(crate::recovery::select_victim(&store, &deadlock, criteria), Some(b));

        let result = RecoveryEngine::default()
            .execute(&mut store, &deadlock, &Recovery::TerminateOne { criteria })
            .expect("recover");
        assert_eq!(result.actions[0].process, b);
        assert!(store.contains_process(a));
        assert!(!store.contains_process(b));
    }

    #[test]
    fn configured_strategy_spares_critical_holder() {
        let (mut store, a, b) = uneven_pair();
        let deadlock = detect_deadlock(&store);
        let engine = RecoveryEngine::new(RecoveryConfig {
            strategy: RecoveryStrategy::TerminateOne,
            selection: SelectionCriteria::MostResources,
            ..RecoveryConfig::default()
        });
        assert_eq!(
            engine.select_victim(&store, &deadlock, SelectionCriteria::MostResources),
            Ok(a)
        );
        let result = engine.recover(&mut store, &deadlock).expect("recover");
        assert_eq!(result.actions[0].process, a);
        assert!(store.contains_process(b));
    }

    #[test]
    fn configured_rollback_publishes_victim() {
        let (mut store, a, _) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        let mut events: Vec<RecoveryEvent> = Vec::new();
        let result = engine(RecoveryStrategy::Rollback)
            .recover_with_sink(&mut store, &deadlock, &mut events)
            .expect("rollback");

        assert!(result.success);
        assert_eq!(result.actions[0].process, a);
        assert_eq!(result.actions[0].strategy, RecoveryStrategy::Rollback);
        assert!(store.contains_process(a));
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[1],
            RecoveryEvent::VictimSelected {
                process: a,
                criteria: SelectionCriteria::LowestPriority,
                score: 70,
            }
        );
        assert!(matches!(events[2], RecoveryEvent::ProcessRolledBack { released: 1, cancelled: 1, .. }));
    }

    #[test]
    fn configured_rollback_without_victim_still_reports() {
        let (mut store, a, b) = pair(30, 70);
        let deadlock = detect_deadlock(&store);
        store.remove_process(a).expect("remove");
        store.remove_process(b).expect("remove");

        let mut events: Vec<RecoveryEvent> = Vec::new();
        let err = engine(RecoveryStrategy::Rollback)
            .recover_with_sink(&mut store, &deadlock, &mut events)
            .expect_err("stale");
        assert_eq!(err, DeadlockError::NoVictimFound);
        assert!(matches!(events.first(), Some(RecoveryEvent::RecoveryStarted { .. })));
        assert_eq!(
            events.last(),
            Some(&RecoveryEvent::RecoveryCompleted {
                success: false,
                iterations: 0
            })
        );
    }

    #[test]
    fn resolve_records_configured_strategy() {
        let (mut store, _, _) = ring(&[10, 20, 30]);
        let result = RecoveryEngine::default().resolve(&mut store).expect("resolve");
        assert_eq!(result.actions[0].strategy, RecoveryStrategy::TerminateLowest);

        let (mut store, _, _) = ring(&[10, 20, 30]);
        let result = engine(RecoveryStrategy::TerminateAll)
            .resolve(&mut store)
            .expect("resolve");
        assert_eq!(result.actions[0].strategy, RecoveryStrategy::TerminateOne);
    }

    #[test]
    fn large_deadlock_with_multi_instance_holder_prefers_preemption() {
        let mut store = GraphStore::default();
        let ps: Vec<ProcessId> = (0..6)
            .map(|i| store.add_process(&format!("P{i}"), 10).expect("add"))
            .collect();
        let rs: Vec<ResourceId> = (0..6)
            .map(|i| {
                let instances = if i == 0 { 2 } else { 1 };
                store.add_resource(&format!("R{i}"), instances).expect("add")
            })
            .collect();
        store.allocate(ps[0], rs[0]).expect("allocate");
        for i in 0..6 {
            store.allocate(ps[i], rs[i]).expect("allocate");
        }
        for i in 0..6 {
            store.request(ps[i], rs[(i + 1) % 6]).expect("request");
        }

        let deadlock = detect_deadlock(&store);
        assert_eq!(deadlock.deadlocked_process_count(), 6);
        assert_eq!(store.held_instances(ps[0]), 2);
        assert_eq!(
            recommend_strategy(&store, &deadlock),
            RecoveryStrategy::PreemptResources
        );
    }
}
