//! Victim scoring.
//!
//! Each criterion maps a deadlocked process to an integer score and the
//! highest score wins. Candidates are scanned in ascending id and the first
//! maximum is kept, so ties go to the lowest id.
//!
//! | Criterion        | Score                          |
//! |------------------|--------------------------------|
//! | LowestPriority   | `100 - priority`               |
//! | FewestResources  | `resource_capacity - held`     |
//! | MostResources    | `held`                         |
//! | ShortestRuntime  | slot index                     |
//! | LongestRuntime   | `process_capacity - index`     |
//! | MinimumCost      | `1000 - termination_cost`      |

use std::collections::BTreeSet;

use crate::detect::DeadlockResult;
use crate::graph::{GraphStore, ProcessId};
use crate::recovery::SelectionCriteria;

/// Estimated cost of terminating `pid`.
///
/// `priority * 10 + held_instances * 20 + 15 * waiters`, where `waiters`
/// counts other processes requesting any resource `pid` holds. Zero for a
/// process that is not live.
#[must_use]
pub fn termination_cost(store: &GraphStore, pid: ProcessId) -> i64 {
    let Ok(process) = store.process(pid) else {
        return 0;
    };

    let waiters: BTreeSet<ProcessId> = store
        .held_resources(pid)
        .flat_map(|rid| store.requesters(rid))
        .filter(|&other| other != pid)
        .collect();

    i64::from(process.priority) * 10
        + i64::from(store.held_instances(pid)) * 20
        + 15 * to_i64(waiters.len())
}

/// Whether `pid` is at or above the critical priority threshold.
#[must_use]
pub fn is_critical_process(store: &GraphStore, pid: ProcessId, threshold: i32) -> bool {
    store
        .process(pid)
        .is_ok_and(|process| process.priority >= threshold)
}

/// Score `pid` under `criteria`; `None` if the process is not live.
#[must_use]
pub fn victim_score(
    store: &GraphStore,
    pid: ProcessId,
    criteria: SelectionCriteria,
) -> Option<i64> {
    let process = store.process(pid).ok()?;
    let score = match criteria {
        SelectionCriteria::LowestPriority => 100 - i64::from(process.priority),
        SelectionCriteria::FewestResources => {
            to_i64(store.resource_capacity()) - i64::from(store.held_instances(pid))
        }
        SelectionCriteria::MostResources => i64::from(store.held_instances(pid)),
        SelectionCriteria::ShortestRuntime => i64::from(pid.index()),
        SelectionCriteria::LongestRuntime => {
            to_i64(store.process_capacity()) - i64::from(pid.index())
        }
        SelectionCriteria::MinimumCost => 1000 - termination_cost(store, pid),
    };
    Some(score)
}

/// Pick the best-scoring live process among `candidates`.
pub(crate) fn best_candidate(
    store: &GraphStore,
    candidates: impl IntoIterator<Item = ProcessId>,
    criteria: SelectionCriteria,
) -> Option<(ProcessId, i64)> {
    let mut best: Option<(ProcessId, i64)> = None;
    for pid in candidates {
        let Some(score) = victim_score(store, pid, criteria) else {
            continue;
        };
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((pid, score));
        }
    }
    best
}

/// Select a victim among the deadlocked processes of `deadlock`.
///
/// Returns `None` when the deadlocked set is empty or none of its members
/// is still live.
#[must_use]
pub fn select_victim(
    store: &GraphStore,
    deadlock: &DeadlockResult,
    criteria: SelectionCriteria,
) -> Option<ProcessId> {
    best_candidate(store, deadlock.deadlocked_processes.iter().copied(), criteria)
        .map(|(pid, _)| pid)
}

#[allow(clippy::cast_possible_wrap)]
const fn to_i64(n: usize) -> i64 {
    n as i64
}
