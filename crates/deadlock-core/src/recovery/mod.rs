//! Deadlock recovery.
//!
//! # Overview
//!
//! Recovery mutates the store through its ordinary operations (release,
//! cancel, remove) until the reported deadlock is gone or a bound is hit.
//!
//! ```text
//! DeadlockResult ──► RecoveryEngine::recover()   configured strategy
//!                └─► RecoveryEngine::execute()   explicit Recovery plan
//!                        │
//!                        ├─ victim::select_victim()   scoring per criteria
//!                        └─ EventSink                 optional event log
//! ```
//!
//! Only `TerminateIterative` re-runs detection; every other plan trusts the
//! result it was handed.

pub mod engine;
pub mod strategy;
pub mod victim;

pub use engine::{
    RecoveryAction, RecoveryEngine, RecoveryEstimate, RecoveryResult, analyze_recovery_option,
    recommend_strategy, recover_default,
};
pub use strategy::{Recovery, RecoveryStrategy, SelectionCriteria};
pub use victim::{is_critical_process, select_victim, termination_cost, victim_score};
