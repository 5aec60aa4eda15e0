//! Read-only deadlock analysis.
//!
//! # Overview
//!
//! Detection never mutates the store and never fails: a graph with no
//! pending requests simply reports no deadlock.
//!
//! ```text
//! GraphStore
//!   ├─ cycles::detect_with_mode()   bipartite DFS → DeadlockResult
//!   └─ wait_for::WaitForGraph        process-only view (single-instance)
//! ```

pub mod cycles;
pub mod wait_for;

pub use cycles::{
    Cycle, DeadlockResult, DetectionMode, MAX_RECORDED_CYCLES, cycle_from, detect_all_cycles,
    detect_deadlock, detect_with_mode, is_process_deadlocked, is_resource_in_deadlock,
};
pub use wait_for::WaitForGraph;
