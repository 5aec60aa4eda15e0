//! Resource allocation graph store.
//!
//! # Overview
//!
//! The store is the only component that mutates shared state. It owns
//! process and resource records plus the request and assignment relations,
//! and keeps the accounting invariants intact across every operation.
//!
//! ```text
//! process ──request──▶ resource        (pending ask for one unit)
//! resource ──assign──▶ process  × n    (n units held)
//! ```
//!
//! ## Typical Usage
//!
//! ```rust
//! use deadlock_core::graph::GraphStore;
//!
//! let mut store = GraphStore::default();
//! let p1 = store.add_process("P1", 30)?;
//! let r1 = store.add_resource("R1", 1)?;
//! store.allocate(p1, r1)?;
//! assert!(store.is_holding(p1, r1));
//! # Ok::<(), deadlock_core::DeadlockError>(())
//! ```

pub mod ids;
pub mod stats;
pub mod store;

pub use ids::{NodeRef, ProcessId, ResourceId};
pub use stats::GraphStats;
pub use store::{GraphStore, Process, ProcessState, Resource};
