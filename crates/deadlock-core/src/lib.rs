#![forbid(unsafe_code)]
//! deadlock-core library.
//!
//! Resource allocation graph store, cycle detection, and deadlock recovery.
//!
//! ```
//! use deadlock_core::{GraphStore, RecoveryEngine, detect_deadlock};
//!
//! let mut store = GraphStore::default();
//! let p1 = store.add_process("writer", 30)?;
//! let p2 = store.add_process("reader", 70)?;
//! let r1 = store.add_resource("disk", 1)?;
//! let r2 = store.add_resource("tape", 1)?;
//! store.allocate(p1, r1)?;
//! store.allocate(p2, r2)?;
//! store.request(p1, r2)?;
//! store.request(p2, r1)?;
//!
//! let deadlock = detect_deadlock(&store);
//! assert!(deadlock.deadlock_detected);
//!
//! let outcome = RecoveryEngine::default().recover(&mut store, &deadlock)?;
//! assert!(outcome.success);
//! assert!(!store.contains_process(p1));
//! # Ok::<(), deadlock_core::DeadlockError>(())
//! ```
//!
//! # Conventions
//!
//! - **Errors**: Store and recovery operations return
//!   `Result<T, DeadlockError>`; config loading uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//!   No subscriber is installed here.

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod graph;
pub mod recovery;

pub use config::{CoreConfig, RecoveryConfig, StoreConfig, load_config, parse_config};
pub use detect::{DeadlockResult, DetectionMode, WaitForGraph, detect_all_cycles, detect_deadlock};
pub use error::{DeadlockError, ErrorCode};
pub use events::{EventSink, NoopSink, RecoveryEvent};
pub use graph::{GraphStore, NodeRef, ProcessId, ProcessState, ResourceId};
pub use recovery::{
    Recovery, RecoveryEngine, RecoveryResult, RecoveryStrategy, SelectionCriteria,
    recommend_strategy,
};
