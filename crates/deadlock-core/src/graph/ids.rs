//! Generational handles for processes and resources.
//!
//! A handle pairs the slot index with the slot's generation at the time the
//! entity was created. Removing an entity bumps the slot generation, so a
//! stale handle never silently resolves to an entity created later in the
//! same slot.
//!
//! Ordering is by slot index first. Among live handles the index is unique,
//! which makes "ascending id" well defined for deterministic traversal.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! slot_handle {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $name {
            /// Build a handle from raw parts.
            #[must_use]
            pub const fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// Slot index; stable for the lifetime of the entity.
            #[must_use]
            pub const fn index(self) -> u32 {
                self.index
            }

            /// Generation of the slot when this handle was issued.
            #[must_use]
            pub const fn generation(self) -> u32 {
                self.generation
            }

            pub(crate) const fn slot(self) -> usize {
                self.index as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.index)
            }
        }
    };
}

slot_handle!(ProcessId, "P");
slot_handle!(ResourceId, "R");

/// A node of the resource allocation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Process(ProcessId),
    Resource(ResourceId),
}

impl NodeRef {
    #[must_use]
    pub const fn as_process(self) -> Option<ProcessId> {
        match self {
            Self::Process(pid) => Some(pid),
            Self::Resource(_) => None,
        }
    }

    #[must_use]
    pub const fn as_resource(self) -> Option<ResourceId> {
        match self {
            Self::Resource(rid) => Some(rid),
            Self::Process(_) => None,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(pid) => fmt::Display::fmt(pid, f),
            Self::Resource(rid) => fmt::Display::fmt(rid, f),
        }
    }
}
