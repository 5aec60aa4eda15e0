use std::fmt;

use crate::graph::{ProcessId, ResourceId};
use crate::recovery::RecoveryResult;

/// Machine-readable error codes for callers that translate failures into
/// their own wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidIdentifier,
    CapacityExceeded,
    InvalidArgument,
    ResourceUnavailable,
    NotHolding,
    NotRequesting,
    ResourceBusy,
    NoVictimFound,
    RecoveryBoundExceeded,
    ConfigParseError,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "E1001",
            Self::CapacityExceeded => "E1002",
            Self::InvalidArgument => "E1003",
            Self::ResourceUnavailable => "E2001",
            Self::NotHolding => "E2002",
            Self::NotRequesting => "E2003",
            Self::ResourceBusy => "E2004",
            Self::NoVictimFound => "E3001",
            Self::RecoveryBoundExceeded => "E3002",
            Self::ConfigParseError => "E4001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "Unknown or stale process/resource id",
            Self::CapacityExceeded => "No free process/resource slot",
            Self::InvalidArgument => "Invalid argument",
            Self::ResourceUnavailable => "No available instances",
            Self::NotHolding => "Process does not hold the resource",
            Self::NotRequesting => "Process is not requesting the resource",
            Self::ResourceBusy => "Resource is still allocated",
            Self::NoVictimFound => "No victim process found",
            Self::RecoveryBoundExceeded => "Recovery iteration bound exceeded",
            Self::ConfigParseError => "Config file parse error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidIdentifier => {
                Some("Ids are invalidated on removal; re-read ids after removing entities.")
            }
            Self::CapacityExceeded => Some("Remove unused entities or raise the store capacity."),
            Self::InvalidArgument => None,
            Self::ResourceUnavailable => {
                Some("Register a request instead and allocate once an instance is released.")
            }
            Self::NotHolding | Self::NotRequesting => None,
            Self::ResourceBusy => Some("Release every held instance before removing the resource."),
            Self::NoVictimFound => Some("Run detection first and pass a result with a deadlock."),
            Self::RecoveryBoundExceeded => {
                Some("Raise max_iterations or switch to a terminate-all strategy.")
            }
            Self::ConfigParseError => Some("Fix the TOML syntax in the config file and retry."),
            Self::InternalUnexpected => Some("Report a bug with the graph state and logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by graph store and recovery operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeadlockError {
    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("no free {kind} slot (capacity {capacity})")]
    CapacityExceeded { kind: &'static str, capacity: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource {0} has no available instances")]
    ResourceUnavailable(ResourceId),

    #[error("process {process} does not hold resource {resource}")]
    NotHolding {
        process: ProcessId,
        resource: ResourceId,
    },

    #[error("process {process} is not requesting resource {resource}")]
    NotRequesting {
        process: ProcessId,
        resource: ResourceId,
    },

    #[error("resource {resource} is still held by {holders} process(es)")]
    ResourceBusy { resource: ResourceId, holders: usize },

    #[error("no victim process found among deadlocked processes")]
    NoVictimFound,

    #[error("deadlock still present after {iterations} recovery iteration(s)")]
    RecoveryBoundExceeded {
        iterations: u32,
        partial: Box<RecoveryResult>,
    },

    #[error("graph invariant violated: {0}")]
    Corrupted(String),
}

impl DeadlockError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownProcess(_) | Self::UnknownResource(_) => ErrorCode::InvalidIdentifier,
            Self::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::ResourceUnavailable(_) => ErrorCode::ResourceUnavailable,
            Self::NotHolding { .. } => ErrorCode::NotHolding,
            Self::NotRequesting { .. } => ErrorCode::NotRequesting,
            Self::ResourceBusy { .. } => ErrorCode::ResourceBusy,
            Self::NoVictimFound => ErrorCode::NoVictimFound,
            Self::RecoveryBoundExceeded { .. } => ErrorCode::RecoveryBoundExceeded,
            Self::Corrupted(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Partial recovery log carried by a bound-exceeded failure.
    #[must_use]
    pub fn partial_recovery(&self) -> Option<&RecoveryResult> {
        match self {
            Self::RecoveryBoundExceeded { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
