use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{ProcessId, ResourceId};

/// Configured recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Terminate every deadlocked process.
    TerminateAll,
    /// Terminate one victim chosen by the configured selection criteria.
    TerminateOne,
    /// Terminate the lowest-priority deadlocked process.
    TerminateLowest,
    /// Terminate the most recently created deadlocked process.
    TerminateYoungest,
    /// Terminate the oldest deadlocked process.
    TerminateOldest,
    /// Take every held instance away from one victim and block it.
    PreemptResources,
    /// Reset one victim to a clean running state.
    Rollback,
}

impl RecoveryStrategy {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TerminateAll => "Terminate All",
            Self::TerminateOne => "Terminate One",
            Self::TerminateLowest => "Terminate Lowest Priority",
            Self::TerminateYoungest => "Terminate Youngest",
            Self::TerminateOldest => "Terminate Oldest",
            Self::PreemptResources => "Preempt Resources",
            Self::Rollback => "Rollback",
        }
    }

    /// Criteria a single-victim strategy implies, if it fixes one.
    #[must_use]
    pub const fn implied_criteria(self) -> Option<SelectionCriteria> {
        match self {
            Self::TerminateLowest => Some(SelectionCriteria::LowestPriority),
            Self::TerminateYoungest => Some(SelectionCriteria::ShortestRuntime),
            Self::TerminateOldest => Some(SelectionCriteria::LongestRuntime),
            Self::TerminateAll | Self::TerminateOne | Self::PreemptResources | Self::Rollback => {
                None
            }
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Victim scoring criterion. The highest score is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionCriteria {
    LowestPriority,
    FewestResources,
    MostResources,
    /// Higher slot index stands in for a more recent start.
    ShortestRuntime,
    LongestRuntime,
    MinimumCost,
}

impl SelectionCriteria {
    pub const ALL: [Self; 6] = [
        Self::LowestPriority,
        Self::FewestResources,
        Self::MostResources,
        Self::ShortestRuntime,
        Self::LongestRuntime,
        Self::MinimumCost,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LowestPriority => "Lowest Priority",
            Self::FewestResources => "Fewest Resources",
            Self::MostResources => "Most Resources",
            Self::ShortestRuntime => "Shortest Runtime",
            Self::LongestRuntime => "Longest Runtime",
            Self::MinimumCost => "Minimum Cost",
        }
    }
}

impl fmt::Display for SelectionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete recovery plan for [`super::RecoveryEngine::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum Recovery {
    TerminateAll,
    TerminateOne {
        criteria: SelectionCriteria,
    },
    /// Detect, terminate one victim, repeat. `max_iterations == 0` is
    /// unbounded.
    TerminateIterative {
        criteria: SelectionCriteria,
        max_iterations: u32,
    },
    /// Preempt from one victim; `resources: None` takes everything it holds.
    PreemptResources {
        criteria: SelectionCriteria,
        resources: Option<Vec<ResourceId>>,
    },
    Rollback {
        process: ProcessId,
    },
}

impl Recovery {
    /// Strategy recorded on the actions this plan produces.
    #[must_use]
    pub const fn strategy(&self) -> RecoveryStrategy {
        match self {
            Self::TerminateAll => RecoveryStrategy::TerminateAll,
            Self::TerminateOne { .. } | Self::TerminateIterative { .. } => {
                RecoveryStrategy::TerminateOne
            }
            Self::PreemptResources { .. } => RecoveryStrategy::PreemptResources,
            Self::Rollback { .. } => RecoveryStrategy::Rollback,
        }
    }
}
