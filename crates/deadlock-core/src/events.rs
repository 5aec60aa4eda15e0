//! Recovery events published to an explicitly passed sink.
//!
//! The engine holds no global listener. Callers that want a log pass a
//! sink into the recovery call; everyone else gets [`NoopSink`].

use serde::{Deserialize, Serialize};

use crate::graph::{ProcessId, ResourceId};
use crate::recovery::{RecoveryStrategy, SelectionCriteria};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecoveryEvent {
    RecoveryStarted {
        strategy: RecoveryStrategy,
        deadlocked_processes: usize,
    },
    VictimSelected {
        process: ProcessId,
        criteria: SelectionCriteria,
        score: i64,
    },
    ProcessTerminated {
        process: ProcessId,
        released: u32,
    },
    ResourcePreempted {
        process: ProcessId,
        resource: Option<ResourceId>,
        instances: u32,
    },
    ProcessRolledBack {
        process: ProcessId,
        released: u32,
        cancelled: usize,
    },
    RecoveryCompleted {
        success: bool,
        iterations: u32,
    },
}

/// Receiver for [`RecoveryEvent`]s.
pub trait EventSink {
    fn publish(&mut self, event: RecoveryEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&mut self, _event: RecoveryEvent) {}
}

impl EventSink for Vec<RecoveryEvent> {
    fn publish(&mut self, event: RecoveryEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_records_in_order() {
        let mut log: Vec<RecoveryEvent> = Vec::new();
        log.publish(RecoveryEvent::RecoveryCompleted {
            success: true,
            iterations: 1,
        });
        NoopSink.publish(RecoveryEvent::RecoveryCompleted {
            success: false,
            iterations: 0,
        });
        assert_eq!(
            log,
            vec![RecoveryEvent::RecoveryCompleted {
                success: true,
                iterations: 1
            }]
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(RecoveryEvent::ProcessTerminated {
            process: ProcessId::new(2, 0),
            released: 3,
        })
        .expect("serialize");
        assert_eq!(json["event"], "process_terminated");
        assert_eq!(json["released"], 3);
    }
}
