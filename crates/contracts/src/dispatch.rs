//! Dispatch record - metadata linking a queued event to its payload slot

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which registry slots a call is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Every occupied slot, regardless of its restrict flag
    #[default]
    Broadcast,
    /// Unrestricted slots plus the restricted slot with this index
    Slot(usize),
}

impl Target {
    /// Map a signed source index; negative values mean broadcast
    pub fn from_index(index: i32) -> Self {
        usize::try_from(index).map_or(Target::Broadcast, Target::Slot)
    }

    /// Selection rule for one registry slot
    ///
    /// A slot matches when the call is a broadcast, when the slot is not
    /// restricted, or when it is restricted and its index equals the target.
    #[inline]
    pub fn selects(self, slot_index: usize, restrict_to_index: bool) -> bool {
        match self {
            Target::Broadcast => true,
            Target::Slot(index) => !restrict_to_index || index == slot_index,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Broadcast => f.write_str("broadcast"),
            Target::Slot(index) => write!(f, "slot#{index}"),
        }
    }
}

/// Queued metadata: who the call targets and where its payload lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub target: Target,
    pub ring_slot: usize,
}

/// Counters for one dispatcher (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Calls whose record was enqueued
    pub accepted: u64,
    /// Calls dropped because the queue was full
    pub dropped: u64,
    /// Records popped and evaluated by the worker
    pub records_dispatched: u64,
    /// Individual handler invocations
    pub handler_invocations: u64,
    /// Payloads forwarded to the parent
    pub propagated: u64,
    /// Forward attempts that the parent rejected or could not receive
    pub forward_failures: u64,
}

impl MetricsSnapshot {
    /// Percentage of calls dropped
    pub fn drop_rate(&self) -> f64 {
        let total = self.accepted + self.dropped;
        if total > 0 {
            (self.dropped as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}
