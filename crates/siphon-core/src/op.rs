//! Operation kinds, ids, and the dispatchable operation record.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The role an operation plays within a batch.
///
/// Completion order within a batch is fixed: extraction, counter-extraction,
/// reinforcement, counter-reinforcement (reinforcement-only batches skip the
/// first two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Removes value from the target; raises its resistance as a side effect.
    Extraction,
    /// Lowers resistance back down after an extraction.
    CounterExtraction,
    /// Restores the target's value level; raises resistance as a side effect.
    Reinforcement,
    /// Lowers resistance back down after a reinforcement.
    CounterReinforcement,
}

impl OperationKind {
    /// Execution-slot cost per unit for this kind of operation.
    ///
    /// These are fixed properties of the worker payloads, not tunables.
    pub fn unit_cost(self) -> f64 {
        match self {
            OperationKind::Extraction => 1.70,
            OperationKind::CounterExtraction
            | OperationKind::Reinforcement
            | OperationKind::CounterReinforcement => 1.75,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Extraction => "extraction",
            OperationKind::CounterExtraction => "counter-extraction",
            OperationKind::Reinforcement => "reinforcement",
            OperationKind::CounterReinforcement => "counter-reinforcement",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Ids are unique per process; batches and operations draw from the same
// counter so an id never names both.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of one dispatched (or to-be-dispatched) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    pub fn fresh() -> Self {
        Self(next_raw_id())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Identifier of one concrete batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

impl BatchId {
    pub fn fresh() -> Self {
        Self(next_raw_id())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// A concrete operation ready to hand to the capacity dispatcher.
///
/// Offsets are absolute within the run: the worker delays its effect by
/// `start_offset_ms` so that completions land in template order.
#[derive(Debug, Clone)]
pub struct DispatchableOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: String,
    pub unit_count: u32,
    pub start_offset_ms: f64,
    pub end_offset_ms: f64,
    /// The return value the planner predicted for this operation; completion
    /// reports are compared against it for efficacy logging.
    pub expected_return: f64,
}

impl DispatchableOperation {
    /// Slot cost of this operation on whichever node it lands on.
    pub fn capacity_cost(&self) -> f64 {
        f64::from(self.unit_count) * self.kind.unit_cost()
    }
}
