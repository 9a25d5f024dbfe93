//! Dispatcher error types.
//!
//! Apart from `Provisioning` (fatal at construction), every variant here
//! signals a broken caller invariant — unique ids, reserve-before-use,
//! pre-checked capacity — and must never be swallowed or retried.

use thiserror::Error;

use siphon_core::OperationId;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to distribute payload to node {0}")]
    Provisioning(String),

    #[error("operation {0} is already dispatched")]
    DuplicateOperation(OperationId),

    #[error("operation {id} has invalid unit count {units}")]
    InvalidUnitCount { id: OperationId, units: u32 },

    #[error("no capacity block fits operation {id} (cost {cost:.2}, largest free block {largest:.2})")]
    CapacityExhausted {
        id: OperationId,
        cost: f64,
        largest: f64,
    },

    #[error("node {node_id} refused launch of operation {id}")]
    LaunchFailure { id: OperationId, node_id: String },

    #[error("operation {0} has not been dispatched")]
    UnknownOperation(OperationId),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
