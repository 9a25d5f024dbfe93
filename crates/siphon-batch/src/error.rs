//! Batch manager and controller error types.

use thiserror::Error;

use siphon_core::{OperationId, ProtocolError};
use siphon_dispatch::DispatchError;
use siphon_plan::PlanError;

/// Errors from batch bookkeeping. All of these are contract violations:
/// retrying would mask a scheduling bug, so they are fatal where they occur.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A completion arrived for an operation no batch ever dispatched.
    #[error("no batch found for operation {0}")]
    OrphanOperation(OperationId),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type BatchResult<T> = Result<T, BatchError>;

/// Errors surfaced by the controller.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

pub type ControlResult<T> = Result<T, ControlError>;
