//! Planner error types.

use thiserror::Error;

/// Errors that can occur while building a batch template.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The caller supplied an unschedulable request; fatal, never retried.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type PlanResult<T> = Result<T, PlanError>;
