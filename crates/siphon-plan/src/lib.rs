//! siphon-plan — the timing planner.
//!
//! Builds immutable [`BatchTemplate`]s: per-operation unit counts plus
//! relative start/end offsets chosen so that, against a primed target,
//! completions land in a fixed kind order with exactly one spacer interval
//! between them and the target ends the cycle primed again.
//!
//! Templates are built once per (target, parameters) and stamped into
//! concrete [`Batch`]es for every launch.

pub mod batch;
pub mod error;
pub mod template;

pub use batch::Batch;
pub use error::{PlanError, PlanResult};
pub use template::{BatchTemplate, OperationTemplate};
