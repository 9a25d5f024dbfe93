//! siphon-batch — pipelined batch orchestration.
//!
//! The [`BatchManager`] stamps concrete batches from a template, dispatches
//! their operations through the capacity dispatcher, and tracks them through
//! asynchronous completion messages. When a batch's last operation
//! completes, a replacement batch is started from the same template before
//! the old batch's bookkeeping is dropped, so the pipeline never drains and
//! capacity accounting never gaps.
//!
//! The [`Controller`] is the thin layer above: it decides prep mode vs.
//! steady state, picks the pipeline depth, and reports per-cycle status.

pub mod controller;
pub mod error;
pub mod manager;

pub use controller::{Controller, ControllerSettings};
pub use error::{BatchError, BatchResult, ControlError, ControlResult};
pub use manager::BatchManager;
