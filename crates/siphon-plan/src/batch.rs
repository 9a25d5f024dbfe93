//! A concrete batch stamped from a template.

use siphon_core::{BatchId, DispatchableOperation};

/// One complete set of operations with fresh ids and absolute offsets.
///
/// Exists from instantiation until its last operation's completion is
/// processed by the batch manager.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub target: String,
    pub ops: Vec<DispatchableOperation>,
}
