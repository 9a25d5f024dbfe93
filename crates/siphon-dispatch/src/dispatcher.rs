//! The capacity dispatcher: sorted blocks, best-fit placement, probes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use siphon_core::{
    CompletionSender, DispatchableOperation, ExecHandle, NodeInventory, OperationId,
    OperationKind, ProcessLauncher,
};

use crate::error::{DispatchError, DispatchResult};

/// Free execution slots on one node. Created at construction, mutated on
/// every dispatch/free, never removed during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityBlock {
    pub node_id: String,
    pub free_capacity: f64,
}

/// Bookkeeping for one currently-executing operation.
#[derive(Debug, Clone)]
pub struct DispatchedOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub node_id: String,
    pub unit_count: u32,
    pub capacity_cost: f64,
    pub expected_return: f64,
    /// `None` when this record came from a dry run and nothing executes.
    pub handle: Option<ExecHandle>,
}

/// Owns the capacity blocks and places operations on them best-fit.
///
/// Blocks are kept sorted ascending by free capacity, so a linear scan
/// finds the smallest block that fits. Operations are never split across
/// blocks — worker timing assumes exactly the requested unit count runs
/// in one place.
pub struct CapacityDispatcher {
    launcher: Arc<dyn ProcessLauncher + Send + Sync>,
    /// Sorted ascending by `free_capacity`.
    blocks: Vec<CapacityBlock>,
    dispatched: HashMap<OperationId, DispatchedOperation>,
}

impl CapacityDispatcher {
    /// Build blocks from the live inventory and push worker payloads to
    /// every usable node. Zero-capacity and inaccessible nodes are skipped
    /// (common, not an error); a failed payload distribution is fatal.
    pub fn new(
        inventory: &dyn NodeInventory,
        launcher: Arc<dyn ProcessLauncher + Send + Sync>,
    ) -> DispatchResult<Self> {
        let mut blocks = Vec::new();

        for node in inventory.list_nodes() {
            if !node.has_access || node.free_capacity <= 0.0 {
                continue;
            }
            if !inventory.distribute_payload(&node.node_id) {
                return Err(DispatchError::Provisioning(node.node_id));
            }
            blocks.push(CapacityBlock {
                node_id: node.node_id,
                free_capacity: node.free_capacity,
            });
        }

        let mut dispatcher = Self {
            launcher,
            blocks,
            dispatched: HashMap::new(),
        };
        dispatcher.sort_blocks();

        info!(
            nodes = dispatcher.blocks.len(),
            total_capacity = dispatcher.total_capacity(),
            "capacity dispatcher ready"
        );
        Ok(dispatcher)
    }

    /// Reserve capacity for `op` and launch it. Every dispatched operation
    /// MUST eventually be freed, otherwise its slots leak for the run.
    pub fn dispatch(
        &mut self,
        op: &DispatchableOperation,
        completions: &CompletionSender,
    ) -> DispatchResult<()> {
        self.dispatch_inner(op, Some(completions))
    }

    /// Reserve capacity without launching anything; the record has no
    /// execution handle. Used by [`Self::could_fit`].
    pub fn dispatch_dry_run(&mut self, op: &DispatchableOperation) -> DispatchResult<()> {
        self.dispatch_inner(op, None)
    }

    fn dispatch_inner(
        &mut self,
        op: &DispatchableOperation,
        completions: Option<&CompletionSender>,
    ) -> DispatchResult<()> {
        if self.dispatched.contains_key(&op.id) {
            return Err(DispatchError::DuplicateOperation(op.id));
        }
        if op.unit_count == 0 {
            return Err(DispatchError::InvalidUnitCount {
                id: op.id,
                units: op.unit_count,
            });
        }

        let cost = op.capacity_cost();

        // blocks are sorted ascending, so the first fit is the smallest fit
        let block_index = self
            .blocks
            .iter()
            .position(|block| block.free_capacity >= cost)
            .ok_or_else(|| DispatchError::CapacityExhausted {
                id: op.id,
                cost,
                largest: self
                    .blocks
                    .last()
                    .map(|block| block.free_capacity)
                    .unwrap_or(0.0),
            })?;
        let node_id = self.blocks[block_index].node_id.clone();

        // launch before touching the block: a refused launch must leave
        // capacity accounting untouched
        let handle = match completions {
            Some(completions) => Some(
                self.launcher
                    .launch(&node_id, op, completions)
                    .ok_or_else(|| DispatchError::LaunchFailure {
                        id: op.id,
                        node_id: node_id.clone(),
                    })?,
            ),
            None => None,
        };

        self.blocks[block_index].free_capacity -= cost;
        debug!(
            op = %op.id,
            kind = %op.kind,
            units = op.unit_count,
            node = %node_id,
            dry_run = handle.is_none(),
            "dispatched operation"
        );

        self.dispatched.insert(
            op.id,
            DispatchedOperation {
                id: op.id,
                kind: op.kind,
                node_id,
                unit_count: op.unit_count,
                capacity_cost: cost,
                expected_return: op.expected_return,
                handle,
            },
        );
        self.sort_blocks();
        Ok(())
    }

    /// Release the capacity an operation reserved, exactly once.
    pub fn free(&mut self, op_id: OperationId) -> DispatchResult<DispatchedOperation> {
        let record = self
            .dispatched
            .remove(&op_id)
            .ok_or(DispatchError::UnknownOperation(op_id))?;

        let block = self
            .blocks
            .iter_mut()
            .find(|block| block.node_id == record.node_id)
            .expect("blocks are never removed while operations reference them");
        block.free_capacity += record.capacity_cost;

        self.sort_blocks();
        Ok(record)
    }

    /// Best-effort terminate every still-tracked worker, then free each.
    /// Used at shutdown/cancellation; there is no per-operation cancel.
    pub fn free_and_release_all(&mut self) {
        let open: Vec<OperationId> = self.dispatched.keys().copied().collect();
        debug!(count = open.len(), "releasing all dispatched operations");

        for op_id in open {
            if let Some(handle) = self.dispatched.get(&op_id).and_then(|record| record.handle) {
                self.launcher.terminate(handle);
            }
            let _ = self.free(op_id);
        }
    }

    /// Non-mutating feasibility probe: would this whole candidate set fit
    /// right now? Hardest-to-place operations go first so an infeasible
    /// set fails fast. Dispatcher state is identical before and after,
    /// whatever the outcome.
    pub fn could_fit(&mut self, ops: &[DispatchableOperation]) -> bool {
        let mut candidates: Vec<&DispatchableOperation> = ops.iter().collect();
        candidates.sort_by(|a, b| b.unit_count.cmp(&a.unit_count));

        let mut placed: Vec<OperationId> = Vec::with_capacity(candidates.len());
        let mut all_fit = true;

        for op in candidates {
            match self.dispatch_dry_run(op) {
                Ok(()) => placed.push(op.id),
                Err(_) => {
                    all_fit = false;
                    break;
                }
            }
        }

        for op_id in placed {
            let _ = self.free(op_id);
        }
        all_fit
    }

    /// Sum of free capacity across all blocks — a cheap upper bound
    /// callers check before the more expensive `could_fit`.
    pub fn total_capacity(&self) -> f64 {
        self.blocks.iter().map(|block| block.free_capacity).sum()
    }

    pub fn dispatched(&self, op_id: OperationId) -> Option<&DispatchedOperation> {
        self.dispatched.get(&op_id)
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched.len()
    }

    pub fn blocks(&self) -> &[CapacityBlock] {
        &self.blocks
    }

    // todo-performance: linear rescan + resort on every mutation; fine for
    // tens of nodes, switch to an ordered index if it ever shows up hot
    fn sort_blocks(&mut self) {
        self.blocks
            .sort_by(|a, b| a.free_capacity.total_cmp(&b.free_capacity));
    }
}
