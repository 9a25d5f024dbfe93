//! Node inventory and process launcher — the fleet-facing collaborators.

use crate::op::DispatchableOperation;
use crate::protocol::CompletionSender;

/// One execution node as reported by the inventory.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: String,
    /// Free execution slots right now. Nodes self-report; nothing is
    /// persisted across runs.
    pub free_capacity: f64,
    /// Whether we can place payloads on this node.
    pub has_access: bool,
}

/// Query + side-effect interface to the fleet.
pub trait NodeInventory {
    /// All known nodes, accessible or not; the dispatcher filters.
    fn list_nodes(&self) -> Vec<NodeInfo>;

    /// Push the worker payloads to a node. Returns false on failure, which
    /// is fatal at dispatcher construction.
    fn distribute_payload(&self, node_id: &str) -> bool;
}

/// Opaque handle to a launched worker process, used only for best-effort
/// termination at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecHandle(pub u64);

/// Starts worker processes on fleet nodes.
///
/// Workers are fire-and-forget: once launched they delay by the
/// operation's start offset, run, and report on the completion channel.
pub trait ProcessLauncher {
    /// Launch `op` on `node_id`. `None` means the node refused the launch.
    fn launch(
        &self,
        node_id: &str,
        op: &DispatchableOperation,
        completions: &CompletionSender,
    ) -> Option<ExecHandle>;

    /// Best-effort terminate. Ignores handles that already finished.
    fn terminate(&self, handle: ExecHandle);
}
