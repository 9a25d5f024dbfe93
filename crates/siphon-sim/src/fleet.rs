//! Simulated inventory and launcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use siphon_core::config::SimNodeConfig;
use siphon_core::{
    CompletionSender, DispatchableOperation, ExecHandle, NodeInfo, NodeInventory, OperationReport,
    ProcessLauncher,
};

use crate::world::SimWorld;

/// Fleet description straight from config.
pub struct SimInventory {
    nodes: Vec<SimNodeConfig>,
}

impl SimInventory {
    pub fn new(nodes: Vec<SimNodeConfig>) -> Self {
        Self { nodes }
    }
}

impl NodeInventory for SimInventory {
    fn list_nodes(&self) -> Vec<NodeInfo> {
        self.nodes
            .iter()
            .map(|node| NodeInfo {
                node_id: node.id.clone(),
                free_capacity: node.capacity,
                has_access: node.has_access,
            })
            .collect()
    }

    fn distribute_payload(&self, _node_id: &str) -> bool {
        true
    }
}

/// Launches simulated workers as tokio tasks.
///
/// A worker sleeps until its absolute end offset (divided by the time
/// compression factor), applies its effect to the shared world, and sends
/// its report on the completion channel — the same fire-and-forget shape
/// as a real remote worker.
pub struct SimLauncher {
    world: Arc<SimWorld>,
    time_compression: f64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_handle: AtomicU64,
}

impl SimLauncher {
    pub fn new(world: Arc<SimWorld>, time_compression: f64) -> Self {
        Self {
            world,
            time_compression,
            tasks: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }
}

impl ProcessLauncher for SimLauncher {
    fn launch(
        &self,
        node_id: &str,
        op: &DispatchableOperation,
        completions: &CompletionSender,
    ) -> Option<ExecHandle> {
        let handle_id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let world = Arc::clone(&self.world);
        let completions = completions.clone();
        let op = op.clone();
        let compression = self.time_compression;

        trace!(op = %op.id, node = node_id, "sim worker launched");

        let task = tokio::spawn(async move {
            let wall_ms = (op.end_offset_ms / compression).max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(wall_ms / 1000.0)).await;

            let return_value = world.apply(op.kind, op.unit_count);
            completions.send_report(&OperationReport {
                operation_id: op.id,
                kind: op.kind,
                time_taken_ms: op.end_offset_ms - op.start_offset_ms,
                return_value,
            });
        });

        self.tasks.lock().unwrap().insert(handle_id, task);
        Some(ExecHandle(handle_id))
    }

    fn terminate(&self, handle: ExecHandle) {
        if let Some(task) = self.tasks.lock().unwrap().remove(&handle.0) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use siphon_core::config::SimTargetConfig;
    use siphon_core::{Message, OperationId, OperationKind, completion_channel};

    use super::*;

    fn world() -> Arc<SimWorld> {
        Arc::new(SimWorld::new(&SimTargetConfig {
            name: "vault".to_string(),
            max_value: 1000.0,
            min_resistance: 2.0,
            current_value: 1000.0,
            current_resistance: 2.0,
            base_duration_ms: 100.0,
        }))
    }

    fn operation(end_offset_ms: f64) -> DispatchableOperation {
        DispatchableOperation {
            id: OperationId::fresh(),
            kind: OperationKind::Extraction,
            target: "vault".to_string(),
            unit_count: 10,
            start_offset_ms: 0.0,
            end_offset_ms,
            expected_return: 70.0,
        }
    }

    #[tokio::test]
    async fn worker_applies_effect_and_reports() {
        let world = world();
        let launcher = SimLauncher::new(world.clone(), 1000.0);
        let (tx, mut rx) = completion_channel();

        let op = operation(100.0);
        launcher.launch("node-0", &op, &tx).unwrap();

        let Message::OperationReport(report) = rx.recv().await.unwrap().unwrap();
        assert_eq!(report.operation_id, op.id);
        assert!((report.return_value - 70.0).abs() < 1e-9);
        assert!(world.state().current_value < 1000.0);
    }

    #[tokio::test]
    async fn terminated_worker_never_reports() {
        let world = world();
        let launcher = SimLauncher::new(world.clone(), 1.0);
        let (tx, mut rx) = completion_channel();

        // a long-running worker, aborted right away
        let op = operation(60_000.0);
        let handle = launcher.launch("node-0", &op, &tx).unwrap();
        launcher.terminate(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_none());
        assert_eq!(world.state().current_value, 1000.0);
    }
}
