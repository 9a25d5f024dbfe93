//! The batch manager: instantiation, dispatch, completion handling.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use siphon_core::{
    BatchEvent, BatchId, CompletionReceiver, CompletionSender, Message, OperationId,
    OperationReport, completion_channel,
};
use siphon_dispatch::CapacityDispatcher;
use siphon_plan::BatchTemplate;

use crate::error::{BatchError, BatchResult};

/// Launches batches and keeps the pipeline saturated.
///
/// The manager owns the capacity dispatcher and the receiving end of the
/// completion channel; every worker it launches holds a sender handle.
/// Batch membership is resolved purely from the operation-to-batch map, so
/// completions from any number of open batches may interleave arbitrarily.
pub struct BatchManager {
    dispatcher: CapacityDispatcher,
    completions: CompletionReceiver,
    completion_tx: CompletionSender,
    events: mpsc::UnboundedSender<BatchEvent>,
    open_ops: HashMap<BatchId, usize>,
    templates: HashMap<BatchId, Arc<BatchTemplate>>,
    op_to_batch: HashMap<OperationId, BatchId>,
}

impl BatchManager {
    /// Create a manager around an already-provisioned dispatcher. Finished
    /// batches are announced on `events`.
    pub fn new(
        dispatcher: CapacityDispatcher,
        events: mpsc::UnboundedSender<BatchEvent>,
    ) -> Self {
        let (completion_tx, completions) = completion_channel();
        Self {
            dispatcher,
            completions,
            completion_tx,
            events,
            open_ops: HashMap::new(),
            templates: HashMap::new(),
            op_to_batch: HashMap::new(),
        }
    }

    /// Sender handle for this manager's completion channel. Anything that
    /// reports an operation finished must go through a clone of this.
    pub fn completion_sender(&self) -> CompletionSender {
        self.completion_tx.clone()
    }

    /// Instantiate and dispatch one batch.
    ///
    /// Absolute offsets are the template's offsets plus one pipeline spacer
    /// (the template's unsafe duration) plus `launch_delay_ms`. A dispatch
    /// failure is fatal — callers probe `could_fit` before committing.
    pub fn start(
        &mut self,
        template: &Arc<BatchTemplate>,
        launch_delay_ms: f64,
    ) -> BatchResult<BatchId> {
        let batch = template.instantiate(template.unsafe_duration_ms() + launch_delay_ms);

        debug!(batch = %batch.id, ops = batch.ops.len(), "starting batch");

        self.open_ops.insert(batch.id, batch.ops.len());
        self.templates.insert(batch.id, Arc::clone(template));

        for op in &batch.ops {
            self.dispatcher.dispatch(op, &self.completion_tx)?;
            self.op_to_batch.insert(op.id, batch.id);
        }
        Ok(batch.id)
    }

    /// Await and handle the next completion message. Returns `false` if the
    /// channel closed (every sender handle dropped).
    pub async fn process_next(&mut self) -> BatchResult<bool> {
        match self.completions.recv().await {
            Some(Ok(Message::OperationReport(report))) => {
                self.handle_report(report)?;
                Ok(true)
            }
            Some(Err(err)) => Err(err.into()),
            None => Ok(false),
        }
    }

    /// Handle one operation report.
    ///
    /// If this was the batch's last open operation, a replacement batch is
    /// started from the same template *before* the finished batch's
    /// bookkeeping is removed — the pipeline is refilled while the old
    /// batch still exists, so there is never a capacity-accounting gap.
    fn handle_report(&mut self, report: OperationReport) -> BatchResult<()> {
        let batch_id = *self
            .op_to_batch
            .get(&report.operation_id)
            .ok_or(BatchError::OrphanOperation(report.operation_id))?;

        let open = self
            .open_ops
            .get_mut(&batch_id)
            .expect("every tracked operation belongs to a registered batch");
        *open -= 1;
        let remaining = *open;

        if let Some(record) = self.dispatcher.dispatched(report.operation_id) {
            let efficacy = if record.expected_return != 0.0 {
                report.return_value / record.expected_return
            } else {
                1.0
            };
            debug!(
                op = %report.operation_id,
                kind = %report.kind,
                batch = %batch_id,
                remaining,
                efficacy = format!("{:.3}", efficacy),
                time_ms = report.time_taken_ms,
                "operation finished"
            );
        }

        if remaining == 0 {
            let template = self
                .templates
                .get(&batch_id)
                .cloned()
                .expect("every open batch keeps its template");

            // replacement first, cleanup after
            let replacement = self.start(&template, 0.0)?;
            info!(finished = %batch_id, replacement = %replacement, "batch finished, pipeline refilled");

            let _ = self.events.send(BatchEvent::BatchFinished { batch_id });

            self.open_ops.remove(&batch_id);
            self.templates.remove(&batch_id);
        }

        self.dispatcher.free(report.operation_id)?;
        self.op_to_batch.remove(&report.operation_id);
        Ok(())
    }

    /// Drive completions until shutdown is signalled or the channel closes,
    /// then release everything.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> BatchResult<()> {
        let result = loop {
            tokio::select! {
                processed = self.process_next() => match processed {
                    Ok(true) => continue,
                    Ok(false) => break Ok(()),
                    Err(err) => break Err(err),
                },
                changed = shutdown.changed() => {
                    // a dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
            }
        };
        self.shutdown_release();
        result
    }

    /// Terminate and free every in-flight operation and drop all batch
    /// bookkeeping, including reports already queued but not yet processed.
    /// Used between controller phases and at shutdown — a stale prep-mode
    /// report must never refill the pipeline with a prep batch.
    pub fn shutdown_release(&mut self) {
        self.dispatcher.free_and_release_all();
        self.open_ops.clear();
        self.templates.clear();
        self.op_to_batch.clear();
        while self.completions.try_recv().is_some() {}
    }

    /// Feasibility probe, forwarded to the dispatcher.
    pub fn could_fit(&mut self, ops: &[siphon_core::DispatchableOperation]) -> bool {
        self.dispatcher.could_fit(ops)
    }

    /// Free-capacity upper bound, forwarded to the dispatcher.
    pub fn total_capacity(&self) -> f64 {
        self.dispatcher.total_capacity()
    }

    pub fn open_batches(&self) -> usize {
        self.open_ops.len()
    }

    pub fn in_flight_operations(&self) -> usize {
        self.op_to_batch.len()
    }

    pub fn is_tracking(&self, batch_id: BatchId) -> bool {
        self.open_ops.contains_key(&batch_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use siphon_core::{
        DispatchableOperation, EffectOracle, ExecHandle, NodeInfo, NodeInventory, OperationKind,
        ProcessLauncher, TargetState,
    };

    use super::*;

    /// Reports every launched operation finished immediately, in launch
    /// order — completions are queued on the channel synchronously.
    #[derive(Default)]
    struct EchoLauncher {
        terminated: Mutex<Vec<ExecHandle>>,
    }

    impl ProcessLauncher for EchoLauncher {
        fn launch(
            &self,
            _node_id: &str,
            op: &DispatchableOperation,
            completions: &CompletionSender,
        ) -> Option<ExecHandle> {
            completions.send_report(&OperationReport {
                operation_id: op.id,
                kind: op.kind,
                time_taken_ms: op.end_offset_ms - op.start_offset_ms,
                return_value: op.expected_return,
            });
            Some(ExecHandle(op.unit_count.into()))
        }

        fn terminate(&self, handle: ExecHandle) {
            self.terminated.lock().unwrap().push(handle);
        }
    }

    struct BigInventory;

    impl NodeInventory for BigInventory {
        fn list_nodes(&self) -> Vec<NodeInfo> {
            vec![NodeInfo {
                node_id: "node-0".to_string(),
                free_capacity: 10_000.0,
                has_access: true,
            }]
        }

        fn distribute_payload(&self, _node_id: &str) -> bool {
            true
        }
    }

    struct FlatOracle;

    impl EffectOracle for FlatOracle {
        fn operation_duration(&self, _: OperationKind, _: &str) -> f64 {
            100.0
        }
        fn extraction_units_for(&self, _: &str, _: f64) -> f64 {
            8.0
        }
        fn reinforcement_units_for(&self, _: &str, _: f64) -> f64 {
            6.0
        }
        fn resistance_delta(&self, units: u32) -> f64 {
            f64::from(units) * 0.05
        }
        fn counter_unit_effect(&self) -> f64 {
            0.1
        }
        fn target_state(&self, _: &str) -> TargetState {
            TargetState {
                max_value: 1000.0,
                current_value: 1000.0,
                min_resistance: 2.0,
                current_resistance: 2.0,
            }
        }
    }

    fn manager() -> (BatchManager, mpsc::UnboundedReceiver<BatchEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher =
            CapacityDispatcher::new(&BigInventory, Arc::new(EchoLauncher::default())).unwrap();
        (BatchManager::new(dispatcher, events_tx), events_rx)
    }

    fn template() -> Arc<BatchTemplate> {
        BatchTemplate::extraction(&FlatOracle, "vault", 0.9, 5.0)
            .unwrap()
            .into_shared()
    }

    #[tokio::test]
    async fn start_registers_batch_and_operations() {
        let (mut manager, _events) = manager();
        let template = template();

        let batch_id = manager.start(&template, 0.0).unwrap();

        assert!(manager.is_tracking(batch_id));
        assert_eq!(manager.open_batches(), 1);
        assert_eq!(manager.in_flight_operations(), 4);
    }

    #[tokio::test]
    async fn finishing_a_batch_starts_a_replacement_before_cleanup() {
        let (mut manager, mut events) = manager();
        let template = template();
        let first = manager.start(&template, 0.0).unwrap();

        // the echo launcher queued all four completions at start; process them
        for _ in 0..4 {
            assert!(manager.process_next().await.unwrap());
        }

        // the finished batch is gone...
        assert!(!manager.is_tracking(first));
        // ...but a replacement from the same template is already open, so
        // the template never has a moment without an active batch
        assert_eq!(manager.open_batches(), 1);
        assert_eq!(manager.in_flight_operations(), 4);

        assert_eq!(
            events.try_recv().unwrap(),
            BatchEvent::BatchFinished { batch_id: first }
        );
    }

    #[tokio::test]
    async fn interleaved_batches_resolve_by_operation_id() {
        let (mut manager, mut events) = manager();
        let template = template();
        let a = manager.start(&template, 0.0).unwrap();
        let b = manager.start(&template, 20.0).unwrap();

        assert_eq!(manager.open_batches(), 2);
        assert_eq!(manager.in_flight_operations(), 8);

        // completions arrive in launch order: batch a's four, then batch b's
        for _ in 0..8 {
            assert!(manager.process_next().await.unwrap());
        }

        assert_eq!(
            events.try_recv().unwrap(),
            BatchEvent::BatchFinished { batch_id: a }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            BatchEvent::BatchFinished { batch_id: b }
        );
        // both replacements in flight
        assert_eq!(manager.open_batches(), 2);
    }

    #[tokio::test]
    async fn orphan_report_is_fatal() {
        let (mut manager, _events) = manager();
        let sender = manager.completion_sender();

        sender.send_report(&OperationReport {
            operation_id: OperationId::fresh(),
            kind: OperationKind::Extraction,
            time_taken_ms: 1.0,
            return_value: 0.0,
        });

        let result = manager.process_next().await;
        assert!(matches!(result, Err(BatchError::OrphanOperation(_))));
    }

    #[tokio::test]
    async fn malformed_message_is_fatal() {
        let (mut manager, _events) = manager();
        let sender = manager.completion_sender();
        sender.send_raw("not json".to_string());

        let result = manager.process_next().await;
        assert!(matches!(result, Err(BatchError::Protocol(_))));
    }

    /// Launches that never report back.
    struct SilentLauncher;

    impl ProcessLauncher for SilentLauncher {
        fn launch(
            &self,
            _node_id: &str,
            _op: &DispatchableOperation,
            _completions: &CompletionSender,
        ) -> Option<ExecHandle> {
            Some(ExecHandle(1))
        }

        fn terminate(&self, _handle: ExecHandle) {}
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_and_releases_capacity() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let dispatcher =
            CapacityDispatcher::new(&BigInventory, Arc::new(SilentLauncher)).unwrap();
        let mut manager = BatchManager::new(dispatcher, events_tx);
        let template = template();
        manager.start(&template, 0.0).unwrap();
        let full = 10_000.0;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();
        manager.run(shutdown_rx).await.unwrap();

        assert_eq!(manager.in_flight_operations(), 0);
        assert!((manager.total_capacity() - full).abs() < 1e-6);
    }

    #[tokio::test]
    async fn run_stops_when_shutdown_sender_drops() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let dispatcher =
            CapacityDispatcher::new(&BigInventory, Arc::new(SilentLauncher)).unwrap();
        let mut manager = BatchManager::new(dispatcher, events_tx);
        manager.start(&template(), 0.0).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        tokio::time::timeout(std::time::Duration::from_secs(5), manager.run(shutdown_rx))
            .await
            .expect("dropped sender was not treated as shutdown")
            .unwrap();
        assert_eq!(manager.in_flight_operations(), 0);
    }

    #[tokio::test]
    async fn shutdown_release_clears_all_bookkeeping() {
        let (mut manager, _events) = manager();
        let template = template();
        manager.start(&template, 0.0).unwrap();
        let capacity = manager.total_capacity();

        manager.shutdown_release();

        assert_eq!(manager.open_batches(), 0);
        assert_eq!(manager.in_flight_operations(), 0);
        // queued echo reports were drained, not left for the next phase
        assert!(!manager.process_next_now());
        assert!(manager.total_capacity() > capacity);
    }

    impl BatchManager {
        /// Test helper: is a completion queued right now?
        fn process_next_now(&mut self) -> bool {
            self.completions.try_recv().is_some()
        }
    }
}
