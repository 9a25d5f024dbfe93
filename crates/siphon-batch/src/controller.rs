//! The controller: prep mode, steady state, pipeline depth.
//!
//! Thin by design — the hard work lives in the planner, dispatcher, and
//! manager. The controller decides which template to run, how many batches
//! to keep in flight, and reports per-cycle status.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use siphon_core::{BatchEvent, DispatchableOperation, EffectOracle};
use siphon_core::config::PipelineConfig;
use siphon_plan::BatchTemplate;

use crate::error::ControlResult;
use crate::manager::BatchManager;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub extraction_fraction: f64,
    pub spacer_ms: f64,
    pub prep_multiplier: f64,
    pub max_depth: u32,
}

impl From<&PipelineConfig> for ControllerSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            extraction_fraction: config.extraction_fraction,
            spacer_ms: config.spacer_ms,
            prep_multiplier: config.prep_multiplier,
            max_depth: config.max_depth,
        }
    }
}

/// Drives one target: prep it if needed, then extract from it forever.
pub struct Controller {
    oracle: Arc<dyn EffectOracle + Send + Sync>,
    manager: BatchManager,
    events: mpsc::UnboundedReceiver<BatchEvent>,
    target: String,
    settings: ControllerSettings,
}

impl Controller {
    pub fn new(
        oracle: Arc<dyn EffectOracle + Send + Sync>,
        manager: BatchManager,
        events: mpsc::UnboundedReceiver<BatchEvent>,
        target: String,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            oracle,
            manager,
            events,
            target,
            settings,
        }
    }

    /// Run until shutdown: prep the target if it is not primed, then keep
    /// the extraction pipeline saturated. All in-flight work is released
    /// on the way out.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ControlResult<()> {
        if !self.oracle.target_state(&self.target).is_primed() {
            info!(target_id = %self.target, "target is not primed, starting prep");
            self.prep(&mut shutdown).await?;
        }

        if !*shutdown.borrow() {
            self.steady_state(&mut shutdown).await?;
        }

        self.manager.shutdown_release();
        info!(target_id = %self.target, "controller stopped");
        Ok(())
    }

    /// Prep mode: pipeline reinforcement batches until the target sits at
    /// max value and min resistance, then release whatever is still in
    /// flight — leftover prep work is useless once the target is primed.
    async fn prep(&mut self, shutdown: &mut watch::Receiver<bool>) -> ControlResult<()> {
        let template = BatchTemplate::reinforcement(
            self.oracle.as_ref(),
            &self.target,
            self.settings.prep_multiplier,
            self.settings.spacer_ms,
        )?
        .into_shared();

        let depth = self.choose_depth(&template);
        info!(target_id = %self.target, depth, "prep pipeline starting");
        for i in 0..depth {
            self.manager
                .start(&template, f64::from(i) * template.unsafe_duration_ms())?;
        }

        loop {
            tokio::select! {
                processed = self.manager.process_next() => {
                    if !processed? {
                        return Ok(());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }

            while let Ok(BatchEvent::BatchFinished { batch_id }) = self.events.try_recv() {
                let state = self.oracle.target_state(&self.target);
                debug!(
                    batch = %batch_id,
                    value_pct = format!("{:.1}", state.value_fraction() * 100.0),
                    resistance = state.current_resistance,
                    "prep cycle finished"
                );
                if state.is_primed() {
                    info!(target_id = %self.target, "target primed, leaving prep mode");
                    self.manager.shutdown_release();
                    return Ok(());
                }
            }
        }
    }

    /// Steady state: pipeline extraction batches at the chosen depth and
    /// log target status after every finished cycle.
    async fn steady_state(&mut self, shutdown: &mut watch::Receiver<bool>) -> ControlResult<()> {
        let template = BatchTemplate::extraction(
            self.oracle.as_ref(),
            &self.target,
            self.settings.extraction_fraction,
            self.settings.spacer_ms,
        )?
        .into_shared();

        let depth = self.choose_depth(&template);
        info!(
            target_id = %self.target,
            depth,
            expected_per_cycle = template.expected_value_delta(),
            "extraction pipeline starting"
        );
        for i in 0..depth {
            self.manager
                .start(&template, f64::from(i) * template.unsafe_duration_ms())?;
        }

        loop {
            tokio::select! {
                processed = self.manager.process_next() => {
                    if !processed? {
                        return Ok(());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }

            while let Ok(BatchEvent::BatchFinished { batch_id }) = self.events.try_recv() {
                let state = self.oracle.target_state(&self.target);
                info!(
                    batch = %batch_id,
                    value_pct = format!("{:.1}", state.value_fraction() * 100.0),
                    resistance_headroom =
                        format!("{:.2}", state.current_resistance - state.min_resistance),
                    "extraction cycle finished"
                );
            }
        }
    }

    /// Pick how many batches to keep in flight: the template's timing bound
    /// caps it, the configured limit caps it, and within those we grow one
    /// batch at a time while the fleet still fits the whole candidate set
    /// (cheap total-capacity bound first, full probe second).
    ///
    /// The manager dispatches a replacement batch while the finishing
    /// operation still holds its slots, so the probe always includes one
    /// extra operation's worth of headroom beyond the full depth.
    fn choose_depth(&mut self, template: &Arc<BatchTemplate>) -> u32 {
        let cap = template
            .max_concurrent_batches()
            .max(1)
            .min(self.settings.max_depth.max(1));

        let headroom_op = template
            .instantiate(0.0)
            .ops
            .into_iter()
            .max_by(|a, b| a.capacity_cost().total_cmp(&b.capacity_cost()));
        let headroom = headroom_op
            .as_ref()
            .map_or(0.0, DispatchableOperation::capacity_cost);

        let mut candidate: Vec<DispatchableOperation> = headroom_op.into_iter().collect();
        let mut depth = 0;
        for i in 0..cap {
            candidate.extend(template.instantiate(0.0).ops);
            let needed = template.peak_capacity_usage() * f64::from(i + 1) + headroom;
            if needed > self.manager.total_capacity() || !self.manager.could_fit(&candidate) {
                break;
            }
            depth = i + 1;
        }
        depth.max(1)
    }
}
