//! Batch templates — immutable timing/unit-count blueprints.

use std::sync::Arc;

use tracing::debug;

use siphon_core::{
    BatchId, DispatchableOperation, EffectOracle, OperationId, OperationKind,
};

use crate::batch::Batch;
use crate::error::{PlanError, PlanResult};

/// One proto-operation within a template. Offsets are relative to the
/// batch; the minimum start across a template is always exactly zero.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationTemplate {
    pub kind: OperationKind,
    pub relative_start_ms: f64,
    pub relative_end_ms: f64,
    pub unit_count: u32,
    pub expected_return: f64,
}

impl OperationTemplate {
    pub fn duration_ms(&self) -> f64 {
        self.relative_end_ms - self.relative_start_ms
    }

    pub fn capacity_cost(&self) -> f64 {
        f64::from(self.unit_count) * self.kind.unit_cost()
    }
}

/// An immutable, reusable blueprint from which concrete batches are
/// stamped. Built once per (target, parameters); all derived quantities
/// are precomputed here.
#[derive(Debug, Clone)]
pub struct BatchTemplate {
    target: String,
    /// Sorted ascending by relative start.
    ops: Vec<OperationTemplate>,
    spacer_ms: f64,
    total_duration_ms: f64,
    unsafe_duration_ms: f64,
    peak_capacity_usage: f64,
    expected_value_delta: f64,
}

impl BatchTemplate {
    /// Build the 4-operation extraction template.
    ///
    /// Against a primed target the cycle looks like this (not to scale):
    ///
    /// ```text
    ///                 |= extraction ==============|                  (1)
    ///  |= counter-extraction =========================|              (2)
    ///            |= reinforcement =======================|           (3)
    ///     |= counter-reinforcement =========================|        (4)
    ///
    ///  0 ------------------- time ----------------|--|------->
    ///                                             |-> spacer_ms
    /// ```
    ///
    /// Completions are anchored at the extraction and chained one spacer
    /// apart, so the target is primed again when (4) lands.
    pub fn extraction(
        oracle: &dyn EffectOracle,
        target: &str,
        fraction: f64,
        spacer_ms: f64,
    ) -> PlanResult<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(PlanError::InvalidParameter(format!(
                "extraction fraction {fraction} must be in (0, 1]"
            )));
        }
        check_spacer(spacer_ms)?;

        let state = oracle.target_state(target);
        if state.max_value == 0.0 {
            return Err(PlanError::InvalidParameter(format!(
                "target {target} has zero maximum value, extraction is undefined"
            )));
        }

        let value_to_extract = state.max_value * fraction;

        // Extraction units are floored, everything else is ceiled: rounding
        // must never leave the target under-corrected at the end of a cycle.

        // (1)
        let extraction_units = oracle.extraction_units_for(target, fraction).floor() as u32;

        // (2) counter effects are linear in units, so units needed is just
        // the resistance the extraction adds over one counter unit's effect
        let extraction_resistance = oracle.resistance_delta(extraction_units);
        let counter_extraction_units =
            (extraction_resistance / oracle.counter_unit_effect()).ceil() as u32;

        // (3)
        let growth_factor = state.max_value / (state.max_value - value_to_extract);
        let reinforcement_units = oracle
            .reinforcement_units_for(target, growth_factor)
            .ceil() as u32;

        // (4)
        let reinforcement_resistance = oracle.resistance_delta(reinforcement_units);
        let counter_reinforcement_units =
            (reinforcement_resistance / oracle.counter_unit_effect()).ceil() as u32;

        let slots = [
            (
                OperationKind::Extraction,
                extraction_units,
                value_to_extract,
            ),
            (
                OperationKind::CounterExtraction,
                counter_extraction_units,
                extraction_resistance,
            ),
            (
                OperationKind::Reinforcement,
                reinforcement_units,
                growth_factor,
            ),
            (
                OperationKind::CounterReinforcement,
                counter_reinforcement_units,
                reinforcement_resistance,
            ),
        ];

        let template = Self::assemble(oracle, target, &slots, spacer_ms, value_to_extract);
        debug!(
            target_id = target,
            ops = template.ops.len(),
            total_ms = template.total_duration_ms,
            peak = template.peak_capacity_usage,
            "built extraction template"
        );
        Ok(template)
    }

    /// Build the 2-operation reinforcement template (prep mode): grow the
    /// target's value by `multiplier`, then counter the resistance the
    /// growth added.
    pub fn reinforcement(
        oracle: &dyn EffectOracle,
        target: &str,
        multiplier: f64,
        spacer_ms: f64,
    ) -> PlanResult<Self> {
        if multiplier <= 1.0 {
            return Err(PlanError::InvalidParameter(format!(
                "reinforcement multiplier {multiplier} must be > 1"
            )));
        }
        check_spacer(spacer_ms)?;

        let state = oracle.target_state(target);
        if state.max_value == 0.0 {
            return Err(PlanError::InvalidParameter(format!(
                "target {target} has zero maximum value"
            )));
        }

        let reinforcement_units = oracle
            .reinforcement_units_for(target, multiplier)
            .ceil() as u32;
        let reinforcement_resistance = oracle.resistance_delta(reinforcement_units);
        let counter_units =
            (reinforcement_resistance / oracle.counter_unit_effect()).ceil() as u32;

        let slots = [
            (OperationKind::Reinforcement, reinforcement_units, multiplier),
            (
                OperationKind::CounterReinforcement,
                counter_units,
                reinforcement_resistance,
            ),
        ];

        let template = Self::assemble(oracle, target, &slots, spacer_ms, 0.0);
        debug!(
            target_id = target,
            ops = template.ops.len(),
            total_ms = template.total_duration_ms,
            "built reinforcement template"
        );
        Ok(template)
    }

    /// Chain completion times one spacer apart in slot order, subtract each
    /// kind's duration for its start, normalize the earliest start to zero,
    /// and precompute the derived quantities.
    fn assemble(
        oracle: &dyn EffectOracle,
        target: &str,
        slots: &[(OperationKind, u32, f64)],
        spacer_ms: f64,
        expected_value_delta: f64,
    ) -> Self {
        let mut ops: Vec<OperationTemplate> = slots
            .iter()
            .enumerate()
            .map(|(i, &(kind, unit_count, expected_return))| {
                let relative_end_ms = i as f64 * spacer_ms;
                let relative_start_ms = relative_end_ms - oracle.operation_duration(kind, target);
                OperationTemplate {
                    kind,
                    relative_start_ms,
                    relative_end_ms,
                    unit_count,
                    expected_return,
                }
            })
            .collect();

        let earliest_start = ops
            .iter()
            .map(|op| op.relative_start_ms)
            .fold(f64::INFINITY, f64::min);
        for op in &mut ops {
            op.relative_start_ms -= earliest_start;
            op.relative_end_ms -= earliest_start;
        }
        ops.sort_by(|a, b| a.relative_start_ms.total_cmp(&b.relative_start_ms));

        let total_duration_ms = ops
            .iter()
            .map(|op| op.relative_end_ms)
            .fold(0.0, f64::max);
        let unsafe_duration_ms = ops.len() as f64 * spacer_ms;
        let peak_capacity_usage = ops.iter().map(OperationTemplate::capacity_cost).sum();

        Self {
            target: target.to_string(),
            ops,
            spacer_ms,
            total_duration_ms,
            unsafe_duration_ms,
            peak_capacity_usage,
            expected_value_delta,
        }
    }

    /// Stamp a concrete batch: fresh ids, absolute offsets = template
    /// offsets plus `extra_delay_ms`.
    pub fn instantiate(&self, extra_delay_ms: f64) -> Batch {
        Batch {
            id: BatchId::fresh(),
            target: self.target.clone(),
            ops: self
                .ops
                .iter()
                .map(|op| DispatchableOperation {
                    id: OperationId::fresh(),
                    kind: op.kind,
                    target: self.target.clone(),
                    unit_count: op.unit_count,
                    start_offset_ms: op.relative_start_ms + extra_delay_ms,
                    end_offset_ms: op.relative_end_ms + extra_delay_ms,
                    expected_return: op.expected_return,
                })
                .collect(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn ops(&self) -> &[OperationTemplate] {
        &self.ops
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    pub fn spacer_ms(&self) -> f64 {
        self.spacer_ms
    }

    /// Span from the earliest start to the latest completion.
    pub fn total_duration_ms(&self) -> f64 {
        self.total_duration_ms
    }

    /// Conservative lower bound on the gap between two batch launches that
    /// avoids operation collisions: one spacer per operation.
    pub fn unsafe_duration_ms(&self) -> f64 {
        self.unsafe_duration_ms
    }

    /// Batches that can be in flight at once without the newest batch's
    /// earliest operation starting before the oldest batch's slot frees up.
    pub fn max_concurrent_batches(&self) -> u32 {
        (self.total_duration_ms / self.unsafe_duration_ms).floor() as u32
    }

    /// Slot cost of one whole batch across the fleet.
    pub fn peak_capacity_usage(&self) -> f64 {
        self.peak_capacity_usage
    }

    /// Value extracted per cycle (zero for reinforcement templates).
    pub fn expected_value_delta(&self) -> f64 {
        self.expected_value_delta
    }

    /// Shared handle; the batch manager keeps one per open batch.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn check_spacer(spacer_ms: f64) -> PlanResult<()> {
    if spacer_ms > 0.0 {
        Ok(())
    } else {
        Err(PlanError::InvalidParameter(format!(
            "spacer {spacer_ms}ms must be positive"
        )))
    }
}
