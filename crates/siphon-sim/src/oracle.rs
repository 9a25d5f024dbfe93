//! Closed-form effect oracle over the simulated world.

use std::sync::Arc;

use siphon_core::{EffectOracle, OperationKind, TargetState};

use crate::world::{
    COUNTER_EFFECT_PER_UNIT, EXTRACT_FRACTION_PER_UNIT, GROWTH_PER_UNIT, RESISTANCE_PER_UNIT,
    SimWorld,
};

/// Duration multipliers relative to extraction.
const REINFORCEMENT_DURATION_FACTOR: f64 = 3.2;
const COUNTER_DURATION_FACTOR: f64 = 4.0;

/// Oracle whose formulas match exactly what [`SimWorld::apply`] does, so a
/// plan built from it leaves the simulated target primed after each cycle.
pub struct SimOracle {
    world: Arc<SimWorld>,
    base_duration_ms: f64,
}

impl SimOracle {
    pub fn new(world: Arc<SimWorld>, base_duration_ms: f64) -> Self {
        Self {
            world,
            base_duration_ms,
        }
    }
}

impl EffectOracle for SimOracle {
    /// Durations stretch as the target hardens: everything scales with the
    /// ratio of current to minimum resistance.
    fn operation_duration(&self, kind: OperationKind, _target: &str) -> f64 {
        let state = self.world.state();
        let hardening = if state.min_resistance > 0.0 {
            state.current_resistance / state.min_resistance
        } else {
            1.0
        };
        let factor = match kind {
            OperationKind::Extraction => 1.0,
            OperationKind::Reinforcement => REINFORCEMENT_DURATION_FACTOR,
            OperationKind::CounterExtraction | OperationKind::CounterReinforcement => {
                COUNTER_DURATION_FACTOR
            }
        };
        self.base_duration_ms * factor * hardening
    }

    fn extraction_units_for(&self, _target: &str, fraction: f64) -> f64 {
        fraction / EXTRACT_FRACTION_PER_UNIT
    }

    fn reinforcement_units_for(&self, _target: &str, multiplier: f64) -> f64 {
        multiplier.ln() / GROWTH_PER_UNIT.ln()
    }

    fn resistance_delta(&self, units: u32) -> f64 {
        f64::from(units) * RESISTANCE_PER_UNIT
    }

    fn counter_unit_effect(&self) -> f64 {
        COUNTER_EFFECT_PER_UNIT
    }

    fn target_state(&self, _target: &str) -> TargetState {
        self.world.state()
    }
}

#[cfg(test)]
mod tests {
    use siphon_core::config::SimTargetConfig;

    use super::*;

    fn oracle() -> SimOracle {
        let world = Arc::new(SimWorld::new(&SimTargetConfig {
            name: "vault".to_string(),
            max_value: 1000.0,
            min_resistance: 2.0,
            current_value: 1000.0,
            current_resistance: 4.0,
            base_duration_ms: 100.0,
        }));
        SimOracle::new(world, 100.0)
    }

    #[test]
    fn durations_scale_with_hardening() {
        let oracle = oracle();
        // resistance is at 2× minimum
        assert_eq!(
            oracle.operation_duration(OperationKind::Extraction, "vault"),
            200.0
        );
        assert_eq!(
            oracle.operation_duration(OperationKind::CounterExtraction, "vault"),
            800.0
        );
    }

    #[test]
    fn unit_formulas_invert_world_effects() {
        let oracle = oracle();
        // extracting 70% needs exactly 100 units
        assert!((oracle.extraction_units_for("vault", 0.7) - 100.0).abs() < 1e-9);
        // growing by 1.01^50 needs exactly 50 units
        let multiplier = GROWTH_PER_UNIT.powi(50);
        assert!((oracle.reinforcement_units_for("vault", multiplier) - 50.0).abs() < 1e-9);
    }
}
