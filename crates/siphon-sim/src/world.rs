//! The simulated target resource.

use std::sync::Mutex;

use siphon_core::OperationKind;
use siphon_core::config::SimTargetConfig;
use siphon_core::oracle::TargetState;

/// Per-unit effect constants. One extraction unit removes 0.7% of the
/// maximum value; one reinforcement unit multiplies the value by 1.01;
/// extraction and reinforcement both add 0.002 resistance per unit and one
/// counter unit removes 0.05.
pub const EXTRACT_FRACTION_PER_UNIT: f64 = 0.007;
pub const GROWTH_PER_UNIT: f64 = 1.01;
pub const RESISTANCE_PER_UNIT: f64 = 0.002;
pub const COUNTER_EFFECT_PER_UNIT: f64 = 0.05;

/// Shared mutable state of one simulated target.
///
/// Workers apply their effects here at completion time; the oracle reads
/// the same state, so predictions and outcomes agree.
pub struct SimWorld {
    name: String,
    state: Mutex<TargetState>,
}

impl SimWorld {
    pub fn new(config: &SimTargetConfig) -> Self {
        Self {
            name: config.name.clone(),
            state: Mutex::new(TargetState {
                max_value: config.max_value,
                current_value: config.current_value,
                min_resistance: config.min_resistance,
                current_resistance: config.current_resistance,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TargetState {
        *self.state.lock().unwrap()
    }

    /// Apply one finished operation's effect and return its return value
    /// (value removed, growth factor applied, or resistance removed).
    pub fn apply(&self, kind: OperationKind, units: u32) -> f64 {
        let mut state = self.state.lock().unwrap();
        let units_f = f64::from(units);

        match kind {
            OperationKind::Extraction => {
                let removed = (units_f * EXTRACT_FRACTION_PER_UNIT * state.max_value)
                    .min(state.current_value);
                state.current_value -= removed;
                state.current_resistance += units_f * RESISTANCE_PER_UNIT;
                removed
            }
            OperationKind::Reinforcement => {
                let factor = GROWTH_PER_UNIT.powf(units_f);
                let grown = (state.current_value * factor).min(state.max_value);
                let applied = if state.current_value == 0.0 {
                    1.0
                } else {
                    grown / state.current_value
                };
                state.current_value = grown;
                state.current_resistance += units_f * RESISTANCE_PER_UNIT;
                applied
            }
            OperationKind::CounterExtraction | OperationKind::CounterReinforcement => {
                let before = state.current_resistance;
                state.current_resistance =
                    (before - units_f * COUNTER_EFFECT_PER_UNIT).max(state.min_resistance);
                before - state.current_resistance
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> SimWorld {
        SimWorld::new(&SimTargetConfig {
            name: "vault".to_string(),
            max_value: 1000.0,
            min_resistance: 2.0,
            current_value: 1000.0,
            current_resistance: 2.0,
            base_duration_ms: 100.0,
        })
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn extraction_removes_value_and_raises_resistance() {
        let world = world();
        let removed = world.apply(OperationKind::Extraction, 100);
        assert!(close(removed, 700.0));
        let state = world.state();
        assert!(close(state.current_value, 300.0));
        assert!(close(state.current_resistance, 2.2));
    }

    #[test]
    fn reinforcement_caps_at_max_value() {
        let world = world();
        world.apply(OperationKind::Extraction, 100);
        world.apply(OperationKind::Reinforcement, 1000);
        assert_eq!(world.state().current_value, 1000.0);
    }

    #[test]
    fn counter_floors_at_min_resistance() {
        let world = world();
        world.apply(OperationKind::Extraction, 10); // +0.02
        let removed = world.apply(OperationKind::CounterReinforcement, 50); // -2.5, floored
        assert!(close(removed, 0.02));
        assert!(close(world.state().current_resistance, 2.0));
    }
}
