//! The effect oracle — pure queries the planner builds schedules from.

use crate::op::OperationKind;

/// Live snapshot of the target resource.
///
/// Queried fresh for every planning call and every status check; never
/// cached across calls — the remote side is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetState {
    pub max_value: f64,
    pub current_value: f64,
    pub min_resistance: f64,
    pub current_resistance: f64,
}

impl TargetState {
    /// A target is primed when it sits at max value and min resistance —
    /// the precondition every extraction template is computed against.
    pub fn is_primed(&self) -> bool {
        self.current_value >= self.max_value && self.current_resistance <= self.min_resistance
    }

    /// Fraction of the maximum value currently present (0 when max is 0).
    pub fn value_fraction(&self) -> f64 {
        if self.max_value == 0.0 {
            0.0
        } else {
            self.current_value / self.max_value
        }
    }
}

/// Maps target state and operation parameters to durations, unit
/// requirements, and resource deltas.
///
/// The oracle is queried, never re-derived: all numeric "effect" formulas
/// live behind this trait.
pub trait EffectOracle {
    /// How long one operation of `kind` takes against `target`, in ms.
    fn operation_duration(&self, kind: OperationKind, target: &str) -> f64;

    /// Units needed to extract `fraction` of the target's maximum value.
    /// May be fractional; the planner floors it.
    fn extraction_units_for(&self, target: &str, fraction: f64) -> f64;

    /// Units needed to multiply the target's value by `multiplier`.
    /// May be fractional; the planner ceils it.
    fn reinforcement_units_for(&self, target: &str, multiplier: f64) -> f64;

    /// Resistance added as a side effect of running `units` units of an
    /// extraction or reinforcement operation.
    fn resistance_delta(&self, units: u32) -> f64;

    /// Resistance removed per unit of a counter operation.
    fn counter_unit_effect(&self) -> f64;

    /// Live state of the target.
    fn target_state(&self, target: &str) -> TargetState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primed_requires_both_levels() {
        let primed = TargetState {
            max_value: 100.0,
            current_value: 100.0,
            min_resistance: 5.0,
            current_resistance: 5.0,
        };
        assert!(primed.is_primed());

        let drained = TargetState {
            current_value: 40.0,
            ..primed
        };
        assert!(!drained.is_primed());

        let hardened = TargetState {
            current_resistance: 9.0,
            ..primed
        };
        assert!(!hardened.is_primed());
    }

    #[test]
    fn value_fraction_handles_zero_max() {
        let dead = TargetState {
            max_value: 0.0,
            current_value: 0.0,
            min_resistance: 1.0,
            current_resistance: 1.0,
        };
        assert_eq!(dead.value_fraction(), 0.0);
    }
}
