//! siphon-sim — a simulated fleet for local mode and integration tests.
//!
//! Implements the three collaborator traits against a shared in-memory
//! target, with closed-form effect formulas so planner rounding and the
//! full launch→sleep→report cycle are exercised end to end. Simulated
//! workers are tokio tasks; durations can be time-compressed.

pub mod fleet;
pub mod oracle;
pub mod world;

pub use fleet::{SimInventory, SimLauncher};
pub use oracle::SimOracle;
pub use world::SimWorld;
