//! siphon.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiphonConfig {
    pub pipeline: PipelineConfig,
    pub sim: SimConfig,
}

/// Knobs for the batch pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fraction of the target's maximum value extracted per cycle, in (0, 1].
    #[serde(default = "default_fraction")]
    pub extraction_fraction: f64,
    /// Gap between consecutive operation completions within a batch.
    #[serde(default = "default_spacer_ms")]
    pub spacer_ms: f64,
    /// Growth multiplier used by prep-mode reinforcement batches.
    #[serde(default = "default_prep_multiplier")]
    pub prep_multiplier: f64,
    /// Hard cap on concurrent in-flight batches; the controller may pick
    /// fewer if timing or capacity limits bind first.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

/// Simulated-fleet description for local mode and integration tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Divide all simulated durations by this factor (1.0 = real time).
    #[serde(default = "default_time_compression")]
    pub time_compression: f64,
    pub target: SimTargetConfig,
    #[serde(default)]
    pub nodes: Vec<SimNodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTargetConfig {
    pub name: String,
    pub max_value: f64,
    pub min_resistance: f64,
    pub current_value: f64,
    pub current_resistance: f64,
    /// Baseline duration of one extraction at minimum resistance, in ms.
    pub base_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimNodeConfig {
    pub id: String,
    pub capacity: f64,
    #[serde(default = "default_true")]
    pub has_access: bool,
}

fn default_fraction() -> f64 {
    0.9
}

fn default_spacer_ms() -> f64 {
    5.0
}

fn default_prep_multiplier() -> f64 {
    1.5
}

fn default_max_depth() -> u32 {
    16
}

fn default_time_compression() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl SiphonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SiphonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A small runnable default: one target, three mixed-size nodes,
    /// heavily time-compressed.
    pub fn example() -> Self {
        SiphonConfig {
            pipeline: PipelineConfig {
                extraction_fraction: 0.9,
                spacer_ms: 5.0,
                prep_multiplier: 1.5,
                max_depth: 16,
            },
            sim: SimConfig {
                time_compression: 50.0,
                target: SimTargetConfig {
                    name: "vault-a".to_string(),
                    max_value: 1_000_000.0,
                    min_resistance: 5.0,
                    current_value: 400_000.0,
                    current_resistance: 5.04,
                    base_duration_ms: 4000.0,
                },
                nodes: vec![
                    SimNodeConfig {
                        id: "node-01".to_string(),
                        capacity: 512.0,
                        has_access: true,
                    },
                    SimNodeConfig {
                        id: "node-02".to_string(),
                        capacity: 256.0,
                        has_access: true,
                    },
                    SimNodeConfig {
                        id: "node-03".to_string(),
                        capacity: 1024.0,
                        has_access: true,
                    },
                ],
            },
        }
    }
}
