//! siphon-core — shared types used across siphon crates.
//!
//! This crate defines the vocabulary of the batch engine:
//!
//! - **`op`** — operation kinds, slot costs, ids, dispatchable operations
//! - **`oracle`** — the effect oracle trait and live target state
//! - **`fleet`** — node inventory and process launcher traits
//! - **`protocol`** — the completion channel and its tagged wire messages
//! - **`config`** — siphon.toml run configuration
//!
//! Everything here is policy-free: the planning, packing, and pipelining
//! logic lives in `siphon-plan`, `siphon-dispatch`, and `siphon-batch`.

pub mod config;
pub mod fleet;
pub mod op;
pub mod oracle;
pub mod protocol;

pub use config::SiphonConfig;
pub use fleet::{ExecHandle, NodeInfo, NodeInventory, ProcessLauncher};
pub use op::{BatchId, DispatchableOperation, OperationId, OperationKind};
pub use oracle::{EffectOracle, TargetState};
pub use protocol::{
    BatchEvent, CompletionReceiver, CompletionSender, Message, OperationReport, ProtocolError,
    completion_channel,
};
