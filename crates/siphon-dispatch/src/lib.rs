//! siphon-dispatch — admission-controlled capacity dispatch.
//!
//! Owns one [`CapacityBlock`] per execution node and performs best-fit
//! bin-packing of operations onto them: every launch reserves slots on
//! exactly one block, every completion releases them exactly once, and a
//! non-committing [`CapacityDispatcher::could_fit`] probe lets callers
//! check a whole candidate set before committing anything.
//!
//! All worker launches in a run go through this crate; nothing else may
//! call the process launcher.

pub mod dispatcher;
pub mod error;

pub use dispatcher::{CapacityBlock, CapacityDispatcher, DispatchedOperation};
pub use error::{DispatchError, DispatchResult};
