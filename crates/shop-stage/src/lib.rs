//! shop-stage
//!
//! Work-order stage resolution.
//!
//! Architectural decisions:
//! - Canceled status or stage always resolves to Canceled
//! - Missing diagnostics resolve to Reception regardless of quotes
//! - An approval anywhere outranks a rejection elsewhere
//! - Automatic resolution never moves an order back from InRepair or later
//! - Missing quote references are reported, never guessed
//!
//! Deterministic, pure logic. No IO. No store calls.

mod drift;
mod engine;
mod types;

pub use drift::{check_stage_drift, is_stage_drifted, StageDrift};
pub use engine::resolve_stage;
pub use types::*;
