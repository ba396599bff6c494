//! shop-reconcile
//!
//! Drives the stage resolver against a store.
//!
//! - [`ReconcileJob`] corrects drifted stages in batch (dry run by default)
//! - [`apply_manual_override`] is the only path that may move a stage backwards
//!
//! Store and notifier are injected; nothing here holds a global client.

mod job;
mod notify;
mod overrides;
mod store;

pub use job::{
    ReconcileJob, ReconcileSummary, RunMode, StageChange, UpdateFailure, WorkOrderNote,
};
pub use notify::{LogNotifier, NullNotifier, StageNotifier};
pub use overrides::{apply_manual_override, OverrideOutcome, StageOverride};
pub use store::{InMemoryStore, ShopSnapshot, WorkOrderFilter, WorkshopStore};
