//! Stored-vs-resolved stage comparison.
//!
//! The resolver answers "where should this work order be". This module answers
//! "does storage agree". It never writes anything; the reconciliation workflow
//! decides whether to persist a correction.

use crate::{resolve_stage, QuotesById, Stage, StageResolution, StoredStage, WorkOrder};

/// Verdict of comparing a work order's stored stage with its resolved stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDrift {
    /// Stored stage already equals the resolved stage.
    InSync { resolution: StageResolution },
    /// Stored stage differs. `from` is the stored value as found, which may
    /// be an unrecognized string.
    Correct {
        from: StoredStage,
        to: Stage,
        resolution: StageResolution,
    },
}

impl StageDrift {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, StageDrift::InSync { .. })
    }

    pub fn requires_correction(&self) -> bool {
        !self.is_in_sync()
    }

    pub fn resolution(&self) -> &StageResolution {
        match self {
            StageDrift::InSync { resolution } => resolution,
            StageDrift::Correct { resolution, .. } => resolution,
        }
    }
}

/// Resolve and compare in one step.
pub fn check_stage_drift(order: &WorkOrder, quotes_by_id: &QuotesById) -> StageDrift {
    let resolution = resolve_stage(order, quotes_by_id);
    if order.stage.known() == Some(resolution.stage) {
        StageDrift::InSync { resolution }
    } else {
        StageDrift::Correct {
            from: order.stage.clone(),
            to: resolution.stage,
            resolution,
        }
    }
}

/// `true` when storage disagrees with the resolver.
pub fn is_stage_drifted(order: &WorkOrder, quotes_by_id: &QuotesById) -> bool {
    check_stage_drift(order, quotes_by_id).requires_correction()
}
