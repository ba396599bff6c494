use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::StageChange;

/// Called once per persisted stage change.
///
/// Notification failures are logged by the job and never undo the change.
#[async_trait]
pub trait StageNotifier: Send + Sync {
    async fn stage_changed(&self, change: &StageChange) -> Result<()>;
}

/// Emits one structured `info` event per change.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl StageNotifier for LogNotifier {
    async fn stage_changed(&self, change: &StageChange) -> Result<()> {
        info!(
            work_order_id = %change.work_order_id,
            from = %change.from,
            to = %change.to,
            rule = ?change.rule,
            "work order stage corrected"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl StageNotifier for NullNotifier {
    async fn stage_changed(&self, _change: &StageChange) -> Result<()> {
        Ok(())
    }
}
