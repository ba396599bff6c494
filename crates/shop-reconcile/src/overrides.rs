//! Manual stage override.
//!
//! The reconcile job never moves a work order back from repair. When a human
//! has to (rework, mistaken approval, reopened job), this is the path: any
//! target stage, mandatory reason, always audited.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shop_audit::AuditLog;
use shop_stage::{index_quotes, resolve_stage, Stage, StoredStage};
use tracing::{info, warn};
use uuid::Uuid;

use crate::WorkshopStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOverride {
    pub work_order_id: String,
    pub stage: Stage,
    pub reason: String,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideOutcome {
    pub work_order_id: String,
    pub from: StoredStage,
    pub to: Stage,
    /// What the resolver would pick right now. When this differs from `to`,
    /// the next apply-mode reconcile may move the work order again.
    pub resolver_stage: Stage,
    pub audit_entry_id: Uuid,
}

impl OverrideOutcome {
    pub fn conflicts_with_resolver(&self) -> bool {
        self.resolver_stage != self.to
    }
}

pub async fn apply_manual_override<S>(
    store: &S,
    audit: &mut AuditLog,
    req: &StageOverride,
) -> Result<OverrideOutcome>
where
    S: WorkshopStore + ?Sized,
{
    let reason = req.reason.trim();
    if reason.is_empty() {
        bail!(
            "OVERRIDE_REASON_REQUIRED: stage override for work order {} needs a reason",
            req.work_order_id
        );
    }

    let Some(wo) = store
        .get_work_order(&req.work_order_id)
        .await
        .context("load work order failed")?
    else {
        bail!("OVERRIDE_UNKNOWN_WORK_ORDER: {}", req.work_order_id);
    };

    let quotes = store
        .fetch_quotes(&wo.linked_quote_ids)
        .await
        .context("fetch quotes failed")?;
    let mut target = wo.clone();
    target.stage = StoredStage::Known(req.stage);
    let resolver_stage = resolve_stage(&target, &index_quotes(quotes)).stage;

    audit
        .ensure_writable()
        .with_context(|| format!("OVERRIDE_AUDIT_UNWRITABLE: {:?}", audit.path()))?;

    store
        .update_stage(&wo.id, req.stage)
        .await
        .with_context(|| format!("persist override for {}", wo.id))?;

    let entry = audit
        .append(
            Uuid::new_v4(),
            "stage",
            "STAGE_OVERRIDE",
            json!({
                "work_order_id": wo.id,
                "from": wo.stage,
                "to": req.stage,
                "resolver_stage": resolver_stage,
                "reason": reason,
                "actor": req.actor,
            }),
        )
        .context("audit append failed")?;

    let outcome = OverrideOutcome {
        work_order_id: wo.id.clone(),
        from: wo.stage.clone(),
        to: req.stage,
        resolver_stage,
        audit_entry_id: entry.entry_id,
    };

    if outcome.conflicts_with_resolver() {
        warn!(
            work_order_id = %outcome.work_order_id,
            to = %outcome.to,
            resolver_stage = %outcome.resolver_stage,
            "override disagrees with resolver; an apply-mode reconcile may move it"
        );
    }
    info!(
        work_order_id = %outcome.work_order_id,
        from = %outcome.from,
        to = %outcome.to,
        actor = %req.actor,
        "manual stage override applied"
    );

    Ok(outcome)
}
