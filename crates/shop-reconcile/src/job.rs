//! Batch stage reconciliation.
//!
//! Flow per pass:
//! 1. list work orders through the store (filtered)
//! 2. batch-fetch every referenced quote once
//! 3. resolve each work order (pure; order between work orders is irrelevant)
//! 4. in apply mode, persist drifted stages with bounded concurrency; each
//!    change is audited and notified as soon as its own update lands
//!
//! Apply mode needs a writable audit log before the first update. One failed
//! update or audit append never aborts the pass. Listing or fetching failures
//! do, since nothing can be resolved without them.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shop_audit::AuditLog;
use shop_config::{ReconcileSettings, UnresolvedPolicy};
use shop_stage::{
    check_stage_drift, index_quotes, ResolutionRule, Stage, StageDrift, StageNote, StoredStage,
};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{StageNotifier, WorkOrderFilter, WorkshopStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Apply,
}

/// A stage correction, proposed (dry run) or persisted (apply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub work_order_id: String,
    pub from: StoredStage,
    pub to: Stage,
    pub rule: ResolutionRule,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFailure {
    pub work_order_id: String,
    pub to: Stage,
    pub error: String,
}

/// Resolver diagnostic tagged with the work order it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderNote {
    pub work_order_id: String,
    pub note: StageNote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub job_id: Uuid,
    pub mode: RunMode,
    pub started_at_utc: DateTime<Utc>,
    pub config_hash: Option<String>,
    pub examined: usize,
    pub in_sync: usize,
    /// Sorted by work order id.
    pub changes: Vec<StageChange>,
    pub failures: Vec<UpdateFailure>,
    /// Persisted changes whose audit entry could not be written.
    pub unaudited: Vec<UpdateFailure>,
    /// Work orders left untouched under the `skip` unresolved policy.
    pub skipped: Vec<String>,
    pub notes: Vec<WorkOrderNote>,
}

impl ReconcileSummary {
    pub fn applied_count(&self) -> usize {
        self.changes.iter().filter(|c| c.applied).count()
    }

    /// No drift found and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty() && self.failures.is_empty() && self.unaudited.is_empty()
    }
}

/// One configured reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileJob {
    settings: ReconcileSettings,
    config_hash: Option<String>,
    ids: Option<Vec<String>>,
}

impl ReconcileJob {
    pub fn new(settings: ReconcileSettings) -> Self {
        Self {
            settings,
            config_hash: None,
            ids: None,
        }
    }

    /// Record which config produced this job (copied into the summary and audit).
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Restrict the pass to specific work orders.
    pub fn only(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn mode(&self) -> RunMode {
        if self.settings.apply {
            RunMode::Apply
        } else {
            RunMode::DryRun
        }
    }

    /// Apply mode fails with `RECONCILE_AUDIT_REQUIRED` when `audit` is
    /// `None`; a dry run ignores it.
    pub async fn run<S, N>(
        &self,
        store: &S,
        notifier: &N,
        audit: Option<&mut AuditLog>,
    ) -> Result<ReconcileSummary>
    where
        S: WorkshopStore + ?Sized,
        N: StageNotifier + ?Sized,
    {
        let job_id = Uuid::new_v4();
        let mode = self.mode();
        let started_at_utc = Utc::now();
        info!(%job_id, ?mode, "stage reconcile started");

        let filter = WorkOrderFilter {
            include_canceled: self.settings.include_canceled,
            ids: self.ids.clone(),
        };
        let mut orders = store
            .list_work_orders(&filter)
            .await
            .context("list work orders failed")?;
        orders.sort_by(|a, b| a.id.cmp(&b.id));

        let quote_ids: Vec<String> = orders
            .iter()
            .flat_map(|wo| wo.linked_quote_ids.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let quotes_by_id = if quote_ids.is_empty() {
            Default::default()
        } else {
            index_quotes(
                store
                    .fetch_quotes(&quote_ids)
                    .await
                    .context("fetch quotes failed")?,
            )
        };

        let mut summary = ReconcileSummary {
            job_id,
            mode,
            started_at_utc,
            config_hash: self.config_hash.clone(),
            examined: orders.len(),
            in_sync: 0,
            changes: Vec::new(),
            failures: Vec::new(),
            unaudited: Vec::new(),
            skipped: Vec::new(),
            notes: Vec::new(),
        };

        let mut proposed: Vec<StageChange> = Vec::new();
        for wo in &orders {
            let drift = check_stage_drift(wo, &quotes_by_id);
            let resolution = drift.resolution();

            for note in &resolution.notes {
                warn!(work_order_id = %wo.id, %note, "stage resolution note");
                summary.notes.push(WorkOrderNote {
                    work_order_id: wo.id.clone(),
                    note: note.clone(),
                });
            }

            let unresolved = !resolution.unresolved_quote_ids().is_empty();
            if unresolved && self.settings.unresolved_policy == UnresolvedPolicy::Skip {
                debug!(work_order_id = %wo.id, "skipped: unresolved quote references");
                summary.skipped.push(wo.id.clone());
                continue;
            }

            match drift {
                StageDrift::InSync { .. } => summary.in_sync += 1,
                StageDrift::Correct {
                    from,
                    to,
                    resolution,
                } => {
                    debug!(work_order_id = %wo.id, %from, %to, "stage drift");
                    proposed.push(StageChange {
                        work_order_id: wo.id.clone(),
                        from,
                        to,
                        rule: resolution.rule,
                        applied: false,
                    });
                }
            }
        }

        if mode == RunMode::DryRun {
            summary.changes = proposed;
            info!(
                %job_id,
                examined = summary.examined,
                proposed = summary.changes.len(),
                "stage reconcile dry run finished"
            );
            return Ok(summary);
        }

        let Some(audit) = audit else {
            bail!("RECONCILE_AUDIT_REQUIRED: apply mode persists stage changes and needs an audit log");
        };
        audit
            .ensure_writable()
            .with_context(|| format!("RECONCILE_AUDIT_UNWRITABLE: {:?}", audit.path()))?;

        let mut updates = stream::iter(proposed)
            .map(|change| async move {
                let res = store.update_stage(&change.work_order_id, change.to).await;
                (change, res)
            })
            .buffer_unordered(self.settings.max_in_flight.max(1));

        while let Some((mut change, res)) = updates.next().await {
            if let Err(err) = res {
                let error = format!("{err:#}");
                warn!(work_order_id = %change.work_order_id, %error, "stage update failed");
                summary.failures.push(UpdateFailure {
                    work_order_id: change.work_order_id,
                    to: change.to,
                    error,
                });
                continue;
            }
            change.applied = true;

            let appended = audit.append(
                job_id,
                "stage",
                "STAGE_CORRECTED",
                json!({
                    "work_order_id": change.work_order_id,
                    "from": change.from,
                    "to": change.to,
                    "rule": change.rule,
                    "config_hash": self.config_hash,
                }),
            );
            if let Err(err) = appended {
                let error = format!("{err:#}");
                error!(work_order_id = %change.work_order_id, %error, "stage persisted but not audited");
                summary.unaudited.push(UpdateFailure {
                    work_order_id: change.work_order_id.clone(),
                    to: change.to,
                    error,
                });
            }

            if let Err(err) = notifier.stage_changed(&change).await {
                warn!(
                    work_order_id = %change.work_order_id,
                    error = %format!("{err:#}"),
                    "stage notifier failed"
                );
            }

            summary.changes.push(change);
        }
        summary
            .changes
            .sort_by(|a, b| a.work_order_id.cmp(&b.work_order_id));
        summary
            .failures
            .sort_by(|a, b| a.work_order_id.cmp(&b.work_order_id));
        summary
            .unaudited
            .sort_by(|a, b| a.work_order_id.cmp(&b.work_order_id));

        info!(
            %job_id,
            examined = summary.examined,
            applied = summary.applied_count(),
            failed = summary.failures.len(),
            unaudited = summary.unaudited.len(),
            "stage reconcile finished"
        );
        Ok(summary)
    }
}
