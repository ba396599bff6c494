//! One failing store write or audit append must not abort the rest of the
//! batch, and neither may go unreported.

use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use shop_audit::{read_entries, AuditLog};
use shop_config::ReconcileSettings;
use shop_reconcile::*;
use shop_stage::{Quote, QuoteStatus, Stage, StoredStage, WorkOrder};

/// Delegates to an in-memory store but refuses writes for one id.
struct FlakyStore {
    inner: InMemoryStore,
    poisoned: String,
}

#[async_trait]
impl WorkshopStore for FlakyStore {
    async fn list_work_orders(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>> {
        self.inner.list_work_orders(filter).await
    }

    async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrder>> {
        self.inner.get_work_order(id).await
    }

    async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<Quote>> {
        self.inner.fetch_quotes(ids).await
    }

    async fn update_stage(&self, id: &str, stage: Stage) -> Result<()> {
        if id == self.poisoned {
            bail!("backend rejected update (503)");
        }
        self.inner.update_stage(id, stage).await
    }
}

/// Delegates to an in-memory store; every successful write replaces the
/// audit file with a directory, so the following append fails.
struct AuditBreakingStore {
    inner: InMemoryStore,
    audit_path: PathBuf,
}

#[async_trait]
impl WorkshopStore for AuditBreakingStore {
    async fn list_work_orders(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>> {
        self.inner.list_work_orders(filter).await
    }

    async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrder>> {
        self.inner.get_work_order(id).await
    }

    async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<Quote>> {
        self.inner.fetch_quotes(ids).await
    }

    async fn update_stage(&self, id: &str, stage: Stage) -> Result<()> {
        self.inner.update_stage(id, stage).await?;
        if self.audit_path.is_file() {
            std::fs::remove_file(&self.audit_path)?;
            std::fs::create_dir(&self.audit_path)?;
        }
        Ok(())
    }
}

fn sent_quotes_shop() -> InMemoryStore {
    InMemoryStore::new(ShopSnapshot {
        work_orders: (1..=6)
            .map(|i| {
                WorkOrder::new(format!("wo-{i}"), Stage::PendingQuote)
                    .with_diagnostic("notes", "ok")
                    .with_quotes([format!("q-{i}")])
            })
            .collect(),
        quotes: (1..=6)
            .map(|i| Quote::new(format!("q-{i}"), QuoteStatus::Sent))
            .collect(),
    })
}

#[tokio::test]
async fn failed_update_is_reported_and_others_persist() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let mut audit = AuditLog::open(&audit_path, true).unwrap();
    let inner = sent_quotes_shop();
    let store = FlakyStore {
        inner,
        poisoned: "wo-3".to_string(),
    };

    let settings = ReconcileSettings {
        apply: true,
        max_in_flight: 2,
        ..ReconcileSettings::default()
    };
    let summary = ReconcileJob::new(settings)
        .run(&store, &NullNotifier, Some(&mut audit))
        .await
        .unwrap();

    assert_eq!(summary.applied_count(), 5);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].work_order_id, "wo-3");
    assert!(summary.failures[0].error.contains("503"));
    assert!(!summary.is_clean());

    for i in [1, 2, 4, 5, 6] {
        let wo = store.get_work_order(&format!("wo-{i}")).await.unwrap().unwrap();
        assert_eq!(wo.stage, StoredStage::Known(Stage::AwaitingApproval));
    }
    let wo3 = store.get_work_order("wo-3").await.unwrap().unwrap();
    assert_eq!(wo3.stage, StoredStage::Known(Stage::PendingQuote));

    let audited: Vec<String> = read_entries(&audit_path)
        .unwrap()
        .iter()
        .map(|e| e.payload["work_order_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(audited.len(), 5);
    assert!(!audited.contains(&"wo-3".to_string()));
}

#[tokio::test]
async fn failed_audit_append_is_reported_per_order() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let mut audit = AuditLog::open(&audit_path, true).unwrap();
    let store = AuditBreakingStore {
        inner: sent_quotes_shop(),
        audit_path: audit_path.clone(),
    };

    let settings = ReconcileSettings {
        apply: true,
        max_in_flight: 1,
        ..ReconcileSettings::default()
    };
    let summary = ReconcileJob::new(settings)
        .run(&store, &NullNotifier, Some(&mut audit))
        .await
        .unwrap();

    // persisted, so still reported as applied, but flagged as unaudited
    assert_eq!(summary.applied_count(), 6);
    assert!(summary.failures.is_empty());
    let unaudited: Vec<&str> = summary
        .unaudited
        .iter()
        .map(|u| u.work_order_id.as_str())
        .collect();
    assert_eq!(unaudited, vec!["wo-1", "wo-2", "wo-3", "wo-4", "wo-5", "wo-6"]);
    assert!(!summary.is_clean());
}
