//! Data-access seam for the reconciliation job.
//!
//! The job never talks to the hosted backend directly; callers inject a
//! [`WorkshopStore`]. [`InMemoryStore`] backs the CLI (snapshot files) and tests.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shop_stage::{Quote, Stage, StoredStage, WorkOrder};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tokio::sync::RwLock;

/// Which work orders a reconcile pass examines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOrderFilter {
    /// Include work orders already at the canceled stage. Those always
    /// resolve to canceled, so leaving them out never hides drift. Orders
    /// with a canceled status but another stage are always examined.
    pub include_canceled: bool,
    /// Restrict to these ids. `None` means all.
    pub ids: Option<Vec<String>>,
}

impl WorkOrderFilter {
    pub fn matches(&self, wo: &WorkOrder) -> bool {
        if !self.include_canceled && wo.stage.is_canceled() {
            return false;
        }
        match &self.ids {
            Some(ids) => ids.iter().any(|id| *id == wo.id),
            None => true,
        }
    }
}

/// CRUD subset the stage workflows need.
#[async_trait]
pub trait WorkshopStore: Send + Sync {
    async fn list_work_orders(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>>;

    async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrder>>;

    /// Batch fetch. Ids with no stored quote are simply absent from the result.
    async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<Quote>>;

    /// Persist a new stage. Errors if the work order does not exist.
    async fn update_stage(&self, id: &str, stage: Stage) -> Result<()>;
}

/// Serialized shape of a store export: `{"work_orders": [...], "quotes": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopSnapshot {
    #[serde(default)]
    pub work_orders: Vec<WorkOrder>,
    #[serde(default)]
    pub quotes: Vec<Quote>,
}

impl ShopSnapshot {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).with_context(|| format!("read snapshot: {path:?}"))?;
        let snap: ShopSnapshot = serde_json::from_str(&s).context("parse snapshot json")?;
        Ok(snap)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let s = serde_json::to_string_pretty(self).context("serialize snapshot")?;
        fs::write(path, s).with_context(|| format!("write snapshot: {path:?}"))?;
        Ok(())
    }
}

#[derive(Default)]
struct Tables {
    work_orders: BTreeMap<String, WorkOrder>,
    quotes: BTreeMap<String, Quote>,
}

/// [`WorkshopStore`] over in-process tables.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new(snapshot: ShopSnapshot) -> Self {
        let tables = Tables {
            work_orders: snapshot
                .work_orders
                .into_iter()
                .map(|wo| (wo.id.clone(), wo))
                .collect(),
            quotes: snapshot
                .quotes
                .into_iter()
                .map(|q| (q.id.clone(), q))
                .collect(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Current contents, ordered by id.
    pub async fn snapshot(&self) -> ShopSnapshot {
        let t = self.tables.read().await;
        ShopSnapshot {
            work_orders: t.work_orders.values().cloned().collect(),
            quotes: t.quotes.values().cloned().collect(),
        }
    }

    pub async fn upsert_work_order(&self, wo: WorkOrder) {
        self.tables
            .write()
            .await
            .work_orders
            .insert(wo.id.clone(), wo);
    }

    pub async fn upsert_quote(&self, q: Quote) {
        self.tables.write().await.quotes.insert(q.id.clone(), q);
    }
}

#[async_trait]
impl WorkshopStore for InMemoryStore {
    async fn list_work_orders(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>> {
        let t = self.tables.read().await;
        Ok(t.work_orders
            .values()
            .filter(|wo| filter.matches(wo))
            .cloned()
            .collect())
    }

    async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrder>> {
        Ok(self.tables.read().await.work_orders.get(id).cloned())
    }

    async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<Quote>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.quotes.get(id).cloned()).collect())
    }

    async fn update_stage(&self, id: &str, stage: Stage) -> Result<()> {
        let mut t = self.tables.write().await;
        let Some(wo) = t.work_orders.get_mut(id) else {
            bail!("work order not found: {id}");
        };
        wo.stage = StoredStage::Known(stage);
        Ok(())
    }
}
