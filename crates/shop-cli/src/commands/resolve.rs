use anyhow::{bail, Result};
use serde::Serialize;
use shop_reconcile::ShopSnapshot;
use shop_stage::{check_stage_drift, index_quotes, ResolutionRule, Stage, StageNote};

#[derive(Serialize)]
struct ResolveLine<'a> {
    work_order_id: &'a str,
    stored: &'a str,
    resolved: Stage,
    rule: ResolutionRule,
    drift: bool,
    notes: &'a [StageNote],
}

/// One JSON line per work order, in snapshot order.
pub fn run_resolve(snapshot_path: &str, only: Option<&str>) -> Result<()> {
    let snap = ShopSnapshot::load_json(snapshot_path)?;
    let quotes_by_id = index_quotes(snap.quotes.iter().cloned());

    let selected: Vec<_> = snap
        .work_orders
        .iter()
        .filter(|wo| only.map(|id| wo.id == id).unwrap_or(true))
        .collect();
    if let (Some(id), true) = (only, selected.is_empty()) {
        bail!("work order not found in snapshot: {id}");
    }

    for wo in selected {
        let drift = check_stage_drift(wo, &quotes_by_id);
        let resolution = drift.resolution();
        let line = ResolveLine {
            work_order_id: &wo.id,
            stored: wo.stage.as_str(),
            resolved: resolution.stage,
            rule: resolution.rule,
            drift: drift.requires_correction(),
            notes: &resolution.notes,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}
