//! `shop reconcile` and `shop override`.
//!
//! Both operate on a snapshot file through [`InMemoryStore`] and write the
//! file back only when something was persisted.

use anyhow::{bail, Context, Result};
use shop_audit::AuditLog;
use shop_config::{report_unused_keys, ConfigMode, UnusedKeyPolicy};
use shop_reconcile::{
    apply_manual_override, InMemoryStore, LogNotifier, NullNotifier, ReconcileJob, RunMode,
    ShopSnapshot, StageOverride,
};
use tracing::{info, warn};

use super::{load_config, parse_stage};

pub struct ReconcileArgs {
    pub snapshot: String,
    pub config_paths: Vec<String>,
    pub apply: bool,
    pub audit: Option<String>,
    pub strict_config: bool,
}

pub async fn run_reconcile(args: ReconcileArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths)?;
    let mut settings = loaded.settings()?;
    if args.apply {
        settings.apply = true;
    }
    if args.audit.is_some() {
        settings.audit_path = args.audit.clone();
    }

    let mode = if settings.apply {
        ConfigMode::Apply
    } else {
        ConfigMode::DryRun
    };
    let policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(mode, &loaded.config_json, policy)?;
    if !unused.is_clean() {
        warn!(
            mode = %unused.mode,
            keys = ?unused.unused_leaf_pointers,
            "config contains keys this mode does not read"
        );
    }

    // Dry runs change nothing, so they never touch the audit log.
    let mut audit = match (&settings.audit_path, settings.apply) {
        (Some(path), true) => Some(AuditLog::resume(path, settings.audit_hash_chain)?),
        (None, true) => {
            bail!("RECONCILE_AUDIT_REQUIRED: --apply needs --audit or audit.path in config")
        }
        _ => None,
    };

    let store = InMemoryStore::new(ShopSnapshot::load_json(&args.snapshot)?);

    let job = ReconcileJob::new(settings.clone()).with_config_hash(loaded.config_hash.clone());
    let summary = if settings.log_changes {
        job.run(&store, &LogNotifier, audit.as_mut()).await?
    } else {
        job.run(&store, &NullNotifier, audit.as_mut()).await?
    };

    if summary.mode == RunMode::Apply && summary.applied_count() > 0 {
        store
            .snapshot()
            .await
            .save_json(&args.snapshot)
            .context("write corrected snapshot failed")?;
        info!(path = %args.snapshot, applied = summary.applied_count(), "snapshot updated");
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.unaudited.is_empty() {
        bail!(
            "AUDIT_WRITE_FAILED: {} persisted change(s) have no audit entry",
            summary.unaudited.len()
        );
    }
    Ok(())
}

pub struct OverrideArgs {
    pub snapshot: String,
    pub work_order: String,
    pub stage: String,
    pub reason: String,
    pub actor: String,
    pub audit: String,
}

pub async fn run_override(args: OverrideArgs) -> Result<()> {
    let stage = parse_stage(&args.stage)?;
    let store = InMemoryStore::new(ShopSnapshot::load_json(&args.snapshot)?);
    let mut audit = AuditLog::resume(&args.audit, true)?;

    let outcome = apply_manual_override(
        &store,
        &mut audit,
        &StageOverride {
            work_order_id: args.work_order,
            stage,
            reason: args.reason,
            actor: args.actor,
        },
    )
    .await?;

    store
        .snapshot()
        .await
        .save_json(&args.snapshot)
        .context("write snapshot failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
