use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on concurrent stage updates when none is configured.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

const MAX_IN_FLIGHT_LIMIT: usize = 64;

/// What the reconciliation job does with a work order that links quotes the
/// store could not return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Resolve with whatever quotes were found and report the gap.
    Report,
    /// Leave the work order untouched and report the gap.
    Skip,
}

impl UnresolvedPolicy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(UnresolvedPolicy::Report),
            "skip" => Ok(UnresolvedPolicy::Skip),
            other => Err(anyhow!(
                "CONFIG_INVALID reconcile.unresolved_policy '{other}'. expected one of: report | skip"
            )),
        }
    }
}

/// Typed view over the merged config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSettings {
    pub apply: bool,
    pub include_canceled: bool,
    pub unresolved_policy: UnresolvedPolicy,
    pub max_in_flight: usize,
    pub audit_path: Option<String>,
    pub audit_hash_chain: bool,
    pub log_changes: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            apply: false,
            include_canceled: false,
            unresolved_policy: UnresolvedPolicy::Report,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            audit_path: None,
            audit_hash_chain: true,
            log_changes: true,
        }
    }
}

impl ReconcileSettings {
    /// Build from canonical config JSON (produced by `load_layered_yaml*`).
    ///
    /// Every key is optional:
    /// - reconcile.apply (bool) default false
    /// - reconcile.include_canceled (bool) default false; re-examine orders already at the canceled stage
    /// - reconcile.unresolved_policy ("report" | "skip") default report
    /// - reconcile.max_in_flight (1..=64) default 4
    /// - audit.path (string) default none
    /// - audit.hash_chain (bool) default true
    /// - notify.log_changes (bool) default true
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let d = Self::default();

        let unresolved_policy = match cfg.pointer("/reconcile/unresolved_policy") {
            None | Some(Value::Null) => d.unresolved_policy,
            Some(Value::String(s)) => UnresolvedPolicy::parse(s)?,
            Some(other) => {
                bail!("CONFIG_INVALID reconcile.unresolved_policy must be a string (got {other})")
            }
        };

        let max_in_flight = match cfg.pointer("/reconcile/max_in_flight") {
            None | Some(Value::Null) => d.max_in_flight,
            Some(v) => {
                let raw = v.as_u64().ok_or_else(|| {
                    anyhow!("CONFIG_INVALID reconcile.max_in_flight must be an integer (got {v})")
                })?;
                let n = usize::try_from(raw).map_err(|_| {
                    anyhow!("CONFIG_INVALID reconcile.max_in_flight out of bounds (1..={MAX_IN_FLIGHT_LIMIT}): {raw}")
                })?;
                if !(1..=MAX_IN_FLIGHT_LIMIT).contains(&n) {
                    bail!(
                        "CONFIG_INVALID reconcile.max_in_flight out of bounds (1..={MAX_IN_FLIGHT_LIMIT}): {n}"
                    );
                }
                n
            }
        };

        let audit_path = match cfg.pointer("/audit/path") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(other) => bail!("CONFIG_INVALID audit.path must be a string (got {other})"),
        };

        Ok(Self {
            apply: read_bool(cfg, "/reconcile/apply", d.apply)?,
            include_canceled: read_bool(cfg, "/reconcile/include_canceled", d.include_canceled)?,
            unresolved_policy,
            max_in_flight,
            audit_path,
            audit_hash_chain: read_bool(cfg, "/audit/hash_chain", d.audit_hash_chain)?,
            log_changes: read_bool(cfg, "/notify/log_changes", d.log_changes)?,
        })
    }
}

fn read_bool(cfg: &Value, ptr: &str, default: bool) -> Result<bool> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => bail!("CONFIG_INVALID {ptr} must be a bool (got {other})"),
    }
}
