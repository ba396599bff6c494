//! Command handler modules for shop-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod reconcile;
pub mod resolve;

use anyhow::{bail, Result};
use shop_audit::ChainCheck;
use shop_config::LoadedConfig;
use shop_stage::Stage;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parse a CLI `--stage` string into a [`Stage`].
pub fn parse_stage(stage: &str) -> Result<Stage> {
    match Stage::parse(stage) {
        Some(s) => Ok(s),
        None => {
            let valid: Vec<&str> = Stage::SEQUENCE
                .iter()
                .chain(std::iter::once(&Stage::Canceled))
                .map(|s| s.as_str())
                .collect();
            bail!(
                "invalid --stage '{}'. expected one of: {}",
                stage,
                valid.join(" | ")
            )
        }
    }
}

/// Merge config layers; no layers means all defaults.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return LoadedConfig::empty();
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    shop_config::load_layered_yaml(&path_refs)
}

pub fn verify_audit(path: &str) -> Result<()> {
    match shop_audit::verify_chain(path)? {
        ChainCheck::Intact { entries } => {
            println!("audit_chain=intact entries={}", entries);
            Ok(())
        }
        ChainCheck::Broken { line, reason } => {
            println!("audit_chain=broken line={} reason={}", line, reason);
            bail!("AUDIT_CHAIN_BROKEN at line {line}")
        }
    }
}
