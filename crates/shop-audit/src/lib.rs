//! shop-audit
//!
//! Append-only record of persisted stage changes and manual overrides.
//! One JSON object per line, keys sorted, optionally hash-chained so that an
//! edited or removed line is detectable.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace for deterministic entry ids.
const ENTRY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5d0c_a7e1_3f42_4b8e_9a61_0e2c_7b15_d4f3);

/// Append-only JSONL audit log.
pub struct AuditLog {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of entries appended through this log (or restored on resume).
    seq: u64,
}

impl AuditLog {
    /// Start a new log at `path` and ensure parent dirs exist.
    ///
    /// A chained log refuses a non-empty existing file, since a fresh handle
    /// would restart the chain mid-file. Use [`AuditLog::resume`] for that.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref();
        if hash_chain && path.is_file() {
            let len = fs::metadata(path)
                .with_context(|| format!("stat audit log {:?}", path))?
                .len();
            if len > 0 {
                bail!(
                    "AUDIT_CHAIN_EXISTS: {:?} already holds entries; resume it instead",
                    path
                );
            }
        }
        Self::at(path, hash_chain)
    }

    /// Open an existing log and continue its chain from the last entry.
    /// A missing file behaves like [`AuditLog::open`].
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut log = Self::at(path.as_ref(), hash_chain)?;
        if !log.path.exists() {
            return Ok(log);
        }

        let content = fs::read_to_string(&log.path)
            .with_context(|| format!("read audit log {:?}", log.path))?;
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(trimmed)
                .with_context(|| format!("parse audit entry at line {}", i + 1))?;
            log.last_hash = entry.hash_self;
            log.seq += 1;
        }
        Ok(log)
    }

    fn at(path: &Path, hash_chain: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Create the file if needed and check it accepts appends.
    ///
    /// Callers that persist a change before auditing it run this first, so an
    /// unwritable log fails before anything is persisted.
    pub fn ensure_writable(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log for append {:?}", self.path))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one entry.
    pub fn append(
        &mut self,
        job_id: Uuid,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEntry> {
        let entry_id = derive_entry_id(self.last_hash.as_deref(), &payload, self.seq)?;
        self.seq += 1;

        let mut entry = AuditEntry {
            entry_id,
            job_id,
            ts_utc: Utc::now(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            entry.hash_prev = self.last_hash.clone();
            let self_hash = compute_entry_hash(&entry)?;
            entry.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&entry)?;
        append_line(&self.path, &line)?;

        Ok(entry)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    /// Reconcile job or override session that produced the entry.
    pub job_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Entry ids depend only on chain position, previous hash and payload.
fn derive_entry_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let mut material = Vec::new();
    material.extend_from_slice(prev_hash.unwrap_or("").as_bytes());
    material.push(0);
    material.extend_from_slice(canonical_json_line(payload)?.as_bytes());
    material.push(0);
    material.extend_from_slice(&seq.to_be_bytes());
    Ok(Uuid::new_v5(&ENTRY_ID_NAMESPACE, &material))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Sorted keys, compact JSON, one line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical entry with `hash_self` cleared.
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Read every entry of a log file, in order.
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse audit entry at line {}", i + 1))
        })
        .collect()
}

/// Verify the hash chain of a log file.
pub fn verify_chain(path: impl AsRef<Path>) -> Result<ChainCheck> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_chain_str(&content)
}

/// Same as [`verify_chain`] over in-memory JSONL content.
pub fn verify_chain_str(content: &str) -> Result<ChainCheck> {
    let mut prev_hash: Option<String> = None;
    let mut entries = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: AuditEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit entry at line {}", i + 1))?;
        entries += 1;

        if entry.hash_prev != prev_hash {
            return Ok(ChainCheck::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(&entry)?;
            if *claimed != recomputed {
                return Ok(ChainCheck::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(ChainCheck::Intact { entries })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCheck {
    Intact { entries: usize },
    Broken { line: usize, reason: String },
}

impl ChainCheck {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainCheck::Intact { .. })
    }
}
