//! Opt-in append-only audit trail for run, issue, and revoke events.
//!
//! One JSON object per line, chained with SHA-256: each entry records the
//! hash of the previous raw line plus its own canonical hash, so truncation
//! or edits are detectable with `leaserun audit verify`.
//!
//! Entries are metadata-only. Lease ids are reduced to a short SHA-256
//! fingerprint and no credential field is ever written here.

use crate::constants;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// "run" | "issue" | "revoke"
    pub action: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Short SHA-256 fingerprint of the lease id, never the id itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_fingerprint: Option<String>,
    /// Terminal state label ("done", "failed", ...).
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

/// Event data supplied by callers; chain fields are filled in on append.
pub struct AuditEvent<'a> {
    pub action: &'a str,
    pub role: Option<&'a str>,
    pub lease_id: Option<&'a str>,
    pub outcome: &'a str,
    pub error_kind: Option<&'a str>,
    pub exit_code: Option<i32>,
}

/// Short hex fingerprint of a lease id for audit purposes.
pub fn lease_fingerprint(lease_id: &str) -> String {
    let digest = Sha256::digest(lease_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..constants::LEASE_FINGERPRINT_LEN].to_string()
}

fn detect_actor() -> String {
    // CI platforms export the triggering user; fall back to the local one
    for var in ["GITHUB_ACTOR", "CI_ACTOR", "USER"] {
        if let Ok(actor) = std::env::var(var) {
            if !actor.is_empty() {
                return actor;
            }
        }
    }
    "unknown".to_string()
}

/// Append an event to the audit trail under an exclusive file lock.
pub fn record(path: &Path, event: AuditEvent<'_>) -> Result<()> {
    let _lock = AuditLock::acquire(path)?;

    let prev_hash = last_line_hash(path)?;
    let mut entry = AuditEntry {
        timestamp: Utc::now(),
        action: event.action.to_string(),
        actor: detect_actor(),
        role: event.role.map(str::to_string),
        lease_fingerprint: event.lease_id.map(lease_fingerprint),
        outcome: event.outcome.to_string(),
        error_kind: event.error_kind.map(str::to_string),
        exit_code: event.exit_code,
        prev_hash,
        entry_hash: None,
    };
    entry.entry_hash = Some(compute_entry_hash(&entry)?);

    let line = serde_json::to_string(&entry).context("serialize audit entry")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create audit directory {}", parent.display()))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit trail {}", path.display()))?;
    writeln!(file, "{}", line).context("append audit entry")?;
    Ok(())
}

/// Read all entries, oldest first. Unparseable lines fail the read.
pub fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file =
        File::open(path).with_context(|| format!("open audit trail {}", path.display()))?;
    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("read audit line")?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line)
            .with_context(|| format!("parse audit entry on line {}", idx + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Result of a chain verification pass.
#[derive(Debug)]
pub struct ChainReport {
    pub entries: usize,
    /// 1-based line number of the first broken link, if any.
    pub broken_at: Option<usize>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// Verify the hash chain and per-entry hashes.
pub fn verify_chain(path: &Path) -> Result<ChainReport> {
    if !path.exists() {
        return Ok(ChainReport {
            entries: 0,
            broken_at: None,
        });
    }
    let file =
        File::open(path).with_context(|| format!("open audit trail {}", path.display()))?;
    let mut prev_line_hash: Option<String> = None;
    let mut count = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("read audit line")?;
        if line.trim().is_empty() {
            continue;
        }
        count += 1;
        let entry: AuditEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(_) => {
                return Ok(ChainReport {
                    entries: count,
                    broken_at: Some(idx + 1),
                })
            }
        };
        if entry.prev_hash != prev_line_hash {
            return Ok(ChainReport {
                entries: count,
                broken_at: Some(idx + 1),
            });
        }
        let expected = compute_entry_hash(&entry)?;
        if entry.entry_hash.as_deref() != Some(expected.as_str()) {
            return Ok(ChainReport {
                entries: count,
                broken_at: Some(idx + 1),
            });
        }
        prev_line_hash = Some(sha256_hex(line.as_bytes()));
    }
    Ok(ChainReport {
        entries: count,
        broken_at: None,
    })
}

struct AuditLock {
    _file: File,
}

impl AuditLock {
    fn acquire(audit_path: &Path) -> Result<Self> {
        let lock_path: PathBuf = audit_path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("open audit lock {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("acquire audit lock {}", lock_path.display()))?;
        Ok(Self { _file: file })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Hash of the canonical entry JSON with `entry_hash` cleared.
fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut canonical = entry.clone();
    canonical.entry_hash = None;
    let json = serde_json::to_string(&canonical).context("serialize audit entry for hashing")?;
    Ok(sha256_hex(json.as_bytes()))
}

fn last_line_hash(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let file =
        File::open(path).with_context(|| format!("open audit trail {}", path.display()))?;
    let mut last: Option<String> = None;
    for line in BufReader::new(file).lines() {
        let line = line.context("read audit line")?;
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }
    Ok(last.map(|l| sha256_hex(l.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn event(action: &'static str, outcome: &'static str) -> AuditEvent<'static> {
        AuditEvent {
            action,
            role: Some("terraform-role"),
            lease_id: Some("aws/creds/terraform-role/L1"),
            outcome,
            error_kind: None,
            exit_code: Some(0),
        }
    }

    #[test]
    fn test_fingerprint_is_short_stable_and_not_the_lease_id() {
        let fp = lease_fingerprint("aws/creds/terraform-role/L1");
        assert_eq!(fp.len(), constants::LEASE_FINGERPRINT_LEN);
        assert_eq!(fp, lease_fingerprint("aws/creds/terraform-role/L1"));
        assert_ne!(fp, lease_fingerprint("aws/creds/terraform-role/L2"));
    }

    #[test]
    fn test_record_never_stores_lease_id_or_credentials() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        record(&path, event("run", "done")).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("aws/creds/terraform-role/L1"));
        assert!(raw.contains("terraform-role"));
        assert!(raw.contains(&lease_fingerprint("aws/creds/terraform-role/L1")));
    }

    #[test]
    fn test_chain_links_and_verifies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        record(&path, event("issue", "done")).unwrap();
        record(&path, event("run", "done")).unwrap();
        record(&path, event("revoke", "failed")).unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].prev_hash.is_none());
        assert!(entries[1].prev_hash.is_some());

        let report = verify_chain(&path).unwrap();
        assert_eq!(report.entries, 3);
        assert!(report.is_intact());
    }

    #[test]
    fn test_tampered_line_breaks_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        record(&path, event("run", "done")).unwrap();
        record(&path, event("run", "done")).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let tampered = raw.replacen("\"outcome\":\"done\"", "\"outcome\":\"failed\"", 1);
        fs::write(&path, tampered).unwrap();

        let report = verify_chain(&path).unwrap();
        assert_eq!(report.broken_at, Some(1));
    }

    #[test]
    fn test_missing_trail_is_empty_and_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.log");
        assert!(read_entries(&path).unwrap().is_empty());
        assert!(verify_chain(&path).unwrap().is_intact());
    }
}
