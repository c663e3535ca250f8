//! Append-only, hash-chained audit trail of admin operations.
//!
//! Entries never carry identifiers or passwords; only the action, the
//! target (`<kind>:<name>` or `profile:<name>`) and the outcome.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::paths::AdminPaths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const HASH_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AuditResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_version: Option<u8>,
}

/// What to record for one operation.
pub struct AuditContext {
    pub action: String,
    pub target: String,
    pub detail: Option<String>,
}

impl AuditContext {
    pub fn new(action: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

fn detect_actor() -> String {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return format!("{}(sudo)", user);
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// Append an entry with the auto-detected actor. Returns the written entry.
pub fn record(
    paths: &AdminPaths,
    ctx: AuditContext,
    success: bool,
    error: Option<String>,
) -> Result<AuditEntry> {
    record_as(paths, ctx, success, error, &detect_actor())
}

pub fn record_as(
    paths: &AdminPaths,
    ctx: AuditContext,
    success: bool,
    error: Option<String>,
    actor: &str,
) -> Result<AuditEntry> {
    fs::create_dir_all(&paths.root)
        .with_context(|| format!("create dir {}", paths.root.display()))?;
    let _lock = FileLock::exclusive(&paths.audit_lock)
        .with_context(|| format!("acquire lock {}", paths.audit_lock.display()))?;
    let prev_hash = last_entry_hash(&paths.audit_log)?;

    let mut entry = AuditEntry {
        timestamp: Utc::now(),
        action: ctx.action,
        actor: actor.to_string(),
        target: ctx.target,
        detail: ctx.detail,
        result: Some(AuditResult { success, error }),
        prev_hash,
        entry_hash: None,
        hash_version: Some(HASH_VERSION),
    };
    entry.entry_hash = Some(compute_entry_hash(&entry)?);

    let line = serde_json::to_string(&entry).context("serialize audit entry")?;
    append_line(&paths.audit_log, &line)?;
    Ok(entry)
}

/// Canonical hash of an entry with its `entry_hash` field removed.
fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical = canonicalize_value(&value);
    let canonical_str = serde_json::to_string(&canonical).context("serialize canonical json")?;
    Ok(format!("{:064x}", Sha256::digest(canonical_str.as_bytes())))
}

/// Recursively sort object keys so hashing is independent of field order.
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize_value(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

fn append_line(audit_path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)
        .with_context(|| format!("open audit log {}", audit_path.display()))?;
    writeln!(file, "{}", line).context("write audit entry")?;

    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(constants::AUDIT_LOG_MODE);
        fs::set_permissions(audit_path, perm).context("set audit log permissions")?;
    }
    Ok(())
}

fn last_entry_hash(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("read audit log {}", path.display()))?;
    let last = content.lines().rev().find(|line| !line.trim().is_empty());
    Ok(last.map(|line| match serde_json::from_str::<AuditEntry>(line) {
        Ok(AuditEntry {
            entry_hash: Some(hash),
            ..
        }) => hash,
        // Unparseable tail: chain to the raw line so tampering still shows.
        _ => raw_line_hash(line.trim()),
    }))
}

/// Read audit entries, keeping only the newest `limit` when given.
pub fn read_log(paths: &AdminPaths, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    if !paths.audit_log.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(&paths.audit_log)
        .with_context(|| format!("open audit log {}", paths.audit_log.display()))?;
    let mut entries = Vec::new();
    let mut malformed = 0usize;

    for line in BufReader::new(file).lines() {
        let line = line.context("read audit log line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(_) => malformed += 1,
        }
    }

    if malformed > 0 {
        warn!(malformed, "skipped malformed audit entries");
    }

    if let Some(limit) = limit {
        if entries.len() > limit {
            entries = entries.split_off(entries.len() - limit);
        }
    }
    Ok(entries)
}

/// One integrity problem, by 1-based line number in the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    Malformed { line: usize },
    BrokenLink { line: usize },
    MissingHash { line: usize },
    HashMismatch { line: usize },
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainIssue::Malformed { line } => write!(f, "line {}: not a valid audit entry", line),
            ChainIssue::BrokenLink { line } => {
                write!(f, "line {}: prev_hash does not match the previous entry", line)
            }
            ChainIssue::MissingHash { line } => write!(f, "line {}: missing entry_hash", line),
            ChainIssue::HashMismatch { line } => {
                write!(f, "line {}: entry_hash mismatch (tampered?)", line)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ChainReport {
    pub entries: usize,
    pub issues: Vec<ChainIssue>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.issues.is_empty()
    }
}

fn raw_line_hash(line: &str) -> String {
    format!("{:064x}", Sha256::digest(line.as_bytes()))
}

/// Walk the log from the top, checking every link and entry hash.
/// The first entry must have no `prev_hash`, so a truncated head shows up too.
pub fn verify_chain(paths: &AdminPaths) -> Result<ChainReport> {
    let mut report = ChainReport::default();
    if !paths.audit_log.exists() {
        return Ok(report);
    }
    let content = fs::read_to_string(&paths.audit_log)
        .with_context(|| format!("read audit log {}", paths.audit_log.display()))?;

    let mut prev: Option<String> = None;
    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<AuditEntry>(raw) else {
            report.issues.push(ChainIssue::Malformed { line });
            prev = Some(raw_line_hash(raw));
            continue;
        };
        report.entries += 1;

        if entry.prev_hash != prev {
            report.issues.push(ChainIssue::BrokenLink { line });
        }
        match &entry.entry_hash {
            None => report.issues.push(ChainIssue::MissingHash { line }),
            Some(stored) if *stored != compute_entry_hash(&entry)? => {
                report.issues.push(ChainIssue::HashMismatch { line })
            }
            Some(_) => {}
        }
        prev = Some(entry.entry_hash.unwrap_or_else(|| raw_line_hash(raw)));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths() -> (TempDir, AdminPaths) {
        let dir = TempDir::new().unwrap();
        let paths = AdminPaths::from_root(dir.path().to_path_buf());
        (dir, paths)
    }

    #[test]
    fn test_record_and_read() {
        let (_dir, paths) = test_paths();
        record_as(&paths, AuditContext::new("account-add", "vmess:alice"), true, None, "tester")
            .unwrap();
        let entries = read_log(&paths, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, "vmess:alice");
        assert!(entries[0].prev_hash.is_none());
        assert!(entries[0].result.as_ref().unwrap().success);
    }

    #[test]
    fn test_entries_are_chained() {
        let (_dir, paths) = test_paths();
        let first =
            record_as(&paths, AuditContext::new("a", "t"), true, None, "tester").unwrap();
        let second = record_as(
            &paths,
            AuditContext::new("b", "t").with_detail("expiry=2025-01-01"),
            false,
            Some("not found".into()),
            "tester",
        )
        .unwrap();
        assert_eq!(second.prev_hash, first.entry_hash);
    }

    #[test]
    fn test_read_log_limit() {
        let (_dir, paths) = test_paths();
        for i in 0..5 {
            record_as(&paths, AuditContext::new(format!("op_{}", i), "t"), true, None, "tester")
                .unwrap();
        }
        let entries = read_log(&paths, Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action, "op_4");
    }

    #[test]
    fn test_verify_chain_ok() {
        let (_dir, paths) = test_paths();
        for action in ["add", "renew", "delete"] {
            record_as(&paths, AuditContext::new(action, "vless:bob"), true, None, "tester")
                .unwrap();
        }
        let report = verify_chain(&paths).unwrap();
        assert_eq!(report.entries, 3);
        assert!(report.is_intact(), "issues: {:?}", report.issues);
    }

    #[test]
    fn test_verify_chain_detects_tamper() {
        let (_dir, paths) = test_paths();
        record_as(&paths, AuditContext::new("add", "trojan:x"), true, None, "tester").unwrap();
        record_as(&paths, AuditContext::new("renew", "trojan:x"), true, None, "tester").unwrap();

        let content = fs::read_to_string(&paths.audit_log).unwrap();
        fs::write(&paths.audit_log, content.replace("renew", "delete")).unwrap();

        let report = verify_chain(&paths).unwrap();
        assert_eq!(report.issues, vec![ChainIssue::HashMismatch { line: 2 }]);
    }

    #[test]
    fn test_verify_chain_detects_truncated_head() {
        let (_dir, paths) = test_paths();
        for action in ["account-add", "account-renew", "account-delete"] {
            record_as(&paths, AuditContext::new(action, "vmess:amy"), true, None, "tester")
                .unwrap();
        }
        let content = fs::read_to_string(&paths.audit_log).unwrap();
        let tail: Vec<&str> = content.lines().skip(1).collect();
        fs::write(&paths.audit_log, tail.join("\n") + "\n").unwrap();

        let report = verify_chain(&paths).unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.issues, vec![ChainIssue::BrokenLink { line: 1 }]);
    }

    #[test]
    fn test_garbage_tail_still_chains() {
        let (_dir, paths) = test_paths();
        record_as(&paths, AuditContext::new("a", "t"), true, None, "tester").unwrap();
        append_line(&paths.audit_log, "not json").unwrap();
        let next = record_as(&paths, AuditContext::new("b", "t"), true, None, "tester").unwrap();
        assert_eq!(next.prev_hash, Some(raw_line_hash("not json")));

        let report = verify_chain(&paths).unwrap();
        assert_eq!(report.issues, vec![ChainIssue::Malformed { line: 2 }]);
    }

    #[test]
    fn test_canonical_json_deterministic() {
        let a = canonicalize_value(&serde_json::json!({"b": 1, "a": 2}));
        let b = canonicalize_value(&serde_json::json!({"a": 2, "b": 1}));
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"a":2,"b":1}"#);
        assert_eq!(a, b);
    }
}
