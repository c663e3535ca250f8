//! Optional journald forwarding of audit entries via `systemd-cat`.
//!
//! Best-effort: a missing or failing `systemd-cat` never fails the operation.

use crate::core::audit_log::AuditEntry;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Syslog priority for an entry: failed operations are raised to `warning`.
fn priority(entry: &AuditEntry) -> &'static str {
    match &entry.result {
        Some(result) if !result.success => "warning",
        _ => "info",
    }
}

/// Forward one audit entry as a single JSON line tagged with `tag`.
pub fn forward_entry(tag: &str, entry: &AuditEntry) {
    let mut line = match serde_json::to_vec(entry) {
        Ok(line) => line,
        Err(e) => {
            debug!(error = %e, "cannot serialize audit entry for journald");
            return;
        }
    };
    line.push(b'\n');

    let spawned = Command::new("systemd-cat")
        .args(["-t", tag, "-p", priority(entry)])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("systemd-cat not available; skipping journald forward");
            return;
        }
        Err(e) => {
            debug!(error = %e, "cannot spawn systemd-cat");
            return;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(&line) {
            debug!(error = %e, "cannot write to systemd-cat");
        }
    }
    let _ = child.wait();
}
