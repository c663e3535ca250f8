//! Read-only diagnostics for the state root, daemon config and profile database.

use crate::cli::CliContext;
use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::profile_store::ProfileStore;
use anyhow::Result;
use clap::Args;
use std::fs;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Also check directory and file permission modes
    #[arg(long)]
    pub perms: bool,
}

#[derive(Default)]
struct Tally {
    ok: u32,
    warn: u32,
    fail: u32,
}

impl Tally {
    fn pass(&mut self, msg: impl AsRef<str>) {
        println!("  [PASS] {}", msg.as_ref());
        self.ok += 1;
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        println!("  [WARN] {}", msg.as_ref());
        self.warn += 1;
    }

    fn fail(&mut self, msg: impl AsRef<str>) {
        println!("  [FAIL] {}", msg.as_ref());
        self.fail += 1;
    }
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<()> {
    let paths = &ctx.paths;
    let mut t = Tally::default();

    println!("Doctor: {}", paths);
    if let Some(w) = &ctx.admin_load_warning {
        t.warn(w);
    }

    if paths.root.is_dir() {
        t.pass(format!("state root exists: {}", paths.root.display()));
    } else {
        t.warn(format!(
            "state root missing: {} (run: xray-admin init)",
            paths.root.display()
        ));
    }

    check_xray_config(ctx, &mut t);

    if paths.config_lock.exists() {
        match FileLock::try_exclusive(&paths.config_lock) {
            Ok(Some(_)) => t.pass("config lock is free"),
            Ok(None) => t.warn(format!(
                "config lock held by another process: {}",
                paths.config_lock.display()
            )),
            Err(e) => t.warn(format!("cannot test lock {}: {}", paths.config_lock.display(), e)),
        }
    }

    if paths.database.is_file() {
        match ProfileStore::open(&paths.database).and_then(|store| store.list()) {
            Ok(rows) => t.pass(format!("profile database ok: {} profiles", rows.len())),
            Err(e) => t.fail(format!("profile database {}: {}", paths.database.display(), e)),
        }
    } else {
        t.warn(format!("profile database missing: {}", paths.database.display()));
    }

    if args.perms {
        check_mode(&mut t, "state root", &paths.root, constants::ADMIN_DIR_MODE);
        check_mode(&mut t, "data dir", &paths.data, constants::DATA_DIR_MODE);
        check_mode(&mut t, "admin.toml", &paths.admin_toml, constants::ADMIN_TOML_MODE);
        check_mode(&mut t, "audit log", &paths.audit_log, constants::AUDIT_LOG_MODE);
    }

    println!();
    println!("Doctor summary: {} pass, {} warn, {} fail", t.ok, t.warn, t.fail);
    if t.fail > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_xray_config(ctx: &CliContext, t: &mut Tally) {
    let store = match ctx.account_store(false) {
        Ok(store) => store,
        Err(e) => {
            t.fail(format!("{:#}", e));
            return;
        }
    };
    let report = match store.check() {
        Ok(report) => report,
        Err(e) => {
            t.fail(e.to_string());
            return;
        }
    };
    t.pass(format!("xray config readable: {}", ctx.xray_config.display()));

    for (kind, kr) in &report.kinds {
        let anchor = kind.grammar().anchor;
        match kr.anchors {
            1 => t.pass(format!("{}: anchor {} present, {} records", kind, anchor, kr.records)),
            0 => t.fail(format!("{}: anchor {} missing (add would fail)", kind, anchor)),
            n => t.warn(format!(
                "{}: anchor {} appears {} times (add uses the first)",
                kind, anchor, n
            )),
        }
        for line in &kr.unpaired {
            t.warn(format!("{}: record at line {} has no entry line", kind, line));
        }
        for name in &kr.duplicates {
            t.warn(format!("{}: name '{}' appears more than once", kind, name));
        }
    }
}

#[cfg(unix)]
fn check_mode(t: &mut Tally, label: &str, path: &std::path::Path, expected: u32) {
    use std::os::unix::fs::PermissionsExt;
    // Missing paths are already reported above.
    let Ok(meta) = fs::metadata(path) else {
        return;
    };
    let mode = meta.permissions().mode() & 0o777;
    if mode == expected {
        t.pass(format!("{} mode ok: {:04o}", label, mode));
    } else {
        t.warn(format!(
            "{} mode: {:04o} (expected {:04o})",
            label, mode, expected
        ));
    }
}

#[cfg(not(unix))]
fn check_mode(_t: &mut Tally, _label: &str, _path: &std::path::Path, _expected: u32) {}
