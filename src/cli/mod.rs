//! CLI routing and command dispatch.

use crate::constants;
use crate::core::account_store::AccountStore;
use crate::core::audit_log::{self, AuditContext};
use crate::core::paths::{self, AdminPaths};
use crate::core::profile_store::ProfileStore;
use crate::core::settings;
use crate::models::admin_config::AdminFile;
use crate::util::{fs as admin_fs, journald, privilege};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

pub mod account;
pub mod audit;
pub mod doctor;
pub mod init;
pub mod profile;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: AdminPaths,
    pub xray_config: PathBuf,
    pub admin: AdminFile,
    pub admin_load_warning: Option<String>,
    pub non_interactive: bool,
}

impl CliContext {
    /// Store over the daemon config. Mutating callers get the configured
    /// lock, which lives in the state root.
    pub fn account_store(&self, mutating: bool) -> Result<AccountStore> {
        let policy = &self.admin.policy;
        let mut store =
            AccountStore::new(self.xray_config.clone()).with_backup(policy.backup_on_write);
        if mutating && policy.lock_config {
            admin_fs::ensure_dir(&self.paths.root, constants::ADMIN_DIR_MODE)?;
            store = store.with_lock(self.paths.config_lock.clone());
        }
        Ok(store)
    }

    pub fn profile_store(&self) -> Result<ProfileStore> {
        ProfileStore::open(&self.paths.database)
            .with_context(|| format!("open profile database {}", self.paths.database.display()))
    }

    /// Record the outcome of an operation, then hand the result back.
    /// Audit failures are logged and never change the outcome.
    pub fn audited<T>(&self, ctx: AuditContext, result: Result<T>) -> Result<T> {
        let (success, error) = match &result {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        match audit_log::record(&self.paths, ctx, success, error) {
            Ok(entry) => {
                if self.admin.policy.journald_audit {
                    journald::forward_entry(constants::JOURNALD_TAG, &entry);
                }
            }
            Err(e) => warn!(error = %e, "audit log write failed"),
        }
        result
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "xray-admin",
    version,
    about = "Account and hosting-profile administration for an Xray proxy host"
)]
pub struct Cli {
    /// State directory (database, audit log, admin.toml)
    #[arg(long, global = true, value_name = "PATH", env = constants::ENV_ADMIN_ROOT)]
    pub root: Option<PathBuf>,

    /// Daemon config holding the account records
    #[arg(long, global = true, value_name = "PATH", env = constants::ENV_XRAY_CONFIG)]
    pub config: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "XRAY_ADMIN_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = AdminPaths::resolve(self.root);

        // admin.toml is optional; a broken one degrades to defaults so that
        // read-only commands like `doctor` still work.
        let mut admin_load_warning = None;
        let admin = match settings::load(&paths.admin_toml) {
            Ok(admin) => admin,
            Err(e) => {
                admin_load_warning = Some(format!("cannot read admin.toml: {:#}", e));
                AdminFile::default()
            }
        };
        let xray_config = paths::resolve_xray_config(self.config, admin.xray.config_path.as_deref());

        let ctx = CliContext {
            paths,
            xray_config,
            admin,
            admin_load_warning,
            non_interactive: self.non_interactive,
        };

        if ctx.admin.policy.require_root && self.command.requires_root() {
            privilege::require_root(&self.command.name())?;
        }

        match self.command {
            Commands::Init(args) => init::run(&ctx, args),
            Commands::Account { command } => account::run(&ctx, command),
            Commands::Profile { command } => profile::run(&ctx, command),
            Commands::Audit { command } => audit::run(&ctx, command),
            Commands::Doctor(args) => doctor::run(&ctx, args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the state directory, admin.toml and the profile database
    Init(init::InitArgs),
    /// Manage client accounts in the daemon config
    Account {
        #[command(subcommand)]
        command: account::AccountCommand,
    },
    /// Manage hosting profiles
    Profile {
        #[command(subcommand)]
        command: profile::ProfileCommand,
    },
    /// View or verify the audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
    /// Diagnose configuration and record integrity (read-only)
    Doctor(doctor::DoctorArgs),
}

impl Commands {
    /// Whether this command requires root privileges.
    pub fn requires_root(&self) -> bool {
        match self {
            Commands::Init(_) => true,
            Commands::Account { command } => command.is_mutating(),
            Commands::Profile { command } => command.is_mutating(),
            Commands::Audit { .. } | Commands::Doctor(_) => false,
        }
    }

    /// Command name for error messages.
    pub fn name(&self) -> String {
        match self {
            Commands::Init(_) => "init".to_string(),
            Commands::Account { command } => format!("account {}", command.name()),
            Commands::Profile { command } => format!("profile {}", command.name()),
            Commands::Audit { .. } => "audit".to_string(),
            Commands::Doctor(_) => "doctor".to_string(),
        }
    }
}
