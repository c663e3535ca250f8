use crate::cli::CliContext;
use crate::constants;
use crate::core::account_doc::{Change, Edit};
use crate::core::audit_log::AuditContext;
use crate::core::profile_store::extended_expiry;
use crate::error::AccountError;
use crate::models::account::AccountEntry;
use crate::models::kind::CredentialKind;
use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use dialoguer::Confirm;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use uuid::Uuid;

const EXPIRY_FORMAT: &str = "%Y-%m-%d";

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Add an account below the kind's anchor line
    Add(AddArgs),
    /// Delete an account
    Delete(DeleteArgs),
    /// Change an account's expiry
    Renew(RenewArgs),
    /// List accounts of one kind in file order
    List(ListArgs),
    /// Exit 0 if the account exists, 1 otherwise
    Exists(ExistsArgs),
}

impl AccountCommand {
    pub fn is_mutating(&self) -> bool {
        match self {
            AccountCommand::Add(args) => !args.dry_run,
            AccountCommand::Delete(args) => !args.dry_run,
            AccountCommand::Renew(args) => !args.dry_run,
            AccountCommand::List(_) | AccountCommand::Exists(_) => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccountCommand::Add(_) => "add",
            AccountCommand::Delete(_) => "delete",
            AccountCommand::Renew(_) => "renew",
            AccountCommand::List(_) => "list",
            AccountCommand::Exists(_) => "exists",
        }
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long, value_enum)]
    pub kind: CredentialKind,

    /// Account name (single token, matched case-insensitively)
    #[arg(long)]
    pub name: String,

    /// Client UUID (vmess/vless) or password (trojan)
    #[arg(long, required_unless_present = "generate", conflicts_with = "generate")]
    pub identifier: Option<String>,

    /// Generate the identifier instead of passing one
    #[arg(long)]
    pub generate: bool,

    /// Length of a generated trojan password
    #[arg(long, default_value_t = constants::DEFAULT_GENERATED_LENGTH)]
    pub length: usize,

    /// Expiry written to the comment line (YYYY-MM-DD)
    #[arg(long, required_unless_present = "days", conflicts_with = "days")]
    pub expiry: Option<String>,

    /// Expire this many days from today
    #[arg(long)]
    pub days: Option<i64>,

    /// Print the edit without writing the config
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long, value_enum)]
    pub kind: CredentialKind,

    #[arg(long)]
    pub name: String,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct RenewArgs {
    #[arg(long, value_enum)]
    pub kind: CredentialKind,

    #[arg(long)]
    pub name: String,

    /// New expiry (YYYY-MM-DD)
    #[arg(long, required_unless_present = "days", conflicts_with = "days")]
    pub expiry: Option<String>,

    /// Extend by this many days from the later of the current expiry and today
    #[arg(long)]
    pub days: Option<i64>,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, value_enum)]
    pub kind: CredentialKind,

    /// Output format: json|table
    #[arg(long, default_value = "json")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct ExistsArgs {
    #[arg(long, value_enum)]
    pub kind: CredentialKind,

    #[arg(long)]
    pub name: String,
}

pub fn run(ctx: &CliContext, cmd: AccountCommand) -> Result<()> {
    match cmd {
        AccountCommand::Add(args) => run_add(ctx, args),
        AccountCommand::Delete(args) => run_delete(ctx, args),
        AccountCommand::Renew(args) => run_renew(ctx, args),
        AccountCommand::List(args) => run_list(ctx, args),
        AccountCommand::Exists(args) => run_exists(ctx, args),
    }
}

fn target(kind: CredentialKind, name: &str) -> String {
    format!("{}:{}", kind, name)
}

fn run_add(ctx: &CliContext, args: AddArgs) -> Result<()> {
    let identifier = match args.identifier {
        Some(id) => id,
        None => {
            if let Some(min_len) = ctx.admin.policy.min_generated_length {
                if !args.kind.uses_uuid() && args.length < min_len {
                    bail!(
                        "policy: generated password length {} below minimum {} (set in admin.toml [policy])",
                        args.length,
                        min_len
                    );
                }
            }
            generate_identifier(args.kind, args.length)
        }
    };
    let expiry = match (args.expiry, args.days) {
        (Some(expiry), _) => expiry,
        (None, Some(days)) => days_from(Utc::now().date_naive(), days)?,
        (None, None) => bail!("add needs --expiry or --days"),
    };

    let store = ctx.account_store(!args.dry_run)?;
    let result = store
        .add(args.kind, &args.name, &identifier, &expiry, args.dry_run)
        .map_err(anyhow::Error::from);
    if args.dry_run {
        print_edit(&result?);
        return Ok(());
    }
    ctx.audited(
        AuditContext::new("account-add", target(args.kind, &args.name))
            .with_detail(format!("expiry={}", expiry)),
        result,
    )?;

    let entry = AccountEntry {
        name: args.name,
        expiry,
        identifier,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&entry).context("serialize account")?
    );
    Ok(())
}

fn run_delete(ctx: &CliContext, args: DeleteArgs) -> Result<()> {
    let store = ctx.account_store(!args.dry_run)?;
    if args.dry_run {
        print_edit(&store.delete(args.kind, &args.name, true)?);
        return Ok(());
    }

    if !args.yes && !ctx.non_interactive {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete {} account '{}'?", args.kind, args.name))
            .default(false)
            .interact()
            .context("read confirmation")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let result = store
        .delete(args.kind, &args.name, false)
        .map_err(anyhow::Error::from);
    ctx.audited(
        AuditContext::new("account-delete", target(args.kind, &args.name)),
        result,
    )?;
    println!("Deleted {} account '{}'", args.kind, args.name);
    Ok(())
}

fn run_renew(ctx: &CliContext, args: RenewArgs) -> Result<()> {
    let store = ctx.account_store(!args.dry_run)?;
    let mut new_expiry = String::new();
    let result = match (args.expiry, args.days) {
        (Some(expiry), _) => {
            new_expiry = expiry;
            store.renew(args.kind, &args.name, &new_expiry, args.dry_run)
        }
        (None, Some(days)) => store.renew_with(args.kind, &args.name, args.dry_run, |current| {
            let next = next_expiry(&current.expiry, Utc::now().date_naive(), days)?;
            new_expiry = next.clone();
            Ok(next)
        }),
        (None, None) => bail!("renew needs --expiry or --days"),
    }
    .map_err(anyhow::Error::from);

    if args.dry_run {
        print_edit(&result?);
        return Ok(());
    }
    let detail = if new_expiry.is_empty() {
        format!("days={}", args.days.unwrap_or_default())
    } else {
        format!("expiry={}", new_expiry)
    };
    ctx.audited(
        AuditContext::new("account-renew", target(args.kind, &args.name)).with_detail(detail),
        result,
    )?;
    println!(
        "Renewed {} account '{}' until {}",
        args.kind, args.name, new_expiry
    );
    Ok(())
}

/// Expiry `days` after the later of the stored expiry and `today`. A stored
/// value that is not a date counts as already expired.
fn next_expiry(stored: &str, today: NaiveDate, days: i64) -> Result<String, AccountError> {
    let current = NaiveDate::parse_from_str(stored, EXPIRY_FORMAT).unwrap_or(today);
    extended_expiry(current, today, days)
        .map(|date| date.format(EXPIRY_FORMAT).to_string())
        .ok_or(AccountError::InvalidField {
            field: "days",
            reason: "out of range",
        })
}

fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }
    let entries = ctx.account_store(false)?.list(args.kind)?;

    if args.format == "json" {
        let json = serde_json::to_string_pretty(&entries).context("serialize list")?;
        println!("{}", json);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No {} accounts found", args.kind);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Expiry").add_attribute(Attribute::Bold),
        Cell::new("Identifier").add_attribute(Attribute::Bold),
    ]);
    for entry in entries {
        let or_dash = |s: String| if s.is_empty() { "-".to_string() } else { s };
        table.add_row(vec![
            or_dash(entry.name),
            or_dash(entry.expiry),
            or_dash(entry.identifier),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_exists(ctx: &CliContext, args: ExistsArgs) -> Result<()> {
    if !ctx.account_store(false)?.exists(args.kind, &args.name)? {
        std::process::exit(1);
    }
    Ok(())
}

fn days_from(base: NaiveDate, days: i64) -> Result<String> {
    let date = Duration::try_days(days)
        .and_then(|delta| base.checked_add_signed(delta))
        .with_context(|| format!("--days {} is out of range", days))?;
    Ok(date.format(EXPIRY_FORMAT).to_string())
}

fn generate_identifier(kind: CredentialKind, length: usize) -> String {
    if kind.uses_uuid() {
        return Uuid::new_v4().to_string();
    }
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn print_edit(edit: &Edit) {
    for change in &edit.changes {
        match change {
            Change::Inserted { at, lines } => {
                println!("@@ insert at line {} @@", at + 1);
                for line in lines {
                    println!("+{}", line.trim_end_matches('\r'));
                }
            }
            Change::Removed { at, lines } => {
                println!("@@ remove at line {} @@", at + 1);
                for line in lines {
                    println!("-{}", line.trim_end_matches('\r'));
                }
            }
            Change::Rewritten { at, before, after } => {
                println!("@@ rewrite line {} @@", at + 1);
                println!("-{}", before.trim_end_matches('\r'));
                println!("+{}", after.trim_end_matches('\r'));
            }
        }
    }
    println!("(dry run: config not written)");
}
