use crate::cli::CliContext;
use crate::core::audit_log::AuditContext;
use crate::models::profile::NewProfile;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use dialoguer::{Confirm, Password};
use serde::Serialize;
use zeroize::Zeroizing;

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Create the profile table (idempotent)
    Init,
    /// Create a profile
    Create(CreateArgs),
    /// List profiles with remaining days and bandwidth
    List(ListArgs),
    /// Show one profile
    Detail(NameArgs),
    /// Delete a profile
    Delete(DeleteArgs),
    /// Push the expiry date forward
    #[command(alias = "extend_days")]
    ExtendDays(ExtendDaysArgs),
    /// Raise the bandwidth limit
    #[command(alias = "extend_bw")]
    ExtendBw(ExtendBwArgs),
    /// Set status (and optionally container name)
    Status(StatusArgs),
    /// Record bandwidth used
    Usage(UsageArgs),
}

impl ProfileCommand {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, ProfileCommand::List(_) | ProfileCommand::Detail(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProfileCommand::Init => "init",
            ProfileCommand::Create(_) => "create",
            ProfileCommand::List(_) => "list",
            ProfileCommand::Detail(_) => "detail",
            ProfileCommand::Delete(_) => "delete",
            ProfileCommand::ExtendDays(_) => "extend-days",
            ProfileCommand::ExtendBw(_) => "extend-bw",
            ProfileCommand::Status(_) => "status",
            ProfileCommand::Usage(_) => "usage",
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub domain: String,

    #[arg(long, alias = "ssh_port")]
    pub ssh_port: u16,

    #[arg(long, alias = "cpu_percent")]
    pub cpu_percent: u32,

    #[arg(long, alias = "ram_mb")]
    pub ram_mb: u32,

    /// Prompted for when omitted (interactive mode only)
    #[arg(long)]
    pub password: Option<String>,

    /// Expiry date (YYYY-MM-DD)
    #[arg(long, alias = "expires_at")]
    pub expires_at: String,

    #[arg(long, alias = "bandwidth_limit_tb")]
    pub bandwidth_limit_tb: f64,

    #[arg(long, alias = "restore_link")]
    pub restore_link: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format: json|table
    #[arg(long, default_value = "json")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct NameArgs {
    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long)]
    pub name: String,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ExtendDaysArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, allow_negative_numbers = true)]
    pub days: i64,
}

#[derive(Args, Debug)]
pub struct ExtendBwArgs {
    #[arg(long)]
    pub name: String,

    /// Terabytes to add to the limit
    #[arg(long, allow_negative_numbers = true)]
    pub increment: f64,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, alias = "status_value")]
    pub status_value: String,

    #[arg(long, alias = "container_name")]
    pub container_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct UsageArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, alias = "used_tb")]
    pub used_tb: f64,
}

pub fn run(ctx: &CliContext, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Init => run_init(ctx),
        ProfileCommand::Create(args) => run_create(ctx, args),
        ProfileCommand::List(args) => run_list(ctx, args),
        ProfileCommand::Detail(args) => run_detail(ctx, args),
        ProfileCommand::Delete(args) => run_delete(ctx, args),
        ProfileCommand::ExtendDays(args) => run_extend_days(ctx, args),
        ProfileCommand::ExtendBw(args) => run_extend_bw(ctx, args),
        ProfileCommand::Status(args) => run_status(ctx, args),
        ProfileCommand::Usage(args) => run_usage(ctx, args),
    }
}

fn target(name: &str) -> String {
    format!("profile:{}", name)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize profile")?
    );
    Ok(())
}

fn run_init(ctx: &CliContext) -> Result<()> {
    ctx.profile_store()?;
    println!("profile database ready at {}", ctx.paths.database.display());
    Ok(())
}

fn read_password(ctx: &CliContext, given: Option<String>, name: &str) -> Result<Zeroizing<String>> {
    if let Some(password) = given {
        return Ok(Zeroizing::new(password));
    }
    if ctx.non_interactive {
        bail!("--non-interactive requires --password for profile create");
    }
    let password = Password::new()
        .with_prompt(format!("Password for {}", name))
        .with_confirmation("Repeat password", "passwords do not match")
        .interact()
        .context("read password from prompt")?;
    Ok(Zeroizing::new(password))
}

fn run_create(ctx: &CliContext, args: CreateArgs) -> Result<()> {
    let password = read_password(ctx, args.password, &args.name)?;
    let new = NewProfile {
        name: args.name,
        domain: args.domain,
        ssh_port: args.ssh_port,
        cpu_percent: args.cpu_percent,
        ram_mb: args.ram_mb,
        password,
        expires_at: args.expires_at,
        bandwidth_limit_tb: args.bandwidth_limit_tb,
        restore_link: args.restore_link,
    };
    let store = ctx.profile_store()?;
    let profile = ctx.audited(
        AuditContext::new("profile-create", target(&new.name))
            .with_detail(format!("expires_at={}", new.expires_at)),
        store.create(&new).map_err(anyhow::Error::from),
    )?;
    print_json(&profile)
}

fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }
    let rows = ctx.profile_store()?.list()?;

    if args.format == "json" {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No profiles found");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Domain").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Expires").add_attribute(Attribute::Bold),
        Cell::new("Days left").add_attribute(Attribute::Bold),
        Cell::new("Bandwidth (TB)").add_attribute(Attribute::Bold),
        Cell::new("Container").add_attribute(Attribute::Bold),
    ]);
    for row in rows {
        let p = row.profile;
        table.add_row(vec![
            p.name,
            p.domain,
            p.status,
            p.expires_at,
            row.remaining_days.to_string(),
            format!(
                "{:.2} / {:.2} ({:.2} left)",
                p.bandwidth_used_tb, p.bandwidth_limit_tb, row.remaining_bandwidth_tb
            ),
            p.container_name.unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_detail(ctx: &CliContext, args: NameArgs) -> Result<()> {
    let profile = ctx.profile_store()?.get(&args.name)?;
    print_json(&profile)
}

fn run_delete(ctx: &CliContext, args: DeleteArgs) -> Result<()> {
    if !args.yes && !ctx.non_interactive {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete profile '{}'?", args.name))
            .default(false)
            .interact()
            .context("read confirmation")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }
    let store = ctx.profile_store()?;
    ctx.audited(
        AuditContext::new("profile-delete", target(&args.name)),
        store.delete(&args.name).map_err(anyhow::Error::from),
    )?;
    println!("Deleted profile '{}'", args.name);
    Ok(())
}

fn run_extend_days(ctx: &CliContext, args: ExtendDaysArgs) -> Result<()> {
    let store = ctx.profile_store()?;
    let profile = ctx.audited(
        AuditContext::new("profile-extend-days", target(&args.name))
            .with_detail(format!("days={}", args.days)),
        store.extend_days(&args.name, args.days).map_err(anyhow::Error::from),
    )?;
    print_json(&profile)
}

fn run_extend_bw(ctx: &CliContext, args: ExtendBwArgs) -> Result<()> {
    let store = ctx.profile_store()?;
    let profile = ctx.audited(
        AuditContext::new("profile-extend-bw", target(&args.name))
            .with_detail(format!("increment_tb={}", args.increment)),
        store
            .extend_bandwidth(&args.name, args.increment)
            .map_err(anyhow::Error::from),
    )?;
    print_json(&profile)
}

fn run_status(ctx: &CliContext, args: StatusArgs) -> Result<()> {
    let store = ctx.profile_store()?;
    ctx.audited(
        AuditContext::new("profile-status", target(&args.name))
            .with_detail(format!("status={}", args.status_value)),
        store
            .update_status(&args.name, &args.status_value, args.container_name.as_deref())
            .map_err(anyhow::Error::from),
    )
}

fn run_usage(ctx: &CliContext, args: UsageArgs) -> Result<()> {
    let store = ctx.profile_store()?;
    store.update_usage(&args.name, args.used_tb)?;
    Ok(())
}
