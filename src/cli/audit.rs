use crate::cli::CliContext;
use crate::core::audit_log;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Display the audit trail
    Log(AuditLogArgs),
    /// Verify audit chain integrity
    Verify,
}

#[derive(Args, Debug)]
pub struct AuditLogArgs {
    /// Maximum number of entries to display
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Only show entries whose target contains this text (e.g. `vmess:` or `profile:alice`)
    #[arg(long)]
    pub target: Option<String>,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub fn run(ctx: &CliContext, cmd: AuditCommand) -> Result<()> {
    match cmd {
        AuditCommand::Log(args) => run_log(ctx, args),
        AuditCommand::Verify => run_verify(ctx),
    }
}

fn run_log(ctx: &CliContext, args: AuditLogArgs) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }
    // Filter before applying the limit so `--limit` counts matching entries.
    let mut entries = audit_log::read_log(&ctx.paths, None)?;
    if let Some(needle) = &args.target {
        entries.retain(|e| e.target.contains(needle.as_str()));
    }
    if entries.len() > args.limit {
        entries = entries.split_off(entries.len() - args.limit);
    }

    if args.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("serialize audit entries")?
        );
        return Ok(());
    }

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Timestamp").add_attribute(Attribute::Bold),
        Cell::new("Action").add_attribute(Attribute::Bold),
        Cell::new("Target").add_attribute(Attribute::Bold),
        Cell::new("Actor").add_attribute(Attribute::Bold),
        Cell::new("Result").add_attribute(Attribute::Bold),
    ]);

    for entry in &entries {
        let local: DateTime<Local> = entry.timestamp.into();
        let result_str = match &entry.result {
            Some(r) if r.success => "OK".to_string(),
            Some(r) => format!("FAIL: {}", r.error.as_deref().unwrap_or("?")),
            None => "-".to_string(),
        };
        let action = match &entry.detail {
            Some(detail) => format!("{} ({})", entry.action, detail),
            None => entry.action.clone(),
        };
        table.add_row(vec![
            local.format("%Y-%m-%d %H:%M:%S").to_string(),
            action,
            entry.target.clone(),
            entry.actor.clone(),
            result_str,
        ]);
    }

    println!("{}", table);
    println!("\n{} entries shown.", entries.len());
    Ok(())
}

fn run_verify(ctx: &CliContext) -> Result<()> {
    let report = audit_log::verify_chain(&ctx.paths)?;

    if report.entries == 0 && report.is_intact() {
        println!("No audit entries to verify.");
        return Ok(());
    }

    for issue in &report.issues {
        println!("  [FAIL] {}", issue);
    }

    if report.is_intact() {
        println!("Audit chain: {} entries verified, 0 errors", report.entries);
        return Ok(());
    }
    println!(
        "Audit chain: {} entries, {} errors",
        report.entries,
        report.issues.len()
    );
    std::process::exit(1);
}
