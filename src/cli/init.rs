use crate::cli::CliContext;
use crate::constants;
use crate::core::settings;
use crate::util::fs as admin_fs;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Skip creating the profile database
    #[arg(long)]
    pub no_database: bool,
}

pub fn run(ctx: &CliContext, args: InitArgs) -> Result<()> {
    let paths = &ctx.paths;
    admin_fs::ensure_dir(&paths.root, constants::ADMIN_DIR_MODE)?;
    admin_fs::ensure_dir(&paths.data, constants::DATA_DIR_MODE)?;

    let mut admin = settings::load(&paths.admin_toml)?;
    settings::ensure_defaults(&mut admin, &ctx.xray_config);
    settings::save(&paths.admin_toml, &admin)?;

    if !args.no_database {
        ctx.profile_store()?;
    }

    println!("xray-admin initialized at {}", paths.root.display());

    if !ctx.xray_config.is_file() {
        println!(
            "Xray config: {} not found (account commands will fail until it exists)",
            ctx.xray_config.display()
        );
        return Ok(());
    }
    println!("Xray config: {}", ctx.xray_config.display());

    // Anchors are reported here so a fresh install shows what `account add` needs.
    match ctx.account_store(false)?.check() {
        Ok(report) => {
            for (kind, kr) in &report.kinds {
                let anchor = kind.grammar().anchor;
                match kr.anchors {
                    0 => println!("  {}: anchor {} missing", kind, anchor),
                    1 => println!("  {}: anchor {} present, {} records", kind, anchor, kr.records),
                    n => println!("  {}: anchor {} appears {} times", kind, anchor, n),
                }
            }
        }
        Err(e) => println!("  cannot read config: {}", e),
    }
    Ok(())
}
