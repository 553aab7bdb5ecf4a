//! Donation CSV import from the command line

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use compass_core::import::parse_donations;
use compass_core::{Amount, CompassConfig};
use compass_server::db::ImportRepo;
use uuid::Uuid;

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Target batch (must be open)
    #[arg(long)]
    pub batch: Uuid,

    /// CSV file with a header row
    pub file: PathBuf,

    /// Parse and report without touching the database
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run_import(args: ImportArgs, config: &CompassConfig) -> Result<()> {
    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let parsed = parse_donations(file)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    if args.dry_run {
        let total: Amount = parsed.rows.iter().map(|r| r.amount).sum();
        println!("{} valid row(s), total {}", parsed.rows.len(), total);
        for err in &parsed.errors {
            println!("  line {}: {}", err.line, err.message);
        }
        return Ok(());
    }

    let source = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let pool = super::connect(config).await?;
    let report = ImportRepo::new(&pool)
        .run(args.batch, parsed, source, None)
        .await
        .context("Import failed")?;

    println!(
        "Imported {} of {} row(s), {} new donor(s), {} error(s)",
        report.run.imported_count,
        report.run.row_count,
        report.run.created_donor_count,
        report.run.error_count
    );
    for err in &report.errors {
        println!("  line {}: {}", err.line, err.message);
    }
    Ok(())
}
