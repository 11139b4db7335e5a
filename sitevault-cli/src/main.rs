/*!
Sitevault CLI - Command-line interface for the site snapshot and restore
engine.

All business logic lives in `sitevault-core`; this binary only parses
arguments, loads the site context and settings, and renders results.
*/

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use sitevault_core::{
    ArchiveStore, BackupOptions, BackupOrchestrator, JsonFileSettings, MysqlClient,
    RestoreOptions, RestoreOrchestrator, SettingsStore, SiteContext, SnapshotMetadata,
};
use tabled::{Table, Tabled};
use tracing::warn;

#[derive(Parser)]
#[command(name = "sitevault")]
#[command(about = "Site snapshot and restore engine")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the site context file (JSON)
    #[arg(short = 'c', long, global = true, default_value = "sitevault-site.json")]
    site_config: PathBuf,

    /// Path to the settings file; defaults to sitevault-settings.json next
    /// to the site context file
    #[arg(short = 's', long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new snapshot of the site
    Backup {
        /// Rewrite staging URLs to the live URL inside the dump
        #[arg(long)]
        replace_urls: bool,
        /// Override the staging URL from settings
        #[arg(long)]
        staging_url: Option<String>,
        /// Override the live URL from settings
        #[arg(long)]
        live_url: Option<String>,
        /// Override the archive store directory
        #[arg(long)]
        backup_dir: Option<PathBuf>,
    },
    /// Restore a snapshot onto the live installation
    Restore {
        /// Path to the snapshot archive (.zip)
        archive: PathBuf,
        /// Pin the restored database's canonical URLs to the current live URL
        #[arg(long)]
        force_current_url: bool,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// List snapshots in the archive store
    List,
    /// Delete snapshots beyond the retention count
    Prune {
        /// Number of snapshots to keep; defaults to the settings value
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Snapshot")]
    base: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "Prefix")]
    prefix: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = load_site_context(&cli.site_config)?;
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| default_settings_path(&cli.site_config));
    let mut settings_store = JsonFileSettings::new(&settings_path);

    match cli.command {
        Commands::Backup {
            replace_urls,
            staging_url,
            live_url,
            backup_dir,
        } => {
            let opts = BackupOptions {
                staging_url,
                live_url,
                backup_dir,
                replace_urls,
            };
            backup(&ctx, &settings_store, &opts)
        }
        Commands::Restore {
            archive,
            force_current_url,
            yes,
        } => restore(&ctx, &mut settings_store, &archive, force_current_url, yes),
        Commands::List => list(&ctx, &settings_store),
        Commands::Prune { keep } => prune(&ctx, &settings_store, keep),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_site_context(path: &PathBuf) -> Result<SiteContext, anyhow::Error> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read site context file {}", path.display()))?;
    let ctx: SiteContext = serde_json::from_str(&raw)
        .with_context(|| format!("invalid site context in {}", path.display()))?;
    ctx.validate()?;
    Ok(ctx)
}

fn default_settings_path(site_config: &PathBuf) -> PathBuf {
    site_config.with_file_name("sitevault-settings.json")
}

fn backup(
    ctx: &SiteContext,
    settings_store: &JsonFileSettings,
    opts: &BackupOptions,
) -> Result<(), anyhow::Error> {
    let mut db = MysqlClient::connect(&ctx.db).context("cannot connect to database")?;
    let report =
        BackupOrchestrator::new(ctx, &mut db, settings_store.load()).create_backup(opts)?;

    println!("Snapshot created: {}", report.archive_path.display());
    println!("  Site: {}", report.metadata.site_name);
    println!("  Prefix: {}", report.metadata.db_prefix);
    println!(
        "  Dump size: {}",
        format_size(report.metadata.db_dump_size_bytes)
    );
    Ok(())
}

fn restore(
    ctx: &SiteContext,
    settings_store: &mut JsonFileSettings,
    archive: &PathBuf,
    force_current_url: bool,
    yes: bool,
) -> Result<(), anyhow::Error> {
    if !yes {
        print!(
            "Restoring '{}' will overwrite the live site content and database. Continue? (y/N): ",
            archive.display()
        );
        use std::io::{self, Write};
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().to_lowercase().starts_with('y') {
            println!("Restore cancelled");
            return Ok(());
        }
    }

    let mut db = MysqlClient::connect(&ctx.db).context("cannot connect to database")?;
    let report = RestoreOrchestrator::new(ctx, &mut db, settings_store)
        .restore_from_backup(archive, RestoreOptions { force_current_url })?;

    println!("Restore complete");
    if let Some(safety) = &report.safety_backup {
        println!("  Safety backup: {}", safety.display());
    }
    if report.old_prefix != report.new_prefix {
        println!(
            "  Table prefix: {} -> {}",
            report.old_prefix, report.new_prefix
        );
    }
    if !report.content_restored {
        println!("  Database-only restore (archive carried no content tree)");
    }
    if let Some(note) = report.import.partial_note() {
        println!("  Warning: {note}");
    }
    Ok(())
}

fn list(ctx: &SiteContext, settings_store: &JsonFileSettings) -> Result<(), anyhow::Error> {
    let store = ArchiveStore::new(
        settings_store
            .load()
            .backup_dir_or_default(&ctx.content_dir),
    );

    let mut rows = Vec::new();
    for pair in store.list_snapshots()? {
        let meta = SnapshotMetadata::read_for_archive(&pair.archive_path);
        let size = fs::metadata(&pair.archive_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "?".to_string());
        rows.push(SnapshotRow {
            base: pair.base,
            created: meta
                .as_ref()
                .map(|m| format_timestamp(m.created_utc))
                .unwrap_or_else(|| "?".to_string()),
            site: meta.as_ref().map(|m| m.site_name.clone()).unwrap_or_default(),
            prefix: meta.as_ref().map(|m| m.db_prefix.clone()).unwrap_or_default(),
            size,
        });
    }

    if rows.is_empty() {
        println!("No snapshots found in {}", store.dir().display());
    } else {
        println!("{}", Table::new(rows));
    }

    for orphan in store.orphans()? {
        warn!(path = %orphan.display(), "orphaned snapshot file");
    }
    Ok(())
}

fn prune(
    ctx: &SiteContext,
    settings_store: &JsonFileSettings,
    keep: Option<usize>,
) -> Result<(), anyhow::Error> {
    let settings = settings_store.load();
    let store = ArchiveStore::new(settings.backup_dir_or_default(&ctx.content_dir));
    let keep = keep.unwrap_or(settings.retention as usize);
    if keep == 0 {
        anyhow::bail!("refusing to prune with keep = 0; pass an explicit --keep");
    }

    let pruned = store.enforce_retention(keep)?;
    if pruned.is_empty() {
        println!("Nothing to prune");
    } else {
        for base in pruned {
            println!("Pruned {base}");
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(utc: DateTime<Utc>) -> String {
    utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
