use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use folio_crypto::ContentHasher;
use folio_dedup::{DedupConfig, DedupManager};
use folio_store::FileSystemBackend;
use folio_types::OwnerId;

use crate::cli::*;

const CONFIG_FILE: &str = "config.toml";

type Manager = DedupManager<FileSystemBackend>;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;

    if let Command::Hash(args) = &cli.command {
        return cmd_hash(&config, args, format).await;
    }

    let backend = FileSystemBackend::open(&cli.root)
        .await
        .with_context(|| format!("opening store at {}", cli.root.display()))?;
    let manager = DedupManager::new(Arc::new(backend), config)?;

    match cli.command {
        Command::Store(args) => cmd_store(&manager, args, format).await,
        Command::Get(args) => cmd_get(&manager, args).await,
        Command::Exists(args) => cmd_exists(&manager, args, format).await,
        Command::Has(args) => cmd_has(&manager, args, format).await,
        Command::Ls(args) => cmd_ls(&manager, args, format).await,
        Command::Rm(args) => cmd_rm(&manager, args, format).await,
        Command::RmOwner(args) => cmd_rm_owner(&manager, args, format).await,
        Command::Cleanup => cmd_cleanup(&manager, format).await,
        Command::Verify => cmd_verify(&manager, format).await,
        Command::Stats => cmd_stats(&manager, format).await,
        Command::Hash(_) => Ok(()),
    }
}

/// Explicit `--config`, else `<root>/config.toml` if it exists, else defaults.
fn load_config(cli: &Cli) -> anyhow::Result<DedupConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let implicit = cli.root.join(CONFIG_FILE);
            if !implicit.exists() {
                return Ok(DedupConfig::default());
            }
            implicit
        }
    };
    debug!(path = %path.display(), "loading configuration");
    DedupConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
}

fn owner(raw: &str) -> anyhow::Result<OwnerId> {
    Ok(OwnerId::new(raw)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn guess_mime(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("css") => "text/css",
        Some("html" | "htm") => "text/html",
        Some("xhtml") => "application/xhtml+xml",
        Some("xml" | "opf" | "ncx") => "application/xml",
        Some("js") => "application/javascript",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("mp3") => "audio/mpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn cmd_hash(
    config: &DedupConfig,
    args: &FileArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let hash = ContentHasher::new(config.algorithm).hash(&data);
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "algorithm": config.algorithm,
            "hash": hash,
        })),
        OutputFormat::Text => {
            println!("{}  {}", hash.to_string().yellow(), args.file.display());
            Ok(())
        }
    }
}

async fn cmd_store(m: &Manager, args: StoreArgs, format: OutputFormat) -> anyhow::Result<()> {
    let owner = owner(&args.owner)?;
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let mime = args.mime.as_deref().unwrap_or_else(|| guess_mime(&args.path));
    let outcome = m.store(&owner, &args.path, &data, mime).await?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }
    let label = if outcome.is_duplicate {
        "deduplicated".cyan()
    } else {
        "stored".green()
    };
    println!(
        "{} {} {}/{}",
        "✓".green().bold(),
        label,
        owner.as_str().bold(),
        args.path
    );
    println!("  Hash: {}", outcome.hash.to_string().yellow());
    println!("  References: {}", outcome.ref_count);
    if outcome.bytes_saved > 0 {
        println!("  Saved: {}", human_bytes(outcome.bytes_saved).green());
    }
    Ok(())
}

async fn cmd_get(m: &Manager, args: GetArgs) -> anyhow::Result<()> {
    let owner = owner(&args.owner)?;
    let Some(data) = m.retrieve(&owner, &args.path).await? else {
        anyhow::bail!("no resource {}/{}", args.owner, args.path);
    };
    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} wrote {} to {}", "✓".green(), human_bytes(data.len() as u64), path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn cmd_exists(m: &Manager, args: FileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let report = m.exists(&data).await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    if report.exists {
        println!("{} present  {}", "✓".green(), report.hash.to_string().yellow());
    } else {
        println!("{} absent   {}", "✗".red(), report.hash.to_string().dimmed());
    }
    Ok(())
}

async fn cmd_has(m: &Manager, args: ResourceArgs, format: OutputFormat) -> anyhow::Result<()> {
    let owner = owner(&args.owner)?;
    let present = m.has_resource(&owner, &args.path).await?;
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "exists": present }));
    }
    if present {
        println!("{} {}/{}", "✓".green(), owner.as_str().bold(), args.path);
    } else {
        println!("{} {}/{} not found", "✗".red(), owner.as_str().bold(), args.path);
    }
    Ok(())
}

async fn cmd_ls(m: &Manager, args: OwnerArgs, format: OutputFormat) -> anyhow::Result<()> {
    let owner = owner(&args.owner)?;
    let resources = m.list_owner_resources(&owner).await?;
    if format == OutputFormat::Json {
        return print_json(&resources);
    }
    if resources.is_empty() {
        println!("No resources for {}.", owner.as_str().bold());
        return Ok(());
    }
    for r in &resources {
        println!(
            "{}  {:>10}  {:<24} {}",
            r.hash.short().yellow(),
            human_bytes(r.size),
            r.mime_type.dimmed(),
            r.resource_path
        );
    }
    Ok(())
}

async fn cmd_rm(m: &Manager, args: ResourceArgs, format: OutputFormat) -> anyhow::Result<()> {
    let owner = owner(&args.owner)?;
    let report = m.remove_resource(&owner, &args.path).await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    if report.references_removed == 0 {
        println!("Nothing to remove.");
    } else {
        println!(
            "{} Removed {}/{} ({} freed)",
            "✓".green(),
            owner.as_str().bold(),
            args.path,
            human_bytes(report.bytes_freed)
        );
    }
    Ok(())
}

async fn cmd_rm_owner(m: &Manager, args: OwnerArgs, format: OutputFormat) -> anyhow::Result<()> {
    let owner = owner(&args.owner)?;
    let report = m.remove_owner(&owner).await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    println!(
        "{} Removed {} resources of {}",
        "✓".green(),
        report.references_removed,
        owner.as_str().bold()
    );
    println!(
        "  Reclaimed: {} entries, {}",
        report.entries_removed,
        human_bytes(report.bytes_freed)
    );
    Ok(())
}

async fn cmd_cleanup(m: &Manager, format: OutputFormat) -> anyhow::Result<()> {
    let report = m.cleanup().await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    if !report.repaired_anything() {
        println!("{} No repairs needed.", "✓".green().bold());
    } else {
        println!("{} Cleanup complete", "✓".green().bold());
        println!("  Orphans removed: {}", report.orphans_removed);
        println!("  Counts corrected: {}", report.counts_corrected);
        println!("  Dangling references: {}", report.dangling_references_removed);
        println!("  Freed: {}", human_bytes(report.bytes_freed).green());
    }
    if report.skipped_recent > 0 {
        println!("  Skipped (recent): {}", report.skipped_recent);
    }
    Ok(())
}

async fn cmd_verify(m: &Manager, format: OutputFormat) -> anyhow::Result<()> {
    let report = m.verify().await?;
    if format == OutputFormat::Json {
        print_json(&report)?;
    } else if report.is_healthy() {
        println!(
            "{} {} entries verified",
            "✓".green().bold(),
            report.valid_entries
        );
    } else {
        println!(
            "{} {}/{} entries valid",
            "✗".red().bold(),
            report.valid_entries,
            report.total_entries
        );
        for hash in &report.corrupted_entries {
            println!("  {} {}", "corrupted".red(), hash);
        }
        for hash in &report.missing_content {
            println!("  {} {}", "missing".red(), hash);
        }
    }
    if !report.is_healthy() {
        anyhow::bail!("store failed verification");
    }
    Ok(())
}

async fn cmd_stats(m: &Manager, format: OutputFormat) -> anyhow::Result<()> {
    let stats = m.stats().await?;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }
    println!("Entries: {}", stats.unique_entries.to_string().bold());
    println!("References: {}", stats.total_references);
    println!("Stored: {}", human_bytes(stats.bytes_stored));
    println!(
        "Saved: {} ({:.1}%)",
        human_bytes(stats.bytes_saved).green(),
        stats.dedup_ratio * 100.0
    );
    if !stats.top_duplicates.is_empty() {
        println!("\nTop duplicates:");
        for d in &stats.top_duplicates {
            println!(
                "  {}  x{:<4} {:>10}  {}",
                d.hash.short().yellow(),
                d.ref_count,
                human_bytes(d.bytes_saved),
                d.mime_type.dimmed()
            );
        }
    }
    Ok(())
}
