use anyhow::{bail, Context, Result};
use colored::*;
use std::env;
use std::path::Path;
use std::sync::Arc;

// Use library instead of local modules
use egrul_founders::founders::format_registry_date;
use egrul_founders::{
    detect_backend, get_extractor, logging, CompanyExtract, Config, DownloadDirSource,
    ExtractQualityEngine, PatternSet, Pipeline, ReconciliationEngine, Scheduler, SqliteStore,
    StateStore,
};

const USAGE: &str = "Usage: egrul-founders <command>

Commands:
  run              Process all tracked INNs now and then every interval
  once             Process all tracked INNs once
  extract <file>   Parse one registry extract (.pdf or .txt) and print it
  import <csv>     Track the INNs in the first column of a CSV file
  export <csv>     Write the tracked records to a CSV file
  clear            Blank founder columns and change dates of every record
  history <inn>    Show the audit trail of one company";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match (args.get(1).map(String::as_str), args.get(2)) {
        (Some("run"), None) => run_scheduled(),
        (Some("once"), None) => run_once(),
        (Some("extract"), Some(file)) => run_extract(Path::new(file)),
        (Some("import"), Some(file)) => run_import(Path::new(file)),
        (Some("export"), Some(file)) => run_export(Path::new(file)),
        (Some("clear"), None) => run_clear(),
        (Some("history"), Some(inn)) => run_history(inn),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    logging::init(&config.logging)?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }
    SqliteStore::open(&config.database_path)
}

fn build_pipeline(config: &Config) -> Result<Pipeline<DownloadDirSource, SqliteStore>> {
    let source = DownloadDirSource::new(&config.download_dir);
    source.ensure_dir()?;

    Ok(Pipeline::new(source, open_store(config)?, Arc::new(PatternSet::new()?))
        .with_retry(config.retry_policy())
        .with_engine(ReconciliationEngine::with_policy(config.former_founders_policy)))
}

fn run_scheduled() -> Result<()> {
    let config = load_config()?;
    log::info!(
        "Starting scheduler: every {} h, former founders policy {}",
        config.update_interval.as_secs() / 3600,
        config.former_founders_policy
    );

    let mut pipeline = build_pipeline(&config)?;
    Scheduler::new(config.update_interval).run_forever(|| pipeline.process_companies())
}

fn run_once() -> Result<()> {
    let config = load_config()?;
    let mut pipeline = build_pipeline(&config)?;

    let summary = pipeline.process_companies()?;
    println!("✓ {}", summary.summary());
    Ok(())
}

fn run_extract(path: &Path) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let patterns = Arc::new(PatternSet::new()?);
    let extractor = get_extractor(detect_backend(path)?, patterns);
    let extract = extractor.extract(path)?;

    print_extract(&extract, extractor.backend().name());

    let report = ExtractQualityEngine::new().check(&extract);
    println!();
    if report.is_clean() {
        println!("{} {}", "✓".green().bold(), report.summary());
    } else {
        println!("{} {}", "⚠".yellow().bold(), report.summary());
        for issue in &report.issues {
            println!("  {:?} {}: {}", issue.severity, issue.field.yellow(), issue.issue);
            println!("    → {}", issue.recommendation.dimmed());
        }
    }

    Ok(())
}

fn print_extract(extract: &CompanyExtract, backend: &str) {
    println!("📄 {} ({})", extract.source_file.bold(), backend);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{} {}", "Full name:".blue().bold(), extract.full_name);
    println!("{} {}", "Short name:".blue().bold(), extract.short_name);
    println!(
        "{} {}",
        "Change date:".blue().bold(),
        extract
            .latest_change_date
            .map(format_registry_date)
            .unwrap_or_else(|| "-".to_string())
    );
    println!("{} {}", "SHA-256:".blue().bold(), extract.source_hash.dimmed());

    println!("\n👥 Founders ({})", extract.founders.len());
    for founder in &extract.founders {
        println!(
            "  {} {}",
            founder.full_name().green().bold(),
            format!("INN {}", founder.tax_id).cyan()
        );
        println!(
            "    nominal {} ₽, share {} %, GRN {} of {}",
            founder.nominal_value.as_deref().unwrap_or("-"),
            founder.share_percentage.as_deref().unwrap_or("-"),
            founder.latest_registration_number.as_deref().unwrap_or("-"),
            founder.latest_registration_date.as_deref().unwrap_or("-")
        );
    }
}

fn run_import(csv_path: &Path) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;

    println!("📂 Importing INNs from {}...", csv_path.display());
    let added = store.import_tracked_csv(csv_path)?;
    println!("✓ {} new INNs tracked", added);
    Ok(())
}

fn run_export(csv_path: &Path) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;

    let count = store.export_csv(csv_path)?;
    println!("✓ Exported {} records to {}", count, csv_path.display());
    Ok(())
}

fn run_clear() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;

    let cleared = store.clear_founder_columns()?;
    println!("✓ Cleared founder columns of {} records", cleared);
    Ok(())
}

fn run_history(inn: &str) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config)?;

    if store.get_record(inn)?.is_none() {
        bail!("INN {} is not tracked", inn);
    }

    let events = store.events_for_company(inn)?;
    println!("📜 {} events for {}", events.len(), inn);
    for event in &events {
        println!(
            "  {} {:<16} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.data
        );
    }
    Ok(())
}
