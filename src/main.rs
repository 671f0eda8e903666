use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pokedex_recon::entities::{upsert_abilities, upsert_games};
use pokedex_recon::{
    audit, get_adapter, read_abilities, read_games, AppConfig, DataQualityEngine, NameCatalog,
    NormalizedRecord, Normalizer, Query, Reconciler, SourceAdapter, SourceKind, Store,
};

const USAGE: &str = "\
Usage:
  pokedex-recon import --web <json> --sheet <csv> [--games <json>] [--abilities <json>] [--dry-run]
  pokedex-recon validate
  pokedex-recon backup
  pokedex-recon stats
  pokedex-recon show <id|name>";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = AppConfig::load()?;

    match args.get(1).map(String::as_str) {
        Some("import") => run_import(&config, &args[2..]),
        Some("validate") => run_validate(&config),
        Some("backup") => run_backup(&config),
        Some("stats") => run_stats(&config),
        Some("show") => {
            let key = args.get(2).ok_or_else(|| anyhow!("show needs an id or name\n{}", USAGE))?;
            run_show(&config, key)
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Value following `--flag`, if present
fn flag_value(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

// ============================================================================
// IMPORT
// ============================================================================

fn run_import(config: &AppConfig, args: &[String]) -> Result<()> {
    println!("🔄 Reconcile Run - Web + Spreadsheet → Store");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let web = flag_value(args, "--web");
    let sheet = flag_value(args, "--sheet");
    let dry_run = args.iter().any(|a| a == "--dry-run");

    if web.is_none() && sheet.is_none() {
        return Err(anyhow!("import needs --web and/or --sheet\n{}", USAGE));
    }

    // 1. Load store
    println!("\n📂 Loading store...");
    let manager = config.store_manager();
    let existing = manager.load().context("Failed to load store")?;
    println!("✓ {} creatures, {} games, {} abilities", existing.len(), existing.games.len(), existing.abilities.len());

    // 2. Reference sets
    let mut working = existing.clone();
    if let Some(path) = flag_value(args, "--games") {
        let changed = upsert_games(&mut working.games, read_games(&path)?);
        println!("✓ Games: {} changed ({} total)", changed, working.games.len());
    }
    if let Some(path) = flag_value(args, "--abilities") {
        let changed = upsert_abilities(&mut working.abilities, read_abilities(&path)?);
        println!("✓ Abilities: {} changed ({} total)", changed, working.abilities.len());
    }

    // 3. Adapt + normalize
    println!("\n🧹 Normalizing sources...");
    let normalizer = Normalizer::with_catalog(NameCatalog::from_store(&working));
    let mut incoming: Vec<NormalizedRecord> = Vec::new();

    for (kind, path) in [(SourceKind::Web, web), (SourceKind::Spreadsheet, sheet)] {
        if let Some(path) = path {
            incoming.extend(normalize_source(config, &normalizer, kind, &path)?);
        }
    }

    // 4. Reconcile
    println!("\n⚖️  Reconciling...");
    let reconciler = Reconciler::new(config.precedence.clone())?;
    let (merged, report) = reconciler.reconcile(&working, &incoming)?;
    println!("✓ {}", report.summary());

    for conflict in &report.conflicts {
        println!("   ⚠️  {} {}: kept {}", conflict.id, conflict.field, conflict.existing_value);
    }

    if dry_run {
        println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("🔍 Dry run: store not written");
        return Ok(());
    }

    if merged == existing {
        println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("✅ Store already up to date");
        return Ok(());
    }

    // 5. Stage audit rows, then commit store + audit together
    println!("\n💾 Saving store...");
    let mut conn = audit::open(&config.audit_db)?;
    let pending = audit::begin_run(&mut conn, &report, &actor())?;

    let backup = manager.save(&merged)?;
    match &backup {
        Some(handle) => println!("✓ Backup: {}", handle.path.display()),
        None => println!("✓ First save, no backup needed"),
    }

    let events = pending.commit(backup.as_ref())?;
    println!("✓ Audit: {} event(s) for run {}", events, report.run_id);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Store now holds {} creatures", merged.len());

    Ok(())
}

fn normalize_source(
    config: &AppConfig,
    normalizer: &Normalizer,
    kind: SourceKind,
    path: &Path,
) -> Result<Vec<NormalizedRecord>> {
    let adapter = get_adapter(kind, config.spreadsheet.header_row);
    let raws = adapter
        .read(path)
        .with_context(|| format!("Failed to read {} source {:?}", kind.name(), path))?;

    let batch = normalizer.normalize_batch(&raws);
    println!(
        "✓ {}: {} records, {} rejected, {} field issue(s)",
        kind.name(),
        batch.records.len(),
        batch.rejected.len(),
        batch.issue_count()
    );
    for (origin, err) in &batch.rejected {
        println!("   ❌ {}: {}", origin, err);
    }

    Ok(batch.records)
}

fn actor() -> String {
    env::var("USER").unwrap_or_else(|_| "pokedex-recon".to_string())
}

// ============================================================================
// MAINTENANCE
// ============================================================================

fn run_validate(config: &AppConfig) -> Result<()> {
    println!("🔍 Validating store {:?}", config.store_path);

    let store = config.store_manager().load()?;
    println!("✓ Shape, ids and checksum OK ({} creatures)", store.len());

    let report = DataQualityEngine::new().check_store(&store);
    for quality in report.flagged() {
        println!("   {}", quality.summary());
        for issue in &quality.issues {
            println!("      {:?} {}: {}", issue.severity, issue.field, issue.issue);
        }
    }

    println!("\n{}", report.summary.summary());
    if report.has_critical_issues() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_backup(config: &AppConfig) -> Result<()> {
    let manager = config.store_manager();
    let handle = manager.backup()?;
    println!("✅ Backup written: {}", handle.path.display());
    println!("   checksum {}", handle.checksum);
    println!("   {} backup(s) in {:?}", manager.list_backups()?.len(), manager.backup_dir());
    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let store = config.store_manager().load()?;
    print_stats(&store);

    if config.audit_db.exists() {
        let conn = audit::open(&config.audit_db)?;
        println!("\n📜 Recent runs:");
        for run in audit::list_runs(&conn, 5)? {
            println!("   {} {}  {}", run.reconciled_at.format("%Y-%m-%d %H:%M"), run.run_id.get(..8).unwrap_or(&run.run_id), run.summary);
        }
    }
    Ok(())
}

fn print_stats(store: &Store) {
    let summary = DataQualityEngine::new().check_store(store).summary;

    println!("📊 Store Statistics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Creatures: {}", store.len());
    println!("Games:     {}", store.games.len());
    println!("Abilities: {}", store.abilities.len());
    println!("Missing ids below highest: {}", summary.missing_ids);

    println!("\nField group completion:");
    for (group, rate) in &summary.group_completion {
        println!("   {:<12} {:>5.1}%", group.name(), rate * 100.0);
    }

    println!("\nTypes:");
    for (type_name, count) in &summary.type_counts {
        println!("   {:<10} {}", type_name, count);
    }
}

fn run_show(config: &AppConfig, key: &str) -> Result<()> {
    let store = config.store_manager().load()?;
    let creature = Query::new(&store)
        .lookup(key)
        .ok_or_else(|| anyhow!("no creature matches '{}'", key))?;

    println!("{}", serde_json::to_string_pretty(creature)?);

    if config.audit_db.exists() {
        let conn = audit::open(&config.audit_db)?;
        let events = audit::get_events_for_creature(&conn, creature.id)?;
        println!("\n📜 History ({} event(s)):", events.len());
        for event in events {
            println!("   {} {}", event.timestamp.format("%Y-%m-%d %H:%M"), event.event_type);
        }
    }
    Ok(())
}
