use std::env;

use anyhow::{anyhow, Context, Result};
use diesel_migrations::MigrationHarness;
use tracing_subscriber::EnvFilter;

use exam_requests::{
    config::AppConfig,
    db::{self, PgRequestStore},
    requests::{clear_category, RequestContext},
    storage::LocalDocumentStorage,
    MIGRATIONS,
};

const USAGE: &str = "Usage: maintenance migrate | clear-category <table> [--dry-run]";
const DRY_RUN_PREVIEW: usize = 10;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate()?,
        Some("clear-category") => {
            let rest: Vec<String> = args.collect();
            let dry_run = rest.iter().any(|arg| arg == "--dry-run");
            let table = rest
                .iter()
                .find(|arg| !arg.starts_with("--"))
                .ok_or_else(|| anyhow!("missing table name\n{USAGE}"))?;
            clear(table, dry_run)?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded backend configuration"
    );
    Ok(config)
}

fn migrate() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow!("failed to run migrations: {err}"))?;

    if applied.is_empty() {
        println!("Schema is up to date.");
    } else {
        for version in applied {
            println!("Applied migration {version}");
        }
    }
    Ok(())
}

fn clear(table: &str, dry_run: bool) -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let store = PgRequestStore::new(pool);
    let files = LocalDocumentStorage::new();
    let ctx = RequestContext::new(&store, &files, &config.document_roots);

    let report = clear_category(&ctx, table, dry_run)
        .with_context(|| format!("failed to clear {table}"))?;

    if dry_run {
        println!(
            "[dry-run] {} rows would be deleted from {table}.",
            report.deleted_rows
        );
        for dir in report.removed_dirs.iter().take(DRY_RUN_PREVIEW) {
            println!("[dry-run] would remove {}", dir.display());
        }
        if report.removed_dirs.len() > DRY_RUN_PREVIEW {
            println!(
                "[dry-run] ... and {} more directories.",
                report.removed_dirs.len() - DRY_RUN_PREVIEW
            );
        }
    } else {
        println!(
            "Deleted {} rows from {table}; removed {} directories ({} not found).",
            report.deleted_rows,
            report.removed_dirs.len(),
            report.missing_dirs.len()
        );
    }

    for protocol in &report.skipped_protocols {
        eprintln!("Skipped protocol {protocol:?}: not a directory name");
    }
    Ok(())
}
