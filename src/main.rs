use anyhow::{Context, Result};
use bhavstore::{audit, import, ArchiveReader, AuditLog, BhavStore, Config};
use std::{env, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();

    // ─── 2) arguments & config ───────────────────────────────────────
    let archive_dir: PathBuf = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: bhavstore <ARCHIVE_DIR>")?;
    let config = Config::from_env();
    info!(db = %config.db_path.display(), logs = %config.log_dir.display(), "startup");

    // ─── 3) open the store session and the archive reader ────────────
    // both logs are truncated here; a failure in either aborts before any import
    let mut store = BhavStore::open(&config.db_path, AuditLog::create(config.row_log_path())?)?;
    let mut reader = ArchiveReader::open(config.archive_log_path())?;

    // ─── 4) import, then release both on every path ──────────────────
    let outcome = import::run(&archive_dir, &mut reader, &mut store);
    let reader_closed = reader.close();
    let store_closed = store.close();
    let summary = outcome?;
    reader_closed?;
    store_closed?;

    info!("{}", summary);
    println!("all done!");

    // ─── 5) point the operator at anything that was discarded ────────
    for log in audit::non_empty_logs(&config.log_dir)? {
        println!(
            "Log {} seems to have some stuff in it. You might want to check if errors happened",
            log.display()
        );
    }

    Ok(())
}
