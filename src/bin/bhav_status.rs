//! bhav_status.rs: summarize what a bhav database already holds.
//!
//! Prints one line per year table with its row count, then the earliest
//! imported year and the latest imported trading day, so it is easy to see
//! which archives still need fetching. Never creates a database.

use anyhow::{Context, Result};
use bhavstore::store::{catalog, FIRST_BHAV_DATE};
use bhavstore::Config;
use rusqlite::{Connection, OpenFlags};
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    // optional first argument overrides BHAV_DB_PATH
    let db_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Config::from_env().db_path);

    // no CREATE: a mistyped path must fail. Not READ_ONLY: WAL needs its -shm file
    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_WRITE)
        .with_context(|| format!("opening {}", db_path.display()))?;

    let tables = catalog::year_tables(&conn)?;
    if tables.is_empty() {
        println!("{}: no year tables yet", db_path.display());
        println!("first bhav copy date: {}", FIRST_BHAV_DATE);
        return Ok(());
    }

    println!("\n{: <20} {:>12}", "Table", "Rows");
    println!("{:-<33}", "");
    let mut total = 0u64;
    for table in &tables {
        let rows = catalog::row_count(&conn, *table)?;
        total += rows;
        println!("{: <20} {:>12}", table.name(), rows);
    }
    println!("{:-<33}", "");
    println!("{: <20} {:>12}\n", "total", total);

    let earliest = catalog::earliest_imported_year(&conn)?;
    let latest = catalog::latest_imported_date(&conn)?;
    println!("first bhav copy date:   {}", FIRST_BHAV_DATE);
    println!(
        "earliest imported year: {}",
        earliest.map_or_else(|| "-".to_string(), |y| y.to_string())
    );
    println!(
        "latest imported date:   {}",
        latest.map_or_else(|| "-".to_string(), |d| d.to_string())
    );

    Ok(())
}
