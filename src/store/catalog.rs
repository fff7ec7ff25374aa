// src/store/catalog.rs
//! Read-only queries over the year tables of a bhav database.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use super::schema::YearTable;

/// Every `bhavcopy_<year>` table, oldest first.
pub fn year_tables(conn: &Connection) -> Result<Vec<YearTable>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'bhavcopy%'")
        .context("listing year tables")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables: Vec<YearTable> = names
        .iter()
        .filter_map(|n| YearTable::from_name(n))
        .collect();
    tables.sort();
    Ok(tables)
}

/// Smallest year that has a table.
pub fn earliest_imported_year(conn: &Connection) -> Result<Option<i32>> {
    Ok(year_tables(conn)?.first().map(|t| t.year()))
}

/// Latest trading day stored in any year table. A year table can exist
/// without rows (its only rows were rejected), so empty tables are skipped.
pub fn latest_imported_date(conn: &Connection) -> Result<Option<NaiveDate>> {
    for table in year_tables(conn)?.into_iter().rev() {
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT max(timestamp) FROM {}", table.name()),
                [],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("reading latest date from {}", table.name()))?
            .flatten();

        if let Some(s) = raw {
            let date = NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("bad stored date {:?} in {}", s, table.name()))?;
            return Ok(Some(date));
        }
    }
    Ok(None)
}

pub fn row_count(conn: &Connection, table: YearTable) -> Result<u64> {
    let count: i64 = conn
        .query_row(&format!("SELECT count(*) FROM {}", table.name()), [], |row| {
            row.get(0)
        })
        .with_context(|| format!("counting rows in {}", table.name()))?;
    Ok(count as u64)
}
