// src/store/mod.rs
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::{collections::HashSet, path::Path};
use tracing::{debug, info};

use crate::archive::Row;
use crate::audit::{AuditEntry, AuditLog};

pub mod catalog;
pub mod date;
mod error;
pub mod schema;

pub use date::{normalize_timestamp, TimestampError, FIRST_BHAV_DATE};
pub use error::RowError;
pub use schema::{SchemaVariant, YearTable};

use error::{classify, Failure};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Terminal state of one `insert` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The row's key is already stored: an earlier import of the same data.
    DuplicateIgnored,
    /// Rejected and written to the row audit log.
    LoggedError,
}

/// Natural key of a bhav row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    pub symbol: String,
    pub series: String,
    pub date: NaiveDate,
}

/// A session on the bhav database: the connection, the cache of year tables
/// known to exist, and the audit log for rejected rows.
///
/// Close with [`BhavStore::close`]. If the session is dropped instead (for
/// example on an early `?`), the connection is closed and the log flushed by
/// their own destructors.
pub struct BhavStore {
    conn: Connection,
    known_tables: HashSet<YearTable>,
    log: AuditLog,
}

impl BhavStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>, log: AuditLog) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {:?}", parent))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening bhav database {:?}", db_path))?;
        Self::with_connection(conn, log)
    }

    pub fn open_in_memory(log: AuditLog) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, log)
    }

    fn with_connection(conn: Connection, log: AuditLog) -> Result<Self> {
        // every row commits on its own; WAL keeps that affordable
        let journal: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))
            .context("configuring bhav database")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("configuring bhav database")?;
        debug!(journal = %journal, "journal mode");
        let known_tables: HashSet<YearTable> = catalog::year_tables(&conn)?.into_iter().collect();
        info!(tables = known_tables.len(), "opened bhav store");
        Ok(Self {
            conn,
            known_tables,
            log,
        })
    }

    /// Insert one row from `archive_id`. Rejections are logged and reported
    /// as [`InsertOutcome::LoggedError`]; `Err` means the audit log could not
    /// be written.
    #[tracing::instrument(level = "trace", skip(self, row), fields(symbol = row.get("SYMBOL")))]
    pub fn insert(&mut self, row: &Row, archive_id: &str) -> Result<InsertOutcome> {
        match self.try_insert(row) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.log_rejection(row, &err, archive_id)?;
                Ok(InsertOutcome::LoggedError)
            }
        }
    }

    fn try_insert(&mut self, row: &Row) -> Result<InsertOutcome, RowError> {
        let raw_ts = required(row, "TIMESTAMP")?;
        let symbol = required(row, "SYMBOL")?;
        let series = required(row, "SERIES")?;

        // 1) Target table from the year digits
        let year = date::year_of(raw_ts)?;
        let table = YearTable::new(year)
            .ok_or_else(|| TimestampError::new(raw_ts, "year out of range"))?;

        // 2) Create it the first time we see the year
        self.ensure_table(table)?;

        // 3) DD-MON-YYYY -> date
        let key = RowKey {
            symbol: symbol.to_string(),
            series: series.to_string(),
            date: normalize_timestamp(raw_ts)?,
        };
        let date_text = key.date.format(DATE_FORMAT).to_string();

        // 4) Bind every column of the variant; absent or blank fields are NULL
        let values: Vec<Option<&str>> = table
            .variant()
            .columns()
            .iter()
            .map(|c| {
                if c.name == "timestamp" {
                    Some(date_text.as_str())
                } else {
                    row.get(c.name).filter(|v| !v.trim().is_empty())
                }
            })
            .collect();

        let result = self
            .conn
            .prepare_cached(&table.insert_sql())
            .and_then(|mut stmt| stmt.execute(params_from_iter(values.iter())));

        // 5) A key clash with our own key is the expected re-import
        match result.map_err(classify) {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(Failure::UniqueViolation(msg)) => match self.conflicting_key(table, &key)? {
                Some(stored) if stored == key => Ok(InsertOutcome::DuplicateIgnored),
                _ => Err(RowError::Duplicate(msg)),
            },
            Err(Failure::Rejected(err)) => Err(err),
        }
    }

    fn ensure_table(&mut self, table: YearTable) -> Result<(), RowError> {
        if self.known_tables.contains(&table) {
            return Ok(());
        }
        self.conn
            .execute(&table.create_sql(), [])
            .map_err(|e| RowError::Store(e.to_string()))?;
        info!(table = %table.name(), variant = ?table.variant(), "created year table");
        self.known_tables.insert(table);
        Ok(())
    }

    /// The stored key that blocks `key`, if any.
    fn conflicting_key(&self, table: YearTable, key: &RowKey) -> Result<Option<RowKey>, RowError> {
        let stored = self
            .conn
            .query_row(
                &table.key_lookup_sql(),
                params![key.symbol, key.series, key.date.format(DATE_FORMAT).to_string()],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| RowError::Store(e.to_string()))?;

        stored
            .map(|(symbol, series, ts)| -> Result<RowKey, RowError> {
                let date = NaiveDate::parse_from_str(&ts, DATE_FORMAT)
                    .map_err(|e| RowError::Store(format!("stored timestamp {:?}: {}", ts, e)))?;
                Ok(RowKey {
                    symbol,
                    series,
                    date,
                })
            })
            .transpose()
    }

    fn log_rejection(&mut self, row: &Row, err: &RowError, archive_id: &str) -> Result<()> {
        let field = |name| row.get(name).unwrap_or_default().to_string();
        debug!(kind = err.kind(), archive = archive_id, "row rejected: {}", err);
        self.log.record(&AuditEntry::Row {
            error: err.kind().to_string(),
            message: err.to_string(),
            symbol: field("SYMBOL"),
            series: field("SERIES"),
            timestamp: field("TIMESTAMP"),
            archive: archive_id.to_string(),
            at: Utc::now(),
        })
    }

    /// Rows rejected so far in this session.
    pub fn rejected(&self) -> usize {
        self.log.entries()
    }

    pub fn known_tables(&self) -> impl Iterator<Item = YearTable> + '_ {
        self.known_tables.iter().copied()
    }

    pub fn year_tables(&self) -> Result<Vec<YearTable>> {
        catalog::year_tables(&self.conn)
    }

    pub fn earliest_imported_year(&self) -> Result<Option<i32>> {
        catalog::earliest_imported_year(&self.conn)
    }

    pub fn latest_imported_date(&self) -> Result<Option<NaiveDate>> {
        catalog::latest_imported_date(&self.conn)
    }

    pub fn row_count(&self, table: YearTable) -> Result<u64> {
        catalog::row_count(&self.conn, table)
    }

    /// Flush the audit log and close the connection.
    pub fn close(self) -> Result<()> {
        let BhavStore { conn, log, .. } = self;
        let logged = log.close();
        conn.close()
            .map_err(|(_, e)| e)
            .context("closing bhav database")?;
        logged
    }
}

fn required<'r>(row: &'r Row, name: &'static str) -> Result<&'r str, RowError> {
    row.get(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(RowError::MissingField(name))
}
