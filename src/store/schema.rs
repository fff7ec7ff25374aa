// src/store/schema.rs
//! Year-table layouts. Column lists are fixed per variant; input field names
//! are only ever matched against them, never spliced into SQL.

use once_cell::sync::Lazy;
use regex::Regex;

pub const TABLE_PREFIX: &str = "bhavcopy_";

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bhavcopy_([0-9]{4})$").expect("table name regex is valid"));

/// First year whose files carry `TOTALTRADES` and `ISIN`.
pub const EXTENDED_FROM_YEAR: i32 = 2011;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name; also the CSV header it is filled from (case-insensitive).
    pub name: &'static str,
    pub definition: &'static str,
}

const fn col(name: &'static str, definition: &'static str) -> Column {
    Column { name, definition }
}

const CLASSIC: &[Column] = &[
    col("symbol", "TEXT NOT NULL CHECK (length(symbol) BETWEEN 1 AND 15)"),
    col("series", "TEXT NOT NULL CHECK (length(series) <= 2)"),
    col("open", "REAL"),
    col("high", "REAL"),
    col("low", "REAL"),
    col("close", "REAL"),
    col("last", "REAL"),
    col("prevclose", "REAL"),
    col("tottrdqty", "INTEGER CHECK (tottrdqty >= 0)"),
    col("tottrdval", "REAL CHECK (tottrdval >= 0)"),
    col("timestamp", "TEXT NOT NULL CHECK (timestamp = date(timestamp))"),
];

const EXTENDED: &[Column] = &[
    col("symbol", "TEXT NOT NULL CHECK (length(symbol) BETWEEN 1 AND 15)"),
    col("series", "TEXT NOT NULL CHECK (length(series) <= 2)"),
    col("open", "REAL"),
    col("high", "REAL"),
    col("low", "REAL"),
    col("close", "REAL"),
    col("last", "REAL"),
    col("prevclose", "REAL"),
    col("tottrdqty", "INTEGER CHECK (tottrdqty >= 0)"),
    col("tottrdval", "REAL CHECK (tottrdval >= 0)"),
    col("totaltrades", "INTEGER DEFAULT NULL CHECK (totaltrades >= 0)"),
    col("isin", "TEXT DEFAULT NULL CHECK (length(isin) <= 12)"),
    col("timestamp", "TEXT NOT NULL CHECK (timestamp = date(timestamp))"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// 1994–2010 layout.
    Classic,
    /// 2011 onwards, with `totaltrades` and `isin`.
    Extended,
}

impl SchemaVariant {
    pub fn for_year(year: i32) -> Self {
        if year >= EXTENDED_FROM_YEAR {
            SchemaVariant::Extended
        } else {
            SchemaVariant::Classic
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            SchemaVariant::Classic => CLASSIC,
            SchemaVariant::Extended => EXTENDED,
        }
    }
}

/// A `bhavcopy_<year>` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearTable {
    year: i32,
}

impl YearTable {
    /// Only four-digit years name a table.
    pub fn new(year: i32) -> Option<Self> {
        (1000..=9999).contains(&year).then_some(Self { year })
    }

    /// Parse a table name such as `bhavcopy_1994`.
    pub fn from_name(name: &str) -> Option<Self> {
        let caps = TABLE_NAME.captures(name)?;
        Self::new(caps[1].parse().ok()?)
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn name(self) -> String {
        format!("{}{}", TABLE_PREFIX, self.year)
    }

    pub fn variant(self) -> SchemaVariant {
        SchemaVariant::for_year(self.year)
    }

    pub fn create_sql(self) -> String {
        let columns: Vec<String> = self
            .variant()
            .columns()
            .iter()
            .map(|c| format!("    {} {}", c.name, c.definition))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{},\n    PRIMARY KEY (symbol, series, timestamp)\n) STRICT",
            self.name(),
            columns.join(",\n")
        )
    }

    pub fn insert_sql(self) -> String {
        let columns = self.variant().columns();
        let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name(),
            names.join(", "),
            params.join(", ")
        )
    }

    pub fn key_lookup_sql(self) -> String {
        format!(
            "SELECT symbol, series, timestamp FROM {} \
             WHERE symbol = ?1 AND series = ?2 AND timestamp = ?3",
            self.name()
        )
    }
}
