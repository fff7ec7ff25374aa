pub mod archive;
pub mod audit;
pub mod config;
pub mod import;
pub mod store;

pub use archive::{ArchiveError, ArchiveReader, CsvRows, Row};
pub use audit::{AuditEntry, AuditLog};
pub use config::Config;
pub use import::ImportSummary;
pub use store::{BhavStore, InsertOutcome, RowError};
