// src/store/error.rs
use rusqlite::{ffi, ErrorCode};

use super::date::TimestampError;

/// Why a row was rejected. Every variant is logged and skipped; none stops
/// the run.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    BadTimestamp(#[from] TimestampError),

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("duplicate entry for a different key: {0}")]
    Duplicate(String),

    #[error("data type error: {0}")]
    DataType(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store error: {0}")]
    Store(String),
}

impl RowError {
    /// Stable label written to the audit log.
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::BadTimestamp(_) => "bad_timestamp_year",
            RowError::MissingField(_) => "missing_field",
            RowError::Duplicate(_) => "duplicate_mismatch",
            RowError::DataType(_) => "data_type",
            RowError::Constraint(_) => "constraint",
            RowError::Store(_) => "store",
        }
    }
}

/// How the engine rejected a statement.
#[derive(Debug)]
pub(crate) enum Failure {
    /// Primary-key or unique violation; the caller decides whether it is the
    /// expected re-import.
    UniqueViolation(String),
    Rejected(RowError),
}

/// Sort a rusqlite error by its extended result code.
pub(crate) fn classify(err: rusqlite::Error) -> Failure {
    match err {
        rusqlite::Error::SqliteFailure(ffi_err, msg)
            if ffi_err.code == ErrorCode::ConstraintViolation =>
        {
            let msg = msg.unwrap_or_else(|| ffi_err.to_string());
            match ffi_err.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    Failure::UniqueViolation(msg)
                }
                ffi::SQLITE_CONSTRAINT_DATATYPE => Failure::Rejected(RowError::DataType(msg)),
                _ => Failure::Rejected(RowError::Constraint(msg)),
            }
        }
        rusqlite::Error::SqliteFailure(ffi_err, msg) if ffi_err.code == ErrorCode::TypeMismatch => {
            Failure::Rejected(RowError::DataType(
                msg.unwrap_or_else(|| ffi_err.to_string()),
            ))
        }
        other => Failure::Rejected(RowError::Store(other.to_string())),
    }
}
