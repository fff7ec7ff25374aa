// src/import.rs
use anyhow::Result;
use std::{fmt, path::Path, time::Instant};
use tracing::info;

use crate::archive::ArchiveReader;
use crate::store::{BhavStore, InsertOutcome};

/// Counters for one pass over an archive directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub archives: usize,
    /// Archive-level audit entries: skipped archives plus archives whose CSV
    /// broke part-way through.
    pub archive_errors: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl ImportSummary {
    fn count(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::DuplicateIgnored => self.duplicates += 1,
            InsertOutcome::LoggedError => self.rejected += 1,
        }
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} archives ({} with errors): {} inserted, {} duplicates ignored, {} rejected",
            self.archives, self.archive_errors, self.inserted, self.duplicates, self.rejected
        )
    }
}

/// Feed every row of every bhav archive in `archive_dir` to `store`.
///
/// Archive and row failures are logged by `reader` and `store` and never stop
/// the run. `Err` is reserved for setup problems (missing directory) and for
/// audit logs that cannot be written.
#[tracing::instrument(level = "info", skip(archive_dir, reader, store), fields(dir = %archive_dir.as_ref().display()))]
pub fn run(
    archive_dir: impl AsRef<Path>,
    reader: &mut ArchiveReader,
    store: &mut BhavStore,
) -> Result<ImportSummary> {
    let start = Instant::now();
    let archives = reader.discover(archive_dir.as_ref())?;
    info!("{} archives to import", archives.len());

    let mut summary = ImportSummary::default();
    for path in archives {
        summary.archives += 1;
        let Some(rows) = reader.read(&path)? else {
            summary.archive_errors += 1;
            continue;
        };

        let archive_id = rows.archive_id().to_string();
        for row in rows {
            match row {
                Ok(row) => summary.count(store.insert(&row, &archive_id)?),
                Err(err) => {
                    reader.record_failure(&err)?;
                    summary.archive_errors += 1;
                    break;
                }
            }
        }
    }

    info!(elapsed = ?start.elapsed(), "{}", summary);
    Ok(summary)
}
