// src/audit.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::{glob, Pattern};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::error;

/// One line of an audit log: something the importer discarded and an
/// operator may want to look at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    /// A whole archive was skipped (or cut short).
    Archive {
        error: String,
        message: String,
        archive: String,
        at: DateTime<Utc>,
    },
    /// A single row was rejected by the store.
    Row {
        error: String,
        message: String,
        symbol: String,
        series: String,
        timestamp: String,
        archive: String,
        at: DateTime<Utc>,
    },
}

/// Append-only JSON-lines log, truncated when opened.
///
/// Call [`AuditLog::close`] to flush and surface I/O errors; dropping the log
/// flushes on a best-effort basis.
pub struct AuditLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    entries: usize,
}

impl AuditLog {
    /// Create (or truncate) the log at `path`, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {:?}", parent))?;
        }
        let file =
            File::create(&path).with_context(|| format!("opening audit log {:?}", &path))?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            entries: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written since the log was opened.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn record(&mut self, entry: &AuditEntry) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .with_context(|| format!("audit log {:?} already closed", self.path))?;
        serde_json::to_writer(&mut *writer, entry)
            .with_context(|| format!("writing entry to {:?}", self.path))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("writing entry to {:?}", self.path))?;
        self.entries += 1;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("flushing audit log {:?}", self.path))?;
        }
        Ok(())
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                error!(path = %self.path.display(), "failed to flush audit log: {}", e);
            }
        }
    }
}

/// Every `*.log` directly under `dir` that has content. An empty vector means
/// the last run discarded nothing.
pub fn non_empty_logs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let base = dir
        .to_str()
        .with_context(|| format!("log directory {:?} is not valid UTF-8", dir))?;
    let pattern = format!("{}/*.log", Pattern::escape(base));

    let mut logs = Vec::new();
    for entry in glob(&pattern).context("invalid glob pattern for log scan")? {
        let path = entry?;
        let len = fs::metadata(&path)
            .with_context(|| format!("reading metadata for {:?}", path))?
            .len();
        if len > 0 {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn archive_entry(name: &str) -> AuditEntry {
        AuditEntry::Archive {
            error: "bad_archive".into(),
            message: "bad zip file".into(),
            archive: name.into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn writes_one_json_object_per_line() -> Result<()> {
        let dir = tempdir()?;
        let mut log = AuditLog::create(dir.path().join("nested/archives.log"))?;
        log.record(&archive_entry("cm01JAN2001bhav.csv.zip"))?;
        log.record(&archive_entry("cm02JAN2001bhav.csv.zip"))?;
        assert_eq!(log.entries(), 2);
        let path = log.path().to_path_buf();
        log.close()?;

        let text = fs::read_to_string(path)?;
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(serde_json::from_str::<serde_json::Value>)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "archive");
        assert_eq!(lines[1]["archive"], "cm02JAN2001bhav.csv.zip");
        Ok(())
    }

    #[test]
    fn reopening_truncates_previous_run() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rows.log");
        {
            let mut log = AuditLog::create(&path)?;
            log.record(&archive_entry("a.zip"))?;
            // dropped without close: Drop still flushes
        }
        assert!(fs::metadata(&path)?.len() > 0);

        AuditLog::create(&path)?.close()?;
        assert_eq!(fs::metadata(&path)?.len(), 0);
        Ok(())
    }

    #[test]
    fn non_empty_logs_skips_empty_and_other_files() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("archives.log"), "")?;
        fs::write(dir.path().join("rows.log"), "{}\n")?;
        fs::write(dir.path().join("notes.txt"), "not a log")?;

        let logs = non_empty_logs(dir.path())?;
        assert_eq!(logs, vec![dir.path().join("rows.log")]);

        assert!(non_empty_logs(dir.path().join("missing"))?.is_empty());
        Ok(())
    }
}
