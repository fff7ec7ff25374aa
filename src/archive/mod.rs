// src/archive/mod.rs
use anyhow::{Context, Result};
use chrono::Utc;
use glob::{glob, Pattern};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::audit::{AuditEntry, AuditLog};

mod rows;

pub use rows::{CsvRows, Row};

/// File-name convention of NSE equity bhav copy archives.
pub const ARCHIVE_PATTERN: &str = "cm*bhav.csv.zip";

/// Upper bound on the buffer reserved up front for a CSV payload.
const PREALLOC_LIMIT: u64 = 64 << 20;

/// Why an archive (or the rest of it) was skipped.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("bad zip file: {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("csv file not found in zip: {} ({entries} entries)", .path.display())]
    CsvNotFound { path: PathBuf, entries: usize },

    #[error("unreadable csv payload in {}: {reason}", .path.display())]
    Payload { path: PathBuf, reason: String },
}

impl ArchiveError {
    /// Stable label written to the audit log.
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::Unreadable { .. } => "bad_archive",
            ArchiveError::CsvNotFound { .. } => "csv_not_found",
            ArchiveError::Payload { .. } => "bad_payload",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ArchiveError::Unreadable { path, .. }
            | ArchiveError::CsvNotFound { path, .. }
            | ArchiveError::Payload { path, .. } => path,
        }
    }

    fn unreadable(path: &Path, reason: impl ToString) -> Self {
        ArchiveError::Unreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// List the bhav archives directly inside `dir` (no recursion), sorted.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        anyhow::bail!(
            "archive dir `{}` does not exist or is not a directory",
            dir.display()
        );
    }
    let base = dir
        .to_str()
        .with_context(|| format!("archive dir {:?} is not valid UTF-8", dir))?;
    let pattern = format!("{}/{}", Pattern::escape(base), ARCHIVE_PATTERN);

    let mut archives = Vec::new();
    for entry in glob(&pattern).context("invalid glob pattern for archive scan")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot read glob entry: {:?}", e);
                continue;
            }
        };
        if path.is_file() {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}

/// Open `zip_path`, check it holds exactly one `.csv` entry, and return a
/// lazy iterator over that CSV's rows.
#[tracing::instrument(level = "debug", skip(zip_path), fields(path = %zip_path.as_ref().display()))]
pub fn read_archive(zip_path: impl AsRef<Path>) -> Result<CsvRows, ArchiveError> {
    let zip_path = zip_path.as_ref();

    // 1) Open the container
    let file = File::open(zip_path).map_err(|e| ArchiveError::unreadable(zip_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| ArchiveError::unreadable(zip_path, e))?;

    // 2) Exactly one entry, and it must be a CSV
    if archive.len() != 1 {
        return Err(ArchiveError::CsvNotFound {
            path: zip_path.to_path_buf(),
            entries: archive.len(),
        });
    }
    let mut entry = archive
        .by_index(0)
        .map_err(|e| ArchiveError::unreadable(zip_path, e))?;
    if !entry.is_file() || !entry.name().ends_with(".csv") {
        return Err(ArchiveError::CsvNotFound {
            path: zip_path.to_path_buf(),
            entries: 1,
        });
    }
    debug!(entry = entry.name(), size = entry.size(), "found csv entry");

    // 3) Buffer and decode the payload; rows are parsed lazily from here
    // declared size is untrusted; cap the reservation
    let mut buf = Vec::with_capacity(entry.size().min(PREALLOC_LIMIT) as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| ArchiveError::unreadable(zip_path, e))?;
    let text = String::from_utf8(buf).map_err(|e| ArchiveError::Payload {
        path: zip_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    CsvRows::new(zip_path.to_path_buf(), text)
}

/// Reads archives one at a time and records every failed archive in its
/// audit log instead of returning it to the caller.
pub struct ArchiveReader {
    log: AuditLog,
}

impl ArchiveReader {
    pub fn new(log: AuditLog) -> Self {
        Self { log }
    }

    /// Open a reader whose audit log lives at `log_path` (truncated).
    pub fn open(log_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(AuditLog::create(log_path)?))
    }

    pub fn discover(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        discover(dir)
    }

    /// `Ok(None)` means the archive was skipped and logged. `Err` is only
    /// returned when the audit log itself cannot be written.
    pub fn read(&mut self, zip_path: impl AsRef<Path>) -> Result<Option<CsvRows>> {
        let zip_path = zip_path.as_ref();
        info!("Doing file: {}", zip_path.display());
        match read_archive(zip_path) {
            Ok(rows) => Ok(Some(rows)),
            Err(err) => {
                self.record_failure(&err)?;
                Ok(None)
            }
        }
    }

    pub fn record_failure(&mut self, err: &ArchiveError) -> Result<()> {
        warn!(kind = err.kind(), "{}", err);
        self.log.record(&AuditEntry::Archive {
            error: err.kind().to_string(),
            message: err.to_string(),
            archive: err.path().display().to_string(),
            at: Utc::now(),
        })
    }

    /// Archive failures recorded so far.
    pub fn failures(&self) -> usize {
        self.log.entries()
    }

    pub fn close(self) -> Result<()> {
        self.log.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,bhavstore::archive=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn write_zip(dir: &TempDir, name: &str, entries: &[(&str, &str)]) -> Result<PathBuf> {
        let path = dir.path().join(name);
        let mut zip = zip::ZipWriter::new(File::create(&path)?);
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (entry, content) in entries {
            zip.start_file(*entry, options)?;
            zip.write_all(content.as_bytes())?;
        }
        zip.finish()?;
        Ok(path)
    }

    const CSV: &str = "SYMBOL,SERIES,OPEN,HIGH,LOW,CLOSE,LAST,PREVCLOSE,TOTTRDQTY,TOTTRDVAL,TIMESTAMP,\n\
ABB,EQ,10,11,9,10.5,10.5,10,100,1050,03-NOV-1994,\n\
ACC,EQ,5,6,4,5,5,5,10,50,03-NOV-1994,\n";

    fn log_kinds(path: &Path) -> Result<Vec<String>> {
        let text = fs::read_to_string(path)?;
        text.lines()
            .map(|l| -> Result<String> {
                let v: serde_json::Value = serde_json::from_str(l)?;
                Ok(v["error"].as_str().unwrap_or_default().to_string())
            })
            .collect()
    }

    #[test]
    fn discover_matches_naming_convention_only() -> Result<()> {
        let dir = tempdir()?;
        write_zip(&dir, "cm04NOV1994bhav.csv.zip", &[("a.csv", CSV)])?;
        write_zip(&dir, "cm03NOV1994bhav.csv.zip", &[("a.csv", CSV)])?;
        write_zip(&dir, "fo03NOV1994bhav.csv.zip", &[("a.csv", CSV)])?;
        fs::write(dir.path().join("cm03NOV1994bhav.csv"), CSV)?;
        fs::create_dir(dir.path().join("nested"))?;
        write_zip(&dir, "nested/cm05NOV1994bhav.csv.zip", &[("a.csv", CSV)])?;

        let found: Vec<String> = discover(dir.path())?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(found, vec!["cm03NOV1994bhav.csv.zip", "cm04NOV1994bhav.csv.zip"]);
        Ok(())
    }

    #[test]
    fn discover_rejects_missing_dir() {
        assert!(discover("/definitely/not/here").is_err());
    }

    #[test]
    fn reads_rows_from_single_csv() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = write_zip(&dir, "cm03NOV1994bhav.csv.zip", &[("cm03NOV1994bhav.csv", CSV)])?;

        let rows = read_archive(&path)?;
        assert_eq!(rows.archive_id(), "cm03NOV1994bhav.csv.zip");
        let rows: Vec<Row> = rows.collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("SYMBOL"), Some("ABB"));
        assert_eq!(rows[1].get("TOTTRDVAL"), Some("50"));
        Ok(())
    }

    #[test]
    fn wrong_member_count_or_type_is_csv_not_found() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let empty = write_zip(&dir, "cm01bhav.csv.zip", &[])?;
        let two = write_zip(&dir, "cm02bhav.csv.zip", &[("a.csv", CSV), ("b.csv", CSV)])?;
        let txt = write_zip(&dir, "cm03bhav.csv.zip", &[("a.txt", CSV)])?;

        let log_path = dir.path().join("logs/archives.log");
        let mut reader = ArchiveReader::open(&log_path)?;
        for path in [&empty, &two, &txt] {
            assert!(reader.read(path)?.is_none());
        }
        assert_eq!(reader.failures(), 3);
        reader.close()?;

        assert_eq!(
            log_kinds(&log_path)?,
            vec!["csv_not_found", "csv_not_found", "csv_not_found"]
        );
        Ok(())
    }

    #[test]
    fn corrupt_container_is_logged_not_fatal() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let bad = dir.path().join("cm03NOV1994bhav.csv.zip");
        fs::write(&bad, b"this is not a zip file")?;

        assert!(matches!(
            read_archive(&bad),
            Err(ArchiveError::Unreadable { .. })
        ));

        let log_path = dir.path().join("archives.log");
        let mut reader = ArchiveReader::open(&log_path)?;
        assert!(reader.read(&bad)?.is_none());
        reader.close()?;
        assert_eq!(log_kinds(&log_path)?, vec!["bad_archive"]);
        Ok(())
    }

    /// Rewrite the central directory so its only entry claims 2^62 bytes,
    /// compressed and uncompressed, through the zip64 extra field.
    fn claim_huge_size(bytes: &mut [u8]) {
        let cd = bytes
            .windows(4)
            .rposition(|w| w == b"PK\x01\x02")
            .expect("central directory header");
        // 32-bit sizes set to the zip64 marker
        bytes[cd + 20..cd + 28].fill(0xff);
        let name_len = u16::from_le_bytes([bytes[cd + 28], bytes[cd + 29]]) as usize;
        let extra = cd + 46 + name_len;
        assert_eq!(&bytes[extra..extra + 2], &[0x01, 0x00], "zip64 extra field first");
        let huge = (1u64 << 62).to_le_bytes();
        bytes[extra + 4..extra + 12].copy_from_slice(&huge);
        bytes[extra + 12..extra + 20].copy_from_slice(&huge);
    }

    #[test]
    fn lying_zip64_size_is_logged_not_allocated() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("cm03NOV1994bhav.csv.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&path)?);
            let options: FileOptions<'_, ()> = FileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .large_file(true);
            zip.start_file("cm03NOV1994bhav.csv", options)?;
            zip.write_all(CSV.as_bytes())?;
            zip.finish()?;
        }
        let mut bytes = fs::read(&path)?;
        claim_huge_size(&mut bytes);
        fs::write(&path, &bytes)?;

        assert!(matches!(
            read_archive(&path),
            Err(ArchiveError::Unreadable { .. })
        ));

        let log_path = dir.path().join("archives.log");
        let mut reader = ArchiveReader::open(&log_path)?;
        assert!(reader.read(&path)?.is_none());
        reader.close()?;
        assert_eq!(log_kinds(&log_path)?, vec!["bad_archive"]);
        Ok(())
    }

    #[test]
    fn upper_case_csv_suffix_is_not_a_csv() -> Result<()> {
        let dir = tempdir()?;
        let path = write_zip(&dir, "cm03NOV1994bhav.csv.zip", &[("CM03NOV1994BHAV.CSV", CSV)])?;
        assert!(matches!(
            read_archive(&path),
            Err(ArchiveError::CsvNotFound { entries: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn invalid_utf8_payload_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cm03NOV1994bhav.csv.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&path)?);
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("a.csv", options)?;
            zip.write_all(&[0xff, 0xfe, b',', b'\n'])?;
            zip.finish()?;
        }
        assert!(matches!(
            read_archive(&path),
            Err(ArchiveError::Payload { .. })
        ));
        Ok(())
    }
}
