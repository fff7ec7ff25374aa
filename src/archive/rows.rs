// src/archive/rows.rs
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use std::{io::Cursor, path::PathBuf};

use super::ArchiveError;

/// One CSV data line as an ordered `header → value` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    /// Look up a field by name, ignoring ASCII case. Fields with an empty
    /// name never match.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| !field.trim().is_empty() && field.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn from_record(headers: &StringRecord, record: &StringRecord) -> Self {
        Self {
            fields: headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Lazy, single-pass iterator over the data rows of one archive's CSV.
///
/// The payload is held in memory; records are parsed as they are pulled.
/// After the first `Err` the iterator is fused.
pub struct CsvRows {
    archive_id: String,
    path: PathBuf,
    headers: StringRecord,
    records: StringRecordsIntoIter<Cursor<String>>,
    done: bool,
}

impl CsvRows {
    pub(super) fn new(path: PathBuf, text: String) -> Result<Self, ArchiveError> {
        let archive_id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(Cursor::new(text));
        let headers = rdr
            .headers()
            .map_err(|e| ArchiveError::Payload {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .clone();

        Ok(Self {
            archive_id,
            path,
            headers,
            records: rdr.into_records(),
            done: false,
        })
    }

    /// File name of the source archive, used to attribute rejected rows.
    pub fn archive_id(&self) -> &str {
        &self.archive_id
    }
}

impl Iterator for CsvRows {
    type Item = Result<Row, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // blank lines never reach us: the csv reader skips them
        match self.records.next()? {
            Ok(record) => Some(Ok(Row::from_record(&self.headers, &record))),
            Err(e) => {
                self.done = true;
                Some(Err(ArchiveError::Payload {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }))
            }
        }
    }
}
