//! Scans an input location for JSON-lines files and parses them into typed records.
//!
//! Listing or fetching failures abort the scan with `SourceUnavailable`. A line
//! that does not parse or misses a required field is logged as a
//! `MalformedRecord` and dropped; the rest of the file is still read.

use crate::models::SourceRecord;
use crate::storage::StorageLocation;
use common::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use glob::{MatchOptions, Pattern};
use object_store::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A parsed record together with where it came from.
#[derive(Debug, Clone)]
pub struct SourceRow<T> {
    pub file: Arc<str>,
    /// 1-based line number within `file`.
    pub line: usize,
    pub record: T,
}

/// Records parsed from one file.
#[derive(Debug)]
pub struct ParsedFile<T> {
    pub rows: Vec<SourceRow<T>>,
    pub malformed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub files: usize,
    pub records: usize,
    pub malformed: usize,
}

pub struct RecordReader {
    location: StorageLocation,
    concurrency: usize,
}

impl RecordReader {
    pub fn new(location: StorageLocation, concurrency: usize) -> Self {
        Self {
            location,
            concurrency: concurrency.max(1),
        }
    }

    /// Lists files under the root whose relative path matches `pattern`.
    pub async fn list(&self, pattern: &str) -> Result<Vec<Path>> {
        let matcher = Pattern::new(pattern)
            .map_err(|e| Error::InvalidInput(format!("Invalid file pattern '{}': {}", pattern, e)))?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::default()
        };

        let list_prefix = self.location.join(literal_prefix(pattern));
        let objects: Vec<_> = self
            .location
            .store
            .list(Some(&list_prefix))
            .try_collect()
            .await
            .map_err(|e| Error::source_unavailable(self.location.url_for(&list_prefix), e))?;

        let mut files: Vec<Path> = objects
            .into_iter()
            .map(|meta| meta.location)
            .filter(|path| {
                self.location
                    .relative(path)
                    .is_some_and(|rel| matcher.matches_with(&rel, options))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::source_unavailable(
                self.location.url_for(&list_prefix),
                format!("no files match '{}'", pattern),
            ));
        }

        debug!(pattern, count = files.len(), "Listed input files");
        Ok(files)
    }

    /// Streams parsed files in listing order, fetching up to `concurrency` at once.
    pub fn scan<'a, T: SourceRecord>(
        &'a self,
        files: Vec<Path>,
    ) -> BoxStream<'a, Result<ParsedFile<T>>> {
        stream::iter(files)
            .map(move |path| self.read_file::<T>(path))
            .buffered(self.concurrency)
            .boxed()
    }

    /// Lists every file matching `pattern` and hands each one to `on_file` as
    /// soon as it is parsed. Only the files in flight are held in memory.
    pub async fn for_each_file<T, F>(&self, pattern: &str, mut on_file: F) -> Result<ScanReport>
    where
        T: SourceRecord,
        F: FnMut(ParsedFile<T>) -> Result<()>,
    {
        let files = self.list(pattern).await?;
        let mut report = ScanReport {
            files: files.len(),
            ..ScanReport::default()
        };

        let mut parsed = self.scan::<T>(files);
        while let Some(file) = parsed.try_next().await? {
            report.records += file.rows.len();
            report.malformed += file.malformed;
            on_file(file)?;
        }

        info!(
            family = T::FAMILY,
            files = report.files,
            records = report.records,
            malformed = report.malformed,
            "Scanned input"
        );
        Ok(report)
    }

    async fn read_file<T: SourceRecord>(&self, path: Path) -> Result<ParsedFile<T>> {
        let bytes = self
            .location
            .store
            .get(&path)
            .await
            .map_err(|e| Error::source_unavailable(self.location.url_for(&path), e))?
            .bytes()
            .await
            .map_err(|e| Error::source_unavailable(self.location.url_for(&path), e))?;

        let file: Arc<str> = Arc::from(path.to_string());
        let (rows, malformed) = parse_lines::<T>(&file, &bytes);
        Ok(ParsedFile { rows, malformed })
    }
}

/// Parses one record per non-blank line, dropping the lines that fail.
/// Lines that are not valid UTF-8 count as malformed.
pub fn parse_lines<T: SourceRecord>(file: &Arc<str>, content: &[u8]) -> (Vec<SourceRow<T>>, usize) {
    let mut rows = Vec::new();
    let mut malformed = 0;

    for (idx, line) in content.split(|byte| *byte == b'\n').enumerate() {
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let parsed = serde_json::from_slice::<T>(line)
            .map_err(|e| e.to_string())
            .and_then(|record| match record.missing_field() {
                Some(field) => Err(format!("missing required field `{}`", field)),
                None => Ok(record),
            });

        match parsed {
            Ok(record) => rows.push(SourceRow {
                file: file.clone(),
                line: idx + 1,
                record,
            }),
            Err(reason) => {
                let err = Error::MalformedRecord {
                    source_path: file.to_string(),
                    line: idx + 1,
                    reason,
                };
                warn!(family = T::FAMILY, error = %err, "Dropping record");
                malformed += 1;
            }
        }
    }

    (rows, malformed)
}

/// Leading path segments of `pattern` that contain no glob metacharacters.
fn literal_prefix(pattern: &str) -> String {
    pattern
        .split('/')
        .take_while(|segment| !segment.contains(['*', '?', '[']))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
