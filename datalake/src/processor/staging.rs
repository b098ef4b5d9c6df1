use super::calendar::CalendarFields;
use crate::models::{LogEvent, SongRecord};
use crate::reader::SourceRow;
use crate::schema::{StagingSchema, get_staging_schema};
use arrow::datatypes::SchemaRef;
use arrow::json::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use common::config::TimeZoneMode;
use common::{Error, Result};
use serde::Serialize;
use tracing::warn;

const BATCH_SIZE: usize = 8192;

#[derive(Serialize)]
struct CatalogRow<'a> {
    song_id: &'a str,
    title: Option<&'a str>,
    artist_id: &'a str,
    artist_name: Option<&'a str>,
    artist_location: Option<&'a str>,
    artist_latitude: Option<f64>,
    artist_longitude: Option<f64>,
    year: i32,
    duration: Option<f64>,
}

#[derive(Serialize)]
struct EventRow<'a> {
    event_seq: i64,
    user_id: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    gender: Option<&'a str>,
    level: Option<&'a str>,
    page: &'a str,
    ts: i64,
    start_time: i64,
    session_id: Option<i64>,
    location: Option<&'a str>,
    user_agent: Option<&'a str>,
    artist: Option<&'a str>,
    song: Option<&'a str>,
    length: Option<f64>,
    hour: i32,
    day: i32,
    week: i32,
    month: i32,
    year: i32,
    weekday: i32,
}

/// Staged batches plus the number of records dropped while staging.
#[derive(Debug, Default)]
pub struct StagedRows {
    pub batches: Vec<RecordBatch>,
    pub malformed: usize,
}

/// Accumulates parsed rows across files and stages them in chunks of
/// `BATCH_SIZE`, so source records never outlive their chunk.
pub struct StagingBuffer<T, F> {
    pending: Vec<SourceRow<T>>,
    next_seq: i64,
    staged: StagedRows,
    stage: F,
}

impl<T, F> StagingBuffer<T, F>
where
    F: FnMut(&[SourceRow<T>], i64) -> Result<StagedRows>,
{
    /// `stage` receives each chunk and the sequence number of its first row.
    pub fn new(stage: F) -> Self {
        Self {
            pending: Vec::with_capacity(BATCH_SIZE),
            next_seq: 0,
            staged: StagedRows::default(),
            stage,
        }
    }

    pub fn push(&mut self, rows: Vec<SourceRow<T>>) -> Result<()> {
        self.pending.extend(rows);
        if self.pending.len() >= BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<StagedRows> {
        self.flush()?;
        Ok(self.staged)
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = (self.stage)(&self.pending, self.next_seq)?;
        self.next_seq += self.pending.len() as i64;
        self.staged.batches.extend(chunk.batches);
        self.staged.malformed += chunk.malformed;
        self.pending.clear();
        Ok(())
    }
}

pub fn stage_catalog(rows: &[SourceRow<SongRecord>]) -> Result<Vec<RecordBatch>> {
    let staged: Vec<CatalogRow<'_>> = rows
        .iter()
        .filter_map(|row| {
            let song = &row.record;
            Some(CatalogRow {
                song_id: song.song_id.as_deref()?,
                title: song.title.as_deref(),
                artist_id: song.artist_id.as_deref()?,
                artist_name: song.artist_name.as_deref(),
                artist_location: song.artist_location.as_deref(),
                artist_latitude: song.artist_latitude,
                artist_longitude: song.artist_longitude,
                year: song.year.unwrap_or(0),
                duration: song.duration,
            })
        })
        .collect();

    to_batches(get_staging_schema(StagingSchema::Catalog), &staged)
}

/// `first_seq` is the `event_seq` of `rows[0]`; later rows follow in input order.
pub fn stage_events(
    rows: &[SourceRow<LogEvent>],
    zone: TimeZoneMode,
    first_seq: i64,
) -> Result<StagedRows> {
    let mut staged = Vec::with_capacity(rows.len());
    let mut malformed = 0;

    for (seq, row) in rows.iter().enumerate() {
        let event = &row.record;
        let (Some(page), Some(ts)) = (event.page.as_deref(), event.ts) else {
            continue;
        };
        let Some(calendar) = CalendarFields::from_epoch_millis(ts, zone) else {
            let err = Error::MalformedRecord {
                source_path: row.file.to_string(),
                line: row.line,
                reason: format!("ts {} is outside the representable range", ts),
            };
            warn!(error = %err, "Dropping event");
            malformed += 1;
            continue;
        };

        staged.push(EventRow {
            event_seq: first_seq + seq as i64,
            user_id: event.user_id.as_deref(),
            first_name: event.first_name.as_deref(),
            last_name: event.last_name.as_deref(),
            gender: event.gender.as_deref(),
            level: event.level.as_deref(),
            page,
            ts,
            start_time: calendar.start_time,
            session_id: event.session_id,
            location: event.location.as_deref(),
            user_agent: event.user_agent.as_deref(),
            artist: event.artist.as_deref(),
            song: event.song.as_deref(),
            length: event.length,
            hour: calendar.hour,
            day: calendar.day,
            week: calendar.week,
            month: calendar.month,
            year: calendar.year,
            weekday: calendar.weekday,
        });
    }

    Ok(StagedRows {
        batches: to_batches(get_staging_schema(StagingSchema::Events), &staged)?,
        malformed,
    })
}

fn to_batches<S: Serialize>(schema: SchemaRef, rows: &[S]) -> Result<Vec<RecordBatch>> {
    let mut decoder = ReaderBuilder::new(schema)
        .with_batch_size(BATCH_SIZE)
        .build_decoder()?;

    let mut batches = Vec::new();
    for chunk in rows.chunks(BATCH_SIZE) {
        decoder.serialize(chunk)?;
        if let Some(batch) = decoder.flush()? {
            batches.push(batch);
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int32Array};
    use arrow::datatypes::Int64Type;
    use std::sync::Arc;

    fn row<T>(record: T, line: usize) -> SourceRow<T> {
        SourceRow {
            file: Arc::from("log_data/2018/11/events.json"),
            line,
            record,
        }
    }

    fn event(json: &str) -> LogEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_catalog_rows_default_unknown_year_to_zero() {
        let song: SongRecord =
            serde_json::from_str(r#"{"song_id": "S1", "artist_id": "A1", "title": "T1"}"#).unwrap();
        let batches = stage_catalog(&[row(song, 1)]).unwrap();

        assert_eq!(batches.len(), 1);
        let year = batches[0]
            .column_by_name("year")
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(year.value(0), 0);
    }

    #[test]
    fn test_events_carry_calendar_fields_and_sequence() {
        let rows = vec![
            row(event(r#"{"page": "Home", "ts": 1541105830796, "userId": "39"}"#), 1),
            row(event(r#"{"page": "NextSong", "ts": 1541106106796, "userId": "8"}"#), 2),
        ];
        let staged = stage_events(&rows, TimeZoneMode::Utc, 0).unwrap();

        assert_eq!(staged.malformed, 0);
        let batch = &staged.batches[0];
        assert_eq!(batch.num_rows(), 2);

        let seq = batch.column_by_name("event_seq").unwrap().as_primitive::<Int64Type>();
        assert_eq!(seq.values().to_vec(), vec![0, 1]);

        let hour = batch
            .column_by_name("hour")
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(hour.value(1), 21);
    }

    #[test]
    fn test_out_of_range_ts_is_dropped_not_fatal() {
        let rows = vec![
            row(event(r#"{"page": "NextSong", "ts": 9223372036854775807}"#), 1),
            row(event(r#"{"page": "NextSong", "ts": 1541106106796}"#), 2),
        ];
        let staged = stage_events(&rows, TimeZoneMode::Utc, 0).unwrap();

        assert_eq!(staged.malformed, 1);
        assert_eq!(staged.batches[0].num_rows(), 1);
    }

    #[test]
    fn test_buffer_keeps_sequence_across_chunks() {
        let mut buffer = StagingBuffer::new(|rows: &[SourceRow<LogEvent>], first_seq| {
            stage_events(rows, TimeZoneMode::Utc, first_seq)
        });
        let rows = |count: usize| {
            (0..count)
                .map(|i| row(event(r#"{"page": "NextSong", "ts": 1541106106796}"#), i + 1))
                .collect::<Vec<_>>()
        };
        buffer.push(rows(BATCH_SIZE - 1)).unwrap();
        buffer.push(rows(2)).unwrap();
        buffer.push(rows(3)).unwrap();
        let staged = buffer.finish().unwrap();

        let seq: Vec<i64> = staged
            .batches
            .iter()
            .flat_map(|b| {
                b.column_by_name("event_seq")
                    .unwrap()
                    .as_primitive::<Int64Type>()
                    .values()
                    .to_vec()
            })
            .collect();
        assert_eq!(staged.batches.len(), 3);
        assert_eq!(seq.len(), BATCH_SIZE + 4);
        assert!(seq.iter().enumerate().all(|(i, s)| *s == i as i64));
    }
}
