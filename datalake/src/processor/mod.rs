mod calendar;
pub mod catalog;
pub mod dedup;
pub mod events;
mod ids;
pub mod songplays;
pub mod staging;

pub use calendar::CalendarFields;
pub use catalog::{CatalogTables, CatalogTransformer, SONGS_PARTITION_BY};
pub use dedup::{DedupSpec, deduplicate};
pub use events::{EventTables, EventTransformer, TIME_PARTITION_BY};
pub use ids::with_surrogate_ids;
pub use songplays::{FactAssembler, SONGPLAYS_PARTITION_BY};
pub use staging::{StagedRows, StagingBuffer};

use crate::models::{LogEvent, SongRecord};
use crate::reader::{RecordReader, ScanReport, SourceRow};
use crate::schema::{
    ARTISTS_TABLE, CATALOG_STAGING, EVENTS_STAGING, SONGPLAYS_TABLE, SONGS_TABLE, StagingSchema,
    TIME_TABLE, USERS_TABLE, get_staging_schema,
};
use crate::storage::StoreManager;
use crate::writer::{PartitionedWriter, TableWriteSummary};
use arrow::record_batch::RecordBatch;
use common::Result;
use common::config::Settings;
use datafusion::datasource::MemTable;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::DataFrame;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub catalog: ScanReport,
    /// `malformed` also counts events dropped while deriving calendar fields.
    pub events: ScanReport,
    pub tables: Vec<TableWriteSummary>,
}

impl RunSummary {
    pub fn table(&self, name: &str) -> Option<&TableWriteSummary> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Drives one run: catalog processing first, then events and the fact table.
pub struct LakeProcessor {
    pub ctx: SessionContext,
    settings: Settings,
    run_id: String,
    reader: RecordReader,
    writer: PartitionedWriter,
}

impl LakeProcessor {
    pub fn new(settings: &Settings) -> Result<Self> {
        let ctx = SessionContext::new();
        let stores = StoreManager::new(settings.aws.clone());

        let input = stores.resolve(&settings.input.root)?;
        let output = stores.resolve(&settings.output.root)?;
        stores.register_object_store(&ctx, &output);

        let run_id = Uuid::new_v4().to_string();
        let reader = RecordReader::new(input, settings.input.read_concurrency);
        let writer = PartitionedWriter::new(output, run_id.clone(), &settings.output.compression);

        Ok(Self {
            ctx,
            settings: settings.clone(),
            run_id,
            reader,
            writer,
        })
    }

    pub async fn run(&self) -> Result<RunSummary> {
        info!(
            run_id = %self.run_id,
            input = %self.settings.input.root,
            output = %self.settings.output.root,
            "Starting run"
        );
        let mut tables = Vec::new();

        let (catalog, catalog_report) = self.process_catalog(&mut tables).await?;
        let events_report = self.process_events(catalog, &mut tables).await?;

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            catalog: catalog_report,
            events: events_report,
            tables,
        };
        for table in &summary.tables {
            info!(table = %table.table, rows = table.rows, files = table.files, "Run output");
        }
        info!(
            run_id = %summary.run_id,
            songs_scanned = summary.catalog.records,
            events_scanned = summary.events.records,
            malformed = summary.catalog.malformed + summary.events.malformed,
            "Run complete"
        );
        Ok(summary)
    }

    /// Scans and stages the catalog, then writes songs and artists.
    /// The staged catalog is returned for the fact join.
    async fn process_catalog(
        &self,
        tables: &mut Vec<TableWriteSummary>,
    ) -> Result<(DataFrame, ScanReport)> {
        let mut buffer = StagingBuffer::new(|rows: &[SourceRow<SongRecord>], _| {
            Ok(StagedRows {
                batches: staging::stage_catalog(rows)?,
                malformed: 0,
            })
        });
        let report = self
            .reader
            .for_each_file::<SongRecord, _>(&self.settings.input.song_pattern, |file| buffer.push(file.rows))
            .await?;
        let staged = buffer.finish()?;
        let catalog = self
            .register_staging(CATALOG_STAGING, StagingSchema::Catalog, staged.batches)
            .await?;

        let transformer = CatalogTransformer::new(&self.ctx, self.settings.transform.key_policy);
        let CatalogTables { songs, artists } = transformer.transform(catalog.clone()).await?;

        tables.push(
            self.writer
                .write_table(SONGS_TABLE, songs, SONGS_PARTITION_BY)
                .await?,
        );
        tables.push(self.writer.write_table(ARTISTS_TABLE, artists, &[]).await?);

        Ok((catalog, report))
    }

    async fn process_events(
        &self,
        catalog: DataFrame,
        tables: &mut Vec<TableWriteSummary>,
    ) -> Result<ScanReport> {
        let zone = self.settings.transform.timezone;
        let mut buffer = StagingBuffer::new(|rows: &[SourceRow<LogEvent>], first_seq| {
            staging::stage_events(rows, zone, first_seq)
        });
        let mut report = self
            .reader
            .for_each_file::<LogEvent, _>(&self.settings.input.log_pattern, |file| buffer.push(file.rows))
            .await?;
        let staged = buffer.finish()?;
        report.malformed += staged.malformed;
        report.records -= staged.malformed;

        let events = self
            .register_staging(EVENTS_STAGING, StagingSchema::Events, staged.batches)
            .await?;

        let transformer = EventTransformer::new(&self.ctx, self.settings.transform.key_policy);
        let EventTables { plays, users, time } = transformer.transform(events).await?;

        tables.push(self.writer.write_table(USERS_TABLE, users, &[]).await?);
        tables.push(
            self.writer
                .write_table(TIME_TABLE, time, TIME_PARTITION_BY)
                .await?,
        );

        let assembler = FactAssembler::new(&self.ctx, self.settings.transform.join_mode);
        let songplays = assembler.assemble(plays, catalog).await?;
        tables.push(
            self.writer
                .write_table(SONGPLAYS_TABLE, songplays, SONGPLAYS_PARTITION_BY)
                .await?,
        );

        Ok(report)
    }

    /// Registers staged batches as an in-memory table and returns a frame over it.
    async fn register_staging(
        &self,
        name: &str,
        schema: StagingSchema,
        batches: Vec<RecordBatch>,
    ) -> Result<DataFrame> {
        let table = MemTable::try_new(get_staging_schema(schema), vec![batches])?;
        self.ctx.register_table(name, Arc::new(table))?;
        Ok(self.ctx.table(name).await?)
    }
}
