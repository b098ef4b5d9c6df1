//! Writes tables as Hive-partitioned Parquet with replace-on-success semantics.
//!
//! Each table is first written under `_staging/<table>/<run_id>/`. Only once
//! that succeeds is the live `<table>/` prefix swapped: the `_SUCCESS` marker
//! is removed, old objects are deleted, staged objects are moved in, and a
//! fresh marker is written last.

use crate::storage::StorageLocation;
use arrow::array::AsArray;
use arrow::datatypes::UInt64Type;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use datafusion::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::*;
use futures::TryStreamExt;
use object_store::PutPayload;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const STAGING_DIR: &str = "_staging";

/// Contents of a table's `_SUCCESS` marker.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableMarker {
    pub table: String,
    pub run_id: String,
    pub partition_by: Vec<String>,
    pub row_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWriteSummary {
    pub table: String,
    pub rows: u64,
    pub files: usize,
}

pub struct PartitionedWriter {
    output: StorageLocation,
    run_id: String,
    compression: String,
}

impl PartitionedWriter {
    pub fn new(
        output: StorageLocation,
        run_id: impl Into<String>,
        compression: impl Into<String>,
    ) -> Self {
        Self {
            output,
            run_id: run_id.into(),
            compression: compression.into(),
        }
    }

    pub fn table_path(&self, table: &str) -> Path {
        self.output.join(table)
    }

    fn staging_path(&self, table: &str) -> Path {
        self.output
            .join(format!("{}/{}/{}", STAGING_DIR, table, self.run_id))
    }

    /// Replaces the output of `table` with the contents of `df`.
    pub async fn write_table(
        &self,
        table: &str,
        df: DataFrame,
        partition_by: &[&str],
    ) -> Result<TableWriteSummary> {
        let staging = self.staging_path(table);
        let staging_url = format!("{}/", self.output.url_for(&staging));
        debug!(table, target = %staging_url, "Staging table");

        let options = DataFrameWriteOptions::new()
            .with_partition_by(partition_by.iter().map(|c| c.to_string()).collect());
        let written = df
            .write_parquet(&staging_url, options, Some(self.parquet_options(table)))
            .await;

        let rows = match written {
            Ok(result) => result
                .first()
                .and_then(|batch| batch.column(0).as_primitive_opt::<UInt64Type>())
                .map(|counts| counts.value(0))
                .unwrap_or_default(),
            Err(e) => {
                self.discard(&staging).await;
                return Err(Error::sink_unavailable(table, e));
            }
        };

        let files = self.swap(table, &staging).await?;

        let marker = TableMarker {
            table: table.to_string(),
            run_id: self.run_id.clone(),
            partition_by: partition_by.iter().map(|c| c.to_string()).collect(),
            row_count: rows,
            created_at: Utc::now(),
        };
        self.write_marker(&marker).await?;

        info!(table, rows, files, "Table written");
        Ok(TableWriteSummary {
            table: table.to_string(),
            rows,
            files,
        })
    }

    /// Reads back the marker of a table written by any run.
    pub async fn read_marker(&self, table: &str) -> Result<TableMarker> {
        let path = self.table_path(table).child(SUCCESS_MARKER);
        let bytes = self
            .output
            .store
            .get(&path)
            .await
            .map_err(|e| Error::source_unavailable(self.output.url_for(&path), e))?
            .bytes()
            .await
            .map_err(|e| Error::source_unavailable(self.output.url_for(&path), e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn parquet_options(&self, table: &str) -> TableParquetOptions {
        let mut options = TableParquetOptions::new();
        options.global.compression = Some(self.compression.clone());
        options
            .key_value_metadata
            .insert("datalake.table".to_string(), Some(table.to_string()));
        options
            .key_value_metadata
            .insert("datalake.run_id".to_string(), Some(self.run_id.clone()));
        options
    }

    /// Moves staged objects into the live prefix. Returns how many were moved.
    async fn swap(&self, table: &str, staging: &Path) -> Result<usize> {
        let store = &self.output.store;
        let live = self.table_path(table);
        let sink = |e: object_store::Error| Error::sink_unavailable(table, e);

        match store.delete(&live.child(SUCCESS_MARKER)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(sink(e)),
        }

        let old: Vec<_> = store.list(Some(&live)).try_collect().await.map_err(sink)?;
        for meta in &old {
            store.delete(&meta.location).await.map_err(sink)?;
        }

        let staged: Vec<_> = store.list(Some(staging)).try_collect().await.map_err(sink)?;
        for meta in &staged {
            let Some(relative) = meta.location.prefix_match(staging) else {
                continue;
            };
            let target = relative.fold(live.clone(), |path, part| path.child(part));
            store.rename(&meta.location, &target).await.map_err(sink)?;
        }

        debug!(table, replaced = old.len(), moved = staged.len(), "Swapped table");
        Ok(staged.len())
    }

    async fn write_marker(&self, marker: &TableMarker) -> Result<()> {
        let path = self.table_path(&marker.table).child(SUCCESS_MARKER);
        let body = serde_json::to_vec_pretty(marker)?;

        self.output
            .store
            .put(&path, PutPayload::from(body))
            .await
            .map_err(|e| Error::sink_unavailable(&marker.table, e))?;

        self.output
            .store
            .head(&path)
            .await
            .map_err(|e| Error::sink_unavailable(&marker.table, e))?;
        Ok(())
    }

    async fn discard(&self, staging: &Path) {
        let store = &self.output.store;
        let staged: Vec<_> = match store.list(Some(staging)).try_collect().await {
            Ok(staged) => staged,
            Err(e) => {
                warn!(path = %staging, error = %e, "Could not list staged objects");
                return;
            }
        };
        for meta in staged {
            if let Err(e) = store.delete(&meta.location).await {
                warn!(path = %meta.location, error = %e, "Could not remove staged object");
            }
        }
    }
}
