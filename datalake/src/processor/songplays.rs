use super::dedup::quote;
use super::ids::with_surrogate_ids;
use arrow::record_batch::RecordBatch;
use common::Result;
use common::config::JoinMode;
use datafusion::prelude::*;
use tracing::debug;
use uuid::Uuid;

pub const SONGPLAYS_PARTITION_BY: &[&str] = &["year", "month"];
pub const SONGPLAY_ID: &str = "songplay_id";

/// Joins song-play events with the staged catalog into the songplays fact table.
pub struct FactAssembler {
    ctx: SessionContext,
    join_mode: JoinMode,
}

impl FactAssembler {
    pub fn new(ctx: &SessionContext, join_mode: JoinMode) -> Self {
        Self {
            ctx: ctx.clone(),
            join_mode,
        }
    }

    pub async fn assemble(&self, plays: DataFrame, catalog: DataFrame) -> Result<DataFrame> {
        let run = Uuid::new_v4().simple().to_string();
        let plays_view = format!("plays_{}", run);
        let catalog_view = format!("catalog_{}", run);
        self.ctx.register_table(plays_view.as_str(), plays.into_view())?;
        self.ctx.register_table(catalog_view.as_str(), catalog.into_view())?;

        let matched = self.match_events(&plays_view, &catalog_view).await;

        self.ctx.deregister_table(plays_view.as_str())?;
        self.ctx.deregister_table(catalog_view.as_str())?;

        let matched = matched?.drop_columns(&["event_seq"])?;
        let schema = matched.schema().inner().clone();
        let mut batches = matched.collect().await?;
        batches.retain(|batch| batch.num_rows() > 0);
        if batches.is_empty() {
            batches.push(RecordBatch::new_empty(schema));
        }

        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        debug!(rows, join_mode = ?self.join_mode, "Assembled song plays");

        let batches = with_surrogate_ids(batches, SONGPLAY_ID)?;
        Ok(self.ctx.read_batches(batches)?)
    }

    async fn match_events(&self, plays: &str, catalog: &str) -> Result<DataFrame> {
        Ok(self.ctx.sql(&self.join_sql(plays, catalog)).await?)
    }

    /// One row per event: the catalog row with the same title wins, then the
    /// smallest `song_id`.
    fn join_sql(&self, plays: &str, catalog: &str) -> String {
        let join = match self.join_mode {
            JoinMode::Inner => "JOIN",
            JoinMode::Left => "LEFT JOIN",
        };
        format!(
            "SELECT event_seq, start_time, user_id, level, song_id, artist_id, \
                    session_id, location, user_agent, year, month \
             FROM (\
                SELECT p.event_seq, p.start_time, p.user_id, p.level, \
                       c.song_id, c.artist_id, p.session_id, p.location, p.user_agent, \
                       p.year, p.month, \
                       ROW_NUMBER() OVER (\
                           PARTITION BY p.event_seq \
                           ORDER BY CASE WHEN c.title = p.song THEN 0 ELSE 1 END, c.song_id ASC NULLS LAST\
                       ) AS match_rank \
                FROM {plays} p {join} {catalog} c ON p.artist = c.artist_name\
             ) matched \
             WHERE match_rank = 1 \
             ORDER BY event_seq",
            plays = quote(plays),
            catalog = quote(catalog),
        )
    }
}
