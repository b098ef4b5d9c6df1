use super::dedup::{DedupSpec, deduplicate};
use crate::schema::{ARTISTS_TABLE, SONGS_TABLE};
use common::Result;
use common::config::KeyPolicy;
use datafusion::prelude::*;

pub const SONGS_PARTITION_BY: &[&str] = &["year", "artist_id"];

pub struct CatalogTables {
    pub songs: DataFrame,
    pub artists: DataFrame,
}

/// Projects staged catalog rows into the songs and artists dimensions.
pub struct CatalogTransformer {
    ctx: SessionContext,
    policy: KeyPolicy,
}

impl CatalogTransformer {
    pub fn new(ctx: &SessionContext, policy: KeyPolicy) -> Self {
        Self {
            ctx: ctx.clone(),
            policy,
        }
    }

    pub async fn transform(&self, catalog: DataFrame) -> Result<CatalogTables> {
        let songs = catalog.clone().select(vec![
            ident("song_id"),
            ident("title"),
            ident("artist_id"),
            ident("year"),
            ident("duration"),
        ])?;
        let songs = deduplicate(&self.ctx, songs, &songs_spec(), self.policy).await?;

        let artists = catalog.select(vec![
            ident("artist_id"),
            ident("artist_name").alias("name"),
            ident("artist_location").alias("location"),
            ident("artist_latitude").alias("latitude"),
            ident("artist_longitude").alias("longitude"),
        ])?;
        let artists = deduplicate(&self.ctx, artists, &artists_spec(), self.policy).await?;

        Ok(CatalogTables { songs, artists })
    }
}

pub fn songs_spec() -> DedupSpec {
    DedupSpec::ordered(
        SONGS_TABLE,
        "song_id",
        vec!["song_id", "title", "artist_id", "year", "duration"],
    )
}

pub fn artists_spec() -> DedupSpec {
    DedupSpec::ordered(
        ARTISTS_TABLE,
        "artist_id",
        vec!["artist_id", "name", "location", "latitude", "longitude"],
    )
}
