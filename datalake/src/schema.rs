use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use lazy_static::lazy_static;
use std::sync::Arc;

pub const SONGS_TABLE: &str = "songs";
pub const ARTISTS_TABLE: &str = "artists";
pub const USERS_TABLE: &str = "users";
pub const TIME_TABLE: &str = "time";
pub const SONGPLAYS_TABLE: &str = "songplays";

// Staging tables, registered in the session for the duration of a run
pub const CATALOG_STAGING: &str = "catalog_staging";
pub const EVENTS_STAGING: &str = "events_staging";

pub fn catalog_staging_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("year", DataType::Int32, false),
        Field::new("duration", DataType::Float64, true),
    ])
}

pub fn events_staging_schema() -> Schema {
    Schema::new(vec![
        Field::new("event_seq", DataType::Int64, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, false),
        Field::new(
            "start_time",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("artist", DataType::Utf8, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ])
}

pub enum StagingSchema {
    Catalog,
    Events,
}

pub fn get_staging_schema(version: StagingSchema) -> SchemaRef {
    match version {
        StagingSchema::Catalog => CATALOG_STAGING_SCHEMA.clone(),
        StagingSchema::Events => EVENTS_STAGING_SCHEMA.clone(),
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref CATALOG_STAGING_SCHEMA: SchemaRef = Arc::new(catalog_staging_schema());
    static ref EVENTS_STAGING_SCHEMA: SchemaRef = Arc::new(events_staging_schema());
}
