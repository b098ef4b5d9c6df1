use super::{SourceRecord, is_blank};
use serde::Deserialize;

/// One entry of the song catalog, as found in `song_data`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SongRecord {
    #[serde(default)]
    pub song_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist_id: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub artist_location: Option<String>,
    #[serde(default)]
    pub artist_latitude: Option<f64>,
    #[serde(default)]
    pub artist_longitude: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl SourceRecord for SongRecord {
    const FAMILY: &'static str = "song";

    fn missing_field(&self) -> Option<&'static str> {
        if is_blank(&self.song_id) {
            Some("song_id")
        } else if is_blank(&self.artist_id) {
            Some("artist_id")
        } else {
            None
        }
    }
}
