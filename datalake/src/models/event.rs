use super::{SourceRecord, is_blank, lenient_string};
use serde::Deserialize;

/// Page value of events that represent an actual playback.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One line of the application usage log, as found in `log_data`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub song: Option<String>,
    #[serde(default)]
    pub length: Option<f64>,
}

impl LogEvent {
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

impl SourceRecord for LogEvent {
    const FAMILY: &'static str = "log";

    fn missing_field(&self) -> Option<&'static str> {
        if is_blank(&self.page) {
            Some("page")
        } else if self.ts.is_none() {
            Some("ts")
        } else {
            None
        }
    }
}
