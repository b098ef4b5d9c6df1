mod event;
mod song;

pub use event::{LogEvent, NEXT_SONG_PAGE};
pub use song::SongRecord;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A JSON-lines record family the reader knows how to validate.
pub trait SourceRecord: DeserializeOwned + Send + 'static {
    /// Name used in logs and scan reports.
    const FAMILY: &'static str;

    /// Name of the first required field that is absent or empty, if any.
    fn missing_field(&self) -> Option<&'static str>;
}

/// Accepts a JSON string or number; empty strings and nulls become `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}
