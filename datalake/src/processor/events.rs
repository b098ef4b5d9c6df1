use super::dedup::{DedupSpec, deduplicate};
use crate::models::NEXT_SONG_PAGE;
use crate::schema::{TIME_TABLE, USERS_TABLE};
use common::Result;
use common::config::KeyPolicy;
use datafusion::prelude::*;

pub const TIME_PARTITION_BY: &[&str] = &["year", "month"];

pub struct EventTables {
    /// Song-play events, still carrying `event_seq` for the fact join.
    pub plays: DataFrame,
    pub users: DataFrame,
    pub time: DataFrame,
}

/// Filters staged events down to song plays and derives the users and time dimensions.
pub struct EventTransformer {
    ctx: SessionContext,
    policy: KeyPolicy,
}

impl EventTransformer {
    pub fn new(ctx: &SessionContext, policy: KeyPolicy) -> Self {
        Self {
            ctx: ctx.clone(),
            policy,
        }
    }

    pub async fn transform(&self, events: DataFrame) -> Result<EventTables> {
        let plays = events.filter(ident("page").eq(lit(NEXT_SONG_PAGE)))?;

        // `ts` is kept so the latest event can decide a user's attributes.
        let users = plays.clone().select(vec![
            ident("user_id"),
            ident("first_name").alias("firstName"),
            ident("last_name").alias("lastName"),
            ident("gender"),
            ident("level"),
            ident("ts"),
        ])?;
        let users = deduplicate(&self.ctx, users, &users_spec(), self.policy).await?;

        let time = plays.clone().select(vec![
            ident("start_time"),
            ident("hour"),
            ident("day"),
            ident("week"),
            ident("month"),
            ident("year"),
            ident("weekday"),
        ])?;
        let time = deduplicate(&self.ctx, time, &time_spec(), self.policy).await?;

        Ok(EventTables { plays, users, time })
    }
}

pub fn users_spec() -> DedupSpec {
    DedupSpec::ordered(
        USERS_TABLE,
        "user_id",
        vec!["user_id", "firstName", "lastName", "gender", "level"],
    )
    .ranked_by("\"ts\" DESC")
}

pub fn time_spec() -> DedupSpec {
    DedupSpec::ordered(
        TIME_TABLE,
        "start_time",
        vec!["start_time", "hour", "day", "week", "month", "year", "weekday"],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogEvent;
    use crate::processor::staging::stage_events;
    use crate::reader::SourceRow;
    use arrow::array::{Array, AsArray};
    use arrow::compute::cast;
    use arrow::datatypes::DataType;
    use common::config::TimeZoneMode;
    use std::collections::HashSet;
    use std::sync::Arc;

    const EVENTS: &[&str] = &[
        r#"{"page": "Home", "ts": 1541105830796, "userId": "39", "firstName": "Walter", "lastName": "Frye", "gender": "M", "level": "free"}"#,
        r#"{"page": "NextSong", "ts": 1541106106796, "userId": "8", "firstName": "Kaylee", "lastName": "Summers", "gender": "F", "level": "free", "artist": "Des'ree", "song": "You Gotta Be", "sessionId": 139}"#,
        r#"{"page": "NextSong", "ts": 1541106352796, "userId": "8", "firstName": "Kaylee", "lastName": "Summers", "gender": "F", "level": "paid", "artist": "Mr Oizo", "song": "Flat 55", "sessionId": 139}"#,
        r#"{"page": "NextSong", "ts": 1541106352796, "userId": "", "level": "free", "artist": "Tamba Trio", "song": "Quem Quiser Encontrar O Amor", "sessionId": 140}"#,
        r#"{"page": "Logout", "ts": 1541106400000, "userId": "8", "level": "paid"}"#,
    ];

    fn staged(ctx: &SessionContext) -> DataFrame {
        let rows: Vec<SourceRow<LogEvent>> = EVENTS
            .iter()
            .enumerate()
            .map(|(idx, line)| SourceRow {
                file: Arc::from("log_data/2018/11/2018-11-01-events.json"),
                line: idx + 1,
                record: serde_json::from_str(line).unwrap(),
            })
            .collect();
        let staged = stage_events(&rows, TimeZoneMode::Utc, 0).unwrap();
        ctx.read_batches(staged.batches).unwrap()
    }

    async fn strings(df: DataFrame, name: &str) -> Vec<Option<String>> {
        let mut values = Vec::new();
        for batch in df.collect().await.unwrap() {
            let array = cast(batch.column_by_name(name).unwrap(), &DataType::Utf8).unwrap();
            let array = array.as_string::<i32>();
            values.extend((0..array.len()).map(|i| {
                (!array.is_null(i)).then(|| array.value(i).to_string())
            }));
        }
        values
    }

    #[tokio::test]
    async fn test_only_song_plays_survive_the_filter() {
        let ctx = SessionContext::new();
        let tables = EventTransformer::new(&ctx, KeyPolicy::FirstWins)
            .transform(staged(&ctx))
            .await
            .unwrap();

        let pages = strings(tables.plays, "page").await;
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.as_deref() == Some(NEXT_SONG_PAGE)));
    }

    #[tokio::test]
    async fn test_users_keep_latest_level_and_drop_blank_ids() {
        let ctx = SessionContext::new();
        let tables = EventTransformer::new(&ctx, KeyPolicy::FirstWins)
            .transform(staged(&ctx))
            .await
            .unwrap();

        let schema = tables.users.schema().clone();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["user_id", "firstName", "lastName", "gender", "level"]);

        // User 39 only visited Home, so it is not a song-play user.
        assert_eq!(
            strings(tables.users.clone(), "user_id").await,
            vec![Some("8".to_string())]
        );
        assert_eq!(
            strings(tables.users, "level").await,
            vec![Some("paid".to_string())]
        );
    }

    #[tokio::test]
    async fn test_time_rows_are_unique_per_start_time() {
        let ctx = SessionContext::new();
        let tables = EventTransformer::new(&ctx, KeyPolicy::FirstWins)
            .transform(staged(&ctx))
            .await
            .unwrap();

        let batches = tables.time.collect().await.unwrap();
        let mut seen = HashSet::new();
        let mut rows = 0;
        for batch in &batches {
            let start = cast(batch.column_by_name("start_time").unwrap(), &DataType::Int64).unwrap();
            let start = start.as_primitive::<arrow::datatypes::Int64Type>();
            for i in 0..start.len() {
                seen.insert(start.value(i));
                rows += 1;
            }
        }
        assert_eq!(rows, 2);
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&1541106106796));
    }

    #[tokio::test]
    async fn test_exact_policy_keeps_one_row_per_distinct_user_state() {
        let ctx = SessionContext::new();
        let tables = EventTransformer::new(&ctx, KeyPolicy::Exact)
            .transform(staged(&ctx))
            .await
            .unwrap();

        // User 8 switched from free to paid, so both rows remain.
        assert_eq!(strings(tables.users, "user_id").await.len(), 2);
    }
}
