use common::Result;
use common::config::KeyPolicy;
use datafusion::prelude::*;
use uuid::Uuid;

/// Describes how a dimension table is reduced to one row per key.
#[derive(Debug, Clone)]
pub struct DedupSpec {
    pub table: &'static str,
    pub key: &'static str,
    /// Output columns, key included.
    pub columns: Vec<&'static str>,
    /// SQL ordering that picks the surviving row of a key under `FirstWins`.
    /// May reference any column of the source, not only the output ones.
    pub rank_by: Vec<String>,
}

impl DedupSpec {
    /// Keeps the first row under an ascending ordering of every non-key column.
    pub fn ordered(table: &'static str, key: &'static str, columns: Vec<&'static str>) -> Self {
        let rank_by = columns
            .iter()
            .filter(|column| **column != key)
            .map(|column| format!("{} ASC NULLS LAST", quote(column)))
            .collect();
        Self {
            table,
            key,
            columns,
            rank_by,
        }
    }

    /// Ranks by `leading` first, then falls back to the column ordering.
    pub fn ranked_by(mut self, leading: impl Into<String>) -> Self {
        self.rank_by.insert(0, leading.into());
        self
    }

    pub fn to_sql(&self, source: &str, policy: KeyPolicy) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| quote(column))
            .collect::<Vec<_>>()
            .join(", ");
        let key = quote(self.key);

        match policy {
            KeyPolicy::Exact => format!(
                "SELECT DISTINCT {columns} FROM {source} WHERE {key} IS NOT NULL ORDER BY {key}",
                source = quote(source),
            ),
            KeyPolicy::FirstWins => {
                let rank_by = if self.rank_by.is_empty() {
                    key.clone()
                } else {
                    self.rank_by.join(", ")
                };
                format!(
                    "SELECT {columns} FROM (\
                        SELECT {columns}, ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY {rank_by}) AS dedup_rank \
                        FROM {source} WHERE {key} IS NOT NULL\
                    ) ranked WHERE dedup_rank = 1 ORDER BY {key}",
                    source = quote(source),
                )
            }
        }
    }
}

/// Sorts `source` by key and removes duplicates according to `policy`.
pub async fn deduplicate(
    ctx: &SessionContext,
    source: DataFrame,
    spec: &DedupSpec,
    policy: KeyPolicy,
) -> Result<DataFrame> {
    let temp_table = format!("dedup_{}_{}", spec.table, Uuid::new_v4().simple());
    ctx.register_table(temp_table.as_str(), source.into_view())?;

    let result = ctx.sql(&spec.to_sql(&temp_table, policy)).await;

    ctx.deregister_table(temp_table.as_str())?;
    Ok(result?)
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
