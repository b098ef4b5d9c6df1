use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use std::sync::Arc;

/// Rows per batch must stay below this so ids from adjacent batches never collide.
const ROW_BITS: u32 = 33;

/// Prepends an Int64 `column` holding `(batch_index << 33) | row_index`.
///
/// Ids are unique within the run and increase with batch order, but are not
/// consecutive across batches.
pub fn with_surrogate_ids(batches: Vec<RecordBatch>, column: &str) -> Result<Vec<RecordBatch>> {
    batches
        .into_iter()
        .enumerate()
        .map(|(batch_idx, batch)| {
            if batch.num_rows() as u64 >= 1 << ROW_BITS {
                return Err(Error::InvalidInput(format!(
                    "batch {} has too many rows for surrogate ids",
                    batch_idx
                )));
            }
            let base = (batch_idx as i64) << ROW_BITS;
            let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(
                (0..batch.num_rows() as i64).map(|row| base | row),
            ));

            let mut fields = vec![Arc::new(Field::new(column, DataType::Int64, false))];
            fields.extend(batch.schema().fields().iter().cloned());
            let mut columns = vec![ids];
            columns.extend(batch.columns().iter().cloned());

            Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::StringArray;
    use std::collections::HashSet;

    fn batch(values: &[&str]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("song_id", DataType::Utf8, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(values.to_vec()))]).unwrap()
    }

    fn ids(batches: &[RecordBatch]) -> Vec<i64> {
        batches
            .iter()
            .flat_map(|b| {
                b.column(0)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .values()
                    .to_vec()
            })
            .collect()
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let out = with_surrogate_ids(
            vec![batch(&["S1", "S2", "S3"]), batch(&[]), batch(&["S4", "S5"])],
            "songplay_id",
        )
        .unwrap();

        let ids = ids(&out);
        assert_eq!(ids.len(), 5);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 5);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids[..3], [0, 1, 2]);
        assert_eq!(ids[3], 2 << 33);
    }

    #[test]
    fn test_id_column_is_prepended() {
        let out = with_surrogate_ids(vec![batch(&["S1"])], "songplay_id").unwrap();
        let schema = out[0].schema();

        assert_eq!(schema.field(0).name(), "songplay_id");
        assert_eq!(schema.field(1).name(), "song_id");
        assert_eq!(out[0].num_columns(), 2);
    }
}
