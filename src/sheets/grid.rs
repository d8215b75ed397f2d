use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::cast,
    datatypes::{DataType, Date32Type, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType},
    record_batch::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use chrono::{DateTime, NaiveDate};
use serde_json::{Number, Value};

use super::Cell;

const EMPTY: &str = "";

/// Column names, in schema order.
pub fn header(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

/// Lay a batch out as row-major cells.
///
/// Integers and floats become JSON numbers, text stays text, timestamps are
/// written `YYYY-MM-DD HH:MM:SS[.fff]`, dates `YYYY-MM-DD`, and nulls (or
/// non-finite floats) become empty strings.
pub fn to_rows(batch: &RecordBatch) -> Result<Vec<Vec<Cell>>> {
    let mut rows: Vec<Vec<Cell>> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(batch.num_columns()))
        .collect();

    for (field, col) in batch.schema().fields().iter().zip(batch.columns()) {
        let cells = column_cells(col).with_context(|| format!("rendering column `{}`", field.name()))?;
        for (row, cell) in rows.iter_mut().zip(cells) {
            row.push(cell);
        }
    }
    Ok(rows)
}

fn empty() -> Cell {
    Value::String(EMPTY.to_string())
}

fn column_cells(col: &ArrayRef) -> Result<Vec<Cell>> {
    let cells = match col.data_type() {
        DataType::Null => vec![empty(); col.len()],
        DataType::Boolean => col
            .as_boolean()
            .iter()
            .map(|v| v.map_or_else(empty, Value::Bool))
            .collect(),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => cast(col, &DataType::Int64)?
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map_or_else(empty, |i| Value::Number(i.into())))
            .collect(),
        DataType::Float16 | DataType::Float32 | DataType::Float64 => cast(col, &DataType::Float64)?
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| {
                v.and_then(Number::from_f64)
                    .map_or_else(empty, Value::Number)
            })
            .collect(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => cast(col, &DataType::Utf8)?
            .as_string::<i32>()
            .iter()
            .map(|v| Value::String(v.unwrap_or(EMPTY).to_string()))
            .collect(),
        DataType::Timestamp(_, _) => {
            cast(col, &DataType::Timestamp(TimeUnit::Microsecond, None))?
                .as_primitive::<TimestampMicrosecondType>()
                .iter()
                .map(|v| {
                    v.and_then(DateTime::from_timestamp_micros)
                        .map_or_else(empty, |dt| {
                            Value::String(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
                        })
                })
                .collect()
        }
        DataType::Date32 | DataType::Date64 => cast(col, &DataType::Date32)?
            .as_primitive::<Date32Type>()
            .iter()
            .map(|v| {
                v.and_then(|days| NaiveDate::from_num_days_from_ce_opt(days + 719_163))
                    .map_or_else(empty, |d| Value::String(d.format("%Y-%m-%d").to_string()))
            })
            .collect(),
        _ => {
            let options = FormatOptions::default();
            let formatter = ArrayFormatter::try_new(col.as_ref(), &options)?;
            (0..col.len())
                .map(|i| {
                    if col.is_null(i) {
                        empty()
                    } else {
                        Value::String(formatter.value(i).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        BooleanArray, Date32Array, Float64Array, Int32Array, StringArray,
        TimestampMicrosecondArray,
    };
    use arrow::datatypes::{Field, Schema};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_to_rows_renders_each_type() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("s", DataType::Utf8, true),
            Field::new("i", DataType::Int32, true),
            Field::new("f", DataType::Float64, true),
            Field::new("b", DataType::Boolean, true),
            Field::new("d", DataType::Date32, true),
            Field::new("t", DataType::Timestamp(TimeUnit::Microsecond, None), true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("mug"), None])),
                Arc::new(Int32Array::from(vec![Some(6), None])),
                Arc::new(Float64Array::from(vec![Some(15.3), Some(f64::NAN)])),
                Arc::new(BooleanArray::from(vec![Some(true), None])),
                Arc::new(Date32Array::from(vec![Some(14944), None])),
                Arc::new(TimestampMicrosecondArray::from(vec![
                    Some(1_291_191_960_000_000),
                    Some(1_291_191_960_500_000),
                ])),
            ],
        )?;

        assert_eq!(header(&batch), vec!["s", "i", "f", "b", "d", "t"]);
        let rows = to_rows(&batch)?;
        assert_eq!(
            rows[0],
            vec![
                json!("mug"),
                json!(6),
                json!(15.3),
                json!(true),
                json!("2010-12-01"),
                json!("2010-12-01 08:26:00"),
            ]
        );
        assert_eq!(
            rows[1],
            vec![
                json!(""),
                json!(""),
                json!(""),
                json!(""),
                json!(""),
                json!("2010-12-01 08:26:00.500"),
            ]
        );
        Ok(())
    }
}
