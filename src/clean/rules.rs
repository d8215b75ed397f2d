//! The individual cleaning rules. Each takes the batch entering the rule and
//! returns the batch leaving it; row order is always preserved.

use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray},
    compute::{cast, filter_record_batch, is_not_null},
    datatypes::DataType,
    record_batch::RecordBatch,
    row::{RowConverter, SortField},
};
use std::{collections::HashSet, sync::Arc};

use super::date_parser::to_timestamp_micros;
use super::utils::{replace_column, to_float64};

/// Placeholder for missing free-text values.
pub const UNKNOWN: &str = "Unknown";

fn keep(batch: &RecordBatch, mask: &BooleanArray) -> Result<RecordBatch> {
    filter_record_batch(batch, mask).context("filtering rows")
}

/// Drop rows equal in every column to an earlier row; the first one wins.
pub fn drop_duplicates(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_rows() == 0 || batch.num_columns() == 0 {
        return Ok(batch.clone());
    }

    let sort_fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(sort_fields).context("building row converter")?;
    let rows = converter
        .convert_columns(batch.columns())
        .context("encoding rows for dedupe")?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let mask: BooleanArray = rows.iter().map(|row| Some(seen.insert(row))).collect();
    keep(batch, &mask)
}

/// Keep rows where both quantity and unit price are strictly positive numbers.
/// Text is compared by its parsed value; text that isn't a number fails.
///
/// Judged on the values [`coerce_numeric`] will produce: quantity must be at
/// least one after truncation, both must be finite, and so must their product.
pub fn keep_positive(batch: &RecordBatch, quantity: usize, unit_price: usize) -> Result<RecordBatch> {
    let qty = to_float64(batch.column(quantity)).context("reading quantity")?;
    let price = to_float64(batch.column(unit_price)).context("reading unit price")?;

    let mask: BooleanArray = qty
        .iter()
        .zip(price.iter())
        .map(|pair| Some(matches!(pair, (Some(q), Some(p)) if positive_sale(q, p))))
        .collect();
    keep(batch, &mask)
}

fn positive_sale(quantity: f64, unit_price: f64) -> bool {
    let q = quantity.trunc();
    q.is_finite()
        && unit_price.is_finite()
        && q >= 1.0
        && q <= i64::MAX as f64
        && unit_price > 0.0
        && (q * unit_price).is_finite()
}

/// Drop rows whose value in `column` is missing (null, or NaN for floats).
pub fn drop_missing(batch: &RecordBatch, column: usize) -> Result<RecordBatch> {
    let arr = batch.column(column);
    let mask = match arr.data_type() {
        DataType::Float16 | DataType::Float32 | DataType::Float64 => to_float64(arr)?
            .iter()
            .map(|v| Some(v.is_some_and(|f| !f.is_nan())))
            .collect(),
        _ => is_not_null(arr.as_ref()).context("computing null mask")?,
    };
    keep(batch, &mask)
}

/// Parse `column` into `Timestamp(µs)` and drop the rows that don't parse.
pub fn normalize_timestamp(batch: &RecordBatch, column: usize) -> Result<RecordBatch> {
    let parsed = to_timestamp_micros(batch.column(column)).context("parsing invoice dates")?;
    let mask = is_not_null(&parsed).context("computing parse mask")?;
    let batch = replace_column(batch, column, Arc::new(parsed), true)?;
    let batch = keep(&batch, &mask)?;
    let col = batch.column(column).clone();
    replace_column(&batch, column, col, false)
}

/// Force quantity to `Int64` and unit price to `Float64`; non-numeric values become zero.
pub fn coerce_numeric(batch: &RecordBatch, quantity: usize, unit_price: usize) -> Result<RecordBatch> {
    let qty: Int64Array = to_float64(batch.column(quantity))?
        .iter()
        .map(|v| Some(v.filter(|f| f.is_finite()).map_or(0, |f| f.trunc() as i64)))
        .collect();
    let price: Float64Array = to_float64(batch.column(unit_price))?
        .iter()
        .map(|v| Some(v.unwrap_or(0.0)))
        .collect();

    let batch = replace_column(batch, quantity, Arc::new(qty), false)?;
    replace_column(&batch, unit_price, Arc::new(price), false)
}

/// Replace missing text in `column` with [`UNKNOWN`]. Never drops a row.
pub fn default_text(batch: &RecordBatch, column: usize) -> Result<RecordBatch> {
    let text: ArrayRef = cast(batch.column(column), &DataType::Utf8).context("casting text column")?;
    let filled: StringArray = text
        .as_string::<i32>()
        .iter()
        .map(|v| Some(v.unwrap_or(UNKNOWN)))
        .collect();
    replace_column(batch, column, Arc::new(filled), false)
}
