use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, AsArray, Float64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Field, FieldRef, Float64Type, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn is_text(dt: &DataType) -> bool {
    matches!(dt, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View)
}

/// Read any numeric or numeric-as-text column as `Float64`.
/// Text is run through [`clean_str`] first; values that don't parse become null.
pub fn to_float64(arr: &ArrayRef) -> Result<Float64Array> {
    let floats = if is_text(arr.data_type()) {
        let text = cast(arr, &DataType::Utf8).context("casting column to Utf8")?;
        let cleaned: StringArray = text
            .as_string::<i32>()
            .iter()
            .map(|opt| opt.map(clean_str))
            .collect();
        cast(&cleaned, &DataType::Float64)
            .context("parsing text column as Float64")?
    } else {
        cast(arr, &DataType::Float64)
            .with_context(|| format!("casting {:?} column to Float64", arr.data_type()))?
    };
    Ok(floats.as_primitive::<Float64Type>().clone())
}

/// Swap column `idx` for `array`, keeping its name and position.
pub fn replace_column(
    batch: &RecordBatch,
    idx: usize,
    array: ArrayRef,
    nullable: bool,
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
    fields[idx] = Arc::new(Field::new(
        fields[idx].name(),
        array.data_type().clone(),
        nullable,
    ));
    let mut columns = batch.columns().to_vec();
    columns[idx] = array;

    let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
    RecordBatch::try_new(Arc::new(schema), columns)
        .with_context(|| format!("replacing column #{}", idx))
}
