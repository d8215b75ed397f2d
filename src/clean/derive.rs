use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{
        ArrayRef, AsArray, Date32Array, Float64Array, Int32Array, StringArray,
        TimestampMicrosecondArray,
    },
    datatypes::{
        DataType, Field, FieldRef, Float64Type, Int64Type, Schema, TimeUnit,
        TimestampMicrosecondType,
    },
    record_batch::RecordBatch,
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::sync::Arc;

pub const TOTAL_PRICE: &str = "TotalPrice";
pub const INVOICE_YEAR: &str = "InvoiceYear";
pub const INVOICE_MONTH: &str = "InvoiceMonth";
pub const INVOICE_DAY: &str = "InvoiceDay";
pub const INVOICE_HOUR: &str = "InvoiceHour";
pub const INVOICE_DATE_ONLY: &str = "InvoiceDateOnly";
pub const INVOICE_WEEKDAY: &str = "InvoiceWeekday";
pub const TRANSFORMED_AT: &str = "_pipeline_transformed_at";

/// Derived columns, in the order they are appended.
pub const DERIVED_COLUMNS: [&str; 8] = [
    TOTAL_PRICE,
    INVOICE_YEAR,
    INVOICE_MONTH,
    INVOICE_DAY,
    INVOICE_HOUR,
    INVOICE_DATE_ONLY,
    INVOICE_WEEKDAY,
    TRANSFORMED_AT,
];

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Append the derived columns. Expects quantity as `Int64`, unit price as
/// `Float64` and the invoice date as non-null `Timestamp(µs)`.
///
/// Derived columns already in `batch` (re-cleaning a production table) are
/// dropped first, so the output layout does not depend on the input having them.
pub fn append_derived(
    batch: &RecordBatch,
    quantity: usize,
    unit_price: usize,
    invoice_date: usize,
    transformed_at: DateTime<Utc>,
) -> Result<RecordBatch> {
    let qty = batch.column(quantity).as_primitive::<Int64Type>();
    let price = batch.column(unit_price).as_primitive::<Float64Type>();
    let dates = batch
        .column(invoice_date)
        .as_primitive::<TimestampMicrosecondType>();

    let total = Float64Array::from_iter_values(
        qty.values()
            .iter()
            .zip(price.values().iter())
            .map(|(q, p)| *q as f64 * *p),
    );

    let n = batch.num_rows();
    let mut years = Vec::with_capacity(n);
    let mut months = Vec::with_capacity(n);
    let mut days = Vec::with_capacity(n);
    let mut hours = Vec::with_capacity(n);
    let mut date_only = Vec::with_capacity(n);
    let mut weekdays = Vec::with_capacity(n);
    for (row, micros) in dates.values().iter().enumerate() {
        let dt = DateTime::from_timestamp_micros(*micros)
            .ok_or_else(|| anyhow!("invoice date out of range at row {}", row))?
            .naive_utc();
        years.push(dt.year());
        months.push(dt.month() as i32);
        days.push(dt.day() as i32);
        hours.push(dt.hour() as i32);
        date_only.push(dt.date().num_days_from_ce() - EPOCH_DAYS_FROM_CE);
        weekdays.push(dt.format("%A").to_string());
    }
    let stamped = TimestampMicrosecondArray::from(vec![transformed_at.timestamp_micros(); n]);

    let derived: [(FieldRef, ArrayRef); 8] = [
        (field(TOTAL_PRICE, DataType::Float64), Arc::new(total)),
        (field(INVOICE_YEAR, DataType::Int32), Arc::new(Int32Array::from(years))),
        (field(INVOICE_MONTH, DataType::Int32), Arc::new(Int32Array::from(months))),
        (field(INVOICE_DAY, DataType::Int32), Arc::new(Int32Array::from(days))),
        (field(INVOICE_HOUR, DataType::Int32), Arc::new(Int32Array::from(hours))),
        (field(INVOICE_DATE_ONLY, DataType::Date32), Arc::new(Date32Array::from(date_only))),
        (field(INVOICE_WEEKDAY, DataType::Utf8), Arc::new(StringArray::from(weekdays))),
        (
            field(TRANSFORMED_AT, DataType::Timestamp(TimeUnit::Microsecond, None)),
            Arc::new(stamped),
        ),
    ];

    let schema = batch.schema();
    let mut fields: Vec<FieldRef> = Vec::with_capacity(batch.num_columns() + derived.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
    for (f, col) in schema.fields().iter().zip(batch.columns()) {
        if DERIVED_COLUMNS.contains(&f.name().as_str()) {
            continue;
        }
        fields.push(f.clone());
        columns.push(col.clone());
    }
    for (f, col) in derived {
        fields.push(f);
        columns.push(col);
    }

    let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
    RecordBatch::try_new(Arc::new(schema), columns).context("assembling production batch")
}

fn field(name: &str, dt: DataType) -> FieldRef {
    Arc::new(Field::new(name, dt, false))
}
