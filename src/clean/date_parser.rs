use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, AsArray, TimestampMicrosecondArray},
    compute::cast,
    datatypes::{DataType, TimeUnit, TimestampMicrosecondType},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::utils::{clean_str, is_text};

/// Date-time layouts tried in order. Month-first comes before day-first, so
/// `01/02/2011` is January 2nd; day-first only catches what month-first rejects.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

/// Bare dates land on midnight.
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Parse a loosely formatted invoice timestamp.
///
/// Accepts the Online Retail layout (`12/1/2010 8:26`), ISO-8601 with `T` or a
/// space, optional seconds and fractions, RFC 3339 with an offset (normalized
/// to UTC) and bare dates. Returns `None` for anything else.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Convert a text, timestamp or date column into naive `Timestamp(µs)`.
/// Unparseable text becomes null; nulls stay null.
pub fn to_timestamp_micros(arr: &ArrayRef) -> Result<TimestampMicrosecondArray> {
    let target = DataType::Timestamp(TimeUnit::Microsecond, None);
    match arr.data_type() {
        dt if is_text(dt) => {
            let text = cast(arr, &DataType::Utf8).context("casting date column to Utf8")?;
            Ok(text
                .as_string::<i32>()
                .iter()
                .map(|opt| {
                    opt.and_then(parse_datetime)
                        .map(|dt| dt.and_utc().timestamp_micros())
                })
                .collect())
        }
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            let ts = cast(arr, &target)
                .with_context(|| format!("casting {:?} to {:?}", arr.data_type(), target))?;
            Ok(ts.as_primitive::<TimestampMicrosecondType>().clone())
        }
        other => bail!("cannot read {:?} column as a timestamp", other),
    }
}
