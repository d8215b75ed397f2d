// src/clean/mod.rs
pub mod date_parser;
pub mod derive;
pub mod rules;
pub mod utils;

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::ColumnNames;

pub use derive::DERIVED_COLUMNS;
pub use rules::UNKNOWN;

/// Rows removed by each rule, each counted against that rule's own input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub duplicates_removed: usize,
    pub non_positive_removed: usize,
    pub missing_customer_removed: usize,
    pub unparseable_dates_removed: usize,
    pub output_rows: usize,
}

/// Output of one cleaning pass.
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub rows: RecordBatch,
    pub report: CleanReport,
}

/// Turns raw invoice rows into production rows.
#[derive(Debug, Clone, Default)]
pub struct CleaningEngine {
    columns: ColumnNames,
}

struct Indices {
    quantity: usize,
    unit_price: usize,
    customer_id: usize,
    invoice_date: usize,
    description: Option<usize>,
    country: Option<usize>,
}

impl CleaningEngine {
    pub fn new(columns: ColumnNames) -> Self {
        Self { columns }
    }

    fn resolve(&self, batch: &RecordBatch) -> Result<Indices> {
        let schema = batch.schema();
        let required = |name: &str| {
            schema
                .index_of(name)
                .with_context(|| format!("raw table has no `{}` column", name))
        };
        Ok(Indices {
            quantity: required(&self.columns.quantity)?,
            unit_price: required(&self.columns.unit_price)?,
            customer_id: required(&self.columns.customer_id)?,
            invoice_date: required(&self.columns.invoice_date)?,
            description: schema.index_of(&self.columns.description).ok(),
            country: schema.index_of(&self.columns.country).ok(),
        })
    }

    /// Apply the cleaning rules in order:
    /// 1. drop exact duplicates (first occurrence wins)
    /// 2. keep quantity > 0 and unit price > 0
    /// 3. drop rows without a customer id
    /// 4. parse the invoice date, dropping rows that don't parse
    /// 5. coerce quantity to `Int64` and unit price to `Float64`
    /// 6. default missing description/country to `"Unknown"`
    /// 7. append total price, calendar fields and `transformed_at`
    ///
    /// `transformed_at` is stamped on every output row unchanged.
    #[instrument(level = "info", skip_all, fields(rows = raw.num_rows()))]
    pub fn clean(&self, raw: &RecordBatch, transformed_at: DateTime<Utc>) -> Result<Cleaned> {
        let idx = self.resolve(raw)?;
        let mut report = CleanReport {
            input_rows: raw.num_rows(),
            ..Default::default()
        };

        let batch = rules::drop_duplicates(raw)?;
        report.duplicates_removed = raw.num_rows() - batch.num_rows();
        info!(
            removed = report.duplicates_removed,
            remaining = batch.num_rows(),
            "dropped duplicate rows"
        );

        let before = batch.num_rows();
        let batch = rules::keep_positive(&batch, idx.quantity, idx.unit_price)?;
        report.non_positive_removed = before - batch.num_rows();
        info!(
            removed = report.non_positive_removed,
            remaining = batch.num_rows(),
            "kept sales with positive quantity and unit price"
        );

        let before = batch.num_rows();
        let batch = rules::drop_missing(&batch, idx.customer_id)?;
        report.missing_customer_removed = before - batch.num_rows();
        info!(
            removed = report.missing_customer_removed,
            remaining = batch.num_rows(),
            "dropped rows without a customer id"
        );

        let before = batch.num_rows();
        let batch = rules::normalize_timestamp(&batch, idx.invoice_date)?;
        report.unparseable_dates_removed = before - batch.num_rows();
        info!(
            removed = report.unparseable_dates_removed,
            remaining = batch.num_rows(),
            "parsed invoice dates"
        );

        let mut batch = rules::coerce_numeric(&batch, idx.quantity, idx.unit_price)?;
        for col in [idx.description, idx.country].into_iter().flatten() {
            batch = rules::default_text(&batch, col)?;
        }

        let batch = derive::append_derived(
            &batch,
            idx.quantity,
            idx.unit_price,
            idx.invoice_date,
            transformed_at,
        )?;
        report.output_rows = batch.num_rows();
        info!(
            rows = report.output_rows,
            columns = batch.num_columns(),
            "built production rows"
        );

        Ok(Cleaned {
            rows: batch,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::init_test_logging;
    use arrow::array::{Array, ArrayRef, AsArray, StringArray};
    use arrow::datatypes::{
        DataType, Date32Type, Field, Float64Type, Int32Type, Int64Type, Schema,
        TimestampMicrosecondType,
    };
    use chrono::TimeZone;
    use std::sync::Arc;

    const HEADERS: [&str; 8] = [
        "InvoiceNo",
        "StockCode",
        "Description",
        "Quantity",
        "InvoiceDate",
        "UnitPrice",
        "CustomerID",
        "Country",
    ];

    type RawRow = [Option<&'static str>; 8];

    fn raw_batch(rows: &[RawRow]) -> RecordBatch {
        let fields: Vec<Field> = HEADERS
            .iter()
            .map(|h| Field::new(*h, DataType::Utf8, true))
            .collect();
        let columns: Vec<ArrayRef> = (0..HEADERS.len())
            .map(|c| {
                Arc::new(rows.iter().map(|r| r[c]).collect::<StringArray>()) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
    }

    /// Ten raw rows: two exact duplicates of the first row, one zero quantity,
    /// one without a customer, one unparseable date, five clean survivors.
    fn scenario_rows() -> Vec<RawRow> {
        let good: RawRow = [
            Some("536365"),
            Some("85123A"),
            Some("WHITE HANGING HEART T-LIGHT HOLDER"),
            Some("6"),
            Some("12/1/2010 8:26"),
            Some("2.55"),
            Some("17850"),
            Some("United Kingdom"),
        ];
        vec![
            good,
            good,
            good,
            [Some("536366"), Some("22633"), Some("HAND WARMER UNION JACK"), Some("6"), Some("12/1/2010 8:28"), Some("1.85"), Some("17850"), Some("United Kingdom")],
            [Some("536367"), Some("84879"), None, Some("32"), Some("12/1/2010 8:34"), Some("1.69"), Some("13047"), None],
            [Some("C536379"), Some("D"), Some("Discount"), Some("0"), Some("12/1/2010 9:41"), Some("27.50"), Some("14527"), Some("United Kingdom")],
            [Some("536414"), Some("22139"), None, Some("56"), Some("12/1/2010 11:52"), Some("0.5"), None, Some("United Kingdom")],
            [Some("536520"), Some("21123"), Some("SET/10 IVORY POLKADOT"), Some("1"), Some("not a date"), Some("1.25"), Some("14729"), Some("United Kingdom")],
            [Some("536370"), Some("22728"), Some("ALARM CLOCK BAKELIKE PINK"), Some("24"), Some("2010-12-01 08:45:00"), Some("3.75"), Some("12583"), Some("France")],
            [Some("536371"), Some("22086"), Some("PAPER CHAIN KIT"), Some("80"), Some("12/1/2010 9:00"), Some("2.55"), Some("13748"), Some("Australia")],
        ]
    }

    fn run_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ten_row_scenario() -> Result<()> {
        init_test_logging();
        let engine = CleaningEngine::default();
        let out = engine.clean(&raw_batch(&scenario_rows()), run_at())?;

        assert_eq!(
            out.report,
            CleanReport {
                input_rows: 10,
                duplicates_removed: 2,
                non_positive_removed: 1,
                missing_customer_removed: 1,
                unparseable_dates_removed: 1,
                output_rows: 5,
            }
        );

        let rows = &out.rows;
        assert_eq!(rows.num_rows(), 5);
        assert_eq!(rows.num_columns(), HEADERS.len() + DERIVED_COLUMNS.len());
        let names: Vec<String> = rows.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(&names[..8], &HEADERS);
        assert_eq!(&names[8..], &DERIVED_COLUMNS);

        let schema = rows.schema();
        let col = |name: &str| rows.column(schema.index_of(name).unwrap()).clone();
        let qty = col("Quantity");
        let qty = qty.as_primitive::<Int64Type>();
        let price = col("UnitPrice");
        let price = price.as_primitive::<Float64Type>();
        let total = col("TotalPrice");
        let total = total.as_primitive::<Float64Type>();
        assert_eq!(qty.values().to_vec(), vec![6, 6, 32, 24, 80]);
        for i in 0..rows.num_rows() {
            assert!(qty.value(i) > 0);
            assert!(price.value(i) > 0.0);
            assert_eq!(total.value(i), qty.value(i) as f64 * price.value(i));
        }

        let desc = col("Description");
        assert_eq!(desc.as_string::<i32>().value(2), UNKNOWN);
        assert_eq!(col("Country").as_string::<i32>().value(2), UNKNOWN);
        assert_eq!(col("CustomerID").null_count(), 0);

        let year = col("InvoiceYear");
        let hour = col("InvoiceHour");
        assert_eq!(year.as_primitive::<Int32Type>().value(0), 2010);
        assert_eq!(col("InvoiceMonth").as_primitive::<Int32Type>().value(0), 12);
        assert_eq!(col("InvoiceDay").as_primitive::<Int32Type>().value(0), 1);
        assert_eq!(hour.as_primitive::<Int32Type>().values().to_vec(), vec![8, 8, 8, 8, 9]);
        assert_eq!(col("InvoiceWeekday").as_string::<i32>().value(0), "Wednesday");
        // 2010-12-01 is day 14944 since the epoch
        assert_eq!(col("InvoiceDateOnly").as_primitive::<Date32Type>().value(0), 14944);

        let stamped = col("_pipeline_transformed_at");
        let stamped = stamped.as_primitive::<TimestampMicrosecondType>();
        assert!(stamped.values().iter().all(|v| *v == run_at().timestamp_micros()));
        Ok(())
    }

    #[test]
    fn test_numeric_edge_values_keep_production_invariants() -> Result<()> {
        init_test_logging();
        // (raw value, survives) for each column.
        let quantities: [(&'static str, bool); 12] = [
            ("0.5", false),
            ("0.99", false),
            ("1e-3", false),
            ("inf", false),
            ("Infinity", false),
            ("-inf", false),
            ("NaN", false),
            ("9e99", false),
            ("1", true),
            ("2.9", true),
            (" 3 ", true),
            ("1e2", true),
        ];
        let prices: [(&'static str, bool); 7] = [
            ("inf", false),
            ("Infinity", false),
            ("NaN", false),
            ("1e-400", false),
            ("2.55", true),
            ("1e2", true),
            ("0.001", true),
        ];

        let template = scenario_rows()[0];
        let mut rows = Vec::new();
        for (q, _) in quantities {
            for (p, _) in prices {
                let mut row = template;
                row[3] = Some(q);
                row[5] = Some(p);
                rows.push(row);
            }
        }
        let survivors = quantities.iter().filter(|(_, ok)| *ok).count()
            * prices.iter().filter(|(_, ok)| *ok).count();

        let out = CleaningEngine::default().clean(&raw_batch(&rows), run_at())?;
        assert_eq!(out.report.duplicates_removed, 0);
        assert_eq!(out.report.non_positive_removed, rows.len() - survivors);
        assert_eq!(out.report.output_rows, survivors);

        let schema = out.rows.schema();
        let qty = out.rows.column(schema.index_of("Quantity")?).as_primitive::<Int64Type>().clone();
        let price = out.rows.column(schema.index_of("UnitPrice")?).as_primitive::<Float64Type>().clone();
        let total = out.rows.column(schema.index_of("TotalPrice")?).as_primitive::<Float64Type>().clone();
        for i in 0..out.rows.num_rows() {
            assert!(qty.value(i) > 0, "row {} quantity {}", i, qty.value(i));
            assert!(price.value(i).is_finite() && price.value(i) > 0.0, "row {} price {}", i, price.value(i));
            assert!(total.value(i).is_finite(), "row {} total {}", i, total.value(i));
            assert_eq!(total.value(i), qty.value(i) as f64 * price.value(i));
        }
        Ok(())
    }

    #[test]
    fn test_clean_is_idempotent() -> Result<()> {
        init_test_logging();
        let engine = CleaningEngine::default();
        let first = engine.clean(&raw_batch(&scenario_rows()), run_at())?;
        let later = run_at() + chrono::Duration::hours(1);
        let second = engine.clean(&first.rows, later)?;

        assert_eq!(second.report.input_rows, 5);
        assert_eq!(second.report.output_rows, 5);
        assert_eq!(second.rows.schema().fields(), first.rows.schema().fields());

        let stamp = first.rows.schema().index_of(derive::TRANSFORMED_AT)?;
        for c in 0..first.rows.num_columns() {
            if c == stamp {
                continue;
            }
            assert_eq!(first.rows.column(c), second.rows.column(c), "column {}", c);
        }
        Ok(())
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("Quantity", DataType::Utf8, true)])),
            vec![Arc::new(StringArray::from(vec![Some("1")]))],
        )
        .unwrap();
        let err = CleaningEngine::default().clean(&batch, run_at()).unwrap_err();
        assert!(err.to_string().contains("UnitPrice"));
    }

    #[test]
    fn test_empty_input() -> Result<()> {
        let out = CleaningEngine::default().clean(&raw_batch(&[]), run_at())?;
        assert_eq!(out.report, CleanReport::default());
        assert_eq!(out.rows.num_columns(), HEADERS.len() + DERIVED_COLUMNS.len());
        Ok(())
    }

    #[test]
    fn test_custom_column_names() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("qty", DataType::Utf8, true),
            Field::new("price", DataType::Utf8, true),
            Field::new("cust", DataType::Utf8, true),
            Field::new("when", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("2"), Some("3")])),
                Arc::new(StringArray::from(vec![Some("1.5"), Some("-1")])),
                Arc::new(StringArray::from(vec![Some("1"), Some("2")])),
                Arc::new(StringArray::from(vec![Some("2011-06-01 10:00"), Some("2011-06-01 10:00")])),
            ],
        )?;
        let engine = CleaningEngine::new(ColumnNames {
            quantity: "qty".into(),
            unit_price: "price".into(),
            customer_id: "cust".into(),
            invoice_date: "when".into(),
            ..Default::default()
        });
        let out = engine.clean(&batch, run_at())?;
        assert_eq!(out.report.output_rows, 1);
        // no description/country columns: nothing is added for them
        assert_eq!(out.rows.num_columns(), 4 + DERIVED_COLUMNS.len());
        Ok(())
    }
}
