// src/pipeline.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    clean::{CleanReport, CleaningEngine},
    config::PipelineConfig,
    ingest,
    publish::{PublishReport, Publisher},
    sheets::SpreadsheetService,
    store::TabularStore,
};

/// Per-stage results of a full run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub ingested_rows: usize,
    pub clean: CleanReport,
    pub publish: PublishReport,
}

/// Load the source file into the raw table, replacing it. Returns the row count.
#[instrument(level = "info", skip_all)]
pub fn ingest_stage(cfg: &PipelineConfig, store: &dyn TabularStore) -> Result<usize> {
    let rows = ingest::load_source(&cfg.source)?;
    store.ensure_schema(&cfg.store.raw_schema)?;
    store
        .replace_table(&cfg.store.raw_schema, &cfg.store.raw_table, &rows)
        .context("writing raw table")?;
    info!(
        rows = rows.num_rows(),
        table = %format!("{}.{}", cfg.store.raw_schema, cfg.store.raw_table),
        "ingest complete"
    );
    Ok(rows.num_rows())
}

/// Clean the raw table into the production table, stamping every row with
/// `transformed_at`.
#[instrument(level = "info", skip_all, fields(transformed_at = %transformed_at))]
pub fn transform_stage(
    cfg: &PipelineConfig,
    store: &dyn TabularStore,
    transformed_at: DateTime<Utc>,
) -> Result<CleanReport> {
    let raw = store
        .read_table(&cfg.store.raw_schema, &cfg.store.raw_table)
        .context("reading raw table")?;
    let cleaned = CleaningEngine::new(cfg.columns.clone()).clean(&raw, transformed_at)?;

    store.ensure_schema(&cfg.store.prod_schema)?;
    store
        .replace_table(&cfg.store.prod_schema, &cfg.store.prod_table, &cleaned.rows)
        .context("writing production table")?;
    info!(
        rows = cleaned.report.output_rows,
        table = %format!("{}.{}", cfg.store.prod_schema, cfg.store.prod_table),
        "transform complete"
    );
    Ok(cleaned.report)
}

/// Publish the production table to the configured spreadsheet.
#[instrument(level = "info", skip_all, fields(spreadsheet = %cfg.sheets.spreadsheet))]
pub fn publish_stage(
    cfg: &PipelineConfig,
    store: &dyn TabularStore,
    sheets: &dyn SpreadsheetService,
) -> Result<PublishReport> {
    let rows = store
        .read_table(&cfg.store.prod_schema, &cfg.store.prod_table)
        .context("reading production table")?;
    let report = Publisher::new(sheets)
        .with_max_cells(cfg.sheets.max_cells)
        .publish(&rows, &cfg.sheets.spreadsheet, &cfg.sheets.base_sheet_name)?;
    info!(pages = report.pages.len(), "publish complete");
    Ok(report)
}

/// Ingest, transform and publish, strictly in that order. The first failing
/// stage ends the run; tables written by earlier stages are left in place.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    store: &'a dyn TabularStore,
    sheets: &'a dyn SpreadsheetService,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a dyn TabularStore,
        sheets: &'a dyn SpreadsheetService,
    ) -> Self {
        Self {
            config,
            store,
            sheets,
        }
    }

    pub fn ingest(&self) -> Result<usize> {
        ingest_stage(self.config, self.store).context("ingest stage failed")
    }

    pub fn transform(&self) -> Result<CleanReport> {
        self.transform_at(Utc::now())
    }

    pub fn transform_at(&self, transformed_at: DateTime<Utc>) -> Result<CleanReport> {
        transform_stage(self.config, self.store, transformed_at).context("transform stage failed")
    }

    pub fn publish(&self) -> Result<PublishReport> {
        publish_stage(self.config, self.store, self.sheets).context("publish stage failed")
    }

    #[instrument(level = "info", skip_all)]
    pub fn run(&self) -> Result<RunSummary> {
        let ingested_rows = self.ingest()?;
        let clean = self.transform()?;
        let publish = self.publish()?;
        Ok(RunSummary {
            ingested_rows,
            clean,
            publish,
        })
    }
}
