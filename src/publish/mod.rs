// src/publish/mod.rs
pub mod pages;

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::ops::Range;
use tracing::{info, instrument};

use crate::sheets::{grid, SpreadsheetService};

pub use pages::{page_name, PageLayout, PageOutcome, DEFAULT_MAX_CELLS};

/// One destination page written by a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPage {
    pub name: String,
    pub rows: Range<usize>,
    pub outcome: PageOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub spreadsheet: String,
    pub layout: PageLayout,
    pub pages: Vec<PublishedPage>,
}

/// Writes a row set to a spreadsheet as one or more size-capped pages.
pub struct Publisher<'a> {
    service: &'a dyn SpreadsheetService,
    max_cells: usize,
}

impl<'a> Publisher<'a> {
    pub fn new(service: &'a dyn SpreadsheetService) -> Self {
        Self {
            service,
            max_cells: DEFAULT_MAX_CELLS,
        }
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    /// Replace pages `{base}_1..{base}_N` of `spreadsheet` with `rows`, header
    /// first on every page.
    #[instrument(level = "info", skip(self, rows), fields(rows = rows.num_rows()))]
    pub fn publish(
        &self,
        rows: &RecordBatch,
        spreadsheet: &str,
        base_sheet_name: &str,
    ) -> Result<PublishReport> {
        let layout = PageLayout::plan(rows.num_rows(), rows.num_columns(), self.max_cells)?;
        info!(
            rows_per_page = layout.rows_per_page,
            pages = layout.page_count,
            "planned pages"
        );

        let book = self.service.open_spreadsheet(spreadsheet)?;
        let header = grid::header(rows);

        let mut pages = Vec::with_capacity(layout.page_count);
        for (i, range) in layout.ranges().enumerate() {
            let name = page_name(base_sheet_name, i);
            let chunk = rows.slice(range.start, range.len());
            let cells = grid::to_rows(&chunk).with_context(|| format!("rendering page {}", name))?;

            let (page, outcome) = pages::prepare_page(
                self.service,
                &book,
                &name,
                range.len() + 1,
                layout.column_count,
            )
            .with_context(|| format!("preparing page {}", name))?;
            self.service
                .write_table(&page, &header, &cells)
                .with_context(|| format!("writing page {}", name))?;

            info!(page = %name, start = range.start, end = range.end, ?outcome, "published page");
            pages.push(PublishedPage {
                name,
                rows: range,
                outcome,
            });
        }

        Ok(PublishReport {
            spreadsheet: book.title,
            layout,
            pages,
        })
    }
}
