use anyhow::{bail, Result};
use serde::Serialize;
use std::ops::Range;
use tracing::{debug, warn};

use crate::sheets::{PageHandle, SpreadsheetHandle, SpreadsheetService};

/// Default cap on data cells per page. The header row is not counted, so a
/// full page holds `(rows_per_page + 1) * cols` cells (9,000,003 at three
/// columns), still under the platform ceiling of 10,000,000.
pub const DEFAULT_MAX_CELLS: usize = 9_000_000;

/// How a row set is split across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageLayout {
    pub total_rows: usize,
    pub column_count: usize,
    pub rows_per_page: usize,
    pub page_count: usize,
}

impl PageLayout {
    pub fn plan(total_rows: usize, column_count: usize, max_cells: usize) -> Result<Self> {
        if column_count == 0 {
            bail!("cannot publish a table with no columns");
        }
        let rows_per_page = (max_cells / column_count).max(1);
        Ok(Self {
            total_rows,
            column_count,
            rows_per_page,
            page_count: total_rows.div_ceil(rows_per_page),
        })
    }

    /// Row range of page `index` (0-based).
    pub fn range(&self, index: usize) -> Range<usize> {
        let start = (index * self.rows_per_page).min(self.total_rows);
        let end = (start + self.rows_per_page).min(self.total_rows);
        start..end
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.page_count).map(|i| self.range(i))
    }
}

/// `"{base}_{index + 1}"`.
pub fn page_name(base: &str, index: usize) -> String {
    format!("{}_{}", base, index + 1)
}

/// What happened to a destination page before its rows were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageOutcome {
    Created,
    Recreated,
    Cleared,
}

enum PageState {
    Absent,
    PresentReplaceable(PageHandle),
    PresentClearFallback(PageHandle),
}

/// Get an empty page named `name`, sized for `rows` x `cols` when created.
///
/// An existing page is deleted and recreated. If the deletion is refused the
/// page is cleared in place and reused instead.
pub fn prepare_page(
    service: &dyn SpreadsheetService,
    book: &SpreadsheetHandle,
    name: &str,
    rows: usize,
    cols: usize,
) -> Result<(PageHandle, PageOutcome)> {
    let mut state = match service.get_page(book, name)? {
        Some(page) => PageState::PresentReplaceable(page),
        None => PageState::Absent,
    };
    loop {
        state = match state {
            PageState::Absent => {
                let page = service.create_page(book, name, rows, cols)?;
                debug!(sheet = name, rows, cols, "created sheet");
                return Ok((page, PageOutcome::Created));
            }
            PageState::PresentReplaceable(page) => match service.delete_page(book, &page) {
                Ok(()) => {
                    let page = service.create_page(book, name, rows, cols)?;
                    debug!(sheet = name, rows, cols, "recreated sheet");
                    return Ok((page, PageOutcome::Recreated));
                }
                Err(e) => {
                    warn!(sheet = name, error = %format!("{:#}", e), "could not delete sheet; clearing it instead");
                    PageState::PresentClearFallback(page)
                }
            },
            PageState::PresentClearFallback(page) => {
                service.clear_page(&page)?;
                return Ok((page, PageOutcome::Cleared));
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::MemorySheets;

    #[test]
    fn test_plan_large_table() -> Result<()> {
        let layout = PageLayout::plan(19_500_000, 3, DEFAULT_MAX_CELLS)?;
        assert_eq!(layout.rows_per_page, 3_000_000);
        assert_eq!(layout.page_count, 7);
        assert_eq!(layout.range(6), 18_000_000..19_500_000);
        // Header included, a full page stays under the platform ceiling.
        assert!((layout.rows_per_page + 1) * layout.column_count < 10_000_000);
        Ok(())
    }

    #[test]
    fn test_plan_boundaries() -> Result<()> {
        let layout = PageLayout::plan(3_000_000, 3, DEFAULT_MAX_CELLS)?;
        assert_eq!(layout.page_count, 1);
        let layout = PageLayout::plan(3_000_001, 3, DEFAULT_MAX_CELLS)?;
        assert_eq!(layout.page_count, 2);
        assert_eq!(layout.range(1), 3_000_000..3_000_001);

        assert_eq!(PageLayout::plan(0, 3, DEFAULT_MAX_CELLS)?.page_count, 0);
        // More columns than the cap still yields one row per page.
        assert_eq!(PageLayout::plan(5, 20, 10)?.rows_per_page, 1);
        assert!(PageLayout::plan(5, 0, DEFAULT_MAX_CELLS).is_err());
        Ok(())
    }

    #[test]
    fn test_ranges_cover_rows_in_order() -> Result<()> {
        let layout = PageLayout::plan(23, 4, 20)?;
        let ranges: Vec<_> = layout.ranges().collect();
        assert_eq!(ranges.len(), 5);
        let covered: Vec<usize> = ranges.into_iter().flatten().collect();
        assert_eq!(covered, (0..23).collect::<Vec<_>>());
        for r in layout.ranges() {
            assert!(r.len() * layout.column_count <= 20);
        }
        Ok(())
    }

    #[test]
    fn test_page_name() {
        assert_eq!(page_name("ProductionData", 0), "ProductionData_1");
        assert_eq!(page_name("ProductionData", 6), "ProductionData_7");
    }

    #[test]
    fn test_prepare_page_transitions() -> Result<()> {
        let sheets = MemorySheets::new();
        let book = sheets.add_spreadsheet("Book");

        let (_, outcome) = prepare_page(&sheets, &book, "P_1", 4, 2)?;
        assert_eq!(outcome, PageOutcome::Created);

        let (page, outcome) = prepare_page(&sheets, &book, "P_1", 6, 2)?;
        assert_eq!(outcome, PageOutcome::Recreated);
        assert_eq!(page.rows, 6);

        sheets.fail_deletes(true);
        let (page, outcome) = prepare_page(&sheets, &book, "P_1", 9, 2)?;
        assert_eq!(outcome, PageOutcome::Cleared);
        assert_eq!(page.rows, 6);
        Ok(())
    }
}
