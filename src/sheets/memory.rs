use anyhow::{anyhow, bail, Result};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};
use tracing::debug;

use super::{Cell, PageHandle, SpreadsheetHandle, SpreadsheetService};

/// Sheet newly created spreadsheets start with.
pub const DEFAULT_PAGE: &str = "Sheet1";

/// Snapshot of one in-memory sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    pub sheet_id: i64,
    pub title: String,
    pub rows: usize,
    pub cols: usize,
    /// Written values, row-major from A1. Rows never written are absent.
    pub cells: Vec<Vec<Cell>>,
}

#[derive(Debug, Default)]
struct Book {
    id: String,
    pages: Vec<MemoryPage>,
}

#[derive(Debug, Default)]
struct State {
    books: BTreeMap<String, Book>,
    next_id: i64,
    fail_deletes: bool,
}

/// In-process spreadsheet service. Behaves like the hosted one where it
/// matters: the last sheet of a spreadsheet cannot be deleted and titles are
/// unique within a spreadsheet.
#[derive(Debug, Default)]
pub struct MemorySheets {
    state: Mutex<State>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty spreadsheet holding a single [`DEFAULT_PAGE`].
    pub fn add_spreadsheet(&self, title: &str) -> SpreadsheetHandle {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        let sheet_id = state.next_id;
        state.books.insert(
            title.to_string(),
            Book {
                id: id.clone(),
                pages: vec![MemoryPage {
                    sheet_id,
                    title: DEFAULT_PAGE.to_string(),
                    rows: 1000,
                    cols: 26,
                    cells: Vec::new(),
                }],
            },
        );
        SpreadsheetHandle {
            id,
            title: title.to_string(),
        }
    }

    /// Make every subsequent sheet deletion fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Sheet titles of a spreadsheet, in tab order.
    pub fn page_titles(&self, spreadsheet: &str) -> Vec<String> {
        self.lock()
            .books
            .get(spreadsheet)
            .map(|b| b.pages.iter().map(|p| p.title.clone()).collect())
            .unwrap_or_default()
    }

    pub fn page(&self, spreadsheet: &str, title: &str) -> Option<MemoryPage> {
        self.lock()
            .books
            .get(spreadsheet)
            .and_then(|b| b.pages.iter().find(|p| p.title == title).cloned())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn book_mut(&mut self, id: &str) -> Result<&mut Book> {
        self.books
            .values_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| anyhow!("spreadsheet {} not found", id))
    }

    fn page_mut(&mut self, page: &PageHandle) -> Result<&mut MemoryPage> {
        self.book_mut(&page.spreadsheet_id)?
            .pages
            .iter_mut()
            .find(|p| p.sheet_id == page.sheet_id)
            .ok_or_else(|| anyhow!("sheet `{}` no longer exists", page.title))
    }
}

fn handle(book_id: &str, page: &MemoryPage) -> PageHandle {
    PageHandle {
        spreadsheet_id: book_id.to_string(),
        sheet_id: page.sheet_id,
        title: page.title.clone(),
        rows: page.rows,
        cols: page.cols,
    }
}

impl SpreadsheetService for MemorySheets {
    fn open_spreadsheet(&self, name: &str) -> Result<SpreadsheetHandle> {
        let state = self.lock();
        let book = state
            .books
            .get(name)
            .ok_or_else(|| anyhow!("spreadsheet `{}` not found", name))?;
        Ok(SpreadsheetHandle {
            id: book.id.clone(),
            title: name.to_string(),
        })
    }

    fn get_page(&self, book: &SpreadsheetHandle, name: &str) -> Result<Option<PageHandle>> {
        let mut state = self.lock();
        let b = state.book_mut(&book.id)?;
        Ok(b.pages
            .iter()
            .find(|p| p.title == name)
            .map(|p| handle(&book.id, p)))
    }

    fn delete_page(&self, book: &SpreadsheetHandle, page: &PageHandle) -> Result<()> {
        let mut state = self.lock();
        if state.fail_deletes {
            bail!("deleting sheet `{}` was refused", page.title);
        }
        let b = state.book_mut(&book.id)?;
        if b.pages.len() <= 1 {
            bail!("cannot remove the only sheet in spreadsheet `{}`", book.title);
        }
        let before = b.pages.len();
        b.pages.retain(|p| p.sheet_id != page.sheet_id);
        if b.pages.len() == before {
            bail!("sheet `{}` not found", page.title);
        }
        debug!(sheet = %page.title, "deleted sheet");
        Ok(())
    }

    fn create_page(
        &self,
        book: &SpreadsheetHandle,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<PageHandle> {
        let mut state = self.lock();
        state.next_id += 1;
        let sheet_id = state.next_id;
        let b = state.book_mut(&book.id)?;
        if b.pages.iter().any(|p| p.title == name) {
            bail!("a sheet named `{}` already exists", name);
        }
        let page = MemoryPage {
            sheet_id,
            title: name.to_string(),
            rows,
            cols,
            cells: Vec::new(),
        };
        let h = handle(&book.id, &page);
        b.pages.push(page);
        Ok(h)
    }

    fn clear_page(&self, page: &PageHandle) -> Result<()> {
        let mut state = self.lock();
        state.page_mut(page)?.cells.clear();
        Ok(())
    }

    fn write_table(&self, page: &PageHandle, header: &[String], rows: &[Vec<Cell>]) -> Result<()> {
        let mut state = self.lock();
        let p = state.page_mut(page)?;

        let header_row: Vec<Cell> = header.iter().map(|h| Cell::String(h.clone())).collect();
        for (r, values) in std::iter::once(&header_row).chain(rows).enumerate() {
            if p.cells.len() <= r {
                p.cells.resize(r + 1, Vec::new());
            }
            let target = &mut p.cells[r];
            if target.len() < values.len() {
                target.resize(values.len(), Cell::String(String::new()));
            }
            target[..values.len()].clone_from_slice(values);
        }
        p.rows = p.rows.max(rows.len() + 1);
        p.cols = p.cols.max(header.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_page_cannot_be_deleted() -> Result<()> {
        let sheets = MemorySheets::new();
        let book = sheets.add_spreadsheet("Book");
        let only = sheets
            .get_page(&book, DEFAULT_PAGE)?
            .ok_or_else(|| anyhow!("default page missing"))?;
        assert!(sheets.delete_page(&book, &only).is_err());

        sheets.create_page(&book, "Extra", 2, 2)?;
        sheets.delete_page(&book, &only)?;
        assert_eq!(sheets.page_titles("Book"), vec!["Extra"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_titles_rejected() -> Result<()> {
        let sheets = MemorySheets::new();
        let book = sheets.add_spreadsheet("Book");
        sheets.create_page(&book, "P", 1, 1)?;
        assert!(sheets.create_page(&book, "P", 1, 1).is_err());
        Ok(())
    }

    #[test]
    fn test_write_overlays_and_clear_empties() -> Result<()> {
        let sheets = MemorySheets::new();
        let book = sheets.add_spreadsheet("Book");
        let page = sheets.create_page(&book, "P", 3, 2)?;

        sheets.write_table(&page, &["a".into(), "b".into()], &[vec![json!(1), json!("x")]])?;
        sheets.write_table(&page, &["c".into()], &[])?;
        let snap = sheets.page("Book", "P").ok_or_else(|| anyhow!("page missing"))?;
        assert_eq!(
            snap.cells,
            vec![vec![json!("c"), json!("b")], vec![json!(1), json!("x")]]
        );

        sheets.clear_page(&page)?;
        let snap = sheets.page("Book", "P").ok_or_else(|| anyhow!("page missing"))?;
        assert!(snap.cells.is_empty());
        assert_eq!((snap.rows, snap.cols), (3, 2));
        Ok(())
    }

    #[test]
    fn test_missing_spreadsheet_is_an_error() {
        let sheets = MemorySheets::new();
        assert!(sheets.open_spreadsheet("nope").is_err());
    }
}
