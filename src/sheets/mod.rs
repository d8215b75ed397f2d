// src/sheets/mod.rs
pub mod google;
pub mod grid;
pub mod memory;

use anyhow::Result;

pub use google::GoogleSheets;
pub use memory::{MemoryPage, MemorySheets};

/// One spreadsheet cell as sent to the service: a JSON string, number or bool.
pub type Cell = serde_json::Value;

/// An opened spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetHandle {
    pub id: String,
    pub title: String,
}

/// A sheet (tab) inside a spreadsheet, with its grid size as last seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    pub title: String,
    pub rows: usize,
    pub cols: usize,
}

/// The spreadsheet operations publishing needs.
pub trait SpreadsheetService {
    /// Open a spreadsheet by title. Missing spreadsheets are an error.
    fn open_spreadsheet(&self, name: &str) -> Result<SpreadsheetHandle>;

    /// Look up a sheet by title.
    fn get_page(&self, book: &SpreadsheetHandle, name: &str) -> Result<Option<PageHandle>>;

    /// Delete a sheet. May fail, e.g. for the last sheet of a spreadsheet.
    fn delete_page(&self, book: &SpreadsheetHandle, page: &PageHandle) -> Result<()>;

    /// Add a sheet sized `rows` x `cols`.
    fn create_page(
        &self,
        book: &SpreadsheetHandle,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<PageHandle>;

    /// Erase every value on the sheet, keeping the sheet itself.
    fn clear_page(&self, page: &PageHandle) -> Result<()>;

    /// Write `header` then `rows` starting at A1, growing the grid if needed.
    fn write_table(&self, page: &PageHandle, header: &[String], rows: &[Vec<Cell>]) -> Result<()>;
}
