// src/sheets/google.rs
use anyhow::{anyhow, bail, Context, Result};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{thread::sleep, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

use super::{Cell, PageHandle, SpreadsheetHandle, SpreadsheetService};
use crate::config::SheetsConfig;

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Whether a request may be sent again after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Repeating the request leaves the same end state (reads, clears, value writes, resizes).
    Transient,
    /// Adding or deleting a sheet: a lost response may hide a success.
    Never,
}

impl Retry {
    fn allows(self, attempt: usize) -> bool {
        self == Retry::Transient && attempt < MAX_RETRIES
    }
}

/// Google Sheets v4 + Drive v3 over blocking HTTP with a bearer token.
pub struct GoogleSheets {
    client: Client,
    token: String,
    sheets_base: Url,
    drive_base: Url,
    write_batch_rows: usize,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a [&'a [Cell]],
}

impl GoogleSheets {
    pub fn new(token: impl Into<String>, sheets_base: &str, drive_base: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            token: token.into(),
            sheets_base: Url::parse(sheets_base)
                .with_context(|| format!("invalid Sheets API base {}", sheets_base))?,
            drive_base: Url::parse(drive_base)
                .with_context(|| format!("invalid Drive API base {}", drive_base))?,
            write_batch_rows: 5_000,
        })
    }

    pub fn from_config(cfg: &SheetsConfig) -> Result<Self> {
        let mut sheets = Self::new(cfg.token()?, &cfg.sheets_api_base, &cfg.drive_api_base)?;
        sheets.write_batch_rows = cfg.write_batch_rows.max(1);
        Ok(sheets)
    }

    fn sheets_url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.sheets_base, segments)
    }

    /// Send, retrying connection errors, 429 and 5xx when `retry` allows it.
    /// Other non-2xx statuses fail at once with the response body in the error.
    fn execute(
        &self,
        build: impl Fn() -> RequestBuilder,
        what: &str,
        retry: Retry,
    ) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().bearer_auth(&self.token).send() {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if retryable(resp.status()) && retry.allows(attempt) => {
                    warn!(status = %resp.status(), attempt, "{} failed; retrying", what);
                }
                Err(e) if retry.allows(attempt) => {
                    warn!(error = %e, attempt, "{} failed; retrying", what);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().unwrap_or_default();
                    bail!("{} returned {}: {}", what, status, body.trim());
                }
                Err(e) => return Err(e).with_context(|| format!("{} request failed", what)),
            }
            sleep(RETRY_DELAY * attempt as u32);
        }
    }

    fn fetch_json<T: DeserializeOwned>(
        &self,
        build: impl Fn() -> RequestBuilder,
        what: &str,
        retry: Retry,
    ) -> Result<T> {
        self.execute(build, what, retry)?
            .json()
            .with_context(|| format!("decoding {} response", what))
    }

    fn batch_update(
        &self,
        spreadsheet_id: &str,
        request: Value,
        what: &str,
        retry: Retry,
    ) -> Result<Value> {
        let url = self.sheets_url(&["spreadsheets", &format!("{}:batchUpdate", spreadsheet_id)])?;
        let body = json!({ "requests": [request] });
        let resp: BatchUpdateResponse =
            self.fetch_json(|| self.client.post(url.clone()).json(&body), what, retry)?;
        Ok(resp.replies.into_iter().next().unwrap_or(Value::Null))
    }

    fn resize(&self, page: &PageHandle, rows: usize, cols: usize) -> Result<()> {
        let request = json!({
            "updateSheetProperties": {
                "properties": {
                    "sheetId": page.sheet_id,
                    "gridProperties": { "rowCount": rows, "columnCount": cols },
                },
                "fields": "gridProperties(rowCount,columnCount)",
            }
        });
        self.batch_update(&page.spreadsheet_id, request, "resizing sheet", Retry::Transient)?;
        debug!(sheet = %page.title, rows, cols, "resized sheet");
        Ok(())
    }
}

impl SpreadsheetService for GoogleSheets {
    fn open_spreadsheet(&self, name: &str) -> Result<SpreadsheetHandle> {
        let mut url = endpoint(&self.drive_base, &["files"])?;
        url.query_pairs_mut()
            .append_pair("q", &drive_query(name))
            .append_pair("fields", "files(id,name)")
            .append_pair("pageSize", "10");
        let list: DriveFileList =
            self.fetch_json(|| self.client.get(url.clone()), "looking up spreadsheet", Retry::Transient)?;
        let file = list
            .files
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("spreadsheet `{}` not found or not shared", name))?;
        info!(spreadsheet = %file.name, id = %file.id, "opened spreadsheet");
        Ok(SpreadsheetHandle {
            id: file.id,
            title: file.name,
        })
    }

    fn get_page(&self, book: &SpreadsheetHandle, name: &str) -> Result<Option<PageHandle>> {
        let mut url = self.sheets_url(&["spreadsheets", &book.id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let meta: SpreadsheetMeta =
            self.fetch_json(|| self.client.get(url.clone()), "listing sheets", Retry::Transient)?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.title == name)
            .map(|p| page_handle(&book.id, p)))
    }

    fn delete_page(&self, book: &SpreadsheetHandle, page: &PageHandle) -> Result<()> {
        let request = json!({ "deleteSheet": { "sheetId": page.sheet_id } });
        self.batch_update(&book.id, request, "deleting sheet", Retry::Never)?;
        Ok(())
    }

    fn create_page(
        &self,
        book: &SpreadsheetHandle,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<PageHandle> {
        let request = json!({
            "addSheet": {
                "properties": {
                    "title": name,
                    "gridProperties": { "rowCount": rows, "columnCount": cols },
                }
            }
        });
        let reply = self.batch_update(&book.id, request, "adding sheet", Retry::Never)?;
        let props: SheetProperties = serde_json::from_value(reply["addSheet"]["properties"].clone())
            .context("decoding addSheet reply")?;
        Ok(page_handle(&book.id, props))
    }

    fn clear_page(&self, page: &PageHandle) -> Result<()> {
        let range = quote_title(&page.title);
        let url = self.sheets_url(&[
            "spreadsheets",
            &page.spreadsheet_id,
            "values",
            &format!("{}:clear", range),
        ])?;
        self.execute(|| self.client.post(url.clone()).json(&json!({})), "clearing sheet", Retry::Transient)?;
        Ok(())
    }

    fn write_table(&self, page: &PageHandle, header: &[String], rows: &[Vec<Cell>]) -> Result<()> {
        let need_rows = rows.len() + 1;
        let need_cols = header.len();
        if page.rows < need_rows || page.cols < need_cols {
            self.resize(page, page.rows.max(need_rows), page.cols.max(need_cols))?;
        }

        let header_cells: Vec<Cell> = header.iter().map(|h| Cell::String(h.clone())).collect();
        let all: Vec<&[Cell]> = std::iter::once(header_cells.as_slice())
            .chain(rows.iter().map(Vec::as_slice))
            .collect();

        for (i, chunk) in all.chunks(self.write_batch_rows).enumerate() {
            let range = a1_range(&page.title, 1 + i * self.write_batch_rows);
            let mut url = self.sheets_url(&["spreadsheets", &page.spreadsheet_id, "values", &range])?;
            url.query_pairs_mut().append_pair("valueInputOption", "RAW");
            let body = ValueRange {
                range: &range,
                major_dimension: "ROWS",
                values: chunk,
            };
            self.execute(|| self.client.put(url.clone()).json(&body), "writing values", Retry::Transient)?;
            debug!(sheet = %page.title, range = %range, rows = chunk.len(), "wrote batch");
        }
        Ok(())
    }
}

fn page_handle(spreadsheet_id: &str, p: SheetProperties) -> PageHandle {
    PageHandle {
        spreadsheet_id: spreadsheet_id.to_string(),
        sheet_id: p.sheet_id,
        title: p.title,
        rows: p.grid_properties.row_count,
        cols: p.grid_properties.column_count,
    }
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `base` with `segments` appended as percent-encoded path segments.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("{} cannot be used as an API base", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sheet title quoted for A1 notation.
fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn a1_range(title: &str, first_row: usize) -> String {
    format!("{}!A{}", quote_title(title), first_row)
}

fn drive_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() -> Result<()> {
        let base = Url::parse("https://sheets.googleapis.com/v4/")?;
        let url = endpoint(&base, &["spreadsheets", "abc", "values", "'My Data'!A1"])?;
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'My%20Data'!A1"
        );

        let url = endpoint(&base, &["spreadsheets", "abc:batchUpdate"])?;
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc:batchUpdate"
        );
        Ok(())
    }

    #[test]
    fn test_sheet_add_and_delete_are_never_retried() {
        assert!(!Retry::Never.allows(1));
        assert!(Retry::Transient.allows(1));
        assert!(Retry::Transient.allows(MAX_RETRIES - 1));
        assert!(!Retry::Transient.allows(MAX_RETRIES));
        assert!(retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!retryable(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_a1_quoting() {
        assert_eq!(a1_range("ProductionData_1", 5001), "'ProductionData_1'!A5001");
        assert_eq!(quote_title("Bob's"), "'Bob''s'");
    }

    #[test]
    fn test_drive_query_escapes_quotes() {
        assert_eq!(
            drive_query("Q1 'final'"),
            "name = 'Q1 \\'final\\'' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false"
        );
    }

    #[test]
    fn test_sheet_properties_decode() -> Result<()> {
        let meta: SpreadsheetMeta = serde_json::from_str(
            r#"{"sheets":[{"properties":{"sheetId":7,"title":"ProductionData_1",
                "gridProperties":{"rowCount":11,"columnCount":3}}}]}"#,
        )?;
        let props = meta
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties)
            .ok_or_else(|| anyhow!("no sheet"))?;
        let page = page_handle("book", props);
        assert_eq!(
            page,
            PageHandle {
                spreadsheet_id: "book".into(),
                sheet_id: 7,
                title: "ProductionData_1".into(),
                rows: 11,
                cols: 3,
            }
        );
        Ok(())
    }
}
