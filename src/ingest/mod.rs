// src/ingest/mod.rs
use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::Arc,
};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::config::SourceConfig;

/// Field values read as missing, on top of the empty string.
const NA_VALUES: &[&str] = &["NA", "N/A", "NaN", "nan", "NULL", "null", "#N/A"];

/// Read the configured source file into a raw batch of nullable `Utf8` columns.
#[tracing::instrument(level = "info", skip(cfg), fields(path = %cfg.path.display()))]
pub fn load_source(cfg: &SourceConfig) -> Result<RecordBatch> {
    let bytes = read_source_bytes(&cfg.path)?;
    let text = decode(&bytes, &cfg.encoding)?;
    if !cfg.delimiter.is_ascii() {
        bail!("delimiter {:?} is not a single-byte character", cfg.delimiter);
    }
    let batch = parse_csv(&text, cfg.delimiter as u8)
        .with_context(|| format!("parsing {:?}", cfg.path))?;
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "read source file"
    );
    Ok(batch)
}

/// Bytes of a `.csv`, or of the first `.csv` entry inside a `.zip`.
pub fn read_source_bytes(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("Failed to open source file: {:?}", path))?;

    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if !is_zip {
        let mut buf = Vec::new();
        BufReader::new(file)
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read {:?}", path))?;
        return Ok(buf);
    }

    let mut archive =
        ZipArchive::new(file).with_context(|| format!("Failed to read ZIP archive: {:?}", path))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{} in {:?}", i, path))?;
        let name = entry.name().to_string();
        if entry.is_file() && name.to_lowercase().ends_with(".csv") {
            debug!(entry = %name, "reading CSV from archive");
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("Failed to read {} into memory", name))?;
            return Ok(buf);
        }
    }
    Err(anyhow!("no .csv entry in {:?}", path))
}

/// Decode `bytes` with the encoding named by `label` (a BOM overrides it).
pub fn decode(bytes: &[u8], label: &str) -> Result<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| anyhow!("unknown encoding label `{}`", label))?;
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(encoding = used.name(), "malformed bytes replaced while decoding");
    }
    Ok(text.into_owned())
}

/// Parse delimited text with a header row. Every column comes back as nullable
/// `Utf8`; empty fields and the usual NA spellings become null.
pub fn parse_csv(text: &str, delimiter: u8) -> Result<RecordBatch> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .context("reading CSV header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        bail!("CSV has no header row");
    }

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        for (col, value) in columns.iter_mut().zip(record.iter()) {
            let missing = value.is_empty() || NA_VALUES.contains(&value);
            col.push(if missing { None } else { Some(value.to_string()) });
        }
    }

    let fields: Vec<Field> = headers
        .iter()
        .map(|h| Field::new(h, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|c| Arc::new(StringArray::from(c)) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context("building raw batch")
}
