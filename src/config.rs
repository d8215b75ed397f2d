// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// Env var naming the YAML config file.
pub const CONFIG_ENV: &str = "PIPELINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pipeline.yaml";

/// Everything a pipeline run needs to know about its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub sheets: SheetsConfig,
    pub columns: ColumnNames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// CSV file, or a ZIP holding one.
    pub path: PathBuf,
    /// WHATWG encoding label, e.g. `cp1252` or `utf-8`.
    pub encoding: String,
    pub delimiter: char,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.csv"),
            encoding: "cp1252".into(),
            delimiter: ',',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the Parquet store; one subdirectory per schema.
    pub root: PathBuf,
    pub raw_schema: String,
    pub raw_table: String,
    pub prod_schema: String,
    pub prod_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("warehouse"),
            raw_schema: "raw_data".into(),
            raw_table: "data_raw".into(),
            prod_schema: "production".into(),
            prod_table: "data_prod".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet: String,
    pub base_sheet_name: String,
    /// Cells per page; kept under the platform's 10M ceiling.
    pub max_cells: usize,
    /// Rows per `values.update` request.
    pub write_batch_rows: usize,
    /// Name of the env var holding the OAuth bearer token.
    pub token_env: String,
    pub sheets_api_base: String,
    pub drive_api_base: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "Kaggle Pipeline Output".into(),
            base_sheet_name: "ProductionData".into(),
            max_cells: crate::publish::DEFAULT_MAX_CELLS,
            write_batch_rows: 5_000,
            token_env: "GOOGLE_SHEETS_TOKEN".into(),
            sheets_api_base: "https://sheets.googleapis.com/v4/".into(),
            drive_api_base: "https://www.googleapis.com/drive/v3/".into(),
        }
    }
}

impl SheetsConfig {
    /// Read the bearer token from the configured env var.
    pub fn token(&self) -> Result<String> {
        env::var(&self.token_env)
            .with_context(|| format!("reading Sheets token from ${}", self.token_env))
    }
}

/// Names of the raw columns the cleaning rules operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub quantity: String,
    pub unit_price: String,
    pub customer_id: String,
    pub description: String,
    pub country: String,
    pub invoice_date: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            quantity: "Quantity".into(),
            unit_price: "UnitPrice".into(),
            customer_id: "CustomerID".into(),
            description: "Description".into(),
            country: "Country".into(),
            invoice_date: "InvoiceDate".into(),
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML config file; omitted keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {:?}", path))
    }

    /// Resolve the config the binaries run with:
    /// - `$PIPELINE_CONFIG` if set (must exist),
    /// - else `pipeline.yaml` if present,
    /// - else built-in defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            info!(path = %path, "loading config");
            return Self::from_file(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.is_file() {
            info!(path = %default_path.display(), "loading config");
            return Self::from_file(default_path);
        }
        info!("no config file; using defaults");
        Ok(Self::default())
    }
}
