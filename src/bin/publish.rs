use anyhow::Result;
use retail_sheets::{
    config::PipelineConfig, pipeline, sheets::GoogleSheets, store::ParquetStore, telemetry,
};
use tracing::info;

fn main() -> Result<()> {
    telemetry::init();
    let cfg = PipelineConfig::load()?;
    let store = ParquetStore::new(&cfg.store.root)?;
    let sheets = GoogleSheets::from_config(&cfg.sheets)?;
    let report = pipeline::publish_stage(&cfg, &store, &sheets)?;
    for page in &report.pages {
        info!(page = %page.name, start = page.rows.start, end = page.rows.end, outcome = ?page.outcome, "page");
    }
    Ok(())
}
