use anyhow::Result;
use retail_sheets::{config::PipelineConfig, pipeline, store::ParquetStore, telemetry};
use tracing::info;

fn main() -> Result<()> {
    telemetry::init();
    let cfg = PipelineConfig::load()?;
    let store = ParquetStore::new(&cfg.store.root)?;
    let rows = pipeline::ingest_stage(&cfg, &store)?;
    info!(rows, "ingest finished");
    Ok(())
}
