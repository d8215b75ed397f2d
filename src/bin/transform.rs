use anyhow::Result;
use chrono::Utc;
use retail_sheets::{config::PipelineConfig, pipeline, store::ParquetStore, telemetry};
use tracing::info;

fn main() -> Result<()> {
    telemetry::init();
    let cfg = PipelineConfig::load()?;
    let store = ParquetStore::new(&cfg.store.root)?;
    let report = pipeline::transform_stage(&cfg, &store, Utc::now())?;
    info!(
        input = report.input_rows,
        output = report.output_rows,
        "transform finished"
    );
    Ok(())
}
