use anyhow::Result;
use retail_sheets::{
    config::PipelineConfig,
    pipeline::Pipeline,
    sheets::GoogleSheets,
    store::ParquetStore,
    telemetry,
};
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    telemetry::init();
    info!("startup");

    // ─── 2) config + collaborators ───────────────────────────────────
    let cfg = PipelineConfig::load()?;
    let store = ParquetStore::new(&cfg.store.root)?;
    let sheets = GoogleSheets::from_config(&cfg.sheets)?;

    // ─── 3) ingest → transform → publish ─────────────────────────────
    let start = Instant::now();
    let summary = Pipeline::new(&cfg, &store, &sheets).run()?;

    info!(
        ingested = summary.ingested_rows,
        production = summary.clean.output_rows,
        pages = summary.publish.pages.len(),
        elapsed = ?start.elapsed(),
        "all done"
    );
    info!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
