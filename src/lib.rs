pub mod clean;
pub mod config;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod sheets;
pub mod store;
pub mod telemetry;

pub use clean::{CleanReport, Cleaned, CleaningEngine};
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, RunSummary};
pub use publish::{PublishReport, Publisher};
pub use sheets::SpreadsheetService;
pub use store::TabularStore;
