// src/store/mod.rs

pub mod memory;
pub mod parquet;

use anyhow::{bail, Result};
use arrow::record_batch::RecordBatch;

pub use memory::MemoryStore;
pub use parquet::ParquetStore;

/// Schema-qualified table storage the pipeline stages read from and write to.
pub trait TabularStore {
    /// Create `schema` if it does not exist yet.
    fn ensure_schema(&self, schema: &str) -> Result<()>;

    /// Read every row of `schema.table`, in stored order.
    fn read_table(&self, schema: &str, table: &str) -> Result<RecordBatch>;

    /// Replace `schema.table` wholesale with `rows`. Readers see either the old
    /// content or the new content, never a mix.
    fn replace_table(&self, schema: &str, table: &str, rows: &RecordBatch) -> Result<()>;
}

/// Schema and table names become path components, so keep them to one segment.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("invalid {} name `{}`", kind, name);
    }
    Ok(())
}
