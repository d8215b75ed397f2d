use anyhow::{anyhow, Context, Result};
use arrow::{compute::concat_batches, record_batch::RecordBatch};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};
use tracing::debug;

use super::{check_name, TabularStore};

/// A directory of Parquet files: `<root>/<schema>/<table>.parquet`.
///
/// `replace_table` writes the full table to `<table>.parquet.tmp` and renames it
/// over the live file, so a failed write leaves the previous table untouched.
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating store root {:?}", &root))?;
        Ok(Self { root })
    }

    fn schema_dir(&self, schema: &str) -> Result<PathBuf> {
        check_name("schema", schema)?;
        Ok(self.root.join(schema))
    }

    fn table_path(&self, schema: &str, table: &str) -> Result<PathBuf> {
        check_name("table", table)?;
        Ok(self.schema_dir(schema)?.join(format!("{}.parquet", table)))
    }
}

impl TabularStore for ParquetStore {
    fn ensure_schema(&self, schema: &str) -> Result<()> {
        let dir = self.schema_dir(schema)?;
        fs::create_dir_all(&dir).with_context(|| format!("creating schema dir {:?}", dir))
    }

    fn read_table(&self, schema: &str, table: &str) -> Result<RecordBatch> {
        let path = self.table_path(schema, table)?;
        let file = File::open(&path)
            .with_context(|| format!("table {}.{} not found at {:?}", schema, table, path))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("opening Parquet reader for `{}`", path.display()))?;
        let arrow_schema = builder.schema().clone();
        let reader = builder
            .with_batch_size(8192)
            .build()
            .with_context(|| format!("building RecordBatchReader for `{}`", path.display()))?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("reading batches from `{}`", path.display()))?;
        let batch = concat_batches(&arrow_schema, &batches)
            .context("concatenating table batches")?;
        debug!(schema, table, rows = batch.num_rows(), "read table");
        Ok(batch)
    }

    fn replace_table(&self, schema: &str, table: &str, rows: &RecordBatch) -> Result<()> {
        let dir = self.schema_dir(schema)?;
        if !dir.is_dir() {
            return Err(anyhow!("schema `{}` does not exist", schema));
        }
        let final_path = self.table_path(schema, table)?;
        let tmp_path = dir.join(format!("{}.parquet.tmp", table));

        let tmp_file = File::create(&tmp_path)
            .with_context(|| format!("could not create temporary file `{}`", tmp_path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(tmp_file), rows.schema(), Some(props))
            .context("creating ArrowWriter for table")?;
        writer.write(rows).context("writing table batch")?;
        writer.close().context("closing ArrowWriter for table")?;

        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!(
                "failed to rename `{}` to `{}`",
                tmp_path.display(),
                final_path.display()
            )
        })?;
        debug!(schema, table, rows = rows.num_rows(), "replaced table");
        Ok(())
    }
}
