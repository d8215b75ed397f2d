use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatch;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{check_name, TabularStore};

/// In-process store. Batches are cheap to clone (columns are `Arc`ed), so a
/// replace is a single map insert under the lock.
#[derive(Default, Clone)]
pub struct MemoryStore {
    schemas: Arc<Mutex<HashMap<String, HashMap<String, RecordBatch>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, HashMap<String, RecordBatch>>>> {
        self.schemas
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl TabularStore for MemoryStore {
    fn ensure_schema(&self, schema: &str) -> Result<()> {
        check_name("schema", schema)?;
        let mut guard = self.lock()?;
        guard.entry(schema.to_string()).or_default();
        Ok(())
    }

    fn read_table(&self, schema: &str, table: &str) -> Result<RecordBatch> {
        let guard = self.lock()?;
        guard
            .get(schema)
            .and_then(|tables| tables.get(table))
            .cloned()
            .ok_or_else(|| anyhow!("table {}.{} not found", schema, table))
    }

    fn replace_table(&self, schema: &str, table: &str, rows: &RecordBatch) -> Result<()> {
        check_name("table", table)?;
        let mut guard = self.lock()?;
        let tables = guard
            .get_mut(schema)
            .ok_or_else(|| anyhow!("schema `{}` does not exist", schema))?;
        tables.insert(table.to_string(), rows.clone());
        Ok(())
    }
}
