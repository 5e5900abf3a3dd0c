// src/process/read.rs
use anyhow::{bail, Context, Result};
use arrow::{
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    record_batch::RecordBatch,
};
use std::{io::Cursor, sync::Arc};
use tracing::{debug, instrument};

use crate::config::JobConfig;

/// Knobs for turning raw CSV bytes into a record batch.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// `None` infers types from every record.
    pub infer_schema_max_records: Option<usize>,
    pub batch_size: usize,
}

impl From<&JobConfig> for ReadOptions {
    fn from(cfg: &JobConfig) -> Self {
        Self {
            infer_schema_max_records: cfg.infer_schema_max_records,
            batch_size: cfg.batch_size,
        }
    }
}

/// Parse a header-bearing CSV into a single batch, inferring column types.
///
/// Integers come back as `Int64`, decimals as `Float64`, anything else as `Utf8`.
/// Empty fields are null, as are trailing fields missing from a short row.
#[instrument(level = "info", skip(data, opts), fields(bytes = data.len()))]
pub fn load_csv(data: &[u8], opts: &ReadOptions) -> Result<RecordBatch> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        bail!("input CSV is empty: expected a header row");
    }

    // 1) infer schema
    let (schema, scanned) = Format::default()
        .with_header(true)
        .with_truncated_rows(true)
        .infer_schema(Cursor::new(data), opts.infer_schema_max_records)
        .context("inferring CSV schema")?;
    let schema = Arc::new(schema);
    debug!(
        columns = schema.fields().len(),
        scanned, "inferred schema"
    );

    // 2) parse every batch with that schema
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_truncated_rows(true)
        .with_batch_size(opts.batch_size)
        .build(Cursor::new(data))
        .context("building CSV reader")?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context("parsing CSV records")?;

    // 3) coalesce into one batch
    let batch = concat_batches(&schema, &batches).context("concatenating CSV batches")?;
    debug!(rows = batch.num_rows(), batches = batches.len(), "loaded CSV");
    Ok(batch)
}
