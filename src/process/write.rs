// src/process/write.rs
use anyhow::{bail, Context, Result};
use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use tracing::{info, instrument};

use crate::storage::{BlobStore, Location};

/// Name of the single data object written under the output prefix.
pub const PART_FILE: &str = "part-00000.csv";
/// Empty marker written last, once the data object is in place.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Encode `batch` as CSV with a header row.
pub fn encode_csv(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
    writer.write(batch).context("encoding CSV")?;
    Ok(writer.into_inner())
}

/// Replace whatever lives under `output` with one CSV object plus a `_SUCCESS` marker.
///
/// Not atomic: a failure after the delete leaves the prefix empty or partially written.
#[instrument(level = "info", skip(store, data), fields(output = %output, bytes = data.len()))]
pub async fn write_output(store: &BlobStore, output: &Location, data: Vec<u8>) -> Result<Location> {
    if output.is_bucket_root() {
        bail!("refusing to overwrite bucket root {}: output needs a key", output);
    }

    let removed = store
        .delete_prefix(output)
        .await
        .with_context(|| format!("clearing previous output at {}", output))?;
    if removed > 0 {
        info!(removed, "overwrote previous output");
    }

    let part = output.join(PART_FILE);
    store
        .put(&part, data, "text/csv")
        .await
        .with_context(|| format!("writing {}", part))?;

    let marker = output.join(SUCCESS_MARKER);
    store
        .put(&marker, Vec::new(), "application/octet-stream")
        .await
        .with_context(|| format!("writing {}", marker))?;

    Ok(part)
}
