// src/pipeline.rs
use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, instrument};

use crate::{
    config::JobConfig,
    process::{
        encode_csv, format_summaries, load_csv, prepare_measures, rename_columns, summarize,
        write_output, ReadOptions, COLUMN_RENAMES, TOP_N,
    },
    session::Session,
    storage::Location,
};

/// What one run read and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub input_rows: usize,
    pub groups: usize,
    pub output_rows: usize,
    pub output_object: Location,
}

/// Wall-clock stamp embedded in the phase messages.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Read, rename, aggregate and rank, format, write.
///
/// Nothing is written until the whole summary has been computed, so a bad
/// input leaves the previous output in place.
#[instrument(level = "info", skip_all, fields(app = %session.app_name()))]
pub async fn run(session: &Session, config: &JobConfig) -> Result<RunSummary> {
    // ─── 1) read ─────────────────────────────────────────────────────
    info!("start read data file: {}", timestamp());
    let input_store = session.store_for(&config.input)?;
    let raw = input_store
        .get(&config.input)
        .await
        .with_context(|| format!("reading input {}", config.input))?;
    let loans = load_csv(&raw, &ReadOptions::from(config))
        .with_context(|| format!("loading CSV from {}", config.input))?;
    drop(raw);
    info!(rows = loans.num_rows(), columns = loans.num_columns(), "input loaded");

    // ─── 2) analyse ──────────────────────────────────────────────────
    info!("start data analysis: {}", timestamp());
    let input_rows = loans.num_rows();
    let loans = rename_columns(&loans, &COLUMN_RENAMES)?;
    let measures = prepare_measures(&loans).context("aggregating loans by country")?;
    drop(loans);
    let ranked = summarize(session.context(), measures, TOP_N)
        .await
        .context("aggregating loans by country")?;
    let table = format_summaries(&ranked.batches)?;
    let csv = encode_csv(&table)?;

    // ─── 3) write ────────────────────────────────────────────────────
    info!("start write results: {}", timestamp());
    let output_store = session.store_for(&config.output)?;
    let output_object = write_output(output_store, &config.output, csv).await?;
    info!("write results completed: {}", timestamp());

    let summary = RunSummary {
        input_rows,
        groups: ranked.groups,
        output_rows: table.num_rows(),
        output_object,
    };
    info!(
        input_rows = summary.input_rows,
        groups = summary.groups,
        output_rows = summary.output_rows,
        output = %summary.output_object,
        "run complete"
    );
    Ok(summary)
}
