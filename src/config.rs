use anyhow::{anyhow, Context, Result};
use std::env;

use crate::storage::Location;

pub const DEFAULT_INPUT: &str =
    "gs://dataproc-demo-bucket/ibrd-statement-of-loans-historical-data.csv";
pub const DEFAULT_OUTPUT: &str = "gs://dataproc-demo-bucket/ibrd-loan-summary-large-python";
pub const DEFAULT_APP_NAME: &str = "dataproc-python-demo";
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Everything the job needs to know about one run.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// CSV object to read.
    pub input: Location,
    /// Prefix the summary is written under (overwritten every run).
    pub output: Location,
    pub app_name: String,
    /// `None` scans the whole file for type inference.
    pub infer_schema_max_records: Option<usize>,
    pub batch_size: usize,
}

impl JobConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input_raw = lookup("LOAN_SUMMARY_INPUT").unwrap_or_else(|| DEFAULT_INPUT.to_string());
        let output_raw =
            lookup("LOAN_SUMMARY_OUTPUT").unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

        let input = Location::parse(&input_raw)
            .with_context(|| format!("LOAN_SUMMARY_INPUT `{}` is not a valid location", input_raw))?;
        let output = Location::parse(&output_raw).with_context(|| {
            format!("LOAN_SUMMARY_OUTPUT `{}` is not a valid location", output_raw)
        })?;
        if output.is_bucket_root() {
            anyhow::bail!(
                "LOAN_SUMMARY_OUTPUT `{}` must name a key inside the bucket, not the bucket itself",
                output_raw
            );
        }

        let app_name = lookup("LOAN_SUMMARY_APP_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        let infer_schema_max_records = match lookup("LOAN_SUMMARY_INFER_MAX_RECORDS") {
            Some(raw) => Some(parse_positive("LOAN_SUMMARY_INFER_MAX_RECORDS", &raw)?),
            None => None,
        };

        let batch_size = match lookup("LOAN_SUMMARY_BATCH_SIZE") {
            Some(raw) => parse_positive("LOAN_SUMMARY_BATCH_SIZE", &raw)?,
            None => DEFAULT_BATCH_SIZE,
        };

        Ok(Self {
            input,
            output,
            app_name,
            infer_schema_max_records,
            batch_size,
        })
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|e| anyhow!("{} must be a positive integer, got `{}`: {}", key, raw, e))?;
    if value == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(value)
}
