// src/process/format.rs
use anyhow::Result;
use arrow::{
    array::{Array, ArrayRef, AsArray, StringArray},
    datatypes::{DataType, Field, Float64Type, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use crate::process::aggregate::{numeric_column, text_column};

/// Render `value` with `decimals` fractional digits and `,` between thousands.
///
/// Rounding is half-to-even on the exact binary value. Negative values keep
/// their sign even when they round to zero (`-0`).
pub fn format_number(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let digits = int_part.as_bytes();
    let mut out = String::with_capacity(fixed.len() + digits.len() / 3 + 1);
    if value.is_sign_negative() {
        out.push('-');
    }
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*d as char);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Output layout: keys as-is, then the three formatted measures.
pub fn output_schema() -> Schema {
    Schema::new(vec![
        Field::new("country", DataType::Utf8, true),
        Field::new("country_code", DataType::Utf8, true),
        Field::new("total_disbursement", DataType::Utf8, true),
        Field::new("total_obligation", DataType::Utf8, true),
        Field::new("avg_interest_rate", DataType::Utf8, true),
    ])
}

/// Turn the ranked aggregate into the string table that gets written out.
/// Obligation is reported as a magnitude; nulls stay null.
pub fn format_summaries(ranked: &[RecordBatch]) -> Result<RecordBatch> {
    let rows: usize = ranked.iter().map(|b| b.num_rows()).sum();
    let mut country: Vec<Option<String>> = Vec::with_capacity(rows);
    let mut country_code: Vec<Option<String>> = Vec::with_capacity(rows);
    let mut disbursement: Vec<Option<String>> = Vec::with_capacity(rows);
    let mut obligation: Vec<Option<String>> = Vec::with_capacity(rows);
    let mut rate: Vec<Option<String>> = Vec::with_capacity(rows);

    for batch in ranked {
        let c = text_column(batch, "country")?;
        let cc = text_column(batch, "country_code")?;
        let d = numeric_column(batch, "total_disbursement")?;
        let o = numeric_column(batch, "total_obligation")?;
        let r = numeric_column(batch, "avg_interest_rate")?;

        let (c, cc) = (c.as_string::<i32>(), cc.as_string::<i32>());
        let d = d.as_primitive::<Float64Type>();
        let o = o.as_primitive::<Float64Type>();
        let r = r.as_primitive::<Float64Type>();

        for i in 0..batch.num_rows() {
            country.push(c.is_valid(i).then(|| c.value(i).to_string()));
            country_code.push(cc.is_valid(i).then(|| cc.value(i).to_string()));
            disbursement.push(d.is_valid(i).then(|| format_number(d.value(i), 0)));
            obligation.push(o.is_valid(i).then(|| format_number(o.value(i).abs(), 0)));
            rate.push(r.is_valid(i).then(|| format_number(r.value(i), 2)));
        }
    }

    let cols: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(country)),
        Arc::new(StringArray::from(country_code)),
        Arc::new(StringArray::from(disbursement)),
        Arc::new(StringArray::from(obligation)),
        Arc::new(StringArray::from(rate)),
    ];
    RecordBatch::try_new(Arc::new(output_schema()), cols).map_err(Into::into)
}
