// src/process/aggregate.rs
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::ArrayRef,
    compute::{cast, cast_with_options, CastOptions},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use datafusion::{
    functions_aggregate::expr_fn::{avg, sum},
    prelude::*,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Rows kept after ordering by total disbursement.
pub const TOP_N: usize = 25;

/// Name the prepared loans are registered under for the query.
pub const LOANS_TABLE: &str = "loans";

/// Ranked, unformatted aggregate plus how many groups existed before the limit.
#[derive(Debug)]
pub struct Ranked {
    pub groups: usize,
    pub batches: Vec<RecordBatch>,
}

impl Ranked {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Project the renamed loans down to the grouping keys and measures.
///
/// Keys become `Utf8`; measures are cast strictly to `Float64`, so one
/// unparseable value fails the whole column. Empty fields stay null.
pub fn prepare_measures(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = Schema::new(vec![
        Field::new("country", DataType::Utf8, true),
        Field::new("country_code", DataType::Utf8, true),
        Field::new("disbursed", DataType::Float64, true),
        Field::new("obligation", DataType::Float64, true),
        Field::new("interest_rate", DataType::Float64, true),
    ]);
    let cols = vec![
        text_column(batch, "country")?,
        text_column(batch, "country_code")?,
        numeric_column(batch, "disbursed")?,
        numeric_column(batch, "obligation")?,
        numeric_column(batch, "interest_rate")?,
    ];
    RecordBatch::try_new(Arc::new(schema), cols).map_err(Into::into)
}

/// GROUP BY country, country_code with SUM/SUM/AVG, ordered by the disbursement
/// sum descending (nulls last), ties by country_code then country, first `n` rows.
///
/// The table is registered for the duration of the query only.
#[instrument(level = "info", skip(ctx, measures), fields(rows = measures.num_rows()))]
pub async fn summarize(ctx: &SessionContext, measures: RecordBatch, n: usize) -> Result<Ranked> {
    ctx.register_batch(LOANS_TABLE, measures)
        .context("registering loans table")?;
    let ranked = rank(ctx, n).await;
    ctx.deregister_table(LOANS_TABLE)
        .context("deregistering loans table")?;
    ranked
}

async fn rank(ctx: &SessionContext, n: usize) -> Result<Ranked> {
    let grouped = ctx.table(LOANS_TABLE).await?.aggregate(
        vec![col("country"), col("country_code")],
        vec![
            sum(col("disbursed")).alias("total_disbursement"),
            sum(col("obligation")).alias("total_obligation"),
            avg(col("interest_rate")).alias("avg_interest_rate"),
        ],
    )?;

    let groups = grouped.clone().count().await?;
    let batches = grouped
        .sort(vec![
            col("total_disbursement").sort(false, false),
            col("country_code").sort(true, true),
            col("country").sort(true, true),
        ])?
        .limit(0, Some(n))?
        .collect()
        .await?;

    let ranked = Ranked { groups, batches };
    debug!(groups, kept = ranked.num_rows(), "aggregated");
    Ok(ranked)
}

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| {
        let available: Vec<&str> = batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        anyhow!(
            "column `{}` not found (available: {})",
            name,
            available.join(", ")
        )
    })
}

pub(crate) fn text_column(batch: &RecordBatch, name: &str) -> Result<ArrayRef> {
    let col = column(batch, name)?;
    cast(col, &DataType::Utf8).with_context(|| format!("column `{}` cannot be read as text", name))
}

pub(crate) fn numeric_column(batch: &RecordBatch, name: &str) -> Result<ArrayRef> {
    let col = column(batch, name)?;
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(col, &DataType::Float64, &options)
        .with_context(|| format!("column `{}` is not numeric", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::query_context;
    use arrow::array::{Array, AsArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Float64Type;

    type Row<'a> = (Option<&'a str>, Option<&'a str>, Option<f64>, Option<f64>, Option<f64>);
    type OutRow = (Option<String>, Option<String>, Option<f64>, Option<f64>, Option<f64>);

    fn measures(rows: &[Row<'_>]) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("country_code", DataType::Utf8, true),
            Field::new("disbursed", DataType::Float64, true),
            Field::new("obligation", DataType::Float64, true),
            Field::new("interest_rate", DataType::Float64, true),
        ]);
        let cols: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.4).collect::<Vec<_>>())),
        ];
        RecordBatch::try_new(Arc::new(schema), cols).unwrap()
    }

    fn out_rows(ranked: &Ranked) -> Vec<OutRow> {
        let mut rows = Vec::new();
        for batch in &ranked.batches {
            let text = |name: &str| text_column(batch, name).unwrap();
            let num = |name: &str| numeric_column(batch, name).unwrap();
            let (c, cc) = (text("country"), text("country_code"));
            let (d, o, r) = (
                num("total_disbursement"),
                num("total_obligation"),
                num("avg_interest_rate"),
            );
            let (c, cc) = (c.as_string::<i32>(), cc.as_string::<i32>());
            let (d, o, r) = (
                d.as_primitive::<Float64Type>(),
                o.as_primitive::<Float64Type>(),
                r.as_primitive::<Float64Type>(),
            );
            for i in 0..batch.num_rows() {
                rows.push((
                    c.is_valid(i).then(|| c.value(i).to_string()),
                    cc.is_valid(i).then(|| cc.value(i).to_string()),
                    d.is_valid(i).then(|| d.value(i)),
                    o.is_valid(i).then(|| o.value(i)),
                    r.is_valid(i).then(|| r.value(i)),
                ));
            }
        }
        rows
    }

    async fn run(rows: &[Row<'_>], n: usize) -> Result<Ranked> {
        summarize(&query_context(), measures(rows), n).await
    }

    #[tokio::test]
    async fn sums_and_averages_per_group() -> Result<()> {
        let ranked = run(
            &[
                (Some("USA"), Some("US"), Some(100.0), Some(-50.0), Some(5.0)),
                (Some("Peru"), Some("PE"), Some(10.0), Some(3.0), Some(2.5)),
                (Some("USA"), Some("US"), Some(50.0), Some(-25.0), Some(7.0)),
            ],
            TOP_N,
        )
        .await?;

        assert_eq!(ranked.groups, 2);
        assert_eq!(
            out_rows(&ranked),
            vec![
                (
                    Some("USA".into()),
                    Some("US".into()),
                    Some(150.0),
                    Some(-75.0),
                    Some(6.0)
                ),
                (
                    Some("Peru".into()),
                    Some("PE".into()),
                    Some(10.0),
                    Some(3.0),
                    Some(2.5)
                ),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn same_country_different_code_are_separate_groups() -> Result<()> {
        let ranked = run(
            &[
                (Some("Yugoslavia"), Some("YU"), Some(1.0), None, None),
                (Some("Yugoslavia"), Some("YF"), Some(2.0), None, None),
            ],
            TOP_N,
        )
        .await?;
        assert_eq!(ranked.groups, 2);
        Ok(())
    }

    #[tokio::test]
    async fn nulls_are_skipped_and_null_keys_group_together() -> Result<()> {
        let ranked = run(
            &[
                (None, Some("XX"), Some(4.0), None, Some(1.0)),
                (None, Some("XX"), None, None, None),
                (None, Some("XX"), Some(6.0), None, Some(3.0)),
            ],
            TOP_N,
        )
        .await?;

        // no non-null obligation, average over the two non-null rates only
        assert_eq!(
            out_rows(&ranked),
            vec![(None, Some("XX".into()), Some(10.0), None, Some(2.0))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn orders_descending_with_null_totals_last() -> Result<()> {
        let ranked = run(
            &[
                (Some("A"), Some("AA"), Some(5.0), Some(0.0), None),
                (Some("B"), Some("BB"), None, Some(0.0), None),
                (Some("C"), Some("CC"), Some(50.0), Some(0.0), None),
                (Some("D"), Some("DD"), Some(-3.0), Some(0.0), None),
            ],
            TOP_N,
        )
        .await?;
        let codes: Vec<String> = out_rows(&ranked).into_iter().filter_map(|r| r.1).collect();
        assert_eq!(codes, vec!["CC", "AA", "DD", "BB"]);
        Ok(())
    }

    #[tokio::test]
    async fn truncates_and_breaks_ties_by_code() -> Result<()> {
        let names: Vec<(String, String)> = (0..30)
            .map(|i| (format!("C{:02}", i), format!("K{:02}", i)))
            .collect();
        let mut rows: Vec<Row<'_>> = names
            .iter()
            .enumerate()
            .map(|(i, (c, k))| {
                (
                    Some(c.as_str()),
                    Some(k.as_str()),
                    Some(i as f64),
                    Some(0.0),
                    Some(1.0),
                )
            })
            .collect();
        rows.push((Some("Zed"), Some("A00"), Some(29.0), Some(0.0), Some(1.0)));

        let ranked = run(&rows, TOP_N).await?;
        assert_eq!(ranked.groups, 31);
        assert_eq!(ranked.num_rows(), TOP_N);

        let out = out_rows(&ranked);
        // the tie at 29.0 resolves by country_code ascending
        assert_eq!(out[0].1.as_deref(), Some("A00"));
        assert_eq!(out[1].1.as_deref(), Some("K29"));
        assert_eq!(out[24].2, Some(6.0));
        Ok(())
    }

    #[tokio::test]
    async fn table_is_released_after_the_query() -> Result<()> {
        let ctx = query_context();
        let batch = measures(&[(Some("A"), Some("AA"), Some(1.0), Some(1.0), Some(1.0))]);
        summarize(&ctx, batch.clone(), TOP_N).await?;
        // a second run on the same context must not collide with the first
        let ranked = summarize(&ctx, batch, TOP_N).await?;
        assert_eq!(ranked.num_rows(), 1);
        assert!(ctx.table(LOANS_TABLE).await.is_err());
        Ok(())
    }

    #[test]
    fn integer_and_text_numeric_columns_are_coerced() -> Result<()> {
        let schema = Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("country_code", DataType::Utf8, true),
            Field::new("disbursed", DataType::Int64, true),
            Field::new("obligation", DataType::Utf8, true),
            Field::new("interest_rate", DataType::Float64, true),
            Field::new("Loan Status", DataType::Utf8, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["Chile", "Chile"])),
                Arc::new(StringArray::from(vec!["CL", "CL"])),
                Arc::new(Int64Array::from(vec![7, 8])),
                Arc::new(StringArray::from(vec![Some("1.5"), None])),
                Arc::new(Float64Array::from(vec![1.0, 2.0])),
                Arc::new(StringArray::from(vec!["Repaid", "Repaid"])),
            ],
        )?;
        let prepared = prepare_measures(&batch)?;

        assert_eq!(prepared.num_columns(), 5);
        let disbursed = prepared.column(2).as_primitive::<Float64Type>();
        assert_eq!(disbursed.value(1), 8.0);
        let obligation = prepared.column(3).as_primitive::<Float64Type>();
        assert_eq!(obligation.value(0), 1.5);
        assert!(obligation.is_null(1));
        Ok(())
    }

    #[test]
    fn unparseable_numeric_value_fails() {
        let schema = Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("country_code", DataType::Utf8, true),
            Field::new("disbursed", DataType::Utf8, true),
            Field::new("obligation", DataType::Float64, true),
            Field::new("interest_rate", DataType::Float64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["Chile"])),
                Arc::new(StringArray::from(vec!["CL"])),
                Arc::new(StringArray::from(vec!["$12"])),
                Arc::new(Float64Array::from(vec![1.0])),
                Arc::new(Float64Array::from(vec![1.0])),
            ],
        )
        .unwrap();
        let err = prepare_measures(&batch).unwrap_err();
        assert!(err.to_string().contains("`disbursed` is not numeric"));
    }

    #[test]
    fn missing_column_is_named_in_the_error() {
        let schema = Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("country_code", DataType::Utf8, true),
            Field::new("disbursed", DataType::Float64, true),
            Field::new("obligation", DataType::Float64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["Chile"])),
                Arc::new(StringArray::from(vec!["CL"])),
                Arc::new(Float64Array::from(vec![1.0])),
                Arc::new(Float64Array::from(vec![1.0])),
            ],
        )
        .unwrap();
        let err = prepare_measures(&batch).unwrap_err();
        assert!(err.to_string().contains("column `interest_rate` not found"));
    }
}
