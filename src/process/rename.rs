use anyhow::Result;
use arrow::{
    datatypes::{Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Source header → normalized column name.
pub const COLUMN_RENAMES: [(&str, &str); 5] = [
    ("Country", "country"),
    ("Country Code", "country_code"),
    ("Disbursed Amount", "disbursed"),
    ("Borrower's Obligation", "obligation"),
    ("Interest Rate", "interest_rate"),
];

/// Rename matching fields; everything else passes through untouched.
/// A pair whose source column is absent is skipped.
pub fn rename_columns(batch: &RecordBatch, renames: &[(&str, &str)]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| {
            match renames.iter().find(|(from, _)| f.name() == from) {
                Some((_, to)) => f.as_ref().clone().with_name(*to),
                None => f.as_ref().clone(),
            }
        })
        .collect();

    let renamed = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(renamed, batch.columns().to_vec()).map_err(Into::into)
}
