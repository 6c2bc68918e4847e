//! Columnar merge writer for the golden tier.
//!
//! Golden files hold one month of an entity each. Writes either create
//! the month file or append to it by rewriting the whole object, so a
//! reader always sees a complete parquet file. Appends refuse to touch
//! a file whose column set disagrees with the incoming data.

mod codec;

pub use codec::{decode_bytes, encode_batches};

use arrow::array::{RecordBatch, StringArray};
use arrow::compute::kernels::cmp::{gt_eq, lt_eq};
use arrow::compute::{and, concat_batches, filter_record_batch};
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use chrono::{Datelike, Duration, NaiveDateTime};
use snafu::prelude::*;
use tracing::info;

use floe_core::storage::StorageProviderRef;

use crate::error::{ArrowSnafu, FilterColumnSnafu, MergeError, ParquetSnafu, SchemaMismatchSnafu};

/// Outcome of a merge write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The month file did not exist and was created.
    Created { rows: usize },
    /// Rows were appended to an existing month file. `rows` is zero when
    /// the incoming batch was empty and the file was left untouched.
    Appended { rows: usize },
}

/// Writer that merges partition batches into golden month files.
pub struct MergeWriter {
    storage: StorageProviderRef,
}

impl MergeWriter {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    /// Golden key for an entity's month bucket.
    pub fn month_path(prefix: &str, bucket: NaiveDateTime) -> String {
        format!("{prefix}{}.parquet", bucket.format("%Y-%m"))
    }

    /// Merge a batch into the month file at `path`.
    ///
    /// Columns named in `exclude` are dropped first. If the file exists,
    /// the incoming column set must equal the existing one (order aside);
    /// on mismatch the write fails and the file is untouched.
    pub async fn write(
        &self,
        path: &str,
        batch: &RecordBatch,
        exclude: &[String],
    ) -> Result<MergeOutcome, MergeError> {
        let batch = drop_columns(batch, exclude).context(ArrowSnafu { path })?;

        if !self.storage.exists(path).await? {
            let bytes = encode_batches(&batch.schema(), &[batch.clone()])
                .context(ParquetSnafu { path })?;
            self.storage.atomic_put(path, bytes).await?;
            info!(path, rows = batch.num_rows(), "created golden file");
            return Ok(MergeOutcome::Created {
                rows: batch.num_rows(),
            });
        }

        let existing_bytes = self.storage.get(path).await?;
        let (existing_schema, mut batches) =
            decode_bytes(existing_bytes).context(ParquetSnafu { path })?;

        ensure_compatible(path, &existing_schema, &batch.schema())?;

        if batch.num_rows() == 0 {
            return Ok(MergeOutcome::Appended { rows: 0 });
        }

        let aligned = align_to(&batch, &existing_schema).context(ArrowSnafu { path })?;
        batches.push(aligned);

        let bytes = encode_batches(&existing_schema, &batches).context(ParquetSnafu { path })?;
        self.storage.atomic_put(path, bytes).await?;
        info!(path, rows = batch.num_rows(), "appended to golden file");

        Ok(MergeOutcome::Appended {
            rows: batch.num_rows(),
        })
    }

    /// Read an entity's golden data for `[start, end]` on the filter
    /// column. Returns `None` when no month file in the range exists.
    ///
    /// The range is widened to whole months for file selection, then
    /// filtered back to the exact bounds.
    pub async fn read_range(
        &self,
        prefix: &str,
        filter_column: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Option<RecordBatch>, MergeError> {
        let mut schema: Option<SchemaRef> = None;
        let mut batches = Vec::new();

        for month in month_buckets(start, end + Duration::days(1)) {
            let path = format!("{prefix}{month}.parquet");
            if !self.storage.exists(&path).await? {
                continue;
            }
            let bytes = self.storage.get(&path).await?;
            let (file_schema, file_batches) =
                decode_bytes(bytes).context(ParquetSnafu { path: path.as_str() })?;
            schema.get_or_insert(file_schema);
            batches.extend(file_batches);
        }

        let Some(schema) = schema else {
            return Ok(None);
        };

        let combined =
            concat_batches(&schema, batches.iter()).context(ArrowSnafu { path: prefix })?;
        let filtered = filter_by_range(&combined, filter_column, start, end)?;
        Ok(Some(filtered))
    }
}

fn ensure_compatible(
    path: &str,
    existing: &SchemaRef,
    incoming: &SchemaRef,
) -> Result<(), MergeError> {
    let mut existing_cols: Vec<String> = existing
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    let mut incoming_cols: Vec<String> = incoming
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    existing_cols.sort();
    incoming_cols.sort();

    ensure!(
        existing_cols == incoming_cols,
        SchemaMismatchSnafu {
            path,
            existing: existing_cols,
            incoming: incoming_cols,
        }
    );
    Ok(())
}

/// Drop columns by name, keeping the remaining column order.
fn drop_columns(batch: &RecordBatch, exclude: &[String]) -> Result<RecordBatch, ArrowError> {
    if exclude.is_empty() {
        return Ok(batch.clone());
    }
    let indices: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| !exclude.iter().any(|name| name == field.name()))
        .map(|(index, _)| index)
        .collect();
    batch.project(&indices)
}

/// Reorder a batch's columns to an existing schema's order.
fn align_to(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch, ArrowError> {
    let indices: Vec<usize> = schema
        .fields()
        .iter()
        .map(|field| batch.schema().index_of(field.name()))
        .collect::<Result<_, _>>()?;
    let projected = batch.project(&indices)?;
    RecordBatch::try_new(schema.clone(), projected.columns().to_vec())
}

fn filter_by_range(
    batch: &RecordBatch,
    filter_column: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<RecordBatch, MergeError> {
    let index = batch
        .schema()
        .index_of(filter_column)
        .ok()
        .context(FilterColumnSnafu {
            column: filter_column,
        })?;
    let column = batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .context(FilterColumnSnafu {
            column: filter_column,
        })?;

    let start_scalar = StringArray::new_scalar(start.format("%Y-%m-%d %H:%M:%S").to_string());
    let end_scalar = StringArray::new_scalar(end.format("%Y-%m-%d %H:%M:%S").to_string());

    let path = filter_column;
    let after_start = gt_eq(column, &start_scalar).context(ArrowSnafu { path })?;
    let before_end = lt_eq(column, &end_scalar).context(ArrowSnafu { path })?;
    let mask = and(&after_start, &before_end).context(ArrowSnafu { path })?;

    filter_record_batch(batch, &mask).context(ArrowSnafu { path })
}

/// Year-month buckets covering `[start, end]`, inclusive of both months.
fn month_buckets(start: NaiveDateTime, end: NaiveDateTime) -> Vec<String> {
    let mut months = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    let last = (end.year(), end.month());

    loop {
        months.push(format!("{year:04}-{month:02}"));
        if (year, month) >= last {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    months
}
