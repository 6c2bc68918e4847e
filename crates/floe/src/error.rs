//! Error types for the floe pipeline.

use snafu::prelude::*;

use floe_core::error::{ConfigError, StorageError};

/// Errors from the columnar merge writer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MergeError {
    /// Existing and incoming data disagree on columns. The existing file
    /// is left untouched.
    #[snafu(display(
        "Schema mismatch at '{path}': existing columns {existing:?}, incoming {incoming:?}"
    ))]
    SchemaMismatch {
        path: String,
        existing: Vec<String>,
        incoming: Vec<String>,
    },

    /// Parquet serialization failure.
    #[snafu(display("Parquet error at '{path}': {source}"))]
    Parquet {
        path: String,
        source: parquet::errors::ParquetError,
    },

    /// Arrow compute or batch construction failure.
    #[snafu(display("Arrow error at '{path}': {source}"))]
    Arrow {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// Range filter column is absent or not a string column.
    #[snafu(display("Filter column '{column}' is missing or not a string column"))]
    FilterColumn { column: String },

    /// Underlying storage failure.
    #[snafu(display("Storage error: {source}"))]
    MergeStorage { source: StorageError },
}

/// Errors from the warehouse client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    #[snafu(display("Failed to connect to warehouse: {source}"))]
    Connect { source: tokio_postgres::Error },

    #[snafu(display("Statement failed: {source}\nstatement: {sql}"))]
    Execute {
        sql: String,
        source: tokio_postgres::Error,
    },

    /// Statement rejected before reaching the warehouse.
    #[snafu(display("Statement rejected: {message}\nstatement: {sql}"))]
    Rejected { sql: String, message: String },
}

/// Errors resolving warehouse credentials.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SecretError {
    #[snafu(display("Secret '{name}' is not set"))]
    NotFound { name: String },

    #[snafu(display("Secret '{name}' is not valid JSON: {source}"))]
    InvalidJson {
        name: String,
        source: serde_json::Error,
    },
}

/// Top-level pipeline error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("{source}"), context(false))]
    Config { source: ConfigError },

    #[snafu(display("{source}"), context(false))]
    Storage { source: StorageError },

    #[snafu(display("{source}"), context(false))]
    Merge { source: MergeError },

    #[snafu(display("{source}"), context(false))]
    Warehouse { source: WarehouseError },

    #[snafu(display("{source}"), context(false))]
    Secret { source: SecretError },

    #[snafu(display("Entity '{entity}' not found in configuration"))]
    UnknownEntity { entity: String },

    #[snafu(display("Invalid execution timestamp '{value}'"))]
    InvalidExecutionTs { value: String },
}

impl From<StorageError> for MergeError {
    fn from(source: StorageError) -> Self {
        MergeError::MergeStorage { source }
    }
}
