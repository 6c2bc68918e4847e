//! Common error types shared across the floe crates.
//!
//! Storage and configuration errors live here so both the leaf components
//! and the pipeline crate can attach context to them.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed at '{path}': {source}"))]
    ObjectStore {
        path: String,
        source: object_store::Error,
    },

    /// Listing a location failed.
    #[snafu(display("Failed to list '{prefix}': {source}"))]
    List {
        prefix: String,
        source: object_store::Error,
    },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },
}

// ============ Config Errors ============

/// Errors raised while parsing and validating configuration values.
///
/// These are fatal and never retried: an unrecognized interval tag or
/// threshold unit means the invocation was wired up wrong.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Step/threshold string could not be parsed as `<integer><unit>`.
    #[snafu(display(
        "Invalid step size '{value}': expected <integer><unit> with unit H, D or M"
    ))]
    InvalidStepSize { value: String },

    /// Execution interval tag is not one of hourly/daily/weekly.
    #[snafu(display("Unrecognized interval tag: '{tag}'"))]
    InvalidInterval { tag: String },

    /// Schedule start date does not parse.
    #[snafu(display("Invalid schedule start date '{value}': expected %Y-%m-%d %H:%M:%S"))]
    InvalidStartDate { value: String },

    /// Entity name is empty.
    #[snafu(display("Entity '{entity}' has an empty {field}"))]
    EmptyField { entity: String, field: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}
