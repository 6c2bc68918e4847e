//! floe-core: Shared components for the floe pipeline.
//!
//! This crate contains the pieces of the lake pipeline that have no
//! dependency on Arrow or the warehouse:
//!
//! - `storage/` - Storage abstraction (S3, local)
//! - `key` - Bucketed key classification and partition sets
//! - `window` - Processing windows, intervals and schedule steps
//! - `error` - Common error types
//! - `tracing` - Tracing initialization

pub mod error;
pub mod key;
pub mod storage;
pub mod tracing;
pub mod window;

// Re-export commonly used items
pub use error::{ConfigError, StorageError};
pub use key::{DataKey, KeyClass, PartitionSet, classify, parse_bucket};
pub use storage::{BackendConfig, LocalConfig, S3Config, StorageProvider, StorageProviderRef};
pub use tracing::init_tracing;
pub use window::{
    DEFAULT_CLOCK_SKEW_HOURS, Interval, ProcessingWindow, StepSize, StepUnit,
};
