//! floe: scheduled lake pipeline from an origin database to a warehouse.
//!
//! Data moves through three object-store tiers. Raw extracts land in
//! the origin tier, get reconciled into the target tier partition by
//! partition, merged into per-month golden files, and finally loaded
//! into the warehouse with a staged upsert.
//!
//! - `config/` - YAML pipeline configuration
//! - `secrets` - Warehouse credential resolution
//! - `extract` - Extraction SQL and landing keys for the origin job
//! - `reconcile` - Origin-to-target partition reconciliation
//! - `schedule` - Backfill boundary scheduling
//! - `merge/` - Columnar merge writer for the golden tier
//! - `warehouse/` - Load SQL generation and execution
//! - `pipeline` - One invocation end to end

pub mod config;
pub mod error;
pub mod extract;
pub mod merge;
pub mod pipeline;
pub mod reconcile;
pub mod schedule;
pub mod secrets;
pub mod warehouse;

pub use config::Config;
pub use error::{MergeError, PipelineError, SecretError, WarehouseError};
pub use merge::{MergeOutcome, MergeWriter};
pub use pipeline::{EntityReport, Pipeline};
pub use reconcile::{ReconcilePlan, ReconcileRequest, Reconciler};
