//! Warehouse load: SQL generation and execution.

mod client;
mod sql;

pub use client::{PostgresExecutor, WarehouseExecutor, run_upsert};
pub use sql::{
    UpsertPlan, UpsertStatements, copy_from_storage, create_table, drop_table, quote_ident,
    unload,
};
