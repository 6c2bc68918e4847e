//! Warehouse execution.
//!
//! Redshift speaks the postgres wire protocol, so the client is a thin
//! wrapper over `tokio_postgres`. Statement execution goes through the
//! `WarehouseExecutor` trait so the load sequence can be tested without
//! a live warehouse.

use async_trait::async_trait;
use snafu::prelude::*;
use tokio_postgres::NoTls;
use tracing::{error, info};

use crate::error::{ConnectSnafu, ExecuteSnafu, WarehouseError};
use crate::secrets::WarehouseCredentials;
use crate::warehouse::sql::UpsertStatements;

/// Executes SQL statements against the warehouse.
#[async_trait]
pub trait WarehouseExecutor: Send + Sync {
    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError>;
}

/// `tokio_postgres`-backed executor.
pub struct PostgresExecutor {
    client: tokio_postgres::Client,
}

impl PostgresExecutor {
    /// Connect and drive the connection on a background task.
    pub async fn connect(credentials: &WarehouseCredentials) -> Result<Self, WarehouseError> {
        let (client, connection) =
            tokio_postgres::connect(&credentials.connection_string(), NoTls)
                .await
                .context(ConnectSnafu)?;

        tokio::spawn(async move {
            if let Err(error) = connection.await {
                error!(%error, "warehouse connection terminated");
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl WarehouseExecutor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError> {
        self.client.execute(sql, &[]).await.context(ExecuteSnafu { sql })
    }
}

/// Run an upsert's statements in order.
///
/// The UPDATE must finish before the INSERT runs; if it fails, the
/// INSERT is not attempted, so staging rows are never half-applied.
pub async fn run_upsert(
    executor: &dyn WarehouseExecutor,
    statements: &UpsertStatements,
) -> Result<u64, WarehouseError> {
    let mut affected = 0;

    if let Some(update) = &statements.update {
        affected += executor.execute(update).await?;
    }
    affected += executor.execute(&statements.insert).await?;

    info!(affected, "upsert applied");
    Ok(affected)
}
