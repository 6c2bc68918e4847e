//! floe CLI: one scheduled invocation of the lake pipeline.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use clap::Parser;
use tracing::info;

use floe::pipeline::Pipeline;
use floe::secrets::{EnvSecretSource, WarehouseCredentials};
use floe::warehouse::{PostgresExecutor, WarehouseExecutor};
use floe::{Config, PipelineError};
use floe_core::init_tracing;
use floe_core::storage::StorageProvider;

#[derive(Parser, Debug)]
#[command(name = "floe", about = "Scheduled lake pipeline runner")]
struct CliArgs {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Execution timestamp, `%Y-%m-%d %H:%M:%S`. Defaults to now (UTC).
    #[arg(long)]
    execution_ts: Option<String>,

    /// Process only this entity
    #[arg(long)]
    entity: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_path(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to load config: {error}");
            return ExitCode::FAILURE;
        }
    };

    match run(config, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Pipeline failed: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(mut config: Config, args: CliArgs) -> Result<(), PipelineError> {
    let execution_ts = match &args.execution_ts {
        Some(value) => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map_err(
            |_| PipelineError::InvalidExecutionTs {
                value: value.clone(),
            },
        )?,
        None => Utc::now().naive_utc(),
    };

    if let Some(name) = &args.entity {
        config.entities.retain(|entity| &entity.entity == name);
        if config.entities.is_empty() {
            return Err(PipelineError::UnknownEntity {
                entity: name.clone(),
            });
        }
    }

    let options = config.lake.storage_options.clone();
    let origin = Arc::new(
        StorageProvider::for_url_with_options(&config.lake.origin_url, options.clone()).await?,
    );
    let target = Arc::new(
        StorageProvider::for_url_with_options(&config.lake.target_url, options.clone()).await?,
    );
    let golden =
        Arc::new(StorageProvider::for_url_with_options(&config.lake.golden_url, options).await?);

    let warehouse = match &config.warehouse {
        Some(settings) => {
            let credentials =
                WarehouseCredentials::from_secret(&EnvSecretSource, &settings.secret)?;
            let executor: Box<dyn WarehouseExecutor> =
                Box::new(PostgresExecutor::connect(&credentials).await?);
            Some((settings.clone(), executor))
        }
        None => None,
    };

    info!(
        entities = config.entities.len(),
        execution_ts = %execution_ts,
        "starting invocation"
    );

    let pipeline = Pipeline::new(origin, target, golden, warehouse);
    let reports = pipeline.run_invocation(&config, execution_ts).await?;

    for report in &reports {
        info!(
            entity = %report.entity,
            partitions_moved = report.partitions_moved,
            rows_merged = report.rows_merged,
            pending_extractions = report.extraction_queries.len(),
            warehouse_affected = report.warehouse_affected,
            "entity complete"
        );
    }

    Ok(())
}
