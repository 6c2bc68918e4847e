//! End-to-end invocation of the pipeline.
//!
//! One invocation walks every configured entity through four steps:
//! pending extraction windows (rendered for the external extraction
//! job), origin-to-target reconciliation, golden merge, and the
//! warehouse load. Entities are processed sequentially; a failing
//! entity aborts the invocation so a partial tier state is visible in
//! the logs rather than silently skipped.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};
use snafu::prelude::*;
use tracing::{info, warn};

use floe_core::key::{DataKey, PartitionSet};
use floe_core::storage::StorageProviderRef;
use floe_core::window::ProcessingWindow;

use crate::config::{Config, EntityConfig, WarehouseSettings};
use crate::error::{ParquetSnafu, PipelineError};
use crate::extract;
use crate::merge::{MergeOutcome, MergeWriter, decode_bytes};
use crate::reconcile::{ReconcilePlan, ReconcileRequest, Reconciler};
use crate::schedule;
use crate::warehouse::{self, WarehouseExecutor};

/// What happened to one entity during an invocation.
#[derive(Debug, Default)]
pub struct EntityReport {
    pub entity: String,
    /// Extraction queries for schedule boundaries not yet extracted.
    pub extraction_queries: Vec<String>,
    pub partitions_moved: usize,
    pub rows_merged: usize,
    pub warehouse_affected: Option<u64>,
}

/// One pipeline invocation over the three lake tiers.
pub struct Pipeline {
    origin: StorageProviderRef,
    target: StorageProviderRef,
    golden: MergeWriter,
    golden_url: String,
    warehouse: Option<(WarehouseSettings, Box<dyn WarehouseExecutor>)>,
}

impl Pipeline {
    pub fn new(
        origin: StorageProviderRef,
        target: StorageProviderRef,
        golden: StorageProviderRef,
        warehouse: Option<(WarehouseSettings, Box<dyn WarehouseExecutor>)>,
    ) -> Self {
        let golden_url = golden.canonical_url().to_string();
        Self {
            origin,
            target,
            golden: MergeWriter::new(golden),
            golden_url,
            warehouse,
        }
    }

    /// Run every entity for one execution timestamp.
    pub async fn run_invocation(
        &self,
        config: &Config,
        execution_ts: NaiveDateTime,
    ) -> Result<Vec<EntityReport>, PipelineError> {
        let skew = Duration::hours(config.clock_skew_hours);
        let mut reports = Vec::with_capacity(config.entities.len());

        for entity in &config.entities {
            let window = ProcessingWindow::from_execution(execution_ts, entity.interval, skew);
            info!(
                entity = %entity.entity,
                start = %window.start_str(),
                end = %window.end_str(),
                "processing entity"
            );
            reports.push(self.run_entity(entity, &window).await?);
        }

        Ok(reports)
    }

    async fn run_entity(
        &self,
        entity: &EntityConfig,
        window: &ProcessingWindow,
    ) -> Result<EntityReport, PipelineError> {
        let mut report = EntityReport {
            entity: entity.entity.clone(),
            ..Default::default()
        };

        report.extraction_queries = self.pending_extractions(entity, window).await?;

        let moved = self.reconcile_entity(entity, window.end).await?;
        report.partitions_moved = moved.len();

        let months = self.merge_partitions(entity, &moved, &mut report).await?;

        if !months.is_empty() {
            report.warehouse_affected = self.load_entity(entity, &months).await?;
        }

        Ok(report)
    }

    /// Render extraction queries for schedule boundaries the origin tier
    /// does not hold yet.
    async fn pending_extractions(
        &self,
        entity: &EntityConfig,
        window: &ProcessingWindow,
    ) -> Result<Vec<String>, PipelineError> {
        let Some(config) = &entity.schedule else {
            return Ok(Vec::new());
        };

        let start = config.start_at()?;

        let boundaries = schedule::pending_from_target(
            &self.origin,
            &entity.lake_prefix(),
            start,
            config.step,
            window.end,
        )
        .await?;

        let column_names: Vec<String> = entity
            .columns
            .iter()
            .map(|column| column.name.clone())
            .collect();

        let queries: Vec<String> = boundaries
            .iter()
            .map(|boundary| {
                let window = ProcessingWindow {
                    start: *boundary - config.step.duration(),
                    end: *boundary,
                };
                extract::window_query(entity, &column_names, &window)
            })
            .collect();

        if !queries.is_empty() {
            info!(
                entity = %entity.entity,
                pending = queries.len(),
                fetch_hint = extract::fetch_hint(entity.volume),
                "schedule boundaries awaiting extraction"
            );
        }
        Ok(queries)
    }

    /// Move pending partitions from origin to target, returning them.
    async fn reconcile_entity(
        &self,
        entity: &EntityConfig,
        now: NaiveDateTime,
    ) -> Result<Vec<DataKey>, PipelineError> {
        let request = ReconcileRequest {
            prefix: entity.lake_prefix(),
            target_prefix: entity.target_lake_prefix(),
            all_files: entity.all_files,
            min_age: entity.min_age,
            now,
        };
        let reconciler = Reconciler::new(self.origin.clone(), self.target.clone());

        let partitions = match reconciler.plan(&request).await? {
            ReconcilePlan::Bootstrap { prefix } => {
                info!(%prefix, "target tier is empty, copying whole prefix");
                let keys = self.origin.list_prefix(&prefix).await?;
                self.copy_keys(entity, &keys).await?;
                PartitionSet::from_keys(&keys).entries().to_vec()
            }
            ReconcilePlan::Partitions(partitions) => {
                for partition in &partitions {
                    let keys = self.origin.list_prefix(&partition.prefix).await?;
                    self.copy_keys(entity, &keys).await?;
                }
                partitions
            }
        };

        info!(
            entity = %entity.entity,
            partitions = partitions.len(),
            "reconciled origin into target"
        );
        Ok(partitions)
    }

    async fn copy_keys(&self, entity: &EntityConfig, keys: &[String]) -> Result<(), PipelineError> {
        for key in keys {
            let bytes = self.origin.get(key).await?;
            self.target.put(&Self::target_key(entity, key), bytes).await?;
        }
        Ok(())
    }

    /// Rewrite an origin key to its target-tier location, applying the
    /// entity rename when one is configured.
    fn target_key(entity: &EntityConfig, key: &str) -> String {
        match key.strip_prefix(&entity.lake_prefix()) {
            Some(rest) => format!("{}{}", entity.target_lake_prefix(), rest),
            None => key.to_string(),
        }
    }

    /// Merge moved partitions into golden month files. Returns the set
    /// of month keys that were written.
    async fn merge_partitions(
        &self,
        entity: &EntityConfig,
        partitions: &[DataKey],
        report: &mut EntityReport,
    ) -> Result<BTreeSet<String>, PipelineError> {
        let mut months = BTreeSet::new();

        for partition in partitions {
            let partition_prefix = Self::target_key(entity, &partition.prefix);
            let keys = self.target.list_prefix(&partition_prefix).await?;

            let mut schema = None;
            let mut batches = Vec::new();
            for key in &keys {
                if !key.ends_with(".parquet") {
                    warn!(key = %key, "skipping non-parquet file in partition");
                    continue;
                }
                let bytes = self.target.get(key).await?;
                let (file_schema, file_batches) =
                    decode_bytes(bytes).context(ParquetSnafu { path: key.as_str() })?;
                schema.get_or_insert(file_schema);
                batches.extend(file_batches);
            }
            let Some(schema) = schema else {
                continue;
            };

            let combined = arrow::compute::concat_batches(&schema, batches.iter()).map_err(
                |source| crate::error::MergeError::Arrow {
                    path: partition_prefix.clone(),
                    source,
                },
            )?;

            let month_path = MergeWriter::month_path(&entity.target_lake_prefix(), partition.bucket);
            let outcome = self
                .golden
                .write(&month_path, &combined, &entity.exclude_columns)
                .await?;
            report.rows_merged += match outcome {
                MergeOutcome::Created { rows } | MergeOutcome::Appended { rows } => rows,
            };
            months.insert(month_path);
        }

        Ok(months)
    }

    /// Load written months into the warehouse through a staging table.
    async fn load_entity(
        &self,
        entity: &EntityConfig,
        months: &BTreeSet<String>,
    ) -> Result<Option<u64>, PipelineError> {
        let Some((settings, executor)) = &self.warehouse else {
            return Ok(None);
        };
        if entity.columns.is_empty() {
            warn!(
                entity = %entity.entity,
                "no column definitions, skipping warehouse load"
            );
            return Ok(None);
        }

        let table = entity.table_name();
        let staging = format!("{table}_staging");
        let executor = executor.as_ref();

        executor
            .execute(&warehouse::create_table(
                &settings.schema,
                table,
                &entity.columns,
                &entity.primary_key,
            ))
            .await?;
        executor
            .execute(&warehouse::drop_table(&settings.schema, &staging))
            .await?;
        executor
            .execute(&warehouse::create_table(
                &settings.schema,
                &staging,
                &entity.columns,
                &[],
            ))
            .await?;

        for month in months {
            let location = format!("{}/{}", self.golden_url, month);
            executor
                .execute(&warehouse::copy_from_storage(
                    &settings.schema,
                    &staging,
                    &location,
                    settings.iam_role.as_deref(),
                ))
                .await?;
        }

        let plan = warehouse::UpsertPlan {
            schema: settings.schema.clone(),
            table: table.to_string(),
            staging_table: staging.clone(),
            columns: entity
                .columns
                .iter()
                .map(|column| column.name.clone())
                .collect(),
            primary_key: entity.primary_key.clone(),
        };
        let affected = warehouse::run_upsert(executor, &plan.render()).await?;

        executor
            .execute(&warehouse::drop_table(&settings.schema, &staging))
            .await?;

        Ok(Some(affected))
    }
}

