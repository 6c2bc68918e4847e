//! Pipeline configuration.
//!
//! Configuration is loaded from a YAML file. A config names the three
//! lake locations (origin, target, golden), the warehouse connection,
//! and the entities to process.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use floe_core::error::{
    ConfigError, EmptyFieldSnafu, InvalidStartDateSnafu, ReadFileSnafu, YamlParseSnafu,
};
use floe_core::window::{Interval, StepSize};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub lake: LakeConfig,

    /// Warehouse settings. When absent, entities are merged into the
    /// golden layer but never loaded.
    #[serde(default)]
    pub warehouse: Option<WarehouseSettings>,

    pub entities: Vec<EntityConfig>,

    /// Hours subtracted from the execution timestamp before deriving a
    /// processing window.
    #[serde(default = "default_clock_skew_hours")]
    pub clock_skew_hours: i64,
}

/// Lake tier locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LakeConfig {
    /// Raw extracts land here (bronze).
    pub origin_url: String,
    /// Reconciled partitions land here (silver).
    pub target_url: String,
    /// Merged per-entity files land here (golden).
    pub golden_url: String,

    /// Extra options passed through to the object store builder.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Warehouse connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSettings {
    /// Name of the secret holding host/port/user/password/dbname.
    pub secret: String,

    /// Target schema for loaded tables.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// IAM role ARN used by COPY and UNLOAD statements.
    #[serde(default)]
    pub iam_role: Option<String>,
}

/// Expected size class of an entity, used to pick a fetch granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataVolume {
    Few,
    #[default]
    Medium,
    Huge,
}

/// A warehouse column definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
}

/// Backfill schedule for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Inclusive schedule origin, `%Y-%m-%d %H:%M:%S`.
    pub start_date: String,
    /// Distance between boundaries, e.g. `1D` or `6H`.
    pub step: StepSize,
}

impl ScheduleConfig {
    /// Parsed schedule origin.
    pub fn start_at(&self) -> Result<chrono::NaiveDateTime, ConfigError> {
        chrono::NaiveDateTime::parse_from_str(&self.start_date, "%Y-%m-%d %H:%M:%S")
            .ok()
            .context(InvalidStartDateSnafu {
                value: self.start_date.clone(),
            })
    }
}

/// A single entity (source table) to move through the lake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Source namespace (schema) in the origin database.
    pub namespace: String,
    /// Source entity (table) name.
    pub entity: String,

    /// Name under which the entity lands in the warehouse. Defaults to
    /// the source entity name.
    #[serde(default)]
    pub target_entity: Option<String>,

    /// Minimum bucket age before a partition is considered settled.
    #[serde(default = "default_min_age")]
    pub min_age: StepSize,

    /// Reconcile every origin partition missing from the target instead
    /// of only those past the watermark.
    #[serde(default)]
    pub all_files: bool,

    pub interval: Interval,

    /// Columns removed before merging into the golden layer.
    #[serde(default)]
    pub exclude_columns: Vec<String>,

    /// Primary key columns. Empty means the upsert degenerates to a
    /// plain insert.
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Timestamp column used for range filters on golden reads.
    #[serde(default = "default_filter_column")]
    pub filter_column: String,

    #[serde(default)]
    pub volume: DataVolume,

    /// Warehouse column definitions, in table order.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

impl EntityConfig {
    /// Lake prefix for this entity, `namespace/entity/`.
    pub fn lake_prefix(&self) -> String {
        format!("{}/{}/", self.namespace, self.entity)
    }

    /// Lake prefix in the target and golden tiers. Picks up the renamed
    /// entity when `target_entity` is set.
    pub fn target_lake_prefix(&self) -> String {
        format!("{}/{}/", self.namespace, self.table_name())
    }

    /// Warehouse table name for this entity.
    pub fn table_name(&self) -> &str {
        self.target_entity.as_deref().unwrap_or(&self.entity)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.namespace.is_empty(),
            EmptyFieldSnafu {
                entity: self.entity.clone(),
                field: "namespace",
            }
        );
        ensure!(
            !self.entity.is_empty(),
            EmptyFieldSnafu {
                entity: self.namespace.clone(),
                field: "entity",
            }
        );
        ensure!(
            !self.filter_column.is_empty(),
            EmptyFieldSnafu {
                entity: self.entity.clone(),
                field: "filter_column",
            }
        );
        for column in &self.primary_key {
            ensure!(
                !column.is_empty(),
                EmptyFieldSnafu {
                    entity: self.entity.clone(),
                    field: "primary_key",
                }
            );
        }
        if let Some(schedule) = &self.schedule {
            schedule.start_at()?;
        }
        Ok(())
    }
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Find an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|entity| entity.entity == name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for entity in &self.entities {
            entity.validate()?;
        }
        Ok(())
    }
}

fn default_clock_skew_hours() -> i64 {
    floe_core::window::DEFAULT_CLOCK_SKEW_HOURS
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_min_age() -> StepSize {
    StepSize {
        amount: 1,
        unit: floe_core::window::StepUnit::Day,
    }
}

fn default_filter_column() -> String {
    "trusted".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_core::window::StepUnit;

    const SAMPLE: &str = r#"
lake:
  origin_url: s3://lake-bronze
  target_url: s3://lake-silver
  golden_url: s3://lake-golden
warehouse:
  secret: warehouse-credentials
  iam_role: arn:aws:iam::123456789012:role/loader
entities:
  - namespace: sales
    entity: orders
    interval: daily
    min_age: 1H
    primary_key: [order_id]
    exclude_columns: [op_checksum]
    columns:
      - name: order_id
        sql_type: BIGINT
      - name: trusted
        sql_type: TIMESTAMP
    schedule:
      start_date: "2024-01-01 00:00:00"
      step: 1D
  - namespace: sales
    entity: events
    target_entity: events_hist
    interval: "@hourly"
    all_files: true
    volume: huge
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.clock_skew_hours, 3);
        assert_eq!(config.entities.len(), 2);

        let orders = config.entity("orders").unwrap();
        assert_eq!(orders.lake_prefix(), "sales/orders/");
        assert_eq!(orders.target_lake_prefix(), "sales/orders/");
        assert_eq!(orders.table_name(), "orders");
        assert_eq!(orders.min_age.unit, StepUnit::Hour);
        assert_eq!(orders.primary_key, vec!["order_id"]);
        assert_eq!(orders.filter_column, "trusted");
        assert!(!orders.all_files);
        let schedule = orders.schedule.as_ref().unwrap();
        assert_eq!(schedule.step.unit, StepUnit::Day);

        let events = config.entity("events").unwrap();
        assert_eq!(events.table_name(), "events_hist");
        assert_eq!(events.target_lake_prefix(), "sales/events_hist/");
        assert_eq!(events.interval, Interval::Hourly);
        assert!(events.all_files);
        assert_eq!(events.volume, DataVolume::Huge);
        assert_eq!(events.min_age.unit, StepUnit::Day);
        assert!(events.primary_key.is_empty());
    }

    #[test]
    fn test_rejects_empty_namespace() {
        let yaml = r#"
lake:
  origin_url: s3://a
  target_url: s3://b
  golden_url: s3://c
entities:
  - namespace: ""
    entity: orders
    interval: daily
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_bad_start_date() {
        let yaml = r#"
lake:
  origin_url: s3://a
  target_url: s3://b
  golden_url: s3://c
entities:
  - namespace: sales
    entity: orders
    interval: daily
    schedule:
      start_date: "January 1st"
      step: 1D
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_bad_step() {
        let yaml = r#"
lake:
  origin_url: s3://a
  target_url: s3://b
  golden_url: s3://c
entities:
  - namespace: sales
    entity: orders
    interval: daily
    min_age: 1W
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
