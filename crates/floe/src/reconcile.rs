//! Partition reconciliation between the origin and target tiers.
//!
//! Compares the time-bucketed partitions present under an entity prefix
//! in two lake tiers and decides which partitions still need to move.
//! Three regimes:
//!
//! - bootstrap: the target has nothing under the prefix yet, so the
//!   whole prefix is copied as one unit;
//! - incremental: only buckets newer than the target watermark move,
//!   and only once they are old enough to be settled;
//! - backfill (`all_files`): every bucket missing from the target moves,
//!   regardless of age.

use chrono::NaiveDateTime;

use floe_core::key::{DataKey, PartitionSet};
use floe_core::storage::StorageProviderRef;
use floe_core::window::StepSize;

use crate::error::PipelineError;

/// What to reconcile for one entity.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Entity prefix in the origin tier, `namespace/entity/`.
    pub prefix: String,
    /// Entity prefix in the target tier. Differs from `prefix` when the
    /// entity is renamed on the way in.
    pub target_prefix: String,
    /// Backfill mode: move every missing bucket.
    pub all_files: bool,
    /// Minimum bucket age before an incremental bucket is settled.
    pub min_age: StepSize,
    /// Evaluation instant.
    pub now: NaiveDateTime,
}

/// Outcome of planning one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// Target is empty under the prefix; copy the whole prefix.
    Bootstrap { prefix: String },
    /// Move these partitions, in origin listing order.
    Partitions(Vec<DataKey>),
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        matches!(self, ReconcilePlan::Partitions(partitions) if partitions.is_empty())
    }
}

/// Decide which partitions to move, given both listings.
///
/// `target_listing_empty` reflects the raw listing before key
/// classification, so a target holding only markers or stray files does
/// not trigger a bootstrap.
pub fn plan_buckets(
    request: &ReconcileRequest,
    origin: &PartitionSet,
    target: &PartitionSet,
    target_listing_empty: bool,
) -> ReconcilePlan {
    if target_listing_empty && !request.all_files {
        return ReconcilePlan::Bootstrap {
            prefix: request.prefix.clone(),
        };
    }

    if request.all_files {
        let missing: Vec<DataKey> = origin.difference(target).cloned().collect();
        return ReconcilePlan::Partitions(missing);
    }

    let watermark = target.max_bucket();
    let threshold = request.min_age.threshold();

    let pending: Vec<DataKey> = origin
        .entries()
        .iter()
        .filter(|key| watermark.is_none_or(|mark| key.bucket > mark))
        .filter(|key| request.now - key.bucket >= threshold)
        .cloned()
        .collect();

    ReconcilePlan::Partitions(pending)
}

/// Reconciler over two lake tiers.
pub struct Reconciler {
    origin: StorageProviderRef,
    target: StorageProviderRef,
}

impl Reconciler {
    pub fn new(origin: StorageProviderRef, target: StorageProviderRef) -> Self {
        Self { origin, target }
    }

    /// List both tiers under their entity prefixes and plan the move.
    pub async fn plan(&self, request: &ReconcileRequest) -> Result<ReconcilePlan, PipelineError> {
        let origin_keys = self.origin.list_prefix(&request.prefix).await?;
        let target_keys = self.target.list_prefix(&request.target_prefix).await?;

        let target_listing_empty = target_keys.is_empty();
        let origin_set = PartitionSet::from_keys(&origin_keys);
        let target_set = PartitionSet::from_keys(&target_keys);

        tracing::debug!(
            prefix = %request.prefix,
            origin_partitions = origin_set.len(),
            target_partitions = target_set.len(),
            "reconciling entity prefix"
        );

        Ok(plan_buckets(
            request,
            &origin_set,
            &target_set,
            target_listing_empty,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use floe_core::window::StepUnit;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn request(all_files: bool, unit: StepUnit, now: NaiveDateTime) -> ReconcileRequest {
        ReconcileRequest {
            prefix: "sales/orders/".to_string(),
            target_prefix: "sales/orders/".to_string(),
            all_files,
            min_age: StepSize { amount: 1, unit },
            now,
        }
    }

    fn set(keys: &[&str]) -> PartitionSet {
        PartitionSet::from_keys(keys.iter().copied())
    }

    #[test]
    fn test_bootstrap_when_target_empty() {
        let origin = set(&["sales/orders/2024-01-01/a.parquet"]);
        let target = PartitionSet::default();
        let request = request(false, StepUnit::Day, ts(2024, 1, 10, 0));

        let plan = plan_buckets(&request, &origin, &target, true);
        assert_eq!(
            plan,
            ReconcilePlan::Bootstrap {
                prefix: "sales/orders/".to_string()
            }
        );
    }

    #[test]
    fn test_no_bootstrap_in_backfill_mode() {
        let origin = set(&["sales/orders/2024-01-01/a.parquet"]);
        let target = PartitionSet::default();
        let request = request(true, StepUnit::Day, ts(2024, 1, 10, 0));

        let plan = plan_buckets(&request, &origin, &target, true);
        let ReconcilePlan::Partitions(partitions) = plan else {
            panic!("expected partitions");
        };
        assert_eq!(partitions.len(), 1);
    }

    #[test]
    fn test_incremental_moves_settled_buckets_past_watermark() {
        let origin = set(&[
            "sales/orders/2024-01-01/a.parquet",
            "sales/orders/2024-01-02/a.parquet",
            "sales/orders/2024-01-03/a.parquet",
            "sales/orders/2024-01-04/a.parquet",
        ]);
        let target = set(&["sales/orders/2024-01-02/a.parquet"]);
        // 01-04 is newer than the watermark but not a day old yet
        let request = request(false, StepUnit::Day, ts(2024, 1, 4, 12));

        let plan = plan_buckets(&request, &origin, &target, false);
        let ReconcilePlan::Partitions(partitions) = plan else {
            panic!("expected partitions");
        };
        let buckets: Vec<_> = partitions.iter().map(|k| k.bucket).collect();
        assert_eq!(buckets, vec![ts(2024, 1, 3, 0)]);
    }

    #[test]
    fn test_incremental_waits_out_multi_unit_min_age() {
        let origin = set(&[
            "sales/orders/2023-12-31 20:00:00/a.parquet",
            "sales/orders/2024-01-01 10:00:00/a.parquet",
        ]);
        let target = set(&["sales/orders/2023-12-31 08:00:00/a.parquet"]);
        // 12-hour settling window: the bucket from two hours ago stays put
        let mut request = request(false, StepUnit::Hour, ts(2024, 1, 1, 12));
        request.min_age = StepSize {
            amount: 12,
            unit: StepUnit::Hour,
        };

        let plan = plan_buckets(&request, &origin, &target, false);
        let ReconcilePlan::Partitions(partitions) = plan else {
            panic!("expected partitions");
        };
        let buckets: Vec<_> = partitions.iter().map(|k| k.bucket).collect();
        assert_eq!(buckets, vec![ts(2023, 12, 31, 20)]);
    }

    #[test]
    fn test_incremental_ignores_gaps_behind_watermark() {
        let origin = set(&[
            "sales/orders/2024-01-01/a.parquet",
            "sales/orders/2024-01-03/a.parquet",
        ]);
        // 01-01 is missing from the target but behind the watermark
        let target = set(&["sales/orders/2024-01-02/a.parquet"]);
        let request = request(false, StepUnit::Day, ts(2024, 1, 10, 0));

        let plan = plan_buckets(&request, &origin, &target, false);
        let ReconcilePlan::Partitions(partitions) = plan else {
            panic!("expected partitions");
        };
        let buckets: Vec<_> = partitions.iter().map(|k| k.bucket).collect();
        assert_eq!(buckets, vec![ts(2024, 1, 3, 0)]);
    }

    #[test]
    fn test_backfill_returns_every_missing_bucket() {
        let origin = set(&[
            "sales/orders/2024-01-01/a.parquet",
            "sales/orders/2024-01-02/a.parquet",
            "sales/orders/2024-01-03/a.parquet",
        ]);
        let target = set(&["sales/orders/2024-01-02/a.parquet"]);
        // now is within the threshold of every bucket; backfill ignores age
        let request = request(true, StepUnit::Month, ts(2024, 1, 3, 1));

        let plan = plan_buckets(&request, &origin, &target, false);
        let ReconcilePlan::Partitions(partitions) = plan else {
            panic!("expected partitions");
        };
        let buckets: Vec<_> = partitions.iter().map(|k| k.bucket).collect();
        assert_eq!(buckets, vec![ts(2024, 1, 1, 0), ts(2024, 1, 3, 0)]);
    }

    #[test]
    fn test_steady_state_is_empty() {
        let keys = &[
            "sales/orders/2024-01-01/a.parquet",
            "sales/orders/2024-01-02/a.parquet",
        ];
        let origin = set(keys);
        let target = set(keys);
        let request = request(false, StepUnit::Day, ts(2024, 2, 1, 0));

        let plan = plan_buckets(&request, &origin, &target, false);
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_plan_against_local_tiers() {
        use bytes::Bytes;
        use floe_core::storage::StorageProvider;
        use std::sync::Arc;
        use tempfile::TempDir;

        let origin_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let origin = Arc::new(
            StorageProvider::for_url(origin_dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let target = Arc::new(
            StorageProvider::for_url(target_dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );

        origin
            .put(
                "sales/orders/2024-01-01/part-0.parquet",
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        let reconciler = Reconciler::new(origin, target);
        let request = ReconcileRequest {
            prefix: "sales/orders/".to_string(),
            target_prefix: "sales/orders/".to_string(),
            all_files: false,
            min_age: StepSize {
                amount: 1,
                unit: StepUnit::Day,
            },
            now: ts(2024, 1, 10, 0),
        };

        let plan = reconciler.plan(&request).await.unwrap();
        assert_eq!(
            plan,
            ReconcilePlan::Bootstrap {
                prefix: "sales/orders/".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_plan_watermarks_against_renamed_target_prefix() {
        use bytes::Bytes;
        use floe_core::storage::StorageProvider;
        use std::sync::Arc;
        use tempfile::TempDir;

        let origin_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let origin = Arc::new(
            StorageProvider::for_url(origin_dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let target = Arc::new(
            StorageProvider::for_url(target_dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );

        for key in [
            "sales/orders/2024-01-01/part-0.parquet",
            "sales/orders/2024-01-02/part-0.parquet",
        ] {
            origin.put(key, Bytes::from_static(b"x")).await.unwrap();
        }
        // The renamed copy of 01-01 is the watermark; no bootstrap.
        target
            .put(
                "sales/orders_hist/2024-01-01/part-0.parquet",
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        let reconciler = Reconciler::new(origin, target);
        let request = ReconcileRequest {
            prefix: "sales/orders/".to_string(),
            target_prefix: "sales/orders_hist/".to_string(),
            all_files: false,
            min_age: StepSize {
                amount: 1,
                unit: StepUnit::Day,
            },
            now: ts(2024, 1, 10, 0),
        };

        let plan = reconciler.plan(&request).await.unwrap();
        let ReconcilePlan::Partitions(partitions) = plan else {
            panic!("expected partitions");
        };
        let buckets: Vec<_> = partitions.iter().map(|k| k.bucket).collect();
        assert_eq!(buckets, vec![ts(2024, 1, 2, 0)]);
    }
}
