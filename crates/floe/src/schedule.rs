//! Backfill scheduling over fixed step boundaries.
//!
//! A schedule is an origin instant plus a step size. Boundaries are the
//! instants `start + k * step` for `k >= 1` that have already elapsed.
//! The scheduler resumes from whatever the target tier already holds:
//! everything after the newest processed boundary is pending, so a
//! partially-completed backfill picks up where it stopped.

use chrono::NaiveDateTime;

use floe_core::key::PartitionSet;
use floe_core::storage::StorageProviderRef;
use floe_core::window::StepSize;

use crate::error::PipelineError;

/// Boundaries of `[start, now]` not yet covered by `processed`.
///
/// The schedule origin itself is never a boundary. Boundaries strictly
/// after the newest processed instant are pending; gaps behind it are
/// considered handled.
pub fn pending_boundaries(
    start: NaiveDateTime,
    step: StepSize,
    now: NaiveDateTime,
    processed: Option<NaiveDateTime>,
) -> Vec<NaiveDateTime> {
    let step_duration = step.duration();
    let elapsed = now - start;
    if elapsed < step_duration {
        return Vec::new();
    }

    let total = elapsed.num_seconds() / step_duration.num_seconds();

    (1..=total)
        .map(|k| start + step_duration * k as i32)
        .filter(|boundary| processed.is_none_or(|mark| *boundary > mark))
        .collect()
}

/// Compute pending boundaries for an entity, resuming from the buckets
/// already present in the target tier.
pub async fn pending_from_target(
    target: &StorageProviderRef,
    prefix: &str,
    start: NaiveDateTime,
    step: StepSize,
    now: NaiveDateTime,
) -> Result<Vec<NaiveDateTime>, PipelineError> {
    let keys = target.list_prefix(prefix).await?;
    let processed = PartitionSet::from_keys(&keys);
    Ok(pending_boundaries(start, step, now, processed.max_bucket()))
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

    const DAY: StepSize = StepSize {
        amount: 1,
        unit: StepUnit::Day,
    };

    #[test]
    fn test_empty_before_first_boundary() {
        let pending = pending_boundaries(ts(2024, 1, 1, 0), DAY, ts(2024, 1, 1, 12), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_all_boundaries_when_nothing_processed() {
        let pending = pending_boundaries(ts(2024, 1, 1, 0), DAY, ts(2024, 1, 4, 6), None);
        assert_eq!(
            pending,
            vec![ts(2024, 1, 2, 0), ts(2024, 1, 3, 0), ts(2024, 1, 4, 0)]
        );
    }

    #[test]
    fn test_resumes_after_newest_processed() {
        let pending = pending_boundaries(
            ts(2024, 1, 1, 0),
            DAY,
            ts(2024, 1, 5, 6),
            Some(ts(2024, 1, 3, 0)),
        );
        assert_eq!(pending, vec![ts(2024, 1, 4, 0), ts(2024, 1, 5, 0)]);
    }

    #[test]
    fn test_exact_multiple_includes_last_boundary() {
        let pending = pending_boundaries(ts(2024, 1, 1, 0), DAY, ts(2024, 1, 3, 0), None);
        assert_eq!(pending, vec![ts(2024, 1, 2, 0), ts(2024, 1, 3, 0)]);
    }

    #[test]
    fn test_hourly_step() {
        let step = StepSize {
            amount: 6,
            unit: StepUnit::Hour,
        };
        let pending = pending_boundaries(ts(2024, 1, 1, 0), step, ts(2024, 1, 1, 19), None);
        assert_eq!(
            pending,
            vec![ts(2024, 1, 1, 6), ts(2024, 1, 1, 12), ts(2024, 1, 1, 18)]
        );
    }

    #[tokio::test]
    async fn test_pending_from_target_listing() {
        use bytes::Bytes;
        use floe_core::storage::StorageProvider;
        use std::sync::Arc;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let target: StorageProviderRef = Arc::new(
            StorageProvider::for_url(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        target
            .put(
                "sales/orders/2024-01-03/part-0.parquet",
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        let pending = pending_from_target(
            &target,
            "sales/orders/",
            ts(2024, 1, 1, 0),
            DAY,
            ts(2024, 1, 5, 12),
        )
        .await
        .unwrap();

        assert_eq!(pending, vec![ts(2024, 1, 4, 0), ts(2024, 1, 5, 0)]);
    }
}
