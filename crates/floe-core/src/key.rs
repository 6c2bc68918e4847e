//! Storage key classification and partition sets.
//!
//! Lake layouts encode the time bucket of a partition in the third
//! path segment, e.g. `sales/orders/2024-01-02 03:00:00/part-0.parquet`.
//! Keys that do not follow the layout (directory markers, stray files)
//! are tolerated and skipped with a warning.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::warn;

/// Timestamp formats accepted in the bucket segment, tried in order.
const BUCKET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d",
    "%Y-%m",
];

/// A storage key that carries a parseable time bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKey {
    /// The partition prefix, i.e. the key up to and including the bucket
    /// segment, with a trailing slash.
    pub prefix: String,
    /// The time bucket parsed from the third path segment.
    pub bucket: NaiveDateTime,
}

/// Classification of a listed storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyClass {
    /// A data file inside a time-bucketed partition.
    Data(DataKey),
    /// A directory marker (key ending in `/`).
    Marker,
    /// A key that does not follow the bucketed layout.
    NonConforming,
}

/// Parse a bucket segment into a timestamp.
///
/// Accepts second-precision timestamps, bare dates, and year-month
/// buckets. Segments carrying a file extension (e.g. a flat
/// `2024-01-02 03:00:00.csv` layout) are parsed after stripping the
/// extension.
pub fn parse_bucket(segment: &str) -> Option<NaiveDateTime> {
    for format in BUCKET_FORMATS {
        if format.contains("%H") {
            if let Ok(ts) = NaiveDateTime::parse_from_str(segment, format) {
                return Some(ts);
            }
        } else if let Ok(date) = chrono::NaiveDate::parse_from_str(segment, format) {
            return Some(date.and_hms_opt(0, 0, 0).unwrap());
        } else if *format == "%Y-%m" {
            // NaiveDate needs a day, so complete the month bucket
            if let Ok(date) =
                chrono::NaiveDate::parse_from_str(&format!("{segment}-01"), "%Y-%m-%d")
            {
                return Some(date.and_hms_opt(0, 0, 0).unwrap());
            }
        }
    }

    // Flat layouts name files after the bucket directly
    if let Some(stem) = segment.rsplit_once('.').map(|(stem, _)| stem) {
        if stem.len() < segment.len() {
            return parse_bucket(stem);
        }
    }

    None
}

/// Classify a storage key against the bucketed lake layout.
pub fn classify(key: &str) -> KeyClass {
    if key.ends_with('/') {
        return KeyClass::Marker;
    }

    let segments: Vec<&str> = key.split('/').collect();
    if segments.len() < 3 {
        return KeyClass::NonConforming;
    }

    match parse_bucket(segments[2]) {
        Some(bucket) => {
            let prefix = format!("{}/{}/{}/", segments[0], segments[1], segments[2]);
            KeyClass::Data(DataKey { prefix, bucket })
        }
        None => KeyClass::NonConforming,
    }
}

/// The set of time-bucketed partitions discovered in a listing.
///
/// Entries preserve first-seen order; bucket lookups go through a
/// sorted index so `max_bucket` and containment checks are cheap.
#[derive(Debug, Default, Clone)]
pub struct PartitionSet {
    entries: Vec<DataKey>,
    index: BTreeMap<NaiveDateTime, usize>,
}

impl PartitionSet {
    /// Build a partition set from listed keys, skipping markers and
    /// warning on non-conforming keys.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for key in keys {
            let key = key.as_ref();
            match classify(key) {
                KeyClass::Data(data_key) => set.insert(data_key),
                KeyClass::Marker => {}
                KeyClass::NonConforming => {
                    warn!(key, "skipping key that does not match the bucketed layout");
                }
            }
        }
        set
    }

    fn insert(&mut self, key: DataKey) {
        if self.index.contains_key(&key.bucket) {
            return;
        }
        self.index.insert(key.bucket, self.entries.len());
        self.entries.push(key);
    }

    /// Partitions in first-seen order.
    pub fn entries(&self) -> &[DataKey] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The most recent bucket in the set.
    pub fn max_bucket(&self) -> Option<NaiveDateTime> {
        self.index.keys().next_back().copied()
    }

    pub fn contains(&self, bucket: &NaiveDateTime) -> bool {
        self.index.contains_key(bucket)
    }

    /// Partitions whose bucket is absent from `other`, in first-seen order.
    pub fn difference<'a>(&'a self, other: &'a PartitionSet) -> impl Iterator<Item = &'a DataKey> {
        self.entries
            .iter()
            .filter(move |entry| !other.contains(&entry.bucket))
    }
}
