//! The "latest sum per device" aggregation engine.
//!
//! Computes, for each allow-listed device, the sum of detector traffic
//! amounts at that device's single most-recent reading timestamp, over the
//! last `n` sampling intervals. This is the view the dashboard consumes.

use crate::allowlist::DeviceAllowList;
use crate::storage::{ReadingStore, ReadingStoreError};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Timestamp key format used in the aggregated view.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors that can occur while computing the aggregated view.
///
/// Aggregation failures are logged and re-raised; callers surface them as
/// "aggregation unavailable" rather than returning a partial result.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// The underlying store query failed.
    #[error("Aggregation query failed: {0}")]
    Store(#[from] ReadingStoreError),
}

/// Device sums grouped by one sampling timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IntervalSums {
    /// Timestamp key, formatted in the reference timezone.
    timestamp: String,
    /// Bare device code to summed traffic amount.
    totals: BTreeMap<String, i64>,
}

/// Aggregated traffic sums keyed by timestamp, most recent first.
///
/// Serializes as a JSON object whose keys are `YYYY-MM-DD HH:MM:SS` strings
/// in the reference timezone and whose values are objects of bare device
/// code to integer sum. Insertion order follows descending timestamp because
/// readings are fetched in that order before grouping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LatestTrafficSums {
    intervals: Vec<IntervalSums>,
}

impl LatestTrafficSums {
    /// Timestamp keys in serialization order (most recent first).
    pub fn timestamps(&self) -> impl Iterator<Item = &str> {
        self.intervals.iter().map(|i| i.timestamp.as_str())
    }

    /// Per-device sums for one timestamp key, if present.
    #[must_use]
    pub fn device_sums(&self, timestamp: &str) -> Option<&BTreeMap<String, i64>> {
        self.intervals
            .iter()
            .find(|i| i.timestamp == timestamp)
            .map(|i| &i.totals)
    }

    /// Number of distinct timestamps in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Returns true if no device had readings within the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl Serialize for LatestTrafficSums {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.intervals.len()))?;
        for interval in &self.intervals {
            map.serialize_entry(&interval.timestamp, &interval.totals)?;
        }
        map.end()
    }
}

/// Aggregation engine over a reading store.
///
/// Holds the store, the device allow-list, the reference timezone used for
/// timestamp keys, and the sampling cadence (10 minutes in the reference
/// deployment). All of these are explicit constructor inputs; there is no
/// ambient global state.
pub struct Aggregator {
    store: Arc<dyn ReadingStore>,
    allow_list: DeviceAllowList,
    timezone: Tz,
    cadence: Duration,
}

impl Aggregator {
    /// Creates an aggregator with the default 10-minute sampling cadence.
    #[must_use]
    pub fn new(store: Arc<dyn ReadingStore>, allow_list: DeviceAllowList, timezone: Tz) -> Self {
        Self {
            store,
            allow_list,
            timezone,
            cadence: Duration::minutes(10),
        }
    }

    /// Overrides the sampling cadence.
    #[must_use]
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Computes the latest traffic sum per device over the last `n` sampling
    /// intervals.
    ///
    /// For each device only the rows at its single most-recent reading
    /// timestamp contribute, restricted to allow-listed device/detector
    /// pairs and to `timestamp >= now - n * cadence`. Rows without a traffic
    /// amount are skipped: "no data" is not counted as zero traffic.
    ///
    /// Duplicate `(device, detector, timestamp)` rows from overlapping poll
    /// windows are summed twice. That matches the source system and is
    /// flagged in the tests rather than silently corrected.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Store`] if the window query fails; the
    /// error is logged here and must be surfaced by the caller as
    /// "aggregation unavailable".
    pub fn latest_sums(&self, n: u32) -> Result<LatestTrafficSums, AggregationError> {
        let intervals = i32::try_from(n).unwrap_or(i32::MAX);
        let cutoff = Utc::now() - self.cadence * intervals;

        let rows = self.store.query_window(cutoff).map_err(|e| {
            tracing::error!(error = %e, "Aggregation window query failed");
            e
        })?;

        // Single most-recent timestamp per device, regardless of detector.
        // Any reading newer than the window rows would itself be in the
        // window, so the max over window rows equals the device's global max.
        let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for row in &rows {
            latest
                .entry(row.device.as_str())
                .and_modify(|ts| {
                    if row.timestamp > *ts {
                        *ts = row.timestamp;
                    }
                })
                .or_insert(row.timestamp);
        }

        let mut result = LatestTrafficSums::default();

        // Rows arrive most-recent-first, so encounter order of timestamp
        // keys is already the serialization order.
        for row in &rows {
            if latest.get(row.device.as_str()) != Some(&row.timestamp) {
                continue;
            }

            let bare = self.allow_list.bare_code(&row.device);
            if !self.allow_list.allows(bare, &row.detector) {
                continue;
            }

            let Some(amount) = row.traffic_amount else {
                continue;
            };

            let key = row
                .timestamp
                .with_timezone(&self.timezone)
                .format(TIMESTAMP_FORMAT)
                .to_string();

            let pos = match result.intervals.iter().position(|i| i.timestamp == key) {
                Some(pos) => pos,
                None => {
                    result.intervals.push(IntervalSums {
                        timestamp: key,
                        totals: BTreeMap::new(),
                    });
                    result.intervals.len() - 1
                }
            };

            *result.intervals[pos].totals.entry(bare.to_string()).or_insert(0) += amount;
        }

        Ok(result)
    }
}
