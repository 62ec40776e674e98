//! Reading storage trait and implementations.
//!
//! Provides the `ReadingStore` trait for abstracting the append-only reading
//! log, an `InMemoryReadingStore` implementation for development and testing,
//! and a `ClickHouseReadingStore` for production use.

use crate::models::Reading;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur during reading store operations.
#[derive(Debug, Error)]
pub enum ReadingStoreError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on reading store")]
    Lock,

    /// A batch or single-row insert failed; the data for that batch is lost.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Schema creation failed at startup.
    #[error("Schema creation failed: {0}")]
    Schema(String),

    /// Generic storage error during a query.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Trait for reading storage implementations.
///
/// The store is an append-only log: readings are inserted by the collector
/// and never updated or deleted. Implementations must be thread-safe
/// (Send + Sync); the collector writes from a background task while the
/// aggregation engine reads from request handlers.
pub trait ReadingStore: Send + Sync {
    /// Creates the backing table if it does not exist.
    ///
    /// Idempotent and safe to call on every process start. Callers are
    /// expected to log a failure and continue, since the table may already
    /// exist with a compatible shape.
    ///
    /// # Errors
    ///
    /// Returns [`ReadingStoreError::Schema`] if table creation fails.
    fn ensure_schema(&self) -> Result<(), ReadingStoreError>;

    /// Inserts a single reading, assigning its surrogate id.
    ///
    /// # Errors
    ///
    /// Returns [`ReadingStoreError::WriteFailed`] if the insert fails.
    fn insert(&self, reading: Reading) -> Result<(), ReadingStoreError>;

    /// Inserts one device's cycle batch atomically.
    ///
    /// A failed batch is dropped as a whole; the caller logs the failure and
    /// moves on to the next device. There is no within-cycle retry.
    ///
    /// # Errors
    ///
    /// Returns [`ReadingStoreError::WriteFailed`] if the commit fails.
    fn insert_batch(&self, readings: Vec<Reading>) -> Result<(), ReadingStoreError>;

    /// Returns all readings with `timestamp >= cutoff`, for all devices,
    /// most-recent-first.
    ///
    /// Filtering down to "latest per device" is the aggregation engine's
    /// job, not the store's.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query_window(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reading>, ReadingStoreError>;

    /// Returns the total number of readings in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the count operation fails.
    fn count(&self) -> Result<usize, ReadingStoreError>;

    /// Clears all readings from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the clear operation fails.
    fn clear(&self) -> Result<(), ReadingStoreError>;
}

/// In-memory reading store implementation.
#[derive(Debug)]
pub struct InMemoryReadingStore {
    readings: Arc<RwLock<Vec<Reading>>>,
    next_id: AtomicU64,
}

impl Default for InMemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReadingStore {
    /// Creates a new empty in-memory reading store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            readings: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a new in-memory reading store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ReadingStore for InMemoryReadingStore {
    fn ensure_schema(&self) -> Result<(), ReadingStoreError> {
        // Nothing to create; the vector is the table.
        Ok(())
    }

    fn insert(&self, reading: Reading) -> Result<(), ReadingStoreError> {
        self.insert_batch(vec![reading])
    }

    fn insert_batch(&self, batch: Vec<Reading>) -> Result<(), ReadingStoreError> {
        let mut readings = self.readings.write().map_err(|_| ReadingStoreError::Lock)?;
        for mut reading in batch {
            reading.id = Some(self.next_id.fetch_add(1, Ordering::Relaxed));
            readings.push(reading);
        }
        Ok(())
    }

    fn query_window(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reading>, ReadingStoreError> {
        let readings = self.readings.read().map_err(|_| ReadingStoreError::Lock)?;

        let mut window: Vec<Reading> = readings
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect();
        window.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(window)
    }

    fn count(&self) -> Result<usize, ReadingStoreError> {
        let readings = self.readings.read().map_err(|_| ReadingStoreError::Lock)?;
        Ok(readings.len())
    }

    fn clear(&self) -> Result<(), ReadingStoreError> {
        let mut readings = self.readings.write().map_err(|_| ReadingStoreError::Lock)?;
        readings.clear();
        Ok(())
    }
}

/// `ClickHouse`-backed reading store implementation.
///
/// Stores readings in the `detector_readings` table. Timestamps are kept as
/// nanoseconds since the epoch; ids are assigned server-side so inserted
/// batches never carry one.
#[derive(Clone)]
pub struct ClickHouseReadingStore {
    client: Arc<clickhouse::Client>,
}

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS detector_readings (
    id UInt64 DEFAULT generateSnowflakeID(),
    device String,
    detector String,
    traffic_amount Nullable(Int64),
    reliability Nullable(Float64),
    timestamp Int64
) ENGINE = MergeTree ORDER BY (device, timestamp)";

impl ClickHouseReadingStore {
    /// Creates a new `ClickHouse` reading store with the given client.
    #[must_use]
    pub fn new(client: Arc<clickhouse::Client>) -> Self {
        Self { client }
    }

    /// Creates a new `ClickHouse` reading store wrapped in an Arc.
    #[must_use]
    pub fn new_shared(client: Arc<clickhouse::Client>) -> Arc<Self> {
        Arc::new(Self::new(client))
    }

    /// Helper to execute async operations synchronously.
    fn block_on<F, T>(future: F) -> Result<T, String>
    where
        F: std::future::Future<Output = Result<T, clickhouse::error::Error>>,
    {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current()
                .block_on(future)
                .map_err(|e| e.to_string())
        })
    }
}

impl ReadingStore for ClickHouseReadingStore {
    fn ensure_schema(&self) -> Result<(), ReadingStoreError> {
        let client = Arc::clone(&self.client);
        Self::block_on(async move { client.query(CREATE_TABLE_SQL).execute().await })
            .map_err(ReadingStoreError::Schema)
    }

    fn insert(&self, reading: Reading) -> Result<(), ReadingStoreError> {
        self.insert_batch(vec![reading])
    }

    fn insert_batch(&self, readings: Vec<Reading>) -> Result<(), ReadingStoreError> {
        if readings.is_empty() {
            return Ok(());
        }

        let client = Arc::clone(&self.client);
        Self::block_on(async move {
            #[derive(clickhouse::Row, serde::Serialize)]
            struct ReadingRow {
                device: String,
                detector: String,
                traffic_amount: Option<i64>,
                reliability: Option<f64>,
                timestamp: i64,
            }

            let mut inserter = client.insert::<ReadingRow>("detector_readings").await?;

            for reading in readings {
                let row = ReadingRow {
                    device: reading.device,
                    detector: reading.detector,
                    traffic_amount: reading.traffic_amount,
                    reliability: reading.reliability,
                    timestamp: reading.timestamp.timestamp_nanos_opt().unwrap_or(0),
                };
                inserter.write(&row).await?;
            }

            inserter.end().await?;
            Ok(())
        })
        .map_err(ReadingStoreError::WriteFailed)
    }

    fn query_window(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reading>, ReadingStoreError> {
        #[derive(clickhouse::Row, serde::Deserialize)]
        struct ReadingRow {
            id: u64,
            device: String,
            detector: String,
            traffic_amount: Option<i64>,
            reliability: Option<f64>,
            timestamp: i64,
        }

        let sql = format!(
            "SELECT id, device, detector, traffic_amount, reliability, timestamp \
             FROM detector_readings WHERE timestamp >= {} ORDER BY timestamp DESC",
            cutoff.timestamp_nanos_opt().unwrap_or(0)
        );

        let client = Arc::clone(&self.client);
        let rows: Vec<ReadingRow> =
            Self::block_on(async move { client.query(&sql).fetch_all::<ReadingRow>().await })
                .map_err(ReadingStoreError::Storage)?;

        Ok(rows
            .into_iter()
            .map(|row| Reading {
                id: Some(row.id),
                device: row.device,
                detector: row.detector,
                traffic_amount: row.traffic_amount,
                reliability: row.reliability,
                timestamp: DateTime::from_timestamp_nanos(row.timestamp),
            })
            .collect())
    }

    fn count(&self) -> Result<usize, ReadingStoreError> {
        let client = Arc::clone(&self.client);
        let count: u64 = Self::block_on(async move {
            client
                .query("SELECT count() FROM detector_readings")
                .fetch_one::<u64>()
                .await
        })
        .map_err(ReadingStoreError::Storage)?;

        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    fn clear(&self) -> Result<(), ReadingStoreError> {
        let client = Arc::clone(&self.client);
        Self::block_on(async move {
            client
                .query("TRUNCATE TABLE detector_readings")
                .execute()
                .await
        })
        .map_err(ReadingStoreError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reading_at(device: &str, detector: &str, minutes_ago: i64, amount: i64) -> Reading {
        Reading::new(device, detector, Utc::now() - Duration::minutes(minutes_ago))
            .with_amount(amount)
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = InMemoryReadingStore::new();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_assigns_monotonic_ids() {
        let store = InMemoryReadingStore::new();
        store.insert(reading_at("tre216", "a90", 1, 5)).unwrap();
        store.insert(reading_at("tre216", "b60", 1, 3)).unwrap();

        let rows = store.query_window(Utc::now() - Duration::hours(1)).unwrap();
        let mut ids: Vec<u64> = rows.iter().map(|r| r.id.unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_insert_batch() {
        let store = InMemoryReadingStore::new();
        store
            .insert_batch(vec![
                reading_at("tre216", "a90", 1, 5),
                reading_at("tre216", "b60", 1, 3),
                reading_at("tre212", "a20", 1, 8),
            ])
            .unwrap();

        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_query_window_filters_by_cutoff() {
        let store = InMemoryReadingStore::new();
        store.insert(reading_at("tre216", "a90", 5, 1)).unwrap();
        store.insert(reading_at("tre216", "a90", 120, 2)).unwrap();

        let rows = store
            .query_window(Utc::now() - Duration::minutes(60))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].traffic_amount, Some(1));
    }

    #[test]
    fn test_query_window_is_most_recent_first() {
        let store = InMemoryReadingStore::new();
        store.insert(reading_at("tre216", "a90", 30, 1)).unwrap();
        store.insert(reading_at("tre212", "a20", 10, 2)).unwrap();
        store.insert(reading_at("tre216", "b60", 20, 3)).unwrap();

        let rows = store.query_window(Utc::now() - Duration::hours(1)).unwrap();

        let amounts: Vec<i64> = rows.iter().map(|r| r.traffic_amount.unwrap()).collect();
        assert_eq!(amounts, vec![2, 3, 1]);
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let store = InMemoryReadingStore::new();
        store.insert(reading_at("tre216", "a90", 1, 5)).unwrap();

        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();

        // Observable state is unchanged by repeated schema calls.
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_clear_store() {
        let store = InMemoryReadingStore::new();
        store.insert(reading_at("tre216", "a90", 1, 5)).unwrap();
        store.insert(reading_at("tre212", "a20", 1, 8)).unwrap();

        assert_eq!(store.count().unwrap(), 2);

        store.clear().unwrap();

        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_rows_are_kept() {
        // (device, detector, timestamp) is deliberately not unique.
        let store = InMemoryReadingStore::new();
        let ts = Utc::now() - Duration::minutes(1);
        let reading = Reading::new("tre216", "a90", ts).with_amount(5);

        store.insert(reading.clone()).unwrap();
        store.insert(reading).unwrap();

        assert_eq!(store.count().unwrap(), 2);
    }
}
