//! Ingestion collector and its scheduler loop.
//!
//! One collection cycle fetches the most recent one-minute window for every
//! device in the configured list and persists each device's batch with a
//! single store commit. Failures are local to one device: a fetch or commit
//! error is logged and the cycle moves on, so one broken device never blocks
//! the others. Lost batches are not replayed; the next cycle fetches fresh
//! data.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use shared::models::{Reading, TrafficAmountResponse};
use shared::storage::{ReadingStore, ReadingStoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::interval;

/// Client identifier sent with every upstream request.
const USER_AGENT: &str = "traffic-app/1.0";

/// Length of the fetch window, ending at the cycle start instant.
const FETCH_WINDOW_SECS: i64 = 60;

/// Errors that can occur while collecting one device's readings.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Network failure, timeout, or non-2xx response from the upstream API.
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The upstream response body was not the expected JSON shape.
    #[error("Upstream returned malformed payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The per-device batch commit failed; that device's data is dropped
    /// for this cycle.
    #[error(transparent)]
    Store(#[from] ReadingStoreError),
}

/// Outcome of one collection cycle, consumed only by logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Devices whose batch was fetched and committed.
    pub devices_ok: usize,
    /// Devices that failed to fetch or commit.
    pub devices_failed: usize,
    /// Total readings persisted this cycle.
    pub readings_stored: usize,
}

/// Fetches per-device readings from the upstream API and appends them to
/// the reading store.
pub struct Collector {
    client: Client,
    base_url: String,
    devices: Vec<String>,
    timezone: Tz,
    store: Arc<dyn ReadingStore>,
}

impl Collector {
    /// Creates a collector polling the given devices against `base_url`.
    ///
    /// Every upstream request carries a fixed client identifier and the
    /// given timeout; the upstream itself enforces none.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        devices: Vec<String>,
        timezone: Tz,
        timeout: Duration,
        store: Arc<dyn ReadingStore>,
    ) -> Result<Self, CollectError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            devices,
            timezone,
            store,
        })
    }

    /// Runs one collection cycle: fetch and persist the most recent
    /// one-minute window for every configured device.
    ///
    /// Never fails as a whole; per-device errors are logged and counted in
    /// the returned summary. Success is observed through logs and store
    /// state, not a return value.
    pub async fn collect_once(&self) -> CycleSummary {
        let end_time = Utc::now();
        let start_time = end_time - chrono::Duration::seconds(FETCH_WINDOW_SECS);

        let mut summary = CycleSummary::default();

        for device in &self.devices {
            match self.collect_device(device, start_time, end_time).await {
                Ok(stored) => {
                    summary.devices_ok += 1;
                    summary.readings_stored += stored;
                }
                Err(e) => {
                    summary.devices_failed += 1;
                    tracing::error!(device = %device, error = %e, "Device collection failed");
                }
            }
        }

        tracing::info!(
            devices_ok = summary.devices_ok,
            devices_failed = summary.devices_failed,
            readings_stored = summary.readings_stored,
            "Collection cycle finished"
        );

        summary
    }

    /// Fetches one device's window and commits its batch in one store call.
    async fn collect_device(
        &self,
        device: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<usize, CollectError> {
        let url = format!("{}/trafficAmount/{}", self.base_url, device);

        let response = self
            .client
            .get(&url)
            .query(&[
                (
                    "startTime",
                    start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    "endTime",
                    end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        let payload: TrafficAmountResponse =
            serde_json::from_slice(&body).map_err(CollectError::Decode)?;

        let mut batch: Vec<Reading> = Vec::with_capacity(payload.results.len());
        for sample in payload.results {
            match sample.into_reading(device, self.timezone) {
                Ok(reading) => {
                    if reading.validate_reading().is_err() {
                        tracing::warn!(device = %device, "Skipping sample with empty detector code");
                        continue;
                    }
                    batch.push(reading);
                }
                Err(e) => {
                    tracing::warn!(device = %device, error = %e, "Skipping sample with bad timestamp");
                }
            }
        }

        let stored = batch.len();
        self.store.insert_batch(batch)?;
        Ok(stored)
    }

    /// Runs the scheduler loop: one collection cycle per tick, forever.
    ///
    /// The interval is fixed-rate: ticks stay aligned to the original
    /// schedule, so a slow cycle does not push back the next one. Per-cycle
    /// failures are already absorbed inside [`Self::collect_once`]; nothing
    /// here can terminate the loop short of process shutdown.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut tick = interval(period);

        loop {
            tick.tick().await;

            let summary = self.collect_once().await;
            if summary.devices_failed > 0 {
                tracing::warn!(
                    devices_failed = summary.devices_failed,
                    "Cycle completed with failed devices; they will be retried next cycle"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Helsinki;
    use shared::storage::InMemoryReadingStore;

    fn collector_for(base_url: &str, devices: &[&str]) -> (Collector, Arc<InMemoryReadingStore>) {
        let store = InMemoryReadingStore::new_shared();
        let collector = Collector::new(
            base_url,
            devices.iter().map(ToString::to_string).collect(),
            Helsinki,
            Duration::from_millis(250),
            store.clone(),
        )
        .unwrap();
        (collector, store)
    }

    #[test]
    fn test_cycle_summary_default_is_zeroed() {
        let summary = CycleSummary::default();
        assert_eq!(summary.devices_ok, 0);
        assert_eq!(summary.devices_failed, 0);
        assert_eq!(summary.readings_stored, 0);
    }

    /// Serves one valid sample for `tre216` and HTTP 500 for everything else
    /// on an ephemeral local port.
    async fn spawn_stub_upstream() -> String {
        use axum::extract::Path;
        use axum::http::StatusCode;
        use axum::routing::get;

        let app = axum::Router::new().route(
            "/api/v1/trafficAmount/{device}",
            get(|Path(device): Path<String>| async move {
                if device == "tre216" {
                    (
                        StatusCode::OK,
                        concat!(
                            r#"{"results":[{"detector":"a90","trafficAmount":4,"#,
                            r#""reliabValue":1.0,"tsPeriodEnd":"2024-03-01T12:00:00+02:00"}]}"#,
                        ),
                    )
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "")
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}/api/v1")
    }

    #[tokio::test]
    async fn test_one_failing_device_does_not_block_the_others() {
        let base_url = spawn_stub_upstream().await;
        let (collector, store) = collector_for(&base_url, &["tre216", "tre212"]);

        let summary = collector.collect_once().await;

        assert_eq!(summary.devices_ok, 1);
        assert_eq!(summary.devices_failed, 1);
        assert_eq!(summary.readings_stored, 1);

        let rows = store
            .query_window(Utc::now() - chrono::Duration::days(3650))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device, "tre216");
        assert_eq!(rows[0].detector, "a90");
        assert_eq!(rows[0].traffic_amount, Some(4));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_fails_per_device_without_panicking() {
        // Port 9 (discard) is not listening; every fetch errors out fast.
        let (collector, store) = collector_for("http://127.0.0.1:9/api/v1", &["tre216", "tre212"]);

        let summary = collector.collect_once().await;

        assert_eq!(summary.devices_ok, 0);
        assert_eq!(summary.devices_failed, 2);
        assert_eq!(summary.readings_stored, 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_device_list_is_a_clean_cycle() {
        let (collector, store) = collector_for("http://127.0.0.1:9/api/v1", &[]);

        let summary = collector.collect_once().await;

        assert_eq!(summary, CycleSummary::default());
        assert_eq!(store.count().unwrap(), 0);
    }
}
