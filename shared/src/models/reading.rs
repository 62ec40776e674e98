//! Detector reading data model.
//!
//! Defines the persisted `Reading` row and the wire-format structures
//! returned by the upstream traffic-light API.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// A single detector reading for one sampling window.
///
/// Readings are immutable once stored: the system only ever appends them.
/// `(device, detector, timestamp)` is deliberately *not* unique - overlapping
/// poll windows can ingest the same sample twice, and downstream aggregation
/// is duplicate-summing by design.
///
/// # Example
///
/// ```
/// use shared::models::Reading;
/// use chrono::Utc;
///
/// let reading = Reading::new("tre216", "a90", Utc::now())
///     .with_amount(5)
///     .with_reliability(0.98);
///
/// assert!(reading.validate_reading().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Reading {
    /// Surrogate identity assigned by the store on insert; `None` before
    /// insertion. Monotonically increasing, never reused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Upstream device identifier, including any fixed prefix (e.g. `tre216`).
    #[validate(length(min = 1, message = "Device identifier cannot be empty"))]
    pub device: String,

    /// Sub-sensor identifier within the device (a device has 1..N detectors).
    #[validate(length(min = 1, message = "Detector identifier cannot be empty"))]
    pub detector: String,

    /// Vehicle count observed in the sampling window; absent when upstream
    /// omits it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_amount: Option<i64>,

    /// Advisory confidence score from upstream; never used in aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,

    /// The end-of-period instant the reading covers.
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Creates a new reading without an amount or reliability score.
    #[must_use]
    pub fn new(
        device: impl Into<String>,
        detector: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            device: device.into(),
            detector: detector.into(),
            traffic_amount: None,
            reliability: None,
            timestamp,
        }
    }

    /// Sets the traffic amount.
    #[must_use]
    pub fn with_amount(mut self, amount: i64) -> Self {
        self.traffic_amount = Some(amount);
        self
    }

    /// Sets the reliability score.
    #[must_use]
    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = Some(reliability);
        self
    }

    /// Validates the reading.
    ///
    /// # Errors
    ///
    /// Returns validation errors if the device or detector identifier is empty.
    pub fn validate_reading(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()
    }
}

/// Errors that can occur while converting an upstream sample into a reading.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The `tsPeriodEnd` value could not be parsed as a timestamp.
    #[error("Unparsable period end '{0}'")]
    BadTimestamp(String),

    /// The naive `tsPeriodEnd` value is ambiguous or non-existent in the
    /// reference timezone (DST transition).
    #[error("Ambiguous local period end '{0}'")]
    AmbiguousTimestamp(String),
}

/// One entry of the upstream `results` array.
///
/// Mirrors the upstream JSON 1:1; `trafficAmount` and `reliabValue` are
/// modelled as optional because upstream omits them for detectors without
/// data in the window.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSample {
    /// Detector code within the queried device.
    pub detector: String,

    /// Vehicle count for the window, if reported.
    pub traffic_amount: Option<i64>,

    /// Reliability score for the window, if reported.
    pub reliab_value: Option<f64>,

    /// End-of-period timestamp as an ISO-8601 string.
    pub ts_period_end: String,
}

impl DetectorSample {
    /// Converts this sample into a [`Reading`] for the given device.
    ///
    /// `tsPeriodEnd` is parsed as RFC 3339 when it carries an offset;
    /// offset-less values are interpreted as local time in the reference
    /// timezone. Either way the stored timestamp is UTC.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::BadTimestamp`] if the period end cannot be
    /// parsed at all, or [`SampleError::AmbiguousTimestamp`] if a naive value
    /// falls into a DST gap or overlap.
    pub fn into_reading(self, device: &str, timezone: Tz) -> Result<Reading, SampleError> {
        let timestamp = parse_period_end(&self.ts_period_end, timezone)?;

        let mut reading = Reading::new(device, self.detector, timestamp);
        reading.traffic_amount = self.traffic_amount;
        reading.reliability = self.reliab_value;
        Ok(reading)
    }
}

/// Response body of `GET /trafficAmount/{device}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrafficAmountResponse {
    /// Per-detector samples for the queried window; missing in some error
    /// payloads, hence defaulted to empty.
    #[serde(default)]
    pub results: Vec<DetectorSample>,
}

/// Parses an upstream period-end string into a UTC instant.
fn parse_period_end(value: &str, timezone: Tz) -> Result<DateTime<Utc>, SampleError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| SampleError::BadTimestamp(value.to_string()))?;

    timezone
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| SampleError::AmbiguousTimestamp(value.to_string()))
}
