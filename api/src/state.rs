//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers
//! and the ingestion collector.

use chrono_tz::Tz;
use shared::aggregate::Aggregator;
use shared::allowlist::DeviceAllowList;
use shared::storage::{InMemoryReadingStore, ReadingStore};
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// Carries the reading store, the aggregation engine built on top of it,
/// and the static coordinate metadata served to the dashboard.
#[derive(Clone)]
pub struct AppState {
    /// The reading storage backend.
    reading_store: Arc<dyn ReadingStore>,
    /// The aggregation engine over the store.
    aggregator: Arc<Aggregator>,
    /// Static coordinate metadata, loaded once at startup.
    coordinates: Arc<serde_json::Value>,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(
        reading_store: Arc<dyn ReadingStore>,
        allow_list: DeviceAllowList,
        timezone: Tz,
        coordinates: serde_json::Value,
    ) -> Self {
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&reading_store),
            allow_list,
            timezone,
        ));

        Self {
            reading_store,
            aggregator,
            coordinates: Arc::new(coordinates),
        }
    }

    /// Creates a new application state with an in-memory store, the
    /// reference allow-list and empty coordinate metadata.
    ///
    /// This is useful for development and testing.
    #[must_use]
    pub fn with_in_memory_store() -> Self {
        Self::new(
            InMemoryReadingStore::new_shared(),
            DeviceAllowList::tampere(),
            chrono_tz::Europe::Helsinki,
            serde_json::json!({}),
        )
    }

    /// Returns a reference to the reading store.
    #[must_use]
    pub fn reading_store(&self) -> &dyn ReadingStore {
        self.reading_store.as_ref()
    }

    /// Returns a reference to the aggregation engine.
    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        self.aggregator.as_ref()
    }

    /// Returns the static coordinate metadata.
    #[must_use]
    pub fn coordinates(&self) -> &serde_json::Value {
        self.coordinates.as_ref()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_in_memory_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::models::Reading;

    #[test]
    fn test_app_state_with_in_memory_store() {
        let state = AppState::with_in_memory_store();

        let reading = Reading::new("tre216", "a90", Utc::now()).with_amount(5);
        state.reading_store().insert(reading).unwrap();
        assert_eq!(state.reading_store().count().unwrap(), 1);

        let sums = state.aggregator().latest_sums(7).unwrap();
        assert_eq!(sums.len(), 1);
    }

    #[test]
    fn test_app_state_is_clone() {
        let state = AppState::with_in_memory_store();
        let state2 = state.clone();

        // Both should share the same store
        let reading = Reading::new("tre216", "a90", Utc::now()).with_amount(5);
        state.reading_store().insert(reading).unwrap();

        assert_eq!(state2.reading_store().count().unwrap(), 1);
    }

    #[test]
    fn test_default_coordinates_are_empty() {
        let state = AppState::default();
        assert_eq!(state.coordinates(), &serde_json::json!({}));
    }
}
