//! Storage trait and implementations for detector readings.

mod reading_store;

pub use reading_store::{
    ClickHouseReadingStore, InMemoryReadingStore, ReadingStore, ReadingStoreError,
};
