//! Trafficwatch Shared Library
//!
//! This crate contains the shared types and core logic of the Trafficwatch
//! traffic-light monitoring platform.
//!
//! # Modules
//!
//! - [`models`] - Data models for detector readings and the upstream wire format
//! - [`allowlist`] - The curated device/detector allow-list used by aggregation
//! - [`storage`] - Storage trait and implementations for readings
//! - [`aggregate`] - The "latest sum per device" aggregation engine
//!
//! # Example
//!
//! ```
//! use shared::models::Reading;
//! use chrono::Utc;
//!
//! let reading = Reading::new("tre216", "a90", Utc::now()).with_amount(5);
//!
//! assert!(reading.validate_reading().is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod allowlist;
pub mod models;
pub mod storage;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use chrono_tz;
pub use serde;
pub use serde_json;
pub use validator;
