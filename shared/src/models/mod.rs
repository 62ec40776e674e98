//! Data models for detector readings and the upstream wire format.

mod reading;

pub use reading::{DetectorSample, Reading, SampleError, TrafficAmountResponse};
