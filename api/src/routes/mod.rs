//! API route definitions.
//!
//! This module organizes all HTTP routes for the Trafficwatch API server.

mod dashboard;
mod health;
mod traffic;

pub use dashboard::dashboard_routes;
pub use health::health_routes;
pub use traffic::traffic_routes;
