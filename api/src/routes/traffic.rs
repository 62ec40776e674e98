//! Traffic data API routes.
//!
//! Read endpoints consumed by the dashboard: the aggregated latest-sums
//! view and the static coordinate metadata.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;

use crate::state::AppState;

/// Number of sampling intervals shown by the dashboard view.
pub const LATEST_INTERVALS: u32 = 7;

/// Creates traffic data routes.
///
/// # Routes
///
/// - `GET /get_traffic_data` - Latest traffic sums per device as JSON
/// - `GET /get_coordinates_data` - Static coordinate metadata as JSON
pub fn traffic_routes(state: AppState) -> Router {
    Router::new()
        .route("/get_traffic_data", get(get_traffic_data))
        .route("/get_coordinates_data", get(get_coordinates_data))
        .with_state(state)
}

/// Handler for GET /get_traffic_data.
///
/// An aggregation failure is surfaced as "aggregation unavailable" with
/// status 500; no partial aggregate is ever returned.
async fn get_traffic_data(State(state): State<AppState>) -> Response {
    match state.aggregator().latest_sums(LATEST_INTERVALS) {
        Ok(sums) => Json(sums).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to aggregate traffic data");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "aggregation unavailable" })),
            )
                .into_response()
        }
    }
}

/// Handler for GET /get_coordinates_data.
///
/// Returns the coordinate metadata verbatim as loaded at startup.
async fn get_coordinates_data(State(state): State<AppState>) -> Response {
    Json(state.coordinates().clone()).into_response()
}
