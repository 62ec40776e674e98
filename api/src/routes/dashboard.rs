//! Combined HTML dashboard view.
//!
//! Renders a single page embedding the coordinate metadata and the latest
//! traffic sums. Deliberately thin: a static page with the two payloads
//! inlined, no templating engine.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use super::traffic::LATEST_INTERVALS;
use crate::state::AppState;

/// Creates the dashboard route.
///
/// # Routes
///
/// - `GET /` - Combined HTML view of coordinates and latest traffic sums
pub fn dashboard_routes(state: AppState) -> Router {
    Router::new().route("/", get(dashboard)).with_state(state)
}

/// Handler for GET /.
async fn dashboard(State(state): State<AppState>) -> Response {
    let sums = match state.aggregator().latest_sums(LATEST_INTERVALS) {
        Ok(sums) => sums,
        Err(e) => {
            tracing::error!(error = %e, "Failed to aggregate traffic data for dashboard");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Aggregation unavailable</h1>".to_string()),
            )
                .into_response();
        }
    };

    let traffic = serde_json::to_string(&sums).unwrap_or_else(|_| String::from("{}"));
    let coordinates = state.coordinates().to_string();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Trafficwatch</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; }}
    table {{ border-collapse: collapse; }}
    td, th {{ border: 1px solid #ccc; padding: 0.3rem 0.6rem; }}
  </style>
</head>
<body>
  <h1>Trafficwatch</h1>
  <table id="traffic"><thead><tr><th>Timestamp</th><th>Device</th><th>Vehicles</th></tr></thead><tbody></tbody></table>
  <script>
    const coordinatesData = {coordinates};
    const trafficData = {traffic};
    const tbody = document.querySelector('#traffic tbody');
    for (const [timestamp, devices] of Object.entries(trafficData)) {{
      for (const [device, total] of Object.entries(devices)) {{
        const row = tbody.insertRow();
        row.insertCell().textContent = timestamp;
        row.insertCell().textContent = device;
        row.insertCell().textContent = total;
      }}
    }}
  </script>
</body>
</html>
"#
    ))
    .into_response()
}
