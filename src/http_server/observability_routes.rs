//! Observability HTTP Routes
//!
//! Health check and counter snapshot.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::server::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub storage: &'static str,
    pub now: DateTime<Utc>,
}

/// Create observability routes
pub fn observability_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse {
        ok: true,
        storage: state.store.storage_kind().as_str(),
        now: Utc::now(),
    };

    (StatusCode::OK, Json(response))
}

/// Metrics handler - returns counters as JSON
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.store.metrics().snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            ok: true,
            storage: "json-file",
            now: Utc::now(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["storage"], "json-file");
    }
}
