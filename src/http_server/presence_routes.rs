//! Presence HTTP Routes

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ApiError, ApiResult};
use super::server::AppState;

/// Heartbeat request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub tab: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub online_users: usize,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub ok: bool,
    pub online_users: usize,
    pub now: DateTime<Utc>,
}

pub fn presence_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/presence", get(presence_handler))
        .route("/presence/heartbeat", post(heartbeat_handler))
        .with_state(state)
}

async fn presence_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<PresenceResponse>> {
    let now = Utc::now();
    let snapshot = state.presence.snapshot_at(now)?;
    let version = state.store.version().await?;

    Ok(Json(PresenceResponse {
        online_users: snapshot.online_users,
        last_saved_at: version.saved_at,
        now,
    }))
}

async fn heartbeat_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<HeartbeatResponse>> {
    let request: HeartbeatRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid JSON body: {}", e)))?;

    let now = Utc::now();
    let snapshot = state
        .presence
        .heartbeat_at(&request.session_id, request.tab.as_deref(), now)?;
    state.store.metrics().increment_heartbeats();

    Ok(Json(HeartbeatResponse {
        ok: true,
        online_users: snapshot.online_users,
        now,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_request_defaults() {
        let request: HeartbeatRequest = serde_json::from_str("{}").unwrap();
        assert!(request.session_id.is_empty());
        assert!(request.tab.is_none());

        let request: HeartbeatRequest =
            serde_json::from_str(r#"{"sessionId": "abc", "tab": "leads"}"#).unwrap();
        assert_eq!(request.session_id, "abc");
        assert_eq!(request.tab.as_deref(), Some("leads"));
    }

    #[test]
    fn test_presence_response_shape() {
        let response = PresenceResponse {
            online_users: 2,
            last_saved_at: None,
            now: Utc::now(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["onlineUsers"], 2);
        assert!(json["lastSavedAt"].is_null());
    }
}
