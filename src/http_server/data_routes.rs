//! Dataset HTTP Routes
//!
//! Read and replace the shared dataset, and fetch the latest backup.
//! Writes are guarded by `If-Match` carrying the version token from the
//! `ETag` of a previous read.
//!
//! The whole dataset travels in one body, so these routes carry their own
//! body limit instead of axum's 2 MB default.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{
        header::{CACHE_CONTROL, ETAG, IF_MATCH},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::errors::{ApiError, ApiResult};
use super::server::AppState;
use crate::dataset::{Dataset, VersionToken};

/// Successful write response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub ok: bool,
    pub saved_at: Option<DateTime<Utc>>,
    pub storage: &'static str,
}

pub fn data_routes(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/data", get(get_data_handler).put(put_data_handler))
        .route("/data/backup-latest", get(backup_latest_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}

async fn get_data_handler(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let (dataset, token) = state.store.get().await?;
    Ok((version_headers(&token)?, Json(dataset)))
}

async fn put_data_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    // The body is checked first so a malformed payload never reaches storage,
    // whatever the precondition header says.
    let dataset = parse_dataset(&body)?;
    let expected = if_match(&headers)?;

    let stamp = state.store.put(dataset, expected).await?;

    let response = SaveResponse {
        ok: true,
        saved_at: stamp.saved_at,
        storage: state.store.storage_kind().as_str(),
    };
    Ok((StatusCode::OK, version_headers(&stamp.token)?, Json(response)))
}

async fn backup_latest_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Dataset>> {
    let dataset = state.store.latest_backup().await?;
    Ok(Json(dataset))
}

/// Parse a request body into a dataset. Must be a JSON object.
fn parse_dataset(body: &[u8]) -> ApiResult<Dataset> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid JSON body: {}", e)))?;
    Dataset::from_value(value).map_err(|e| ApiError::InvalidInput(e.to_string()))
}

/// Extract the caller's version token. `None` when the header is absent or blank.
fn if_match(headers: &HeaderMap) -> ApiResult<Option<VersionToken>> {
    match headers.get(IF_MATCH) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::InvalidInput("If-Match header is not valid text".into()))?;
            Ok(VersionToken::from_header(raw))
        }
    }
}

fn version_headers(token: &VersionToken) -> ApiResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let etag = HeaderValue::from_str(&token.to_etag())
        .map_err(|e| ApiError::Internal(format!("unrepresentable version token: {}", e)))?;
    headers.insert(ETAG, etag);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_body_is_invalid_input() {
        assert!(matches!(parse_dataset(b"[]"), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_malformed_body_is_invalid_input() {
        assert!(matches!(
            parse_dataset(b"{\"leads\": "),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_object_body_parses() {
        let dataset = parse_dataset(br#"{"leads": []}"#).unwrap();
        assert!(dataset.tab("leads").is_some());
    }

    #[test]
    fn test_if_match_forms() {
        let mut headers = HeaderMap::new();
        assert_eq!(if_match(&headers).unwrap(), None);

        headers.insert(IF_MATCH, HeaderValue::from_static("\"1700-1\""));
        assert_eq!(if_match(&headers).unwrap(), Some(VersionToken::new("1700-1")));

        headers.insert(IF_MATCH, HeaderValue::from_static("\"\""));
        assert_eq!(if_match(&headers).unwrap(), None);
    }

    #[test]
    fn test_version_headers() {
        let headers = version_headers(&VersionToken::new("42")).unwrap();
        assert_eq!(headers.get(ETAG).unwrap(), "\"42\"");
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
    }
}
