//! # HTTP Server Module
//!
//! JSON API under `/api` plus the static client for every other path.
//!
//! ## Endpoints
//!
//! - `GET  /api/health` - liveness and active storage
//! - `GET  /api/metrics` - counter snapshot
//! - `GET  /api/data` - current dataset, version in `ETag`
//! - `PUT  /api/data` - replace the dataset, guarded by `If-Match`
//! - `GET  /api/data/backup-latest` - most recent snapshot
//! - `GET  /api/presence` - online user count
//! - `POST /api/presence/heartbeat` - register or refresh a session

mod config;
mod data_routes;
mod errors;
mod observability_routes;
mod presence_routes;
mod server;

pub use config::{HttpServerConfig, DEFAULT_BODY_LIMIT_BYTES};
pub use errors::{ApiError, ApiResult, ErrorResponse};
pub use server::{AppState, HttpServer};
