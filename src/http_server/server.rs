//! # HTTP Server
//!
//! Main HTTP server combining the API routers with the static asset service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header::ETAG;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use super::config::HttpServerConfig;
use super::data_routes::data_routes;
use super::observability_routes::observability_routes;
use super::presence_routes::presence_routes;
use crate::observability::{log_event, log_event_with_fields, Event};
use crate::presence::PresenceTracker;
use crate::store::StateStore;

/// Shared state handed to every handler
#[derive(Debug)]
pub struct AppState {
    pub store: StateStore,
    pub presence: PresenceTracker,
}

impl AppState {
    pub fn new(store: StateStore, presence: PresenceTracker) -> Self {
        Self { store, presence }
    }
}

/// HTTP Server for the dataset API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with custom configuration
    pub fn with_config(config: HttpServerConfig, state: Arc<AppState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, state: Arc<AppState>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };
        // Clients read the token back from the ETag of cross-origin responses.
        let cors = cors.expose_headers([ETAG]);

        let api = Router::new()
            .merge(observability_routes(state.clone()))
            .merge(data_routes(state.clone(), config.body_limit_bytes))
            .merge(presence_routes(state));

        let assets =
            ServeDir::new(&config.static_dir).fallback(ServeFile::new(config.index_file()));

        Router::new()
            .nest("/api", api)
            .fallback_service(assets)
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until Ctrl-C.
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        log_event_with_fields(Event::Serving, &[("addr", &addr.to_string())]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        log_event(Event::ShutdownComplete);
        Ok(())
    }
}

async fn shutdown_signal() {
    // If the handler cannot be installed, serve until the process is killed.
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    log_event(Event::ShutdownStart);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TabSchema;
    use crate::observability::MetricsRegistry;
    use crate::storage::FileBackend;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_server(temp: &TempDir, config: HttpServerConfig) -> HttpServer {
        let metrics = Arc::new(MetricsRegistry::new());
        let backend = Arc::new(FileBackend::new(
            &temp.path().join("data"),
            None,
            TabSchema::default(),
            metrics.clone(),
        ));
        let store = StateStore::open(backend, TabSchema::default(), metrics)
            .await
            .unwrap();
        HttpServer::with_config(config, Arc::new(AppState::new(store, PresenceTracker::new())))
    }

    #[tokio::test]
    async fn test_health_reports_storage() {
        let temp = TempDir::new().unwrap();
        let server = test_server(&temp, HttpServerConfig::default()).await;

        let response = server
            .router()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["storage"], "json-file");
    }

    #[tokio::test]
    async fn test_unknown_path_serves_index() {
        let temp = TempDir::new().unwrap();
        let static_dir = temp.path().join("public");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<html>app</html>").unwrap();

        let config = HttpServerConfig {
            static_dir,
            ..Default::default()
        };
        let server = test_server(&temp, config).await;

        let response = server
            .router()
            .oneshot(Request::get("/drivers/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<html>app</html>");
    }

    #[tokio::test]
    async fn test_socket_addr_from_config() {
        let temp = TempDir::new().unwrap();
        let server = test_server(&temp, HttpServerConfig::with_port(8080)).await;
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
    }
}
