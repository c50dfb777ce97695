//! HTTP Server Configuration
//!
//! Bind address, CORS origins, the static asset directory and the request
//! body ceiling for dataset writes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Directory served for every non-API path (default: "./public")
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Largest accepted `PUT /api/data` body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// 32 MiB; a whole dataset travels in one request.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./public")
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            static_dir: default_static_dir(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl HttpServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fallback document for paths with no matching asset
    pub fn index_file(&self) -> PathBuf {
        self.static_dir.join("index.html")
    }
}
