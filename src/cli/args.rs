//! CLI argument definitions using clap
//!
//! Commands:
//! - tabvault [serve]
//! - tabvault migrate
//! - tabvault summary
//!
//! Every option falls back to an environment variable so the server can be
//! configured entirely from the process environment.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dataset::TabSchema;
use crate::http_server::{HttpServerConfig, DEFAULT_BODY_LIMIT_BYTES};
use crate::storage::StorageConfig;

/// tabvault - shared tabbed dataset server with optimistic concurrency
#[derive(Parser, Debug)]
#[command(name = "tabvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub http: HttpArgs,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API and static client
    Serve,

    /// Copy the file document (or seed) into the relational backend
    Migrate,

    /// Print per-tab row counts of the current dataset
    Summary,
}

#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Directory holding db.json and backups/
    #[arg(long, env = "TABVAULT_DATA_DIR", default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    /// First-boot seed document (default: <data-dir>/seed.json)
    #[arg(long, env = "TABVAULT_SEED_FILE", global = true)]
    pub seed_file: Option<PathBuf>,

    /// Relational backend, e.g. postgres://user@host/db or sqlite://./data/tabvault.db
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "TABVAULT_POOL_SIZE", default_value_t = 4, global = true)]
    pub pool_size: u32,

    /// Accept any Postgres server certificate and hostname
    #[arg(long, env = "DATABASE_TLS_NO_VERIFY", global = true)]
    pub db_tls_no_verify: bool,

    /// Additional tabs every dataset must carry, comma separated
    #[arg(long, env = "TABVAULT_EXTRA_TABS", value_delimiter = ',', global = true)]
    pub extra_tabs: Vec<String>,
}

impl StorageArgs {
    pub fn to_config(&self) -> StorageConfig {
        StorageConfig {
            data_dir: self.data_dir.clone(),
            seed_file: self.seed_file.clone(),
            database_url: self.database_url.clone(),
            pool_size: self.pool_size,
            verify_tls: !self.db_tls_no_verify,
        }
    }

    pub fn schema(&self) -> TabSchema {
        TabSchema::with_extra_tabs(
            self.extra_tabs
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty()),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct HttpArgs {
    #[arg(long, env = "TABVAULT_HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000, global = true)]
    pub port: u16,

    /// Static client directory
    #[arg(long, env = "TABVAULT_STATIC_DIR", default_value = "./public", global = true)]
    pub static_dir: PathBuf,

    /// Allowed CORS origins, comma separated (default: any)
    #[arg(long, env = "TABVAULT_CORS_ORIGINS", value_delimiter = ',', global = true)]
    pub cors_origins: Vec<String>,

    /// Largest accepted dataset upload in bytes
    #[arg(
        long,
        env = "TABVAULT_BODY_LIMIT_BYTES",
        default_value_t = DEFAULT_BODY_LIMIT_BYTES,
        global = true
    )]
    pub body_limit_bytes: usize,
}

impl HttpArgs {
    pub fn to_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            static_dir: self.static_dir.clone(),
            body_limit_bytes: self.body_limit_bytes,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["tabvault"]).unwrap();
        assert_eq!(cli.command(), Command::Serve);
    }

    #[test]
    fn test_subcommand_with_global_options() {
        let cli = Cli::try_parse_from([
            "tabvault",
            "migrate",
            "--database-url",
            "sqlite://./state.db",
            "--data-dir",
            "/var/lib/tabvault",
        ])
        .unwrap();
        assert_eq!(cli.command(), Command::Migrate);

        let config = cli.storage.to_config();
        assert_eq!(config.database_url(), Some("sqlite://./state.db"));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tabvault"));
        assert!(config.verify_tls);
    }

    #[test]
    fn test_tls_verification_can_be_disabled() {
        let cli = Cli::try_parse_from([
            "tabvault",
            "summary",
            "--database-url",
            "postgres://app@db.internal/tabs?sslmode=require",
            "--db-tls-no-verify",
        ])
        .unwrap();

        let config = cli.storage.to_config();
        assert!(!config.verify_tls);
        assert!(!config.connect_options().verify_tls);
    }

    #[test]
    fn test_extra_tabs_split_on_commas() {
        let cli = Cli::try_parse_from(["tabvault", "--extra-tabs", "fuel, ,tolls"]).unwrap();
        let schema = cli.storage.schema();
        assert_eq!(schema.extra(), &["fuel".to_string(), "tolls".to_string()]);
    }

    #[test]
    fn test_http_config() {
        let cli = Cli::try_parse_from(["tabvault", "serve", "--port", "8080"]).unwrap();
        let config = cli.http.to_config();
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.body_limit_bytes, DEFAULT_BODY_LIMIT_BYTES);
    }
}
