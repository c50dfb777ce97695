//! CLI command implementations
//!
//! `serve` boots storage and the HTTP server. A storage failure during boot
//! is fatal: the process exits instead of serving with broken storage.
//!
//! `migrate` and `summary` are one-shot utilities that print a JSON result.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::args::{Cli, Command, HttpArgs, StorageArgs};
use super::errors::{CliError, CliResult};
use super::io::write_response;
use crate::dataset::{Dataset, SnapshotSource, TabSchema};
use crate::http_server::{AppState, HttpServer};
use crate::observability::{log_event, log_event_with_fields, Event, MetricsRegistry};
use crate::presence::PresenceTracker;
use crate::storage::{
    bootstrap_document, open_backend, FileBackend, RelationalBackend, StorageBackend,
    StorageConfig, StorageKind,
};
use crate::store::StateStore;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(&cli)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cli: &Cli) -> CliResult<()> {
    match cli.command() {
        Command::Serve => serve(&cli.storage, &cli.http),
        Command::Migrate => write_response(migrate(&cli.storage)?),
        Command::Summary => write_response(summary(&cli.storage)?),
    }
}

/// Boot storage and serve HTTP until Ctrl-C.
pub fn serve(storage: &StorageArgs, http: &HttpArgs) -> CliResult<()> {
    log_event(Event::BootStart);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::boot_failed(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(async {
        let metrics = Arc::new(MetricsRegistry::new());
        let store = open_store(storage.to_config(), storage.schema(), metrics)
            .await
            .map_err(|detail| {
                log_event_with_fields(Event::StorageInitFailed, &[("detail", detail.as_str())]);
                CliError::boot_failed(detail)
            })?;

        let state = Arc::new(AppState::new(store, PresenceTracker::new()));
        HttpServer::with_config(http.to_config(), state)
            .start()
            .await
            .map_err(|e| CliError::io_error(format!("HTTP server failed: {}", e)))
    })
}

async fn open_store(
    config: StorageConfig,
    schema: TabSchema,
    metrics: Arc<MetricsRegistry>,
) -> Result<StateStore, String> {
    // Relational engines connect synchronously.
    let backend = {
        let schema = schema.clone();
        let metrics = metrics.clone();
        tokio::task::spawn_blocking(move || open_backend(&config, schema, metrics))
            .await
            .map_err(|e| format!("storage open task failed: {}", e))?
            .map_err(|e| e.to_string())?
    };
    StateStore::open(backend, schema, metrics)
        .await
        .map_err(|e| e.to_string())
}

/// Copy the file-mode document into the relational backend.
///
/// Source order: the current `db.json`, then the seed, then an empty
/// dataset. The target receives it as current state plus a `migration`
/// snapshot. File state is never written.
pub fn migrate(storage: &StorageArgs) -> CliResult<Value> {
    let config = storage.to_config();
    let url = config
        .database_url()
        .ok_or_else(|| CliError::config_error("DATABASE_URL is required for migrate"))?;
    let schema = storage.schema();
    let metrics = Arc::new(MetricsRegistry::new());

    let (dataset, source) = read_file_document(&config, &schema, metrics.clone())?;
    let dataset = schema.normalize(dataset);

    let target = RelationalBackend::open(url, &config.connect_options(), None, schema, metrics)?;
    target.import(&dataset, SnapshotSource::Migration)?;

    log_event_with_fields(
        Event::MigrationComplete,
        &[("source", source.as_str()), ("tabs", &dataset.len().to_string())],
    );

    Ok(json!({
        "migrated": true,
        "source": source,
        "tabs": row_count_map(&dataset),
    }))
}

/// Per-tab row counts of the current dataset in the configured storage.
///
/// Relational mode reads through `load_current`. File mode reads `db.json`
/// without bootstrapping it.
pub fn summary(storage: &StorageArgs) -> CliResult<Value> {
    let config = storage.to_config();
    let schema = storage.schema();
    let metrics = Arc::new(MetricsRegistry::new());

    let dataset = match config.database_url() {
        Some(url) => {
            let seed = Some(config.seed_path());
            let options = config.connect_options();
            RelationalBackend::open(url, &options, seed, schema.clone(), metrics)?
                .load_current()?
        }
        None => read_file_document(&config, &schema, metrics)?.0,
    };

    Ok(json!({
        "storage": config.kind().as_str(),
        "tabs": row_count_map(&schema.normalize(dataset)),
    }))
}

fn read_file_document(
    config: &StorageConfig,
    schema: &TabSchema,
    metrics: Arc<MetricsRegistry>,
) -> CliResult<(Dataset, String)> {
    let seed = config.seed_path();
    let file = FileBackend::new(&config.data_dir, Some(seed.clone()), schema.clone(), metrics);
    if let Some(dataset) = file.read_existing()? {
        return Ok((dataset, StorageKind::JsonFile.as_str().to_string()));
    }
    let (dataset, origin) = bootstrap_document(schema, Some(&seed));
    Ok((dataset, origin.to_string()))
}

fn row_count_map(dataset: &Dataset) -> Map<String, Value> {
    dataset
        .row_counts()
        .into_iter()
        .map(|(tab, rows)| (tab, Value::from(rows)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(temp: &TempDir, database: bool) -> StorageArgs {
        StorageArgs {
            data_dir: temp.path().join("data"),
            seed_file: None,
            database_url: database
                .then(|| format!("sqlite://{}", temp.path().join("state.db").display())),
            pool_size: 2,
            db_tls_no_verify: false,
            extra_tabs: Vec::new(),
        }
    }

    #[test]
    fn test_migrate_requires_database_url() {
        let temp = TempDir::new().unwrap();
        let err = migrate(&args(&temp, false)).unwrap_err();
        assert_eq!(err.code_str(), "TABVAULT_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_migrate_copies_file_document() {
        let temp = TempDir::new().unwrap();
        let storage = args(&temp, true);
        fs::create_dir_all(&storage.data_dir).unwrap();

        let mut doc = storage.schema().empty().into_value();
        doc["leads"] = json!([{"id": "lead_1"}, {"id": "lead_2"}]);
        fs::write(storage.data_dir.join("db.json"), doc.to_string()).unwrap();

        let result = migrate(&storage).unwrap();
        assert_eq!(result["source"], "json-file");
        assert_eq!(result["tabs"]["leads"], 2);

        let after = summary(&storage).unwrap();
        assert_eq!(after["storage"], "sqlite");
        assert_eq!(after["tabs"]["leads"], 2);
    }

    #[test]
    fn test_migrate_falls_back_to_seed() {
        let temp = TempDir::new().unwrap();
        let storage = args(&temp, true);
        fs::create_dir_all(&storage.data_dir).unwrap();
        fs::write(
            storage.data_dir.join("seed.json"),
            r#"{"driversSep": [{"id": "drv_1"}]}"#,
        )
        .unwrap();

        let result = migrate(&storage).unwrap();
        assert_eq!(result["source"], "seed");
        assert_eq!(result["tabs"]["driversSep"], 1);
        assert_eq!(result["tabs"]["historical"], 0);
    }

    #[test]
    fn test_summary_does_not_create_file_state() {
        let temp = TempDir::new().unwrap();
        let storage = args(&temp, false);

        let result = summary(&storage).unwrap();
        assert_eq!(result["storage"], "json-file");
        assert_eq!(result["tabs"]["ag4Hires"], 0);
        assert!(!storage.data_dir.join("db.json").exists());
    }
}
