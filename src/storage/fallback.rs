//! First-boot document resolution shared by both backends

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;

use crate::dataset::{Dataset, TabSchema};
use crate::observability::Logger;

/// Where a bootstrapped document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOrigin {
    Seed,
    Empty,
}

impl fmt::Display for BootstrapOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapOrigin::Seed => f.write_str("seed"),
            BootstrapOrigin::Empty => f.write_str("empty"),
        }
    }
}

/// Resolve the document to install when no usable current state exists:
/// the seed file when it holds a JSON object, otherwise an empty dataset.
///
/// A broken seed is logged and skipped rather than failing the boot.
pub fn bootstrap_document(schema: &TabSchema, seed: Option<&Path>) -> (Dataset, BootstrapOrigin) {
    if let Some(path) = seed {
        match read_seed(path) {
            Ok(Some(dataset)) => return (schema.normalize(dataset), BootstrapOrigin::Seed),
            Ok(None) => {}
            Err(reason) => {
                let path = path.display().to_string();
                Logger::warn(
                    "SEED_IGNORED",
                    &[("path", path.as_str()), ("reason", reason.as_str())],
                );
            }
        }
    }
    (schema.empty(), BootstrapOrigin::Empty)
}

fn read_seed(path: &Path) -> Result<Option<Dataset>, String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    Dataset::from_value(value)
        .map(Some)
        .map_err(|e| e.to_string())
}
