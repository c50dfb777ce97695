//! # Dataset
//!
//! The single shared document: a JSON object mapping tab names to ordered
//! arrays of opaque records.

mod schema;
mod version;

pub use schema::{TabSchema, REQUIRED_TABS};
pub use version::{VersionStamp, VersionToken};

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while interpreting a JSON value as a dataset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("dataset must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// The shared document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset(pub(crate) Map<String, Value>);

impl Dataset {
    /// Accept any JSON object. Arrays, scalars and null are rejected.
    pub fn from_value(value: Value) -> Result<Self, DatasetError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DatasetError::NotAnObject(json_kind(&other))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The records of a tab, if the tab exists and is an array.
    pub fn tab(&self, name: &str) -> Option<&Vec<Value>> {
        self.0.get(name).and_then(Value::as_array)
    }

    /// Mutable access to a tab, creating it as `[]` when absent or malformed.
    pub fn tab_mut(&mut self, name: &str) -> &mut Vec<Value> {
        let slot = self
            .0
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(records) => records,
            _ => unreachable!("slot was just set to an array"),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Record counts for every array-valued key, in key order.
    pub fn row_counts(&self) -> Vec<(String, usize)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_array().map(|rows| (k.clone(), rows.len())))
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// First-boot capture
    Bootstrap,
    /// Successful client write
    Put,
    /// One-time copy from file mode into the relational backend
    Migration,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Bootstrap => "bootstrap",
            SnapshotSource::Put => "put",
            SnapshotSource::Migration => "migration",
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
