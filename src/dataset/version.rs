//! Version tokens for optimistic concurrency

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque version token.
///
/// Compared only for equality. The value is derived by the active backend
/// from its durable timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Token reported when no durable state exists yet.
    pub fn initial() -> Self {
        Self("0".to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as a strong HTTP entity tag.
    pub fn to_etag(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Parse an `If-Match` / `ETag` header value.
    ///
    /// Accepts quoted, unquoted and weak (`W/`) forms. `*` is kept literally
    /// and therefore never equals a real token. Returns `None` for a blank
    /// header.
    pub fn from_header(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed)
            .trim();
        if unquoted.is_empty() {
            None
        } else {
            Some(Self(unquoted.to_string()))
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A version token together with the durable timestamp it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStamp {
    pub token: VersionToken,
    pub saved_at: Option<DateTime<Utc>>,
}

impl VersionStamp {
    /// Stamp for a store with no durable state.
    pub fn initial() -> Self {
        Self {
            token: VersionToken::initial(),
            saved_at: None,
        }
    }
}
