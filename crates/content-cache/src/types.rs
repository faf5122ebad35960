//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What backs an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Generated,
}

/// Metadata describing a cached entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    pub identifier: String,
    pub kind: EntryKind,
    /// Size of the bytes currently held, if any are retained
    pub size: Option<usize>,
    pub created_at: DateTime<Utc>,
    /// When the content was last (re)loaded from its source
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}
