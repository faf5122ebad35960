//! The capability shared by every cached entry

use crate::error::Result;
use crate::types::EntryKind;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::sync::Arc;

/// A source of cached bytes that can be resynced on demand.
///
/// `produce` must stay cheap and non-blocking with respect to a concurrent
/// `resync`; the only exception is a lazily refreshed entry, which resyncs
/// inside `produce` by request.
pub trait CacheEntry: Send + Sync {
    /// Current best-known content. `None` when nothing is retained.
    fn produce(&self) -> Option<Bytes>;

    /// Bring the content in line with its source. Returns whether anything
    /// changed.
    fn resync(&self) -> Result<bool>;

    fn kind(&self) -> EntryKind;

    /// When the content was last loaded from its source.
    fn refreshed_at(&self) -> Option<DateTime<Utc>>;

    /// Size of the currently held bytes without producing them.
    fn held_len(&self) -> Option<usize>;

    /// The open descriptor backing this entry, for file entries.
    fn descriptor(&self) -> Option<Arc<File>> {
        None
    }
}
