//! Entries backed by a fixed blob or a generator function

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::policy::RefreshPolicy;
use crate::types::EntryKind;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

type Generator = Box<dyn Fn() -> Bytes + Send + Sync>;

enum Source {
    Static(Bytes),
    Generated(Generator),
}

impl Source {
    fn load(&self) -> Bytes {
        match self {
            Source::Static(bytes) => bytes.clone(),
            Source::Generated(generate) => generate(),
        }
    }
}

struct Held {
    bytes: Bytes,
    refreshed_at: DateTime<Utc>,
}

/// Content that lives only in memory. Owns no OS resources.
pub struct GeneratedContent {
    source: Source,
    policy: RefreshPolicy,
    held: RwLock<Option<Held>>,
}

impl GeneratedContent {
    /// A fixed blob. Resyncing it never changes anything after the first load.
    pub fn fixed(policy: RefreshPolicy, bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Static(bytes.into()),
            policy,
            held: RwLock::new(None),
        }
    }

    /// Content produced by `generator` on every resync.
    pub fn generated<F, B>(policy: RefreshPolicy, generator: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Into<Bytes>,
    {
        Self {
            source: Source::Generated(Box::new(move || generator().into())),
            policy,
            held: RwLock::new(None),
        }
    }

    fn held(&self) -> Option<Bytes> {
        self.held.read().as_ref().map(|held| held.bytes.clone())
    }
}

impl CacheEntry for GeneratedContent {
    fn produce(&self) -> Option<Bytes> {
        match self.policy {
            RefreshPolicy::NoReserve => Some(self.source.load()),
            RefreshPolicy::LazyUpToDate => {
                if let Err(e) = self.resync() {
                    debug!(error = %e, "Lazy regeneration failed, serving previous content");
                }
                self.held()
            }
            RefreshPolicy::OldCopy => {
                let held = self.held();
                if let Err(e) = self.resync() {
                    debug!(error = %e, "Regeneration after read failed");
                }
                held
            }
            _ => self.held(),
        }
    }

    fn resync(&self) -> Result<bool> {
        if !self.policy.retains_content() {
            return Ok(false);
        }
        if matches!(self.source, Source::Static(_)) && self.held.read().is_some() {
            return Ok(false);
        }

        // Generate outside the lock so readers are never held up by it.
        let bytes = self.source.load();
        *self.held.write() = Some(Held {
            bytes,
            refreshed_at: Utc::now(),
        });
        Ok(true)
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Generated
    }

    fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.held.read().as_ref().map(|held| held.refreshed_at)
    }

    fn held_len(&self) -> Option<usize> {
        self.held.read().as_ref().map(|held| held.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(policy: RefreshPolicy) -> (GeneratedContent, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let entry = GeneratedContent::generated(policy, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("gen-{n}")
        });
        (entry, calls)
    }

    #[test]
    fn test_empty_before_first_resync() {
        let (entry, calls) = counting(RefreshPolicy::Once);
        assert!(entry.produce().is_none());
        assert!(entry.refreshed_at().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resync_invokes_generator_once() {
        let (entry, calls) = counting(RefreshPolicy::Once);
        assert!(entry.resync().unwrap());
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-1"));
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.held_len(), Some(5));
        assert!(entry.refreshed_at().is_some());
    }

    #[test]
    fn test_fixed_blob_never_changes() {
        let entry = GeneratedContent::fixed(RefreshPolicy::Once, &b"static"[..]);
        assert!(entry.resync().unwrap());
        assert!(!entry.resync().unwrap());
        assert_eq!(entry.produce().unwrap(), Bytes::from_static(b"static"));
        assert_eq!(entry.kind(), EntryKind::Generated);
    }

    #[test]
    fn test_lazy_regenerates_on_every_read() {
        let (entry, _) = counting(RefreshPolicy::LazyUpToDate);
        entry.resync().unwrap();
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-2"));
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-3"));
    }

    #[test]
    fn test_old_copy_serves_previous_generation() {
        let (entry, _) = counting(RefreshPolicy::OldCopy);
        entry.resync().unwrap();
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-1"));
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-2"));
    }

    #[test]
    fn test_no_reserve_keeps_nothing() {
        let (entry, calls) = counting(RefreshPolicy::NoReserve);
        assert!(!entry.resync().unwrap());
        assert!(entry.held_len().is_none());
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-1"));
        assert_eq!(entry.produce().unwrap(), Bytes::from("gen-2"));
        assert!(entry.held_len().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
