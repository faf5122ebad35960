//! Memory-mapped file entries with change detection
//!
//! The descriptor, its stamp, and its mapping form one snapshot that is
//! replaced as a unit. Mappings are private copies, so a snapshot keeps
//! its bytes even when the file is rewritten or truncated in place.
//! Readers clone the mapped `Bytes` out of whichever snapshot is current; a
//! mapping is unmapped only after the last such clone is dropped, so a remap
//! never invalidates bytes already handed out.

use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::policy::RefreshPolicy;
use crate::types::EntryKind;
use arc_swap::ArcSwap;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use memmap2::MmapOptions;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// The parts of a stat result that identify one version of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    #[cfg(unix)]
    inode: u64,
}

impl FileStamp {
    fn of(meta: &Metadata) -> Self {
        #[cfg(unix)]
        use std::os::unix::fs::MetadataExt;

        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
            #[cfg(unix)]
            inode: meta.ino(),
        }
    }
}

struct Snapshot {
    file: Arc<File>,
    stamp: FileStamp,
    bytes: Option<Bytes>,
    refreshed_at: DateTime<Utc>,
}

impl Snapshot {
    fn load(path: &Path, retain: bool) -> Result<Self> {
        let open_err = |source| CacheError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;
        let meta = file.metadata().map_err(open_err)?;

        let bytes = if retain {
            Some(map(path, &file, meta.len())?)
        } else {
            None
        };

        Ok(Self {
            file: Arc::new(file),
            stamp: FileStamp::of(&meta),
            bytes,
            refreshed_at: Utc::now(),
        })
    }
}

/// Page stride used to detach a private mapping. No supported platform has
/// smaller pages.
const PAGE_STRIDE: usize = 4096;

/// Map `file` privately and detach every page from the page cache, so writes
/// to or truncation of the file afterwards never reach the returned bytes.
fn map(path: &Path, file: &File, len: u64) -> Result<Bytes> {
    if len == 0 {
        return Ok(Bytes::new());
    }
    let map_err = |source| CacheError::Map {
        path: path.to_path_buf(),
        source,
    };
    let len = usize::try_from(len).map_err(|_| {
        map_err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file too large to map",
        ))
    })?;

    // SAFETY: the mapping is private and sized from a fresh fstat. The file
    // shrinking between that fstat and the copy loop below is the one window
    // this cannot close.
    let mut mmap = unsafe { MmapOptions::new().len(len).populate().map_copy(file) }
        .map_err(map_err)?;
    let base = mmap.as_mut_ptr();
    for offset in (0..len).step_by(PAGE_STRIDE) {
        // SAFETY: `offset < len`, so the pointer is inside the mapping.
        // Volatile keeps the store of an unchanged byte from being elided;
        // the store is what gives the page its private copy.
        unsafe {
            let byte = base.add(offset);
            byte.write_volatile(byte.read_volatile());
        }
    }
    let mmap = mmap.make_read_only().map_err(map_err)?;
    Ok(Bytes::from_owner(mmap))
}

/// A file on disk cached as a private, read-only memory mapping.
pub struct FileBackedEntry {
    path: PathBuf,
    policy: RefreshPolicy,
    current: ArcSwap<Snapshot>,
    /// Serializes writers; readers never take it.
    resync_lock: Mutex<()>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileBackedEntry {
    /// Open, stat, and (unless the policy keeps nothing) map `path`.
    pub fn open(path: impl AsRef<Path>, policy: RefreshPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = Snapshot::load(&path, policy.retains_content())?;
        debug!(path = %path.display(), len = snapshot.stamp.len, ?policy, "Mapped file");

        Ok(Self {
            path,
            policy,
            current: ArcSwap::from_pointee(snapshot),
            resync_lock: Mutex::new(()),
            watcher: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Call `on_change` whenever the OS reports the file was written,
    /// replaced, or removed. The subscription lives as long as the entry.
    ///
    /// The parent directory is watched rather than the file itself so that a
    /// rename over the path is still seen after the original inode is gone.
    pub fn watch<F>(&self, on_change: F) -> Result<()>
    where
        F: Fn() + Send + 'static,
    {
        let watch_err = |source| CacheError::Watch {
            path: self.path.clone(),
            source,
        };
        let target = fs::canonicalize(&self.path).map_err(|source| CacheError::Open {
            path: self.path.clone(),
            source,
        })?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| target.clone());

        let watched = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if concerns(&event, &watched) {
                    on_change();
                }
            }
            Err(e) => {
                warn!(path = %watched.display(), error = %e, "File watch error");
            }
        })
        .map_err(watch_err)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(watch_err)?;

        debug!(path = %target.display(), "Watching file for changes");
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

fn concerns(event: &Event, target: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| p == target)
}

impl CacheEntry for FileBackedEntry {
    fn produce(&self) -> Option<Bytes> {
        match self.policy {
            RefreshPolicy::NoReserve => None,
            RefreshPolicy::LazyUpToDate => {
                if let Err(e) = self.resync() {
                    debug!(error = %e, "Lazy resync failed, serving previous content");
                }
                self.snapshot().bytes.clone()
            }
            RefreshPolicy::OldCopy => {
                // Inline resync; waits on `resync_lock` if a remap is running.
                let held = self.snapshot().bytes.clone();
                if let Err(e) = self.resync() {
                    debug!(error = %e, "Resync after read failed");
                }
                held
            }
            _ => self.snapshot().bytes.clone(),
        }
    }

    /// Remap when the file at `path` no longer matches the installed stamp.
    /// Any failure leaves the installed snapshot untouched.
    fn resync(&self) -> Result<bool> {
        let _writer = self.resync_lock.lock();

        let observed = fs::metadata(&self.path)
            .map(|meta| FileStamp::of(&meta))
            .map_err(|source| CacheError::Refresh {
                path: self.path.clone(),
                source,
            })?;
        if observed == self.current.load().stamp {
            return Ok(false);
        }

        let next = Snapshot::load(&self.path, self.policy.retains_content())
            .map_err(CacheError::into_refresh)?;
        debug!(path = %self.path.display(), len = next.stamp.len, "Remapped changed file");
        // The previous descriptor closes when the old snapshot's last reader
        // lets go of it.
        self.current.store(Arc::new(next));
        Ok(true)
    }

    fn kind(&self) -> EntryKind {
        EntryKind::File
    }

    fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        Some(self.current.load().refreshed_at)
    }

    fn held_len(&self) -> Option<usize> {
        self.current.load().bytes.as_ref().map(Bytes::len)
    }

    fn descriptor(&self) -> Option<Arc<File>> {
        Some(Arc::clone(&self.current.load().file))
    }
}
