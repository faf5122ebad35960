//! Identifier-keyed cache container
//!
//! Each put registers the entry's refresh and lifetime work on the
//! container's scheduler. Scheduled actions hold only a weak handle to the
//! container state plus the identifier and the generation of the put that
//! created them; an action whose generation no longer matches the table (the
//! entry was removed or replaced) does nothing and, if periodic, cancels
//! itself.

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::file::FileBackedEntry;
use crate::generated::GeneratedContent;
use crate::policy::{LifetimePolicy, RefreshPolicy};
use crate::types::{CacheStats, EntryInfo};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use tick_scheduler::{Duration, Scheduler, TaskHandle};
use tracing::{debug, error, warn};

static SHARED: LazyLock<Option<CacheContainer>> =
    LazyLock::new(|| match CacheContainer::new(CacheConfig::from_env()) {
        Ok(container) => Some(container),
        Err(e) => {
            error!(error = %e, "Failed to start shared cache container");
            None
        }
    });

struct Slot {
    entry: Arc<dyn CacheEntry>,
    generation: u64,
    refresh_task: Option<TaskHandle>,
    strict_deadline: Option<Duration>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct IdleDeadline {
    idle: Duration,
    deadline: Duration,
}

#[derive(Default)]
struct Tables {
    entries: HashMap<String, Slot>,
    /// Only entries under an idle lifetime appear here
    idle_deadlines: HashMap<String, IdleDeadline>,
    next_generation: u64,
}

struct Shared {
    tables: Mutex<Tables>,
    scheduler: Scheduler,
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

impl Shared {
    fn live_entry(&self, identifier: &str, generation: u64) -> Option<Arc<dyn CacheEntry>> {
        self.tables
            .lock()
            .entries
            .get(identifier)
            .filter(|slot| slot.generation == generation)
            .map(|slot| Arc::clone(&slot.entry))
    }

    fn record_resync(&self, identifier: &str, outcome: Result<bool>) {
        match outcome {
            Ok(true) => {
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                debug!(identifier, "Refreshed entry");
            }
            Ok(false) => {}
            Err(e) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(identifier, error = %e, "Refresh failed, serving previous content");
            }
        }
    }

    /// Take an entry out of the tables and cancel everything scheduled for it.
    /// The caller drops the returned slot after releasing the lock.
    fn detach(&self, tables: &mut Tables, identifier: &str) -> Option<Slot> {
        let slot = tables.entries.remove(identifier)?;
        let idle = tables.idle_deadlines.remove(identifier);

        if let Some(handle) = slot.refresh_task {
            self.scheduler.cancel(handle);
        }
        if let Some(deadline) = slot.strict_deadline.or(idle.map(|i| i.deadline)) {
            self.scheduler.cancel_oneshot(deadline, slot.generation);
        }
        Some(slot)
    }

    fn expire(&self, identifier: &str, generation: u64) {
        let expired = {
            let mut tables = self.tables.lock();
            let current = tables
                .entries
                .get(identifier)
                .is_some_and(|slot| slot.generation == generation);
            if current {
                self.detach(&mut tables, identifier)
            } else {
                None
            }
        };
        if expired.is_some() {
            debug!(identifier, "Entry lifetime elapsed, removed");
        }
    }

    fn schedule_refresh(
        self: &Arc<Self>,
        identifier: &str,
        generation: u64,
        every: Duration,
    ) -> TaskHandle {
        let weak = Arc::downgrade(self);
        let identifier = identifier.to_string();
        self.scheduler.schedule_periodic(every, move || {
            let Some(shared) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let Some(entry) = shared.live_entry(&identifier, generation) else {
                debug!(identifier = %identifier, "Entry gone, dropping refresh task");
                return ControlFlow::Break(());
            };
            shared.record_resync(&identifier, entry.resync());
            ControlFlow::Continue(())
        })
    }

    fn schedule_expiry(
        self: &Arc<Self>,
        identifier: &str,
        generation: u64,
        after: Duration,
    ) -> Duration {
        let weak = Arc::downgrade(self);
        let identifier = identifier.to_string();
        self.scheduler.schedule_oneshot(after, generation, move || {
            if let Some(shared) = weak.upgrade() {
                shared.expire(&identifier, generation);
            }
        })
    }

    fn install(
        self: &Arc<Self>,
        identifier: String,
        entry: Arc<dyn CacheEntry>,
        refresh: RefreshPolicy,
        lifetime: LifetimePolicy,
    ) {
        let replaced = {
            let mut tables = self.tables.lock();
            let replaced = self.detach(&mut tables, &identifier);
            tables.next_generation += 1;
            let generation = tables.next_generation;

            let refresh_task = refresh
                .refresh_interval()
                .map(|every| self.schedule_refresh(&identifier, generation, every));

            let mut strict_deadline = None;
            match lifetime {
                LifetimePolicy::Forever => {}
                LifetimePolicy::StrictInterval(dt) => {
                    strict_deadline = Some(self.schedule_expiry(&identifier, generation, dt));
                }
                LifetimePolicy::IdleInterval(dt) => {
                    let deadline = self.schedule_expiry(&identifier, generation, dt);
                    tables
                        .idle_deadlines
                        .insert(identifier.clone(), IdleDeadline { idle: dt, deadline });
                }
            }

            tables.entries.insert(
                identifier.clone(),
                Slot {
                    entry,
                    generation,
                    refresh_task,
                    strict_deadline,
                    created_at: Utc::now(),
                },
            );
            replaced
        };

        debug!(
            identifier = %identifier,
            ?refresh,
            ?lifetime,
            replaced = replaced.is_some(),
            "Cached entry"
        );
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

/// Named cache entries with refresh and lifetime policies.
pub struct CacheContainer {
    shared: Arc<Shared>,
}

impl CacheContainer {
    /// Create a container whose scheduler is already running.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let scheduler = Scheduler::new(config.resolution);
        scheduler.start().map_err(CacheError::Scheduler)?;
        Ok(Self::with_scheduler(scheduler))
    }

    /// Create a container around an existing scheduler, in whatever run state
    /// it is in. A stopped scheduler has to be ticked by the caller.
    pub fn with_scheduler(scheduler: Scheduler) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                scheduler,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                refreshes: AtomicU64::new(0),
                refresh_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide container configured from the environment. `None` only if
    /// its scheduler thread could not be started.
    pub fn shared() -> Option<&'static CacheContainer> {
        SHARED.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    /// Cache the file at `path`. Nothing is inserted if the file cannot be
    /// opened, mapped, or (for `UpToDate`) watched.
    pub fn put_file(
        &self,
        path: impl AsRef<Path>,
        identifier: impl Into<String>,
        refresh: RefreshPolicy,
        lifetime: LifetimePolicy,
    ) -> Result<()> {
        let identifier = identifier.into();
        let entry = Arc::new(FileBackedEntry::open(path.as_ref(), refresh)?);

        if refresh == RefreshPolicy::UpToDate {
            let weak_shared: Weak<Shared> = Arc::downgrade(&self.shared);
            let weak_entry = Arc::downgrade(&entry);
            let watched = identifier.clone();
            entry.watch(move || {
                let Some(shared) = weak_shared.upgrade() else {
                    return;
                };
                let weak_shared = weak_shared.clone();
                let weak_entry = weak_entry.clone();
                let identifier = watched.clone();
                shared.scheduler.defer(move || {
                    let (Some(shared), Some(entry)) = (weak_shared.upgrade(), weak_entry.upgrade())
                    else {
                        return;
                    };
                    shared.record_resync(&identifier, entry.resync());
                });
            })?;
        }

        self.shared.install(identifier, entry, refresh, lifetime);
        Ok(())
    }

    /// Cache the output of `generator`. It runs once before the entry becomes
    /// visible, so a read never finds it empty.
    pub fn put_generated<F, B>(
        &self,
        identifier: impl Into<String>,
        refresh: RefreshPolicy,
        lifetime: LifetimePolicy,
        generator: F,
    ) where
        F: Fn() -> B + Send + Sync + 'static,
        B: Into<Bytes>,
    {
        let entry = GeneratedContent::generated(refresh, generator);
        self.install_generated(identifier.into(), entry, refresh, lifetime);
    }

    /// Cache a fixed blob.
    pub fn put_static(
        &self,
        identifier: impl Into<String>,
        refresh: RefreshPolicy,
        lifetime: LifetimePolicy,
        bytes: impl Into<Bytes>,
    ) {
        let entry = GeneratedContent::fixed(refresh, bytes);
        self.install_generated(identifier.into(), entry, refresh, lifetime);
    }

    fn install_generated(
        &self,
        identifier: String,
        entry: GeneratedContent,
        refresh: RefreshPolicy,
        lifetime: LifetimePolicy,
    ) {
        if let Err(e) = entry.resync() {
            warn!(identifier = %identifier, error = %e, "Initial generation failed");
        }
        self.shared
            .install(identifier, Arc::new(entry), refresh, lifetime);
    }

    /// Current bytes for `identifier`. A read of an idle-lifetime entry pushes
    /// its removal back to now plus the idle interval.
    pub fn get(&self, identifier: &str) -> Option<Bytes> {
        let entry = {
            let mut tables = self.shared.tables.lock();
            let Tables {
                entries,
                idle_deadlines,
                ..
            } = &mut *tables;

            let Some(slot) = entries.get(identifier) else {
                self.shared.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };
            if let Some(idle) = idle_deadlines.get_mut(identifier) {
                let scheduler = &self.shared.scheduler;
                let rearmed = scheduler.now() + idle.idle;
                scheduler.reschedule_oneshot(idle.deadline, slot.generation, rearmed);
                idle.deadline = rearmed;
            }
            Arc::clone(&slot.entry)
        };

        let bytes = entry.produce();
        let counter = if bytes.is_some() {
            &self.shared.hits
        } else {
            &self.shared.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        bytes
    }

    /// Drop `identifier` and everything scheduled for it. Idempotent.
    pub fn remove(&self, identifier: &str) {
        let removed = {
            let mut tables = self.shared.tables.lock();
            self.shared.detach(&mut tables, identifier)
        };
        if removed.is_some() {
            debug!(identifier, "Removed entry");
        }
    }

    /// Resync `identifier` now. Returns whether its content changed; an
    /// unknown identifier changes nothing.
    pub fn refresh(&self, identifier: &str) -> Result<bool> {
        let entry = self
            .shared
            .tables
            .lock()
            .entries
            .get(identifier)
            .map(|slot| Arc::clone(&slot.entry));
        match entry {
            Some(entry) => entry.resync(),
            None => Ok(false),
        }
    }

    /// Presence check that does not count as a read.
    pub fn contains(&self, identifier: &str) -> bool {
        self.shared.tables.lock().entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.shared.tables.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> =
            self.shared.tables.lock().entries.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// The open descriptor of a file entry.
    pub fn current_file(&self, identifier: &str) -> Option<Arc<File>> {
        let entry = self
            .shared
            .tables
            .lock()
            .entries
            .get(identifier)
            .map(|slot| Arc::clone(&slot.entry))?;
        entry.descriptor()
    }

    pub fn info(&self, identifier: &str) -> Option<EntryInfo> {
        let (entry, created_at) = {
            let tables = self.shared.tables.lock();
            let slot = tables.entries.get(identifier)?;
            (Arc::clone(&slot.entry), slot.created_at)
        };
        Some(EntryInfo {
            identifier: identifier.to_string(),
            kind: entry.kind(),
            size: entry.held_len(),
            created_at,
            refreshed_at: entry.refreshed_at(),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            refreshes: self.shared.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.shared.refresh_failures.load(Ordering::Relaxed),
        }
    }
}
