//! Refresh and lifetime policies

use tick_scheduler::Duration;

/// When and how an entry's bytes are resynced with their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Populate at creation only.
    Once,
    /// Resync every interval.
    Interval(Duration),
    /// Resync whenever the OS reports a change to the backing file.
    UpToDate,
    /// Resync synchronously on every read.
    LazyUpToDate,
    /// Keep no bytes in memory; files hold only their descriptor.
    NoReserve,
    /// Serve the held bytes, then resync so the next read sees any change.
    ///
    /// The resync runs on the reading thread after the held bytes are
    /// captured, so a read can wait behind a concurrent remap of the same
    /// entry. It never waits on the scheduler.
    OldCopy,
}

impl RefreshPolicy {
    /// Whether content is kept in memory between reads.
    pub fn retains_content(self) -> bool {
        !matches!(self, RefreshPolicy::NoReserve)
    }

    /// Period of the recurring refresh task, if the policy has one.
    pub fn refresh_interval(self) -> Option<Duration> {
        match self {
            RefreshPolicy::Interval(dt) => Some(dt),
            _ => None,
        }
    }
}

/// When an entry is evicted from its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimePolicy {
    /// Kept until explicitly removed.
    Forever,
    /// Removed a fixed interval after creation, regardless of reads.
    StrictInterval(Duration),
    /// Removed once no read has happened for the interval.
    IdleInterval(Duration),
}
