//! Tick-driven task scheduler
//!
//! Time is quantized into ticks of a fixed resolution. Every firing bumps the
//! tick count by one, applies queued table mutations, then runs due one-shot
//! and periodic actions. Callers never touch the task tables directly: every
//! scheduling call is queued and applied at the start of the next firing, so
//! the tables only change inside the serialized firing context.

use crate::clock::{MonotonicClock, TimeSource};
use crate::driver::Driver;
use crate::duration::Duration;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Smallest accepted tick length.
pub const MIN_RESOLUTION: Duration = Duration::from_millis(1);

/// Action run on every due tick of a periodic task. Returning
/// `ControlFlow::Break` cancels the task.
pub type PeriodicAction = Box<dyn FnMut() -> ControlFlow<()> + Send>;

/// Action run once, either at a deadline or on the next firing.
pub type OneshotAction = Box<dyn FnOnce() + Send>;

/// Identifies a periodic task for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

/// Hook notified before each periodic action runs.
pub trait TaskObserver: Send + Sync {
    fn before_periodic(&self, handle: TaskHandle, tick: u64);
}

struct PeriodicTask {
    start_tick: u64,
    interval_ticks: u64,
    action: PeriodicAction,
}

impl PeriodicTask {
    fn is_due(&self, tick: u64) -> bool {
        tick >= self.start_tick && (tick - self.start_tick) % self.interval_ticks == 0
    }
}

#[derive(Default)]
struct Tables {
    periodic: BTreeMap<TaskHandle, PeriodicTask>,
    /// tick -> (tag -> action)
    oneshots: BTreeMap<u64, BTreeMap<u64, OneshotAction>>,
}

impl Tables {
    fn take_oneshot(&mut self, tick: u64, tag: u64) -> Option<OneshotAction> {
        let bucket = self.oneshots.get_mut(&tick)?;
        let action = bucket.remove(&tag)?;
        if bucket.is_empty() {
            self.oneshots.remove(&tick);
        }
        Some(action)
    }

    fn insert_oneshot(&mut self, tick: u64, tag: u64, action: OneshotAction) {
        self.oneshots.entry(tick).or_default().insert(tag, action);
    }
}

enum Pending {
    Apply(Box<dyn FnOnce(&mut Tables) + Send>),
    Run(OneshotAction),
}

pub(crate) struct Core {
    resolution: Duration,
    clock: Arc<dyn TimeSource>,
    ticks: AtomicU64,
    next_handle: AtomicU64,
    tables: Mutex<Tables>,
    pending: Mutex<VecDeque<Pending>>,
    firing: Mutex<()>,
    observer: RwLock<Option<Arc<dyn TaskObserver>>>,
}

impl Core {
    pub(crate) fn resolution(&self) -> Duration {
        self.resolution
    }

    /// First tick at or after `deadline`.
    fn tick_at(&self, deadline: Duration) -> u64 {
        deadline.ticks_ceil(self.resolution).max(0) as u64
    }

    fn interval_ticks(&self, interval: Duration) -> u64 {
        let ticks = interval.ticks(self.resolution);
        if ticks < 1 {
            debug!(
                %interval,
                resolution = %self.resolution,
                "Interval shorter than one tick, clamping to one"
            );
            1
        } else {
            ticks as u64
        }
    }

    fn enqueue(&self, op: Pending) {
        self.pending.lock().push_back(op);
    }

    /// One firing: advance the tick, drain the queue, run due work.
    pub(crate) fn fire(&self) {
        let _firing = self.firing.lock();
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        // Work queued by this firing's own actions waits for the next one.
        let batch = std::mem::take(&mut *self.pending.lock());
        for op in batch {
            match op {
                Pending::Apply(apply) => apply(&mut *self.tables.lock()),
                Pending::Run(action) => run_guarded(tick, action),
            }
        }

        let due = {
            let mut tables = self.tables.lock();
            let later = tables.oneshots.split_off(&(tick + 1));
            std::mem::replace(&mut tables.oneshots, later)
        };
        for (_, bucket) in due {
            for (_, action) in bucket {
                run_guarded(tick, action);
            }
        }

        let due: Vec<(TaskHandle, PeriodicTask)> = {
            let mut tables = self.tables.lock();
            let handles: Vec<TaskHandle> = tables
                .periodic
                .iter()
                .filter(|(_, task)| task.is_due(tick))
                .map(|(handle, _)| *handle)
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| tables.periodic.remove(&handle).map(|task| (handle, task)))
                .collect()
        };
        if due.is_empty() {
            return;
        }

        let observer = self.observer.read().clone();
        let mut kept = Vec::with_capacity(due.len());
        for (handle, mut task) in due {
            if let Some(observer) = &observer {
                observer.before_periodic(handle, tick);
            }
            match panic::catch_unwind(AssertUnwindSafe(|| (task.action)())) {
                Ok(ControlFlow::Continue(())) => kept.push((handle, task)),
                Ok(ControlFlow::Break(())) => {
                    debug!(?handle, tick, "Periodic task finished");
                }
                Err(_) => {
                    error!(?handle, tick, "Periodic task panicked, dropping it");
                }
            }
        }

        let mut tables = self.tables.lock();
        for (handle, task) in kept {
            tables.periodic.insert(handle, task);
        }
    }
}

fn run_guarded(tick: u64, action: OneshotAction) {
    if panic::catch_unwind(AssertUnwindSafe(action)).is_err() {
        error!(tick, "Scheduled action panicked");
    }
}

/// Fixed-resolution virtual clock running periodic and one-shot actions.
///
/// A new scheduler is stopped; [`Scheduler::start`] spawns a background
/// thread that calls [`Scheduler::tick`] once per resolution. Ticks can also
/// be driven by hand, which together with a [`crate::ManualClock`] makes
/// timing fully deterministic.
pub struct Scheduler {
    core: Arc<Core>,
    driver: Mutex<Option<Driver>>,
}

impl Scheduler {
    /// Create a stopped scheduler on the monotonic clock.
    pub fn new(resolution: Duration) -> Self {
        Self::with_clock(resolution, Arc::new(MonotonicClock::new()))
    }

    /// Create a stopped scheduler reading time from `clock`.
    pub fn with_clock(resolution: Duration, clock: Arc<dyn TimeSource>) -> Self {
        let resolution = if resolution < MIN_RESOLUTION {
            warn!(%resolution, min = %MIN_RESOLUTION, "Scheduler resolution too small, clamping");
            MIN_RESOLUTION
        } else {
            resolution
        };

        Self {
            core: Arc::new(Core {
                resolution,
                clock,
                ticks: AtomicU64::new(0),
                next_handle: AtomicU64::new(1),
                tables: Mutex::new(Tables::default()),
                pending: Mutex::new(VecDeque::new()),
                firing: Mutex::new(()),
                observer: RwLock::new(None),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start the background timer. No-op when already running.
    pub fn start(&self) -> io::Result<()> {
        let mut driver = self.driver.lock();
        if driver.is_none() {
            *driver = Some(Driver::spawn(Arc::clone(&self.core))?);
        }
        Ok(())
    }

    /// Stop the background timer. No-op when already stopped.
    pub fn stop(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            driver.shutdown();
        }
    }

    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    /// Perform one firing on the calling thread.
    pub fn tick(&self) {
        self.core.fire();
    }

    /// Time since the scheduler's origin. Deadlines are expressed on this scale.
    pub fn now(&self) -> Duration {
        self.core.clock.now()
    }

    pub fn tick_count(&self) -> u64 {
        self.core.ticks.load(Ordering::SeqCst)
    }

    pub fn resolution(&self) -> Duration {
        self.core.resolution
    }

    /// Run `action` every `interval` (at least one tick), starting from the
    /// current tick.
    pub fn schedule_periodic<F>(&self, interval: Duration, action: F) -> TaskHandle
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let handle = TaskHandle(self.core.next_handle.fetch_add(1, Ordering::Relaxed));
        let task = PeriodicTask {
            start_tick: self.tick_count(),
            interval_ticks: self.core.interval_ticks(interval),
            action: Box::new(action),
        };
        self.core.enqueue(Pending::Apply(Box::new(move |tables| {
            tables.periodic.insert(handle, task);
        })));
        handle
    }

    /// Run `action` once, `delay` from now. Returns the absolute deadline,
    /// which together with `tag` identifies the action for rescheduling.
    pub fn schedule_oneshot<F>(&self, delay: Duration, tag: u64, action: F) -> Duration
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = self.now() + delay;
        self.schedule_oneshot_at(deadline, tag, action);
        deadline
    }

    /// Run `action` once when the tick of `deadline` is reached. A deadline
    /// already in the past fires on the next tick. An existing action with the
    /// same tick and tag is replaced.
    pub fn schedule_oneshot_at<F>(&self, deadline: Duration, tag: u64, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let tick = self.core.tick_at(deadline);
        let action: OneshotAction = Box::new(action);
        self.core.enqueue(Pending::Apply(Box::new(move |tables| {
            tables.insert_oneshot(tick, tag, action);
        })));
    }

    /// Move a pending one-shot to `new_deadline`. No-op when it already fired
    /// or was never scheduled.
    pub fn reschedule_oneshot(&self, original: Duration, tag: u64, new_deadline: Duration) {
        let from = self.core.tick_at(original);
        let to = self.core.tick_at(new_deadline);
        self.core.enqueue(Pending::Apply(Box::new(move |tables| {
            if let Some(action) = tables.take_oneshot(from, tag) {
                tables.insert_oneshot(to, tag, action);
            }
        })));
    }

    /// Push a pending one-shot back by `by`.
    pub fn delay_oneshot(&self, original: Duration, tag: u64, by: Duration) {
        self.reschedule_oneshot(original, tag, original + by);
    }

    /// Drop a pending one-shot without running it.
    pub fn cancel_oneshot(&self, deadline: Duration, tag: u64) {
        let tick = self.core.tick_at(deadline);
        self.core.enqueue(Pending::Apply(Box::new(move |tables| {
            tables.take_oneshot(tick, tag);
        })));
    }

    /// Remove a periodic task. Idempotent.
    pub fn cancel(&self, handle: TaskHandle) {
        self.core.enqueue(Pending::Apply(Box::new(move |tables| {
            tables.periodic.remove(&handle);
        })));
    }

    /// Run `action` inside the next firing, after earlier queued work.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.enqueue(Pending::Run(Box::new(action)));
    }

    pub fn set_observer(&self, observer: Arc<dyn TaskObserver>) {
        *self.core.observer.write() = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.core.observer.write() = None;
    }

    /// Periodic tasks currently registered (queued registrations excluded).
    pub fn periodic_count(&self) -> usize {
        self.core.tables.lock().periodic.len()
    }

    /// One-shots currently waiting (queued registrations excluded).
    pub fn oneshot_count(&self) -> usize {
        self.core
            .tables
            .lock()
            .oneshots
            .values()
            .map(|bucket| bucket.len())
            .sum()
    }

    /// Operations waiting for the next firing.
    pub fn pending_count(&self) -> usize {
        self.core.pending.lock().len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn manual(resolution_ms: i64) -> (Scheduler, ManualClock) {
        let clock = ManualClock::new();
        let scheduler =
            Scheduler::with_clock(Duration::from_millis(resolution_ms), Arc::new(clock.clone()));
        (scheduler, clock)
    }

    fn advance(scheduler: &Scheduler, clock: &ManualClock, ticks: usize) {
        for _ in 0..ticks {
            clock.advance(scheduler.resolution());
            scheduler.tick();
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (c.clone(), c)
    }

    #[test]
    fn test_periodic_fires_on_interval_congruence() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        scheduler.schedule_periodic(Duration::from_millis(300), move || {
            count.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        advance(&scheduler, &clock, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        advance(&scheduler, &clock, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interval_below_one_tick_is_clamped() {
        let (scheduler, clock) = manual(100);
        let mut seen = Vec::new();
        for ms in [0, -50, 20] {
            let (count, observed) = counter();
            scheduler.schedule_periodic(Duration::from_millis(ms), move || {
                count.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            });
            seen.push(observed);
        }

        advance(&scheduler, &clock, 5);
        for observed in seen {
            assert_eq!(observed.load(Ordering::SeqCst), 5);
        }
    }

    #[test]
    fn test_oneshot_fires_once_at_deadline() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        let deadline = scheduler.schedule_oneshot(Duration::from_millis(500), 7, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(deadline, Duration::from_millis(500));

        advance(&scheduler, &clock, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.oneshot_count(), 1);

        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.oneshot_count(), 0);

        advance(&scheduler, &clock, 10);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unaligned_oneshot_waits_for_following_tick() {
        let (scheduler, clock) = manual(100);
        clock.set(Duration::from_millis(30));
        let (count, seen) = counter();
        let deadline = scheduler.schedule_oneshot(Duration::from_millis(410), 2, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(deadline, Duration::from_millis(440));

        for tick in 1..=4 {
            clock.set(Duration::from_millis(100 * tick));
            scheduler.tick();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        clock.set(Duration::from_millis(500));
        scheduler.tick();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_oneshots_share_a_bucket_by_tag() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        for tag in 0..3 {
            let count = count.clone();
            scheduler.schedule_oneshot(Duration::from_millis(200), tag, move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        advance(&scheduler, &clock, 1);
        assert_eq!(scheduler.oneshot_count(), 3);
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_past_deadline_fires_on_next_tick() {
        let (scheduler, clock) = manual(100);
        advance(&scheduler, &clock, 5);

        let (count, seen) = counter();
        scheduler.schedule_oneshot_at(Duration::from_millis(100), 1, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reschedule_moves_pending_oneshot() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        let original = scheduler.schedule_oneshot(Duration::from_millis(300), 9, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        advance(&scheduler, &clock, 1);

        scheduler.reschedule_oneshot(original, 9, Duration::from_millis(600));
        advance(&scheduler, &clock, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reschedule_after_fire_is_noop() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        let original = scheduler.schedule_oneshot(Duration::from_millis(100), 1, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        scheduler.reschedule_oneshot(original, 1, Duration::from_millis(500));
        scheduler.reschedule_oneshot(Duration::from_millis(900), 42, Duration::from_millis(500));
        advance(&scheduler, &clock, 6);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.oneshot_count(), 0);
    }

    #[test]
    fn test_delay_oneshot() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        let original = scheduler.schedule_oneshot(Duration::from_millis(200), 3, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.delay_oneshot(original, 3, Duration::from_millis(200));

        advance(&scheduler, &clock, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_oneshot() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        let deadline = scheduler.schedule_oneshot(Duration::from_millis(200), 5, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel_oneshot(deadline, 5);

        advance(&scheduler, &clock, 5);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.oneshot_count(), 0);
    }

    #[test]
    fn test_cancel_periodic_is_idempotent() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        let handle = scheduler.schedule_periodic(Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        advance(&scheduler, &clock, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        scheduler.cancel(handle);
        scheduler.cancel(handle);
        advance(&scheduler, &clock, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.periodic_count(), 0);
    }

    #[test]
    fn test_break_self_cancels() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        scheduler.schedule_periodic(Duration::from_millis(100), move || {
            if count.fetch_add(1, Ordering::SeqCst) == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        advance(&scheduler, &clock, 6);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.periodic_count(), 0);
    }

    #[test]
    fn test_deferred_actions_run_in_order_on_next_tick() {
        let (scheduler, clock) = manual(100);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            scheduler.defer(move || order.lock().push(i));
        }
        assert_eq!(scheduler.pending_count(), 3);
        assert!(order.lock().is_empty());

        advance(&scheduler, &clock, 1);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_observer_sees_every_periodic_call() {
        struct Recorder(Mutex<Vec<(TaskHandle, u64)>>);

        impl TaskObserver for Recorder {
            fn before_periodic(&self, handle: TaskHandle, tick: u64) {
                self.0.lock().push((handle, tick));
            }
        }

        let (scheduler, clock) = manual(100);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        scheduler.set_observer(recorder.clone());
        let handle = scheduler
            .schedule_periodic(Duration::from_millis(200), || ControlFlow::Continue(()));

        advance(&scheduler, &clock, 4);
        assert_eq!(*recorder.0.lock(), vec![(handle, 2), (handle, 4)]);

        scheduler.clear_observer();
        advance(&scheduler, &clock, 2);
        assert_eq!(recorder.0.lock().len(), 2);
    }

    #[test]
    fn test_panicking_actions_do_not_break_the_scheduler() {
        let (scheduler, clock) = manual(100);
        let (count, seen) = counter();
        scheduler.schedule_periodic(Duration::from_millis(100), || panic!("periodic boom"));
        scheduler.schedule_oneshot(Duration::from_millis(100), 0, || panic!("oneshot boom"));
        scheduler.schedule_periodic(Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        advance(&scheduler, &clock, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.periodic_count(), 1);
    }

    #[test]
    fn test_actions_can_schedule_from_inside_a_firing() {
        let (scheduler, clock) = manual(100);
        let scheduler = Arc::new(scheduler);
        let (count, seen) = counter();
        let weak = Arc::downgrade(&scheduler);
        scheduler.schedule_oneshot(Duration::from_millis(100), 0, move || {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.defer(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        advance(&scheduler, &clock, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolution_is_clamped() {
        let scheduler = Scheduler::new(Duration::ZERO);
        assert_eq!(scheduler.resolution(), MIN_RESOLUTION);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let scheduler = Scheduler::new(Duration::from_millis(5));
        assert!(!scheduler.is_running());

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        std::thread::sleep(std::time::Duration::from_millis(60));
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        let ticks = scheduler.tick_count();
        assert!(ticks > 0);
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(scheduler.tick_count(), ticks);
    }

    #[test]
    fn test_background_timer_runs_periodic_tasks() {
        let scheduler = Scheduler::new(Duration::from_millis(5));
        let (count, seen) = counter();
        scheduler.schedule_periodic(Duration::from_millis(5), move || {
            count.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        scheduler.start().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while seen.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(seen.load(Ordering::SeqCst) >= 3);
    }
}
