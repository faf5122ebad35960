//! Tick-based virtual clock
//!
//! Converts monotonic time into discrete ticks of a fixed resolution and runs
//! periodic and one-shot actions on a single serialized background thread.

mod clock;
mod driver;
mod duration;
mod scheduler;

pub use clock::{ManualClock, MonotonicClock, TimeSource};
pub use duration::Duration;
pub use scheduler::{
    OneshotAction, PeriodicAction, Scheduler, TaskHandle, TaskObserver, MIN_RESOLUTION,
};
