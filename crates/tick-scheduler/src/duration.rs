//! Nanosecond time spans
//!
//! Unlike `std::time::Duration` this type is signed, so deadlines can be
//! subtracted freely, and it knows how to express itself in scheduler ticks.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Rem, Sub, SubAssign};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed span of time with nanosecond resolution.
///
/// Absolute deadlines are expressed as a `Duration` measured from the
/// scheduler's origin, see [`crate::Scheduler::now`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    nanos: i64,
}

impl Duration {
    pub const ZERO: Duration = Duration { nanos: 0 };

    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self {
            nanos: micros * NANOS_PER_MICRO,
        }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis * NANOS_PER_MILLI,
        }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self {
            nanos: secs * NANOS_PER_SEC,
        }
    }

    pub const fn as_nanos(self) -> i64 {
        self.nanos
    }

    pub const fn as_millis(self) -> i64 {
        self.nanos / NANOS_PER_MILLI
    }

    pub const fn as_secs(self) -> i64 {
        self.nanos / NANOS_PER_SEC
    }

    pub const fn is_negative(self) -> bool {
        self.nanos < 0
    }

    pub const fn is_zero(self) -> bool {
        self.nanos == 0
    }

    /// Number of whole `resolution` ticks this span covers, rounded half away
    /// from zero. A non-positive resolution yields zero ticks.
    pub fn ticks(self, resolution: Duration) -> i64 {
        if resolution.nanos <= 0 {
            return 0;
        }
        let n = i128::from(self.nanos);
        let r = i128::from(resolution.nanos);
        let rounded = (n.abs() + r / 2) / r;
        let signed = if n < 0 { -rounded } else { rounded };
        signed.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Index of the first tick at or after this span. Deadlines map through
    /// this so an action never runs before its time. A non-positive
    /// resolution yields zero ticks.
    pub fn ticks_ceil(self, resolution: Duration) -> i64 {
        if resolution.nanos <= 0 {
            return 0;
        }
        let n = i128::from(self.nanos);
        let r = i128::from(resolution.nanos);
        let ceiled = n.div_euclid(r) + i128::from(n.rem_euclid(r) != 0);
        ceiled.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// `self / rhs`, or `None` for a zero divisor or on overflow.
    pub fn checked_div(self, rhs: i64) -> Option<Duration> {
        self.nanos.checked_div(rhs).map(Duration::from_nanos)
    }

    /// Truncating ratio `self / rhs`, or `None` for a zero span or on overflow.
    pub fn checked_ratio(self, rhs: Duration) -> Option<i64> {
        self.nanos.checked_div(rhs.nanos)
    }

    /// `self % rhs`, or `None` for a zero span or on overflow.
    pub fn checked_rem(self, rhs: Duration) -> Option<Duration> {
        self.nanos.checked_rem(rhs.nanos).map(Duration::from_nanos)
    }

    /// Converts to a `std::time::Duration`, or `None` when negative.
    pub fn to_std(self) -> Option<std::time::Duration> {
        u64::try_from(self.nanos)
            .ok()
            .map(std::time::Duration::from_nanos)
    }
}

impl From<std::time::Duration> for Duration {
    /// Saturates at `i64::MAX` nanoseconds (roughly 292 years).
    fn from(d: std::time::Duration) -> Self {
        Self {
            nanos: i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos % NANOS_PER_MILLI == 0 {
            write!(f, "{}ms", self.nanos / NANOS_PER_MILLI)
        } else {
            write!(f, "{}ns", self.nanos)
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::from_nanos(self.nanos.saturating_add(rhs.nanos))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i64) -> Duration {
        Duration::from_nanos(self.nanos.saturating_mul(rhs))
    }
}

/// # Panics
///
/// On a zero divisor, or dividing the most negative span by `-1`. See
/// [`Duration::checked_div`].
impl Div<i64> for Duration {
    type Output = Duration;

    fn div(self, rhs: i64) -> Duration {
        Duration::from_nanos(self.nanos / rhs)
    }
}

/// Truncating ratio of two spans.
///
/// # Panics
///
/// When `rhs` is zero, or on overflow. See [`Duration::checked_ratio`].
impl Div for Duration {
    type Output = i64;

    fn div(self, rhs: Duration) -> i64 {
        self.nanos / rhs.nanos
    }
}

/// # Panics
///
/// When `rhs` is zero, or on overflow. See [`Duration::checked_rem`].
impl Rem for Duration {
    type Output = Duration;

    fn rem(self, rhs: Duration) -> Duration {
        Duration::from_nanos(self.nanos % rhs.nanos)
    }
}
