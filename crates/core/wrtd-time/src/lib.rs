//! TAI timestamp representation and arithmetic.
//!
//! Time in the trigger-distribution system is a triple of TAI seconds,
//! 8 ns ticks and sub-tick fractional units. One second is 125,000,000
//! ticks; one tick is 4096 fractional units (~1.95 ps per LSB). All
//! arithmetic keeps timestamps normalized: `frac` in `[0, 4096)` and
//! `ticks` in `[0, 125_000_000)`.
//!
//! Subtraction that would borrow out of the seconds field clamps seconds
//! to zero and leaves `ticks` negative. Such a "before the epoch" value is
//! a sentinel for "in the past"; consumers discard it rather than act on it.

#![cfg_attr(not(test), no_std)]

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of 8 ns ticks in one TAI second.
pub const TICKS_PER_SECOND: i32 = 125_000_000;

/// Number of fractional units in one tick.
pub const FRAC_PER_TICK: i32 = 4096;

/// Duration of one tick in picoseconds.
pub const TICK_PS: u64 = 8_000;

/// Picoseconds in one TAI second.
pub const SECOND_PS: u64 = 1_000_000_000_000;

/// A TAI timestamp: seconds, 8 ns ticks and 1/4096-tick fractional units.
///
/// `ticks` and `frac` are signed so that borrow propagation during
/// subtraction can leave a "before the epoch" marker (negative `ticks`
/// with `seconds == 0`); every other normalized value keeps both fields
/// non-negative.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    /// TAI seconds.
    pub seconds: u64,
    /// 8 ns ticks within the second, `[0, 125_000_000)` when normalized.
    pub ticks: i32,
    /// Fractional units within the tick, `[0, 4096)` when normalized.
    pub frac: i32,
}

impl Timestamp {
    /// Creates a timestamp from already-normalized components.
    #[must_use]
    pub const fn new(seconds: u64, ticks: i32, frac: i32) -> Self {
        Self { seconds, ticks, frac }
    }

    /// The epoch (all-zero) timestamp.
    #[must_use]
    pub const fn zero() -> Self {
        Self { seconds: 0, ticks: 0, frac: 0 }
    }

    /// Builds a timestamp from a raw TAI readout (seconds + cycle counter).
    #[must_use]
    pub const fn from_sec_cycles(seconds: u32, cycles: u32) -> Self {
        Self { seconds: seconds as u64, ticks: cycles as i32, frac: 0 }
    }

    /// Converts a picosecond count, truncating to the 8 ns + 1/4096-tick grid.
    #[must_use]
    pub const fn from_picos(ps: u64) -> Self {
        let seconds = ps / SECOND_PS;
        let rem = ps % SECOND_PS;
        let ticks = (rem / TICK_PS) as i32;
        let frac = ((rem % TICK_PS) * FRAC_PER_TICK as u64 / TICK_PS) as i32;
        Self { seconds, ticks, frac }
    }

    /// Total picoseconds represented by this timestamp.
    ///
    /// Only meaningful for normalized, non-negative values.
    #[must_use]
    pub const fn to_picos(&self) -> u64 {
        self.seconds * SECOND_PS
            + self.ticks as u64 * TICK_PS
            + self.frac as u64 * TICK_PS / FRAC_PER_TICK as u64
    }

    /// True when a subtraction has produced a value before the epoch.
    #[must_use]
    pub const fn is_before_epoch(&self) -> bool {
        self.ticks < 0
    }

    /// Adds a quantized output-rule delay: whole ticks plus fractional units.
    ///
    /// This is the single-carry variant used on the pulse-enqueue path,
    /// where `frac` is bounded by one tick and `cycles` by one second.
    pub fn adjust_delay(&mut self, cycles: u32, frac: u32) {
        self.frac += frac as i32;
        if (self.frac & FRAC_PER_TICK) != 0 {
            self.ticks += 1;
        }
        self.frac &= FRAC_PER_TICK - 1;
        self.ticks += cycles as i32;
        if self.ticks >= TICKS_PER_SECOND {
            self.ticks -= TICKS_PER_SECOND;
            self.seconds += 1;
        }
    }

    /// Adds a tick count smaller than one second, carrying into seconds.
    pub fn add_ticks(&mut self, ticks: i32) {
        self.ticks += ticks;
        if self.ticks >= TICKS_PER_SECOND {
            self.ticks -= TICKS_PER_SECOND;
            self.seconds += 1;
        }
    }

    /// Signed tick distance `self - earlier`.
    ///
    /// Used for dead-time checks; negative when `self` precedes `earlier`.
    #[must_use]
    pub fn ticks_since(&self, earlier: &Timestamp) -> i64 {
        (self.seconds as i64 - earlier.seconds as i64) * i64::from(TICKS_PER_SECOND)
            + i64::from(self.ticks - earlier.ticks)
    }

    /// Picoseconds within the current second (ignores the seconds field).
    #[must_use]
    const fn subsecond_picos(&self) -> u64 {
        self.ticks as u64 * TICK_PS + self.frac as u64 * TICK_PS / FRAC_PER_TICK as u64
    }
}

impl AddAssign for Timestamp {
    fn add_assign(&mut self, rhs: Timestamp) {
        self.frac += rhs.frac;
        if self.frac >= FRAC_PER_TICK {
            self.frac -= FRAC_PER_TICK;
            self.ticks += 1;
        }
        self.ticks += rhs.ticks;
        if self.ticks >= TICKS_PER_SECOND {
            self.ticks -= TICKS_PER_SECOND;
            self.seconds += 1;
        }
        self.seconds += rhs.seconds;
    }
}

impl SubAssign for Timestamp {
    fn sub_assign(&mut self, rhs: Timestamp) {
        self.frac -= rhs.frac;
        if self.frac < 0 {
            self.frac += FRAC_PER_TICK;
            self.ticks -= 1;
        }
        self.ticks -= rhs.ticks;
        let mut borrow = 0;
        if self.ticks < 0 {
            self.ticks += TICKS_PER_SECOND;
            borrow = 1;
        }
        let sub = rhs.seconds + borrow;
        if self.seconds >= sub {
            self.seconds -= sub;
        } else {
            // Result precedes the epoch: clamp seconds, leave ticks negative.
            self.seconds = 0;
            self.ticks -= TICKS_PER_SECOND;
        }
    }
}

impl Add for Timestamp {
    type Output = Timestamp;

    fn add(mut self, rhs: Timestamp) -> Timestamp {
        self += rhs;
        self
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;

    fn sub(mut self, rhs: Timestamp) -> Timestamp {
        self -= rhs;
        self
    }
}

impl fmt::Display for Timestamp {
    /// Canonical human-readable form: `SS:NNN,UUU,PPP ns + RRR ps`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_before_epoch() {
            return write!(f, "(pre-epoch {}t)", self.ticks);
        }
        let ps = self.subsecond_picos();
        write!(
            f,
            "{}:{:03},{:03},{:03} ns + {:3} ps",
            self.seconds,
            ps / 1_000_000_000,
            ps / 1_000_000 % 1000,
            ps / 1000 % 1000,
            ps % 1000
        )
    }
}
