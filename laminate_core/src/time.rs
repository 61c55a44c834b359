// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic timestamps for commit-loop instrumentation.
//!
//! [`HostTime`] is a point on the backend's monotonic clock, in ticks.
//! [`Timebase`] converts ticks to nanoseconds (`nanos = ticks * numer /
//! denom`); the DRM backend reads `CLOCK_MONOTONIC` directly in nanoseconds
//! and so reports [`Timebase::NANOS`]. [`Ticks`] is a span in the same units.
//!
//! Conversions go through `u128` so that large tick counts cannot overflow.

use core::fmt;
use core::ops::Sub;

/// A point in time in monotonic clock ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Converts to nanoseconds.
    #[inline]
    #[must_use]
    pub const fn to_nanos(self, timebase: Timebase) -> u64 {
        timebase.ticks_to_nanos(self.0)
    }

    /// Span between `self` and an earlier time, zero if `earlier` is later.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Ticks {
        Ticks(self.0.saturating_sub(earlier.0))
    }
}

impl Sub for HostTime {
    type Output = Ticks;

    #[inline]
    fn sub(self, rhs: Self) -> Ticks {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Rational ticks-to-nanoseconds factor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator.
    pub numer: u32,
    /// Denominator.
    pub denom: u32,
}

impl Timebase {
    /// Ticks are nanoseconds.
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// Creates a timebase.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    #[inline]
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "timebase denominator must not be zero");
        Self { numer, denom }
    }

    /// Converts a tick count to nanoseconds.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn ticks_to_nanos(self, ticks: u64) -> u64 {
        (ticks as u128 * self.numer as u128 / self.denom as u128) as u64
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}

/// A span of monotonic clock ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    /// Zero-length span.
    pub const ZERO: Self = Self(0);

    /// Converts to a [`std::time::Duration`].
    #[inline]
    #[must_use]
    pub const fn to_std(self, timebase: Timebase) -> std::time::Duration {
        std::time::Duration::from_nanos(timebase.ticks_to_nanos(self.0))
    }
}

impl fmt::Debug for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticks({})", self.0)
    }
}
