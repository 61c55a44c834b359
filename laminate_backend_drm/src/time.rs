// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host clock reads and poll timeouts.

use std::time::Duration;

use laminate_core::time::{HostTime, Timebase};
use rustix::time::{ClockId, Timespec, clock_gettime};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Returns the DRM backend [`Timebase`]: host ticks are nanoseconds.
#[must_use]
pub const fn timebase() -> Timebase {
    Timebase::NANOS
}

/// Returns the current `CLOCK_MONOTONIC` time in nanoseconds.
///
/// Page-flip event timestamps use the same clock.
#[must_use]
pub fn now() -> HostTime {
    timespec_to_host_time(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);
    let ticks = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    HostTime(u64::try_from(ticks).unwrap_or(u64::MAX))
}

/// Converts a poll timeout, saturating absurdly long ones.
pub(crate) fn duration_to_timespec(duration: Duration) -> Timespec {
    Timespec {
        tv_sec: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        tv_nsec: i64::from(duration.subsec_nanos()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_is_nanos_identity() {
        assert_eq!(timebase(), Timebase::NANOS);
    }

    #[test]
    fn now_is_monotonic_non_decreasing() {
        let first = now();
        let second = now();
        assert!(second >= first, "monotonic clock should not go backwards");
    }

    #[test]
    fn timespec_conversion_builds_nanosecond_ticks() {
        let input = Timespec {
            tv_sec: 12,
            tv_nsec: 345_678_901,
        };
        assert_eq!(
            timespec_to_host_time(input),
            HostTime(12 * 1_000_000_000 + 345_678_901)
        );
    }

    #[test]
    fn timespec_conversion_saturates() {
        let input = Timespec {
            tv_sec: i64::MAX,
            tv_nsec: 999_999_999,
        };
        assert_eq!(timespec_to_host_time(input), HostTime(u64::MAX));
    }

    #[test]
    fn poll_timeout_splits_seconds_and_nanos() {
        let ts = duration_to_timespec(Duration::from_millis(1_020));
        assert_eq!(ts.tv_sec, 1);
        assert_eq!(ts.tv_nsec, 20_000_000);
    }
}
