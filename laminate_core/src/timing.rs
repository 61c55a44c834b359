// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-rate measurement.

use crate::time::{HostTime, Timebase};

/// Cycles per frame-rate report used by the reference pipeline.
pub const DEFAULT_FPS_WINDOW: u32 = 60;

/// Counts cycles and reports the average rate once per window.
///
/// ```
/// use laminate_core::time::{HostTime, Timebase};
/// use laminate_core::timing::FrameRateMeter;
///
/// let mut meter = FrameRateMeter::new(2, Timebase::NANOS);
/// assert_eq!(meter.tick(HostTime(0)), None);
/// assert_eq!(meter.tick(HostTime(16_000_000)), None);
/// // Two frames in 32 ms.
/// assert_eq!(meter.tick(HostTime(32_000_000)), Some(62.5));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct FrameRateMeter {
    window: u32,
    timebase: Timebase,
    frames: u32,
    window_start: Option<HostTime>,
}

impl FrameRateMeter {
    /// Creates a meter reporting every `window` frames (at least one).
    #[must_use]
    pub const fn new(window: u32, timebase: Timebase) -> Self {
        Self {
            window: if window == 0 { 1 } else { window },
            timebase,
            frames: 0,
            window_start: None,
        }
    }

    /// Records a frame boundary at `now`.
    ///
    /// The first call only starts the clock. Returns frames per second each
    /// time `window` frames have elapsed since the last report.
    pub fn tick(&mut self, now: HostTime) -> Option<f64> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }
        let nanos = now.saturating_duration_since(start).0;
        let frames = self.frames;
        self.frames = 0;
        self.window_start = Some(now);
        if nanos == 0 {
            return None;
        }
        let nanos = self.timebase.ticks_to_nanos(nanos);
        Some(f64::from(frames) * 1e9 / nanos as f64)
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW, Timebase::NANOS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_window() {
        let mut meter = FrameRateMeter::new(60, Timebase::NANOS);
        let frame = 16_666_667_u64;
        let reports: Vec<f64> = (0..=120)
            .filter_map(|i| meter.tick(HostTime(i * frame)))
            .collect();
        assert_eq!(reports.len(), 2, "two full windows in 120 frames");
        assert!((reports[0] - 60.0).abs() < 0.01, "got {}", reports[0]);
    }

    #[test]
    fn zero_window_is_clamped() {
        let mut meter = FrameRateMeter::new(0, Timebase::NANOS);
        assert_eq!(meter.tick(HostTime(0)), None);
        assert_eq!(meter.tick(HostTime(1_000_000_000)), Some(1.0));
    }

    #[test]
    fn zero_span_reports_nothing() {
        let mut meter = FrameRateMeter::new(1, Timebase::NANOS);
        meter.tick(HostTime(5));
        assert_eq!(meter.tick(HostTime(5)), None, "no time passed");
    }
}
