// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bridge from trace events to the `tracing` log.

use laminate_core::time::Timebase;
use laminate_core::trace::{
    CompletionEvent, CycleBeginEvent, CycleSummary, PhaseEndEvent, PhaseKind, SubmitEvent,
    TraceSink,
};

/// Forwards commit-loop events to `tracing`.
///
/// Phase durations are computed from begin/end pairs, so only phase ends are
/// logged. Cycle summaries go out at `debug`, everything else at `trace`.
#[derive(Debug)]
pub struct TracingSink {
    timebase: Timebase,
    cycle_start: Option<u64>,
    events: u64,
}

impl TracingSink {
    /// Creates a sink that converts ticks with `timebase`.
    #[must_use]
    pub const fn new(timebase: Timebase) -> Self {
        Self {
            timebase,
            cycle_start: None,
            events: 0,
        }
    }

    /// Events forwarded so far.
    #[must_use]
    pub const fn events(&self) -> u64 {
        self.events
    }

    fn since_cycle_start_us(&self, ticks: u64) -> u64 {
        let start = self.cycle_start.unwrap_or(ticks);
        self.timebase.ticks_to_nanos(ticks.saturating_sub(start)) / 1_000
    }
}

impl TraceSink for TracingSink {
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        self.cycle_start = Some(e.timestamp.ticks());
        self.events += 1;
        tracing::trace!(cycle = e.cycle, planes = e.occupied_planes, "cycle begin");
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.events += 1;
        tracing::trace!(
            cycle = e.cycle,
            phase = e.phase.name(),
            at_us = self.since_cycle_start_us(e.timestamp.ticks()),
            "phase end"
        );
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        self.events += 1;
        tracing::trace!(
            cycle = e.cycle,
            entries = e.entries,
            validation_failed = e.validation_failed,
            "commit submitted"
        );
    }

    fn on_completion(&mut self, e: &CompletionEvent) {
        self.events += 1;
        tracing::trace!(
            cycle = e.cycle,
            events = e.events,
            at_us = self.since_cycle_start_us(e.completed_at.ticks()),
            "commit completed"
        );
    }

    fn on_cycle_summary(&mut self, s: &CycleSummary) {
        self.events += 1;
        let us = |phase| self.timebase.ticks_to_nanos(s.ticks(phase)) / 1_000;
        tracing::debug!(
            cycle = s.cycle,
            outcome = ?s.outcome,
            committed = s.committed,
            skipped = s.skipped_planes,
            collect_us = us(PhaseKind::Collect),
            await_us = us(PhaseKind::Await),
            "cycle summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminate_core::time::HostTime;

    #[test]
    fn offsets_are_relative_to_cycle_start() {
        let mut sink = TracingSink::new(Timebase::NANOS);
        sink.on_cycle_begin(&CycleBeginEvent {
            cycle: 1,
            occupied_planes: 3,
            timestamp: HostTime(10_000_000),
        });
        assert_eq!(sink.since_cycle_start_us(10_016_000), 16);
        assert_eq!(
            sink.since_cycle_start_us(9_000_000),
            0,
            "earlier timestamps saturate"
        );
    }

    #[test]
    fn counts_forwarded_events() {
        let mut sink = TracingSink::new(Timebase::NANOS);
        sink.on_phase_end(&PhaseEndEvent {
            cycle: 1,
            phase: PhaseKind::Collect,
            timestamp: HostTime(5),
        });
        sink.on_completion(&CompletionEvent {
            cycle: 1,
            events: 3,
            completed_at: HostTime(9),
        });
        assert_eq!(sink.events(), 2);
    }
}
