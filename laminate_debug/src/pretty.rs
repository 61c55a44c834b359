// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use laminate_core::time::{HostTime, Timebase};
use laminate_core::trace::{
    CompletionEvent, CycleBeginEvent, CycleSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    SubmitEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
    phases: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .field("phases", &self.phases)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self::with_writer(Box::new(std::io::stderr()), timebase)
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self {
            writer,
            timebase,
            phases: true,
        }
    }

    /// Suppresses the per-phase begin/end lines; everything else is still
    /// written.
    #[must_use]
    pub fn without_phases(mut self) -> Self {
        self.phases = false;
        self
    }

    /// Consumes the sink and returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[cycle] {} planes={} at {:.1}µs",
            e.cycle,
            e.occupied_planes,
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        if self.phases {
            let _ = writeln!(
                self.writer,
                "[phase:begin] cycle={} {} at {:.1}µs",
                e.cycle,
                e.phase.name(),
                self.host_us(e.timestamp),
            );
        }
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        if self.phases {
            let _ = writeln!(
                self.writer,
                "[phase:end] cycle={} {} at {:.1}µs",
                e.cycle,
                e.phase.name(),
                self.host_us(e.timestamp),
            );
        }
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        let validation = if e.validation_failed { "FAILED" } else { "ok" };
        let _ = writeln!(
            self.writer,
            "[submit] cycle={} entries={} validation={validation} at {:.1}µs",
            e.cycle,
            e.entries,
            self.host_us(e.submitted_at),
        );
    }

    fn on_completion(&mut self, e: &CompletionEvent) {
        let _ = writeln!(
            self.writer,
            "[complete] cycle={} events={} at {:.1}µs",
            e.cycle,
            e.events,
            self.host_us(e.completed_at),
        );
    }

    fn on_cycle_summary(&mut self, s: &CycleSummary) {
        let _ = write!(
            self.writer,
            "[summary] cycle={} outcome={:?} collected={} committed={} skipped={} released={}",
            s.cycle, s.outcome, s.collected, s.committed, s.skipped_planes, s.released,
        );
        for phase in PhaseKind::ALL {
            let _ = write!(
                self.writer,
                " {}={:.1}µs",
                phase.name(),
                self.ticks_to_us(s.ticks(phase)),
            );
        }
        let _ = writeln!(self.writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laminate_core::scheduler::CycleOutcome;

    fn sink() -> PrettyPrintSink<Vec<u8>> {
        PrettyPrintSink::with_writer(Vec::new(), Timebase::NANOS)
    }

    #[test]
    fn pretty_print_cycle_begin() {
        let mut sink = sink();
        sink.on_cycle_begin(&CycleBeginEvent {
            cycle: 1,
            occupied_planes: 3,
            timestamp: HostTime(1_000_000),
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("[cycle] 1"), "got: {output}");
        assert!(output.contains("planes=3"), "got: {output}");
        assert!(output.contains("1000.0µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_summary_lists_every_phase() {
        let mut sink = sink();
        let mut phase_ticks = [0; 6];
        phase_ticks[4] = 16_000;
        sink.on_cycle_summary(&CycleSummary {
            cycle: 7,
            outcome: CycleOutcome::Committed,
            collected: 3,
            committed: 3,
            skipped_planes: 0,
            released: 3,
            phase_ticks,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("outcome=Committed"), "got: {output}");
        assert!(output.contains("await=16.0µs"), "got: {output}");
        for phase in PhaseKind::ALL {
            assert!(output.contains(phase.name()), "missing {}: {output}", phase.name());
        }
        assert_eq!(output.lines().count(), 1, "summary should be a single line");
    }

    #[test]
    fn phase_lines_can_be_suppressed() {
        let mut sink = sink().without_phases();
        sink.on_phase_begin(&PhaseBeginEvent {
            cycle: 2,
            phase: PhaseKind::Await,
            timestamp: HostTime(5),
        });
        sink.on_submit(&SubmitEvent {
            cycle: 2,
            entries: 3,
            validation_failed: true,
            submitted_at: HostTime(10),
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(!output.contains("[phase"), "got: {output}");
        assert!(output.contains("validation=FAILED"), "got: {output}");
    }
}
