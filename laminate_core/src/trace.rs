// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instrumentation hooks for the commit loop.
//!
//! The scheduler reports each cycle to a [`TraceSink`]: a cycle-begin event,
//! a begin/end pair per [`PhaseKind`], a submit event, a completion event,
//! and a closing [`CycleSummary`]. All sink methods default to no-ops, so a
//! sink only implements the events it needs.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. Without the `trace`
//! feature every `Tracer` method compiles to nothing; with it, each method is
//! one `Option` branch before dispatch.
//!
//! This is separate from the `tracing` log output: sinks receive typed,
//! timestamped events suitable for recording and analysis.

use crate::scheduler::CycleOutcome;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A phase of one commit cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Locking every occupied plane's front buffer.
    Collect,
    /// Framebuffer lookup and batch staging.
    Resolve,
    /// Test-only commit.
    Validate,
    /// Non-blocking commit.
    Submit,
    /// Waiting for completion events.
    Await,
    /// Returning buffers to their chains.
    Release,
}

impl PhaseKind {
    /// Every phase, in cycle order.
    pub const ALL: [Self; 6] = [
        Self::Collect,
        Self::Resolve,
        Self::Validate,
        Self::Submit,
        Self::Await,
        Self::Release,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Collect => 0,
            Self::Resolve => 1,
            Self::Validate => 2,
            Self::Submit => 3,
            Self::Await => 4,
            Self::Release => 5,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Resolve => "resolve",
            Self::Validate => "validate",
            Self::Submit => "submit",
            Self::Await => "await",
            Self::Release => "release",
        }
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a cycle starts.
#[derive(Clone, Copy, Debug)]
pub struct CycleBeginEvent {
    /// Cycle counter, starting at 1.
    pub cycle: u64,
    /// Planes with a bound surface.
    pub occupied_planes: usize,
    /// Host time at the start of the cycle.
    pub timestamp: HostTime,
}

/// Marks the beginning of a cycle phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a cycle phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted after the non-blocking commit is accepted.
#[derive(Clone, Copy, Debug)]
pub struct SubmitEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Plane updates in the batch.
    pub entries: usize,
    /// Whether the preceding test commit failed.
    pub validation_failed: bool,
    /// Host time of submission.
    pub submitted_at: HostTime,
}

/// Emitted when every outstanding completion for a cycle has arrived.
#[derive(Clone, Copy, Debug)]
pub struct CompletionEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Completion events consumed while waiting.
    pub events: usize,
    /// Host time when the last completion was observed.
    pub completed_at: HostTime,
}

/// Per-cycle summary produced by [`CycleSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct CycleSummary {
    /// Cycle counter.
    pub cycle: u64,
    /// How the cycle ended.
    pub outcome: CycleOutcome,
    /// Front buffers locked.
    pub collected: usize,
    /// Plane updates committed.
    pub committed: usize,
    /// Planes dropped from the batch after a registration failure.
    pub skipped_planes: usize,
    /// Buffers returned to their chains.
    pub released: usize,
    /// Duration of each phase in ticks, indexed in [`PhaseKind::ALL`] order
    /// (0 if not reached).
    pub phase_ticks: [u64; 6],
}

impl CycleSummary {
    /// Duration of `phase` in ticks.
    #[must_use]
    pub const fn ticks(&self, phase: PhaseKind) -> u64 {
        self.phase_ticks[phase.index()]
    }
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the commit loop.
///
/// All methods have default no-op implementations.
pub trait TraceSink {
    /// Called when a cycle starts.
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of a cycle phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a cycle phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when a commit is submitted.
    fn on_submit(&mut self, e: &SubmitEvent) {
        _ = e;
    }

    /// Called when a submitted commit completes.
    fn on_completion(&mut self, e: &CompletionEvent) {
        _ = e;
    }

    /// Called with the summary of every cycle that did not fail.
    fn on_cycle_summary(&mut self, s: &CycleSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! tracer_emit {
    ($(#[$meta:meta])* $name:ident, $event:ty, $hook:ident) => {
        $(#[$meta])*
        #[inline]
        pub fn $name(&mut self, e: &$event) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$hook(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    tracer_emit! {
        /// Emits a [`CycleBeginEvent`].
        cycle_begin, CycleBeginEvent, on_cycle_begin
    }

    tracer_emit! {
        /// Emits a [`PhaseBeginEvent`].
        phase_begin, PhaseBeginEvent, on_phase_begin
    }

    tracer_emit! {
        /// Emits a [`PhaseEndEvent`].
        phase_end, PhaseEndEvent, on_phase_end
    }

    tracer_emit! {
        /// Emits a [`SubmitEvent`].
        submit, SubmitEvent, on_submit
    }

    tracer_emit! {
        /// Emits a [`CompletionEvent`].
        completion, CompletionEvent, on_completion
    }

    tracer_emit! {
        /// Emits a [`CycleSummary`].
        cycle_summary, CycleSummary, on_cycle_summary
    }
}

// ---------------------------------------------------------------------------
// CycleSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a cycle and produces a [`CycleSummary`].
#[derive(Debug)]
pub struct CycleSummaryBuilder {
    cycle: u64,
    starts: [Option<HostTime>; 6],
    ends: [Option<HostTime>; 6],
}

impl CycleSummaryBuilder {
    /// Starts a summary for `cycle`.
    #[must_use]
    pub const fn new(cycle: u64) -> Self {
        Self {
            cycle,
            starts: [None; 6],
            ends: [None; 6],
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.starts[phase.index()] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.ends[phase.index()] = Some(t);
    }

    /// Produces the summary.
    #[must_use]
    pub fn finish(
        &self,
        outcome: CycleOutcome,
        collected: usize,
        committed: usize,
        skipped_planes: usize,
        released: usize,
    ) -> CycleSummary {
        let mut phase_ticks = [0; 6];
        for (i, ticks) in phase_ticks.iter_mut().enumerate() {
            if let (Some(start), Some(end)) = (self.starts[i], self.ends[i]) {
                *ticks = end.saturating_duration_since(start).0;
            }
        }
        CycleSummary {
            cycle: self.cycle,
            outcome,
            collected,
            committed,
            skipped_planes,
            released,
            phase_ticks,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_builder_computes_durations() {
        let mut builder = CycleSummaryBuilder::new(9);
        builder.phase_begin(PhaseKind::Collect, HostTime(1_000));
        builder.phase_end(PhaseKind::Collect, HostTime(1_250));
        builder.phase_begin(PhaseKind::Await, HostTime(2_000));
        builder.phase_end(PhaseKind::Await, HostTime(18_000));

        let summary = builder.finish(CycleOutcome::Committed, 3, 3, 0, 3);
        assert_eq!(summary.cycle, 9);
        assert_eq!(summary.ticks(PhaseKind::Collect), 250);
        assert_eq!(summary.ticks(PhaseKind::Await), 16_000);
        assert_eq!(summary.ticks(PhaseKind::Submit), 0, "phase never reached");
    }

    #[test]
    fn phase_names_are_distinct() {
        let mut names: Vec<_> = PhaseKind::ALL.iter().map(|p| p.name()).collect();
        names.dedup();
        assert_eq!(names.len(), PhaseKind::ALL.len());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.cycle_begin(&CycleBeginEvent {
            cycle: 1,
            occupied_planes: 3,
            timestamp: HostTime(0),
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        #[derive(Default)]
        struct RecordingSink {
            phases: Vec<PhaseKind>,
        }
        impl TraceSink for RecordingSink {
            fn on_phase_end(&mut self, e: &PhaseEndEvent) {
                self.phases.push(e.phase);
            }
        }

        let mut sink = RecordingSink::default();
        let mut tracer = Tracer::new(&mut sink);
        tracer.phase_end(&PhaseEndEvent {
            cycle: 1,
            phase: PhaseKind::Submit,
            timestamp: HostTime(5),
        });
        drop(tracer);
        assert_eq!(sink.phases, [PhaseKind::Submit]);
    }
}
