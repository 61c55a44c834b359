// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The atomic commit scheduler.
//!
//! One [`CommitScheduler`] owns the frozen [`PlaneRegistry`] and runs one
//! cycle per display refresh:
//!
//! ```text
//!   Collect   lock_front() on every occupied plane        (blocks on producers)
//!   Resolve   FramebufferCache::get_or_create() per buffer (failures skip the plane)
//!   Stage     CommitBatch of (plane, FB_ID, framebuffer)
//!   Validate  test_commit()                                (ValidationPolicy)
//!   Submit    InFlight::begin(); commit()                  (non-blocking)
//!   Await     wait_for_completion() until InFlight is zero (timeout, retry)
//!   Release   FrontBuffer back to its chain                (RetirePolicy)
//! ```
//!
//! The cycle is global: a producer that stops presenting stalls the whole
//! cycle at Collect, so throughput degrades to that of the slowest surface.
//!
//! A commit whose completion wait fails (timeout, wait error, cancellation)
//! is still owned by the hardware. Its buffers stay locked and its
//! [`InFlight`] count stays up; the next cycle first waits out that late
//! completion, then retires the buffers, and only then collects new frames.
//!
//! On the first cycle, when [`CompositorConfig::legacy_bootstrap`] is set,
//! every resolved plane is additionally placed with a legacy
//! [`set_plane`](Device::set_plane) call before the atomic path. This happens
//! at most once per scheduler.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::cancel::{CANCEL_POLL_INTERVAL, CancelToken};
use crate::chain::FrontBuffer;
use crate::config::{CompositorConfig, RetirePolicy, ValidationPolicy};
use crate::device::{CommitBatch, CommitEntry, Device, InFlight, WaitOutcome};
use crate::error::CommitError;
use crate::plane::PlaneRegistry;
use crate::surface::Surface;
use crate::time::HostTime;
use crate::trace::{
    CompletionEvent, CycleBeginEvent, CycleSummaryBuilder, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, SubmitEvent, Tracer,
};

/// How a cycle that did not fail ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CycleOutcome {
    /// The batch was committed and completed.
    Committed,
    /// The test commit failed under [`ValidationPolicy::SkipCycle`].
    ValidationSkipped,
    /// No plane had anything to commit.
    NothingToCommit,
}

/// Result of one [`CommitScheduler::run_cycle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle counter, starting at 1.
    pub cycle: u64,
    /// Front buffers locked in Collect.
    pub collected: usize,
    /// Plane updates in the committed batch.
    pub committed: usize,
    /// Planes dropped after a framebuffer registration failure.
    pub skipped_planes: usize,
    /// Buffers returned to their chains during this cycle.
    pub released: usize,
    /// Whether the test commit failed.
    pub validation_failed: bool,
    /// Completion events consumed in Await.
    pub completions: usize,
    /// How the cycle ended.
    pub outcome: CycleOutcome,
}

/// Totals for [`CommitScheduler::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that committed.
    pub committed: u64,
    /// Cycles that returned an error.
    pub failed: u64,
}

struct Locked<D: Device> {
    surface: Arc<Surface<D>>,
    front: FrontBuffer,
}

impl<D: Device> Locked<D> {
    fn release(self) {
        self.surface.chain().release(self.front);
    }
}

fn release_all<D: Device>(locked: Vec<Locked<D>>) -> usize {
    let n = locked.len();
    locked.into_iter().for_each(Locked::release);
    n
}

fn zero_clock() -> HostTime {
    HostTime(0)
}

/// Drives the per-cycle commit protocol.
pub struct CommitScheduler<D: Device> {
    registry: PlaneRegistry<D>,
    config: CompositorConfig,
    in_flight: InFlight,
    bootstrapped: bool,
    cycle: u64,
    on_screen: Vec<Locked<D>>,
    /// Buffers of a submitted commit whose completion was not observed.
    unconfirmed: Vec<Locked<D>>,
    clock: fn() -> HostTime,
}

impl<D: Device> core::fmt::Debug for CommitScheduler<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommitScheduler")
            .field("config", &self.config)
            .field("cycle", &self.cycle)
            .field("bootstrapped", &self.bootstrapped)
            .field("in_flight", &self.in_flight.pending())
            .field("on_screen", &self.on_screen.len())
            .field("unconfirmed", &self.unconfirmed.len())
            .finish_non_exhaustive()
    }
}

impl<D: Device> CommitScheduler<D> {
    /// Takes ownership of a fully allocated registry.
    ///
    /// Trace timestamps read a zero clock until one is set with
    /// [`with_clock`](Self::with_clock).
    #[must_use]
    pub fn new(registry: PlaneRegistry<D>, config: CompositorConfig) -> Self {
        Self {
            registry,
            config,
            in_flight: InFlight::new(),
            bootstrapped: false,
            cycle: 0,
            on_screen: Vec::new(),
            unconfirmed: Vec::new(),
            clock: zero_clock,
        }
    }

    /// Sets the clock used for trace timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> HostTime) -> Self {
        self.clock = clock;
        self
    }

    /// The registry being scheduled.
    #[must_use]
    pub fn registry(&self) -> &PlaneRegistry<D> {
        &self.registry
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Commits still awaiting their completion event.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.pending()
    }

    /// Whether the legacy first-cycle bootstrap has run.
    #[must_use]
    pub fn bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Cycles started so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    fn phase(&self, tracer: &mut Tracer<'_>, summary: &mut CycleSummaryBuilder, phase: PhaseKind) {
        let timestamp = (self.clock)();
        summary.phase_begin(phase, timestamp);
        tracer.phase_begin(&PhaseBeginEvent {
            cycle: self.cycle,
            phase,
            timestamp,
        });
    }

    fn phase_done(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut CycleSummaryBuilder,
        phase: PhaseKind,
    ) {
        let timestamp = (self.clock)();
        summary.phase_end(phase, timestamp);
        tracer.phase_end(&PhaseEndEvent {
            cycle: self.cycle,
            phase,
            timestamp,
        });
    }

    /// Runs one full cycle.
    ///
    /// Every buffer locked during the cycle is released or retained for
    /// deferred release before this returns, on success and on error.
    pub fn run_cycle(
        &mut self,
        cancel: &CancelToken,
        tracer: &mut Tracer<'_>,
    ) -> Result<CycleReport, CommitError> {
        self.cycle += 1;
        let cycle = self.cycle;
        let mut summary = CycleSummaryBuilder::new(cycle);
        tracer.cycle_begin(&CycleBeginEvent {
            cycle,
            occupied_planes: self.registry.occupied().count(),
            timestamp: (self.clock)(),
        });
        if cancel.is_cancelled() {
            return Err(CommitError::Cancelled);
        }

        let mut report = CycleReport {
            cycle,
            collected: 0,
            committed: 0,
            skipped_planes: 0,
            released: 0,
            validation_failed: false,
            completions: 0,
            outcome: CycleOutcome::NothingToCommit,
        };
        report.released += self.settle_unconfirmed(cancel)?;

        // Collect.
        self.phase(tracer, &mut summary, PhaseKind::Collect);
        let targets: Vec<_> = self
            .registry
            .occupied()
            .filter_map(|plane| Some((plane.fb_property(), Arc::clone(plane.surface()?))))
            .collect();
        let mut locked = Vec::with_capacity(targets.len());
        let mut properties = Vec::with_capacity(targets.len());
        for (property, surface) in targets {
            let Some(front) = surface.chain().lock_front(cancel) else {
                release_all(locked);
                self.phase_done(tracer, &mut summary, PhaseKind::Collect);
                return Err(CommitError::Cancelled);
            };
            locked.push(Locked { surface, front });
            properties.push(property);
        }
        report.collected = locked.len();
        self.phase_done(tracer, &mut summary, PhaseKind::Collect);
        tracing::trace!(cycle, collected = report.collected, "collected front buffers");

        // Resolve and stage.
        self.phase(tracer, &mut summary, PhaseKind::Resolve);
        let mut batch = CommitBatch::with_capacity(locked.len());
        let mut staged = Vec::with_capacity(locked.len());
        for (entry, property) in locked.into_iter().zip(properties) {
            match self.registry.cache().get_or_create(entry.front.info()) {
                Ok(framebuffer) => {
                    batch.push(CommitEntry {
                        plane: entry.surface.plane(),
                        property,
                        framebuffer,
                    });
                    staged.push(entry);
                }
                Err(err) => {
                    tracing::warn!(
                        cycle,
                        plane = ?entry.surface.plane(),
                        %err,
                        "skipping plane this cycle"
                    );
                    report.skipped_planes += 1;
                    entry.release();
                    report.released += 1;
                }
            }
        }
        self.phase_done(tracer, &mut summary, PhaseKind::Resolve);

        if batch.is_empty() {
            tracer.cycle_summary(&summary.finish(
                report.outcome,
                report.collected,
                0,
                report.skipped_planes,
                report.released,
            ));
            return Ok(report);
        }

        if self.config.legacy_bootstrap && !self.bootstrapped {
            self.bootstrap(&batch, &staged);
        }

        // Validate.
        self.phase(tracer, &mut summary, PhaseKind::Validate);
        let validation = self.registry.device().test_commit(&batch);
        self.phase_done(tracer, &mut summary, PhaseKind::Validate);
        if let Err(err) = validation {
            report.validation_failed = true;
            match self.config.validation {
                ValidationPolicy::Proceed => {
                    tracing::warn!(cycle, %err, "test commit failed; committing anyway");
                }
                ValidationPolicy::SkipCycle => {
                    tracing::warn!(cycle, %err, "test commit failed; skipping cycle");
                    report.released += release_all(staged);
                    report.outcome = CycleOutcome::ValidationSkipped;
                    tracer.cycle_summary(&summary.finish(
                        report.outcome,
                        report.collected,
                        0,
                        report.skipped_planes,
                        report.released,
                    ));
                    return Ok(report);
                }
            }
        }

        // Submit.
        self.phase(tracer, &mut summary, PhaseKind::Submit);
        self.in_flight.begin();
        if let Err(err) = self.registry.device().commit(&batch) {
            self.in_flight.rollback();
            release_all(staged);
            self.phase_done(tracer, &mut summary, PhaseKind::Submit);
            return Err(CommitError::Submit(err));
        }
        self.phase_done(tracer, &mut summary, PhaseKind::Submit);
        tracer.submit(&SubmitEvent {
            cycle,
            entries: batch.len(),
            validation_failed: report.validation_failed,
            submitted_at: (self.clock)(),
        });

        // Await.
        self.phase(tracer, &mut summary, PhaseKind::Await);
        match self.await_completion(cancel) {
            Ok(events) => report.completions = events,
            Err(err) => {
                // The flip may still land; keep its buffers until it does.
                tracing::warn!(
                    cycle,
                    %err,
                    buffers = staged.len(),
                    "commit completion not observed; holding buffers"
                );
                self.unconfirmed = staged;
                self.phase_done(tracer, &mut summary, PhaseKind::Await);
                return Err(err);
            }
        }
        self.phase_done(tracer, &mut summary, PhaseKind::Await);
        tracer.completion(&CompletionEvent {
            cycle,
            events: report.completions,
            completed_at: (self.clock)(),
        });

        // Release.
        self.phase(tracer, &mut summary, PhaseKind::Release);
        report.released += self.retire(staged);
        self.phase_done(tracer, &mut summary, PhaseKind::Release);

        report.committed = batch.len();
        report.outcome = CycleOutcome::Committed;
        tracer.cycle_summary(&summary.finish(
            report.outcome,
            report.collected,
            report.committed,
            report.skipped_planes,
            report.released,
        ));
        tracing::trace!(
            cycle,
            committed = report.committed,
            released = report.released,
            "cycle committed"
        );
        Ok(report)
    }

    /// Waits for a completion left outstanding by an earlier cycle, then
    /// retires that commit's buffers. Returns how many were released.
    fn settle_unconfirmed(&mut self, cancel: &CancelToken) -> Result<usize, CommitError> {
        if self.in_flight.pending() > 0 {
            let events = self.await_completion(cancel)?;
            tracing::debug!(
                cycle = self.cycle,
                events,
                buffers = self.unconfirmed.len(),
                "late commit completion arrived"
            );
        }
        if self.unconfirmed.is_empty() {
            return Ok(0);
        }
        let confirmed = core::mem::take(&mut self.unconfirmed);
        Ok(self.retire(confirmed))
    }

    /// Applies the [`RetirePolicy`] to the buffers of a completed commit.
    ///
    /// Under [`RetirePolicy::Deferred`] a buffer held from an earlier cycle
    /// is released only once `shown` carries a newer buffer for its plane;
    /// planes this commit did not touch keep their buffer on screen.
    fn retire(&mut self, shown: Vec<Locked<D>>) -> usize {
        match self.config.retire {
            RetirePolicy::Immediate => release_all(shown),
            RetirePolicy::Deferred => {
                let (replaced, kept): (Vec<_>, Vec<_>) = core::mem::take(&mut self.on_screen)
                    .into_iter()
                    .partition(|old| {
                        shown
                            .iter()
                            .any(|new| new.surface.plane() == old.surface.plane())
                    });
                self.on_screen = kept;
                self.on_screen.extend(shown);
                release_all(replaced)
            }
        }
    }

    fn bootstrap(&mut self, batch: &CommitBatch, staged: &[Locked<D>]) {
        for (entry, locked) in batch.entries().iter().zip(staged) {
            let rect = locked.surface.rect();
            if let Err(err) = self
                .registry
                .device()
                .set_plane(entry.plane, entry.framebuffer, rect)
            {
                tracing::warn!(plane = ?entry.plane, %err, "legacy plane bootstrap failed");
            }
        }
        self.bootstrapped = true;
        tracing::debug!(planes = batch.len(), "legacy plane bootstrap done");
    }

    fn await_completion(&self, cancel: &CancelToken) -> Result<usize, CommitError> {
        let deadline = self
            .config
            .completion_timeout
            .map(|timeout| Instant::now() + timeout);
        let retry = self.config.wait_retry;
        let mut attempt = 0;
        let mut events = 0;
        loop {
            if self.in_flight.pending() == 0 {
                return Ok(events);
            }
            if cancel.is_cancelled() {
                return Err(CommitError::Cancelled);
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CommitError::Timeout {
                            pending: self.in_flight.pending(),
                        });
                    }
                    (deadline - now).min(CANCEL_POLL_INTERVAL)
                }
                None => CANCEL_POLL_INTERVAL,
            };
            match self
                .registry
                .device()
                .wait_for_completion(&self.in_flight, Some(slice))
            {
                Ok(WaitOutcome::Events(n)) => {
                    events += n;
                    attempt = 0;
                }
                Ok(WaitOutcome::TimedOut) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if attempt < retry.max_retries => {
                    let backoff = retry.backoff(attempt);
                    tracing::warn!(%err, attempt, ?backoff, "completion wait failed; retrying");
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(err) => return Err(CommitError::Wait(err)),
            }
        }
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// Cycle errors are logged and the loop continues, unless
    /// [`CompositorConfig::max_consecutive_failures`] is exceeded, in which
    /// case the last error is returned. Returns immediately when no plane is
    /// occupied. Buffers retained for deferred release are released on exit.
    pub fn run(
        &mut self,
        cancel: &CancelToken,
        tracer: &mut Tracer<'_>,
        mut on_cycle: impl FnMut(&CycleReport),
    ) -> Result<RunSummary, CommitError> {
        let mut summary = RunSummary::default();
        if self.registry.occupied().next().is_none() {
            tracing::warn!("no occupied planes; nothing to schedule");
            return Ok(summary);
        }
        tracing::info!(
            planes = self.registry.occupied().count(),
            config = ?self.config,
            "commit loop started"
        );
        let mut consecutive_failures = 0_u32;
        let result = loop {
            if cancel.is_cancelled() {
                break Ok(summary);
            }
            summary.cycles += 1;
            match self.run_cycle(cancel, tracer) {
                Ok(report) => {
                    consecutive_failures = 0;
                    if report.outcome == CycleOutcome::Committed {
                        summary.committed += 1;
                    }
                    on_cycle(&report);
                }
                Err(CommitError::Cancelled) => break Ok(summary),
                Err(err) => {
                    summary.failed += 1;
                    consecutive_failures += 1;
                    tracing::error!(cycle = self.cycle, %err, "commit cycle failed");
                    if self
                        .config
                        .max_consecutive_failures
                        .is_some_and(|max| consecutive_failures >= max)
                    {
                        break Err(err);
                    }
                }
            }
        };
        self.release_on_screen();
        tracing::info!(
            cycles = summary.cycles,
            committed = summary.committed,
            failed = summary.failed,
            "commit loop stopped"
        );
        result
    }

    /// Releases buffers retained by [`RetirePolicy::Deferred`], and those of
    /// a commit whose completion was never observed.
    ///
    /// Only call this once no further flips are expected, such as on
    /// shutdown. Returns how many were released.
    pub fn release_on_screen(&mut self) -> usize {
        release_all(core::mem::take(&mut self.on_screen))
            + release_all(core::mem::take(&mut self.unconfirmed))
    }
}

impl<D: Device> Drop for CommitScheduler<D> {
    fn drop(&mut self) {
        self.release_on_screen();
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::chain::SlotState;
    use crate::geometry::SurfaceRect;
    use crate::testing::{FakeDevice, WaitStep, fake_planes};

    struct Fixture {
        device: Arc<FakeDevice>,
        surfaces: Vec<Arc<Surface<FakeDevice>>>,
        scheduler: CommitScheduler<FakeDevice>,
    }

    fn fixture(tiles: usize, config: CompositorConfig) -> Fixture {
        let device = Arc::new(FakeDevice::new(1920, 1080));
        let mut registry =
            PlaneRegistry::from_discovery(Arc::clone(&device), fake_planes(1, 4, 1), 4);
        let surfaces = (0..tiles)
            .map(|i| {
                let i = i32::try_from(i).unwrap();
                registry
                    .allocate(SurfaceRect::new(i * 96, i * 54, 96, 54), config.chain_length)
                    .unwrap()
            })
            .collect();
        Fixture {
            device,
            surfaces,
            scheduler: CommitScheduler::new(registry, config),
        }
    }

    fn present_all(surfaces: &[Arc<Surface<FakeDevice>>]) {
        let cancel = CancelToken::new();
        for surface in surfaces {
            let back = surface.chain().acquire_back(&cancel).unwrap();
            surface.chain().present(back);
        }
    }

    fn locked(surface: &Surface<FakeDevice>) -> usize {
        surface
            .chain()
            .states()
            .iter()
            .filter(|s| **s == SlotState::Locked)
            .count()
    }

    fn all_free(surface: &Surface<FakeDevice>) -> bool {
        surface
            .chain()
            .states()
            .iter()
            .all(|s| *s == SlotState::Free)
    }

    #[test]
    fn three_surfaces_collect_commit_and_release_three() {
        let mut fx = fixture(3, CompositorConfig::reference());
        present_all(&fx.surfaces);

        let report = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none())
            .unwrap();
        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(report.collected, 3, "one buffer per occupied plane");
        assert_eq!(report.committed, 3);
        assert_eq!(report.released, 3, "every collected buffer released");
        assert_eq!(report.completions, 1);

        let log = fx.device.log();
        assert_eq!(log.commits.len(), 1, "one atomic commit per cycle");
        assert_eq!(log.commits[0].len(), 3, "batch covers all three planes");
        assert_eq!(fx.scheduler.in_flight(), 0);
        assert!(fx.surfaces.iter().all(|s| all_free(s)));
    }

    #[test]
    fn batch_binds_each_plane_to_its_fb_property() {
        let mut fx = fixture(2, CompositorConfig::reference());
        present_all(&fx.surfaces);
        fx.scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none())
            .unwrap();

        let log = fx.device.log();
        for (entry, plane) in log.commits[0].entries().iter().zip(fx.scheduler.registry().occupied()) {
            assert_eq!(entry.plane, plane.id());
            assert_eq!(entry.property, plane.fb_property(), "FB_ID of the same plane");
        }
    }

    #[test]
    fn framebuffers_are_registered_once_across_cycles() {
        let mut fx = fixture(1, CompositorConfig::reference());
        let cancel = CancelToken::new();
        for _ in 0..6 {
            present_all(&fx.surfaces);
            fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        }
        assert_eq!(
            fx.scheduler.registry().cache().registrations(),
            1,
            "a lone producer keeps reusing the first free slot"
        );
        assert_eq!(fx.device.log().framebuffers_added, 1);
    }

    #[test]
    fn legacy_bootstrap_runs_once() {
        let mut fx = fixture(2, CompositorConfig::reference());
        let cancel = CancelToken::new();
        for _ in 0..3 {
            present_all(&fx.surfaces);
            fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        }
        let log = fx.device.log();
        assert_eq!(log.set_plane_calls.len(), 2, "one legacy call per plane, first cycle only");
        assert_eq!(log.set_plane_calls[0].2, fx.surfaces[0].rect());
        assert!(fx.scheduler.bootstrapped());
    }

    #[test]
    fn hardened_preset_skips_bootstrap() {
        let mut fx = fixture(1, CompositorConfig::hardened());
        present_all(&fx.surfaces);
        fx.scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none())
            .unwrap();
        assert!(fx.device.log().set_plane_calls.is_empty());
    }

    #[test]
    fn failed_validation_proceeds_by_default() {
        let mut fx = fixture(2, CompositorConfig::reference());
        fx.device.fail_test_commits(true);
        present_all(&fx.surfaces);
        let report = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none())
            .unwrap();
        assert!(report.validation_failed);
        assert_eq!(report.outcome, CycleOutcome::Committed, "reference behavior commits anyway");
        assert_eq!(fx.device.log().commits.len(), 1);
    }

    #[test]
    fn failed_validation_can_skip_cycle() {
        let config = CompositorConfig {
            validation: ValidationPolicy::SkipCycle,
            ..CompositorConfig::reference()
        };
        let mut fx = fixture(2, config);
        fx.device.fail_test_commits(true);
        present_all(&fx.surfaces);
        let report = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none())
            .unwrap();
        assert_eq!(report.outcome, CycleOutcome::ValidationSkipped);
        assert_eq!(report.released, 2, "skipped cycle still releases");
        assert!(fx.device.log().commits.is_empty(), "nothing submitted");
        assert!(fx.surfaces.iter().all(|s| all_free(s)));
    }

    #[test]
    fn registration_failure_skips_only_that_plane() {
        let mut fx = fixture(3, CompositorConfig::reference());
        present_all(&fx.surfaces);
        let cancel = CancelToken::new();
        let failing = {
            let front = fx.surfaces[1].chain().lock_front(&cancel).unwrap();
            let id = front.info().id;
            // Put the frame back so the scheduler collects it.
            fx.surfaces[1].chain().release(front);
            let back = fx.surfaces[1].chain().acquire_back(&cancel).unwrap();
            let again = back.info().id;
            fx.surfaces[1].chain().present(back);
            assert_eq!(id, again, "first free slot is reused");
            id
        };
        fx.device.fail_framebuffer_for(failing);

        let report = fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        assert_eq!(report.collected, 3);
        assert_eq!(report.skipped_planes, 1);
        assert_eq!(report.committed, 2, "other planes stay live");
        assert_eq!(report.released, 3, "the skipped buffer is released too");
        assert!(all_free(&fx.surfaces[1]));
    }

    #[test]
    fn submit_failure_rolls_back_in_flight() {
        let mut fx = fixture(2, CompositorConfig::reference());
        fx.device.fail_commits(true);
        present_all(&fx.surfaces);
        let result = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none());
        assert!(matches!(result, Err(CommitError::Submit(_))));
        assert_eq!(fx.scheduler.in_flight(), 0, "counter rolled back");
        assert!(fx.surfaces.iter().all(|s| all_free(s)), "buffers released on error");
    }

    #[test]
    fn stalled_completion_times_out_and_keeps_buffers() {
        let config = CompositorConfig {
            completion_timeout: Some(Duration::from_millis(30)),
            ..CompositorConfig::reference()
        };
        let mut fx = fixture(1, config);
        fx.device.stall_completions(true);
        present_all(&fx.surfaces);
        let result = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none());
        assert!(matches!(result, Err(CommitError::Timeout { pending: 1 })));
        assert_eq!(fx.scheduler.in_flight(), 1, "the flip is still outstanding");
        assert_eq!(locked(&fx.surfaces[0]), 1, "buffer may still be scanned out");

        assert_eq!(fx.scheduler.release_on_screen(), 1, "shutdown releases it");
        assert!(all_free(&fx.surfaces[0]));
    }

    #[test]
    fn late_completion_is_settled_before_the_next_commit() {
        let config = CompositorConfig {
            completion_timeout: Some(Duration::from_millis(30)),
            ..CompositorConfig::reference()
        };
        let mut fx = fixture(1, config);
        let cancel = CancelToken::new();
        fx.device.stall_completions(true);
        present_all(&fx.surfaces);
        assert!(matches!(
            fx.scheduler.run_cycle(&cancel, &mut Tracer::none()),
            Err(CommitError::Timeout { .. })
        ));

        // Still no event: nothing new may be submitted.
        present_all(&fx.surfaces);
        assert!(matches!(
            fx.scheduler.run_cycle(&cancel, &mut Tracer::none()),
            Err(CommitError::Timeout { pending: 1 })
        ));
        assert_eq!(fx.device.log().commits.len(), 1, "no commit on top of a pending one");
        assert_eq!(locked(&fx.surfaces[0]), 1);

        fx.device.stall_completions(false);
        let report = fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(report.completions, 1, "late event is not credited to this commit");
        assert_eq!(report.released, 2, "late buffer and this cycle's buffer");
        assert_eq!(fx.device.log().commits.len(), 2);
        assert_eq!(fx.scheduler.in_flight(), 0);
        assert!(all_free(&fx.surfaces[0]));
    }

    #[test]
    fn transient_wait_errors_are_retried() {
        let mut fx = fixture(1, CompositorConfig::hardened());
        fx.device.script_wait([
            WaitStep::Fail(io::ErrorKind::Other),
            WaitStep::Fail(io::ErrorKind::Interrupted),
            WaitStep::Fail(io::ErrorKind::Other),
        ]);
        present_all(&fx.surfaces);
        let report = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none())
            .unwrap();
        assert_eq!(report.outcome, CycleOutcome::Committed);
    }

    #[test]
    fn wait_errors_past_retry_budget_surface() {
        let mut fx = fixture(1, CompositorConfig::reference());
        fx.device.script_wait([WaitStep::Fail(io::ErrorKind::Other)]);
        present_all(&fx.surfaces);
        let result = fx
            .scheduler
            .run_cycle(&CancelToken::new(), &mut Tracer::none());
        assert!(matches!(result, Err(CommitError::Wait(_))), "reference never retries");
        assert!(all_free(&fx.surfaces[0]));
    }

    #[test]
    fn deferred_release_holds_buffers_one_cycle() {
        let mut fx = fixture(1, CompositorConfig::hardened());
        let cancel = CancelToken::new();

        present_all(&fx.surfaces);
        let first = fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        assert_eq!(first.released, 0, "first flip keeps its buffer on screen");
        assert_eq!(locked(&fx.surfaces[0]), 1);

        present_all(&fx.surfaces);
        let second = fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        assert_eq!(second.released, 1, "previous cycle's buffer retired");

        assert_eq!(fx.scheduler.release_on_screen(), 1);
        assert!(all_free(&fx.surfaces[0]));
    }

    #[test]
    fn deferred_release_keeps_buffers_of_skipped_planes() {
        let mut fx = fixture(2, CompositorConfig::hardened());
        let cancel = CancelToken::new();
        present_all(&fx.surfaces);
        fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();

        // The second plane's next frame cannot be registered.
        let back = fx.surfaces[0].chain().acquire_back(&cancel).unwrap();
        fx.surfaces[0].chain().present(back);
        let back = fx.surfaces[1].chain().acquire_back(&cancel).unwrap();
        fx.device.fail_framebuffer_for(back.info().id);
        fx.surfaces[1].chain().present(back);

        let report = fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        assert_eq!(report.committed, 1);
        assert_eq!(report.skipped_planes, 1);
        assert_eq!(
            report.released, 2,
            "first plane's old buffer and the unregistered frame"
        );
        assert_eq!(locked(&fx.surfaces[0]), 1, "new buffer on screen");
        assert_eq!(
            locked(&fx.surfaces[1]),
            1,
            "untouched plane keeps scanning out its old buffer"
        );

        assert_eq!(fx.scheduler.release_on_screen(), 2);
        assert!(fx.surfaces.iter().all(|s| all_free(s)));
    }

    #[cfg(feature = "trace")]
    #[test]
    fn failed_submit_closes_its_phase() {
        use crate::trace::TraceSink;

        #[derive(Default)]
        struct PhaseBalance {
            open: Vec<PhaseKind>,
            unmatched_end: bool,
        }
        impl TraceSink for PhaseBalance {
            fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
                self.open.push(e.phase);
            }
            fn on_phase_end(&mut self, e: &PhaseEndEvent) {
                if self.open.pop() != Some(e.phase) {
                    self.unmatched_end = true;
                }
            }
        }

        let mut fx = fixture(1, CompositorConfig::reference());
        fx.device.fail_commits(true);
        present_all(&fx.surfaces);
        let mut sink = PhaseBalance::default();
        let mut tracer = Tracer::new(&mut sink);
        let result = fx.scheduler.run_cycle(&CancelToken::new(), &mut tracer);
        drop(tracer);
        assert!(matches!(result, Err(CommitError::Submit(_))));
        assert!(sink.open.is_empty(), "phases left open: {:?}", sink.open);
        assert!(!sink.unmatched_end, "every end matches its begin");
    }

    #[test]
    fn cancelled_collect_releases_partial_locks() {
        let mut fx = fixture(2, CompositorConfig::reference());
        let cancel = CancelToken::new();
        // Only the first surface has a frame; collect blocks on the second.
        let back = fx.surfaces[0].chain().acquire_back(&cancel).unwrap();
        fx.surfaces[0].chain().present(back);

        let canceller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            canceller.cancel();
        });
        let result = fx.scheduler.run_cycle(&cancel, &mut Tracer::none());
        handle.join().unwrap();
        assert!(matches!(result, Err(CommitError::Cancelled)));
        assert!(all_free(&fx.surfaces[0]), "partial lock released");
    }

    #[test]
    fn slowest_producer_gates_the_cycle() {
        let mut fx = fixture(2, CompositorConfig::reference());
        let cancel = CancelToken::new();
        let back = fx.surfaces[0].chain().acquire_back(&cancel).unwrap();
        fx.surfaces[0].chain().present(back);

        let slow = Arc::clone(&fx.surfaces[1]);
        let token = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            let back = slow.chain().acquire_back(&token).unwrap();
            slow.chain().present(back);
        });
        let started = Instant::now();
        let report = fx.scheduler.run_cycle(&cancel, &mut Tracer::none()).unwrap();
        handle.join().unwrap();
        assert_eq!(report.committed, 2);
        assert!(
            started.elapsed() >= Duration::from_millis(50),
            "cycle waits for the slow producer"
        );
    }

    #[test]
    fn empty_registry_run_returns_immediately() {
        let device = Arc::new(FakeDevice::new(1920, 1080));
        let registry = PlaneRegistry::from_discovery(device, fake_planes(1, 4, 0), 4);
        let mut scheduler = CommitScheduler::new(registry, CompositorConfig::reference());
        let summary = scheduler
            .run(&CancelToken::new(), &mut Tracer::none(), |_| {})
            .unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn run_stops_after_failure_budget() {
        let config = CompositorConfig {
            max_consecutive_failures: Some(3),
            ..CompositorConfig::reference()
        };
        let mut fx = fixture(1, config);
        fx.device.fail_commits(true);

        // Keep the producer side fed so collect never blocks.
        let cancel = CancelToken::new();
        let surface = Arc::clone(&fx.surfaces[0]);
        let token = cancel.clone();
        let producer = thread::spawn(move || {
            while let Some(back) = surface.chain().acquire_back(&token) {
                surface.chain().present(back);
                thread::sleep(Duration::from_millis(1));
            }
        });

        let result = fx.scheduler.run(&cancel, &mut Tracer::none(), |_| {});
        cancel.cancel();
        producer.join().unwrap();
        assert!(matches!(result, Err(CommitError::Submit(_))));
        assert_eq!(fx.scheduler.cycles(), 3);
    }

    #[test]
    fn run_ends_on_cancel() {
        let mut fx = fixture(1, CompositorConfig::reference());
        let cancel = CancelToken::new();
        let surface = Arc::clone(&fx.surfaces[0]);
        let token = cancel.clone();
        let producer = thread::spawn(move || {
            while let Some(back) = surface.chain().acquire_back(&token) {
                surface.chain().present(back);
                thread::sleep(Duration::from_millis(1));
            }
        });

        let stopper = cancel.clone();
        let summary = fx
            .scheduler
            .run(&cancel, &mut Tracer::none(), |report| {
                if report.cycle == 5 {
                    stopper.cancel();
                }
            })
            .unwrap();
        producer.join().unwrap();
        assert_eq!(summary.committed, 5);
        assert_eq!(summary.failed, 0);
    }
}
