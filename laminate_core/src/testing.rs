// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory device for tests.
//!
//! [`FakeDevice`] implements [`Device`] without hardware. Buffer memory lives
//! inside the device, every driver call is recorded in a [`FakeLog`], and
//! individual calls can be made to fail. Each accepted commit queues one
//! completion event, delivered by the next
//! [`wait_for_completion`](Device::wait_for_completion).

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::device::{
    BYTES_PER_PIXEL, Buffer, BufferInfo, CommitBatch, Device, InFlight, PixelTarget, WaitOutcome,
};
use crate::geometry::SurfaceRect;
use crate::id::{BufferId, ConnectorId, FramebufferId, PipeId, PlaneId, PropertyId};
use crate::output::Output;
use crate::plane::{PlaneDescriptor, PlaneKind};

/// A buffer handed out by [`FakeDevice`]. The pixels stay in the device.
#[derive(Debug)]
pub struct FakeBuffer {
    info: BufferInfo,
}

impl Buffer for FakeBuffer {
    fn info(&self) -> BufferInfo {
        self.info
    }
}

/// A scripted response for one [`Device::wait_for_completion`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStep {
    /// Fail with this error kind.
    Fail(io::ErrorKind),
    /// Return [`WaitOutcome::TimedOut`] without delivering anything.
    Idle,
}

/// Everything the fake driver was asked to do.
#[derive(Clone, Debug, Default)]
pub struct FakeLog {
    /// Buffers allocated.
    pub buffers_allocated: usize,
    /// Buffers destroyed, in order.
    pub destroyed_buffers: Vec<BufferId>,
    /// Successful framebuffer registrations.
    pub framebuffers_added: usize,
    /// Framebuffers removed, in order.
    pub framebuffers_removed: Vec<FramebufferId>,
    /// Buffers destroyed while a framebuffer still referenced them.
    pub framebuffers_outliving_buffer: usize,
    /// `(plane, property, value)` immediate property writes.
    pub property_writes: Vec<(PlaneId, PropertyId, u64)>,
    /// Legacy plane placements.
    pub set_plane_calls: Vec<(PlaneId, FramebufferId, SurfaceRect)>,
    /// Test-only commits attempted.
    pub test_commits: usize,
    /// Accepted commits.
    pub commits: Vec<CommitBatch>,
}

#[derive(Default)]
struct Faults {
    allocation_budget: Option<usize>,
    framebuffers: bool,
    framebuffers_for: HashSet<BufferId>,
    properties: bool,
    test_commits: bool,
    commits: bool,
    stall: bool,
    wait_script: VecDeque<WaitStep>,
}

#[derive(Default)]
struct State {
    log: FakeLog,
    faults: Faults,
    memory: HashMap<BufferId, (BufferInfo, Vec<u8>)>,
    framebuffers: HashMap<FramebufferId, BufferId>,
    queued_completions: usize,
}

/// A [`Device`] backed by memory.
pub struct FakeDevice {
    output: Output,
    next_buffer: AtomicU64,
    next_framebuffer: AtomicU32,
    state: Mutex<State>,
}

impl core::fmt::Debug for FakeDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FakeDevice")
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl FakeDevice {
    /// Creates a device with a `width` x `height` output on connector 24.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            output: Output {
                connector: ConnectorId(24),
                pipe: PipeId(40),
                width,
                height,
            },
            next_buffer: AtomicU64::new(1),
            next_framebuffer: AtomicU32::new(100),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A snapshot of the call log.
    #[must_use]
    pub fn log(&self) -> FakeLog {
        self.state().log.clone()
    }

    /// Reads one pixel of a live buffer.
    #[must_use]
    pub fn pixel(&self, buffer: BufferId, x: u32, y: u32) -> Option<u32> {
        let mut state = self.state();
        let (info, memory) = state.memory.get_mut(&buffer)?;
        PixelTarget::new(memory, info.width, info.height, info.stride)?.pixel(x, y)
    }

    /// Lets `n` more buffer allocations succeed, then fails the rest.
    /// `None` lifts the limit.
    pub fn fail_allocations_after(&self, n: Option<usize>) {
        self.state().faults.allocation_budget = n;
    }

    /// Fails every framebuffer registration while set.
    pub fn fail_framebuffers(&self, fail: bool) {
        self.state().faults.framebuffers = fail;
    }

    /// Fails framebuffer registration for one buffer.
    pub fn fail_framebuffer_for(&self, buffer: BufferId) {
        self.state().faults.framebuffers_for.insert(buffer);
    }

    /// Fails immediate property writes while set.
    pub fn fail_properties(&self, fail: bool) {
        self.state().faults.properties = fail;
    }

    /// Fails test-only commits while set.
    pub fn fail_test_commits(&self, fail: bool) {
        self.state().faults.test_commits = fail;
    }

    /// Fails real commits while set.
    pub fn fail_commits(&self, fail: bool) {
        self.state().faults.commits = fail;
    }

    /// Withholds every completion event while set.
    pub fn stall_completions(&self, stall: bool) {
        self.state().faults.stall = stall;
    }

    /// Queues scripted responses for upcoming waits. Once the script runs
    /// out, waits deliver queued completions normally.
    pub fn script_wait(&self, steps: impl IntoIterator<Item = WaitStep>) {
        self.state().faults.wait_script.extend(steps);
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("injected {what} failure"))
}

impl Device for FakeDevice {
    type Buffer = FakeBuffer;

    fn output(&self) -> Output {
        self.output
    }

    fn allocate_buffer(&self, width: u32, height: u32) -> io::Result<FakeBuffer> {
        let mut state = self.state();
        match &mut state.faults.allocation_budget {
            Some(0) => return Err(injected("allocation")),
            Some(n) => *n -= 1,
            None => {}
        }
        let id = BufferId(self.next_buffer.fetch_add(1, Ordering::Relaxed));
        let stride = width * BYTES_PER_PIXEL;
        let info = BufferInfo {
            id,
            width,
            height,
            stride,
            handle: u32::try_from(id.raw()).unwrap_or(u32::MAX),
        };
        state
            .memory
            .insert(id, (info, vec![0; stride as usize * height as usize]));
        state.log.buffers_allocated += 1;
        Ok(FakeBuffer { info })
    }

    fn map_buffer(
        &self,
        buffer: &mut FakeBuffer,
        draw: &mut dyn FnMut(PixelTarget<'_>),
    ) -> io::Result<()> {
        let info = buffer.info;
        let mut state = self.state();
        let (_, memory) = state
            .memory
            .get_mut(&info.id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "buffer not live"))?;
        let target = PixelTarget::new(memory, info.width, info.height, info.stride)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short mapping"))?;
        draw(target);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: FakeBuffer) {
        let id = buffer.info.id;
        let mut state = self.state();
        let outliving = state.framebuffers.values().filter(|b| **b == id).count();
        state.log.framebuffers_outliving_buffer += outliving;
        state.memory.remove(&id);
        state.log.destroyed_buffers.push(id);
    }

    fn add_framebuffer(&self, buffer: &BufferInfo) -> io::Result<FramebufferId> {
        let mut state = self.state();
        if state.faults.framebuffers || state.faults.framebuffers_for.contains(&buffer.id) {
            return Err(injected("framebuffer"));
        }
        let framebuffer = FramebufferId(self.next_framebuffer.fetch_add(1, Ordering::Relaxed));
        state.framebuffers.insert(framebuffer, buffer.id);
        state.log.framebuffers_added += 1;
        Ok(framebuffer)
    }

    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> io::Result<()> {
        let mut state = self.state();
        if state.framebuffers.remove(&framebuffer).is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown framebuffer"));
        }
        state.log.framebuffers_removed.push(framebuffer);
        Ok(())
    }

    fn set_plane_property(
        &self,
        plane: PlaneId,
        property: PropertyId,
        value: u64,
    ) -> io::Result<()> {
        let mut state = self.state();
        if state.faults.properties {
            return Err(injected("property"));
        }
        state.log.property_writes.push((plane, property, value));
        Ok(())
    }

    fn set_plane(
        &self,
        plane: PlaneId,
        framebuffer: FramebufferId,
        rect: SurfaceRect,
    ) -> io::Result<()> {
        self.state()
            .log
            .set_plane_calls
            .push((plane, framebuffer, rect));
        Ok(())
    }

    fn test_commit(&self, _batch: &CommitBatch) -> io::Result<()> {
        let mut state = self.state();
        state.log.test_commits += 1;
        if state.faults.test_commits {
            return Err(injected("test commit"));
        }
        Ok(())
    }

    fn commit(&self, batch: &CommitBatch) -> io::Result<()> {
        let mut state = self.state();
        if state.faults.commits {
            return Err(injected("commit"));
        }
        state.log.commits.push(batch.clone());
        state.queued_completions += 1;
        Ok(())
    }

    fn wait_for_completion(
        &self,
        in_flight: &InFlight,
        timeout: Option<Duration>,
    ) -> io::Result<WaitOutcome> {
        let mut state = self.state();
        match state.faults.wait_script.pop_front() {
            Some(WaitStep::Fail(kind)) => return Err(io::Error::new(kind, "injected wait failure")),
            Some(WaitStep::Idle) => return Ok(WaitOutcome::TimedOut),
            None => {}
        }
        if state.faults.stall || state.queued_completions == 0 {
            drop(state);
            std::thread::sleep(timeout.unwrap_or(Duration::from_millis(1)));
            return Ok(WaitOutcome::TimedOut);
        }
        let delivered = core::mem::take(&mut state.queued_completions);
        drop(state);
        for _ in 0..delivered {
            in_flight.complete();
        }
        Ok(WaitOutcome::Events(delivered))
    }
}

/// Plane descriptors in discovery order: `primaries` primary planes, then
/// `overlays` overlays, then `cursors` cursor planes.
///
/// Plane ids start at 31; each plane's `FB_ID` property is `plane + 100`
/// and its `zorder` property is `plane + 200`.
#[must_use]
pub fn fake_planes(primaries: u32, overlays: u32, cursors: u32) -> Vec<PlaneDescriptor> {
    let kinds = core::iter::repeat_n(PlaneKind::Primary, primaries as usize)
        .chain(core::iter::repeat_n(PlaneKind::Overlay, overlays as usize))
        .chain(core::iter::repeat_n(PlaneKind::Cursor, cursors as usize));
    (31..)
        .zip(kinds)
        .map(|(id, kind)| PlaneDescriptor {
            id: PlaneId(id),
            kind,
            fb_property: PropertyId(id + 100),
            zorder_property: Some(PropertyId(id + 200)),
        })
        .collect()
}
