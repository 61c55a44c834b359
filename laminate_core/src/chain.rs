// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-surface buffer chain.
//!
//! A chain holds a fixed set of scan-out buffers shared between exactly one
//! render worker (the producer) and the commit scheduler (the consumer).
//! Every slot is in one of four states:
//!
//! ```text
//!            acquire_back            present
//!   Free ───────────────► Rendering ─────────► Front
//!    ▲  ▲                     │                │  │
//!    │  └─────── abandon ─────┘                │  │ lock_front
//!    │  └──── replaced by a newer present ─────┘  ▼
//!    └────────────────── release ─────────────── Locked
//! ```
//!
//! At most one slot is `Front`. A producer that outruns the display replaces
//! an unconsumed front, which goes straight back to `Free` and is counted as
//! a dropped frame. A consumer that outruns the producer blocks in
//! [`lock_front`](BufferChain::lock_front) until a new frame is presented.
//!
//! Both blocking calls wake at least every
//! [`CANCEL_POLL_INTERVAL`](crate::cancel::CANCEL_POLL_INTERVAL) to check
//! their [`CancelToken`].
//!
//! Dropping the chain releases each buffer's framebuffer binding from the
//! [`FramebufferCache`] and then destroys the buffer through the device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::cancel::{CANCEL_POLL_INTERVAL, CancelToken};
use crate::device::{Buffer, BufferInfo, Device};
use crate::framebuffer::FramebufferCache;

/// State of one chain slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Available to the producer.
    Free,
    /// Checked out by the producer.
    Rendering,
    /// Newest completed frame, waiting for the scheduler.
    Front,
    /// Held by the scheduler until its commit retires.
    Locked,
}

struct Slot<B> {
    info: BufferInfo,
    state: SlotState,
    // `None` while the producer has the buffer checked out.
    buffer: Option<B>,
}

/// A buffer checked out for rendering.
///
/// Hand it back with [`BufferChain::present`] or [`BufferChain::abandon`].
#[must_use = "return the buffer with `present` or `abandon`"]
#[derive(Debug)]
pub struct BackBuffer<B> {
    index: usize,
    buffer: B,
}

impl<B: Buffer> BackBuffer<B> {
    /// The buffer, for mapping.
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// Description of the buffer.
    #[must_use]
    pub fn info(&self) -> BufferInfo {
        self.buffer.info()
    }
}

/// A presented frame locked for scan-out.
///
/// Hand it back with [`BufferChain::release`] once the display no longer
/// reads from it.
#[must_use = "locked buffers must be released"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrontBuffer {
    index: usize,
    info: BufferInfo,
}

impl FrontBuffer {
    /// Description of the locked buffer.
    #[must_use]
    pub fn info(&self) -> &BufferInfo {
        &self.info
    }
}

/// Fixed-size chain of scan-out buffers for one surface.
pub struct BufferChain<D: Device> {
    device: Arc<D>,
    cache: Arc<FramebufferCache<D>>,
    slots: Mutex<Vec<Slot<D::Buffer>>>,
    free_slot: Condvar,
    new_front: Condvar,
    presented: AtomicU64,
    dropped: AtomicU64,
}

impl<D: Device> core::fmt::Debug for BufferChain<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferChain")
            .field("states", &self.states())
            .field("presented", &self.presented_frames())
            .field("dropped", &self.dropped_frames())
            .finish_non_exhaustive()
    }
}

impl<D: Device> BufferChain<D> {
    /// Allocates `len` buffers of `width` x `height`.
    ///
    /// If any allocation fails, the buffers already allocated are destroyed
    /// before the error is returned.
    pub fn allocate(
        device: Arc<D>,
        cache: Arc<FramebufferCache<D>>,
        width: u32,
        height: u32,
        len: usize,
    ) -> std::io::Result<Self> {
        let chain = Self {
            device,
            cache,
            slots: Mutex::new(Vec::with_capacity(len)),
            free_slot: Condvar::new(),
            new_front: Condvar::new(),
            presented: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };
        for _ in 0..len {
            let buffer = chain.device.allocate_buffer(width, height)?;
            chain.lock_slots().push(Slot {
                info: buffer.info(),
                state: SlotState::Free,
                buffer: Some(buffer),
            });
        }
        Ok(chain)
    }

    fn lock_slots(&self) -> MutexGuard<'_, Vec<Slot<D::Buffer>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The device that owns the chain's buffers.
    #[must_use]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Number of buffers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// Returns `true` for a chain with no buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    /// Current state of every slot.
    #[must_use]
    pub fn states(&self) -> Vec<SlotState> {
        self.lock_slots().iter().map(|slot| slot.state).collect()
    }

    /// Frames presented since creation.
    #[must_use]
    pub fn presented_frames(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    /// Presented frames that were replaced before the scheduler consumed them.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Checks out a free buffer for rendering, blocking until one exists.
    ///
    /// Returns `None` if `cancel` fires first.
    pub fn acquire_back(&self, cancel: &CancelToken) -> Option<BackBuffer<D::Buffer>> {
        let mut slots = self.lock_slots();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(index) = slots.iter().position(|s| s.state == SlotState::Free) {
                let slot = &mut slots[index];
                if let Some(buffer) = slot.buffer.take() {
                    slot.state = SlotState::Rendering;
                    return Some(BackBuffer { index, buffer });
                }
            }
            slots = self
                .free_slot
                .wait_timeout(slots, CANCEL_POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Publishes a rendered buffer as the newest front.
    ///
    /// An older front that the scheduler never locked is returned to `Free`.
    pub fn present(&self, back: BackBuffer<D::Buffer>) {
        let mut slots = self.lock_slots();
        let mut replaced = false;
        for slot in slots.iter_mut() {
            if slot.state == SlotState::Front {
                slot.state = SlotState::Free;
                replaced = true;
            }
        }
        let slot = &mut slots[back.index];
        slot.buffer = Some(back.buffer);
        slot.state = SlotState::Front;
        drop(slots);

        self.presented.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.free_slot.notify_one();
        }
        self.new_front.notify_all();
    }

    /// Returns a checked-out buffer without presenting it.
    pub fn abandon(&self, back: BackBuffer<D::Buffer>) {
        let mut slots = self.lock_slots();
        let slot = &mut slots[back.index];
        slot.buffer = Some(back.buffer);
        slot.state = SlotState::Free;
        drop(slots);
        self.free_slot.notify_one();
    }

    /// Locks the newest front for scan-out, blocking until the producer has
    /// presented one.
    ///
    /// Returns `None` if `cancel` fires first.
    pub fn lock_front(&self, cancel: &CancelToken) -> Option<FrontBuffer> {
        let mut slots = self.lock_slots();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(index) = slots.iter().position(|s| s.state == SlotState::Front) {
                let slot = &mut slots[index];
                slot.state = SlotState::Locked;
                return Some(FrontBuffer {
                    index,
                    info: slot.info,
                });
            }
            slots = self
                .new_front
                .wait_timeout(slots, CANCEL_POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Returns a locked buffer to the producer.
    pub fn release(&self, front: FrontBuffer) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(front.index)
            && slot.state == SlotState::Locked
        {
            slot.state = SlotState::Free;
        }
        drop(slots);
        self.free_slot.notify_one();
    }
}

impl<D: Device> Drop for BufferChain<D> {
    fn drop(&mut self) {
        let slots = core::mem::take(&mut *self.lock_slots());
        for slot in slots {
            self.cache.release(slot.info.id);
            match slot.buffer {
                Some(buffer) => self.device.destroy_buffer(buffer),
                None => tracing::warn!(
                    buffer = ?slot.info.id,
                    "buffer still checked out at teardown; not destroyed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeDevice;

    type Fixture = (
        Arc<FakeDevice>,
        Arc<FramebufferCache<FakeDevice>>,
        BufferChain<FakeDevice>,
    );

    fn chain(len: usize) -> Fixture {
        let device = Arc::new(FakeDevice::new(1920, 1080));
        let cache = Arc::new(FramebufferCache::new(Arc::clone(&device)));
        let chain =
            BufferChain::allocate(Arc::clone(&device), Arc::clone(&cache), 32, 16, len).unwrap();
        (device, cache, chain)
    }

    #[test]
    fn present_then_lock_then_release() {
        let (_device, _cache, chain) = chain(3);
        let cancel = CancelToken::new();

        let back = chain.acquire_back(&cancel).unwrap();
        let id = back.info().id;
        chain.present(back);
        assert_eq!(chain.states().iter().filter(|s| **s == SlotState::Front).count(), 1);

        let front = chain.lock_front(&cancel).unwrap();
        assert_eq!(front.info().id, id, "scheduler locks the presented buffer");
        chain.release(front);
        assert!(
            chain.states().iter().all(|s| *s == SlotState::Free),
            "every slot free after release"
        );
    }

    #[test]
    fn newer_present_drops_unconsumed_front() {
        let (_device, _cache, chain) = chain(3);
        let cancel = CancelToken::new();

        let first = chain.acquire_back(&cancel).unwrap();
        chain.present(first);
        let second = chain.acquire_back(&cancel).unwrap();
        let second_id = second.info().id;
        chain.present(second);

        assert_eq!(chain.dropped_frames(), 1, "first frame was never consumed");
        assert_eq!(chain.presented_frames(), 2);
        let front = chain.lock_front(&cancel).unwrap();
        assert_eq!(front.info().id, second_id, "latest frame wins");
        chain.release(front);
    }

    #[test]
    fn abandon_returns_slot() {
        let (_device, _cache, chain) = chain(2);
        let cancel = CancelToken::new();
        let back = chain.acquire_back(&cancel).unwrap();
        chain.abandon(back);
        assert!(chain.states().iter().all(|s| *s == SlotState::Free));
        assert_eq!(chain.presented_frames(), 0);
    }

    #[test]
    fn lock_front_returns_none_when_cancelled() {
        let (_device, _cache, chain) = chain(2);
        let cancel = CancelToken::new();
        let waiter = cancel.clone();
        let chain = Arc::new(chain);
        let blocked = Arc::clone(&chain);
        let handle = thread::spawn(move || blocked.lock_front(&waiter));
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();
        assert!(handle.join().unwrap().is_none(), "cancel unblocks the consumer");
    }

    #[test]
    fn acquire_back_blocks_until_release() {
        let (_device, _cache, chain) = chain(2);
        let cancel = CancelToken::new();
        let chain = Arc::new(chain);

        // One slot locked, the other front: nothing is free.
        let a = chain.acquire_back(&cancel).unwrap();
        chain.present(a);
        let locked = chain.lock_front(&cancel).unwrap();
        let b = chain.acquire_back(&cancel).unwrap();
        chain.present(b);

        let producer = Arc::clone(&chain);
        let token = cancel.clone();
        let handle = thread::spawn(move || producer.acquire_back(&token).map(|back| back.info().id));
        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished(), "no free slot, producer must wait");

        let released = locked.info().id;
        chain.release(locked);
        assert_eq!(handle.join().unwrap(), Some(released));
    }

    #[test]
    fn drop_releases_framebuffers_before_destroying() {
        let (device, cache, chain) = chain(3);
        let cancel = CancelToken::new();
        let back = chain.acquire_back(&cancel).unwrap();
        chain.present(back);
        let front = chain.lock_front(&cancel).unwrap();
        cache.get_or_create(front.info()).unwrap();
        chain.release(front);

        drop(chain);
        let log = device.log();
        assert_eq!(log.destroyed_buffers.len(), 3, "every buffer destroyed");
        assert_eq!(log.framebuffers_removed.len(), 1, "bound framebuffer removed");
        assert!(cache.is_empty());
        assert_eq!(
            log.framebuffers_outliving_buffer, 0,
            "framebuffer removed before its buffer"
        );
    }

    #[test]
    fn failed_allocation_cleans_up() {
        let device = Arc::new(FakeDevice::new(1920, 1080));
        let cache = Arc::new(FramebufferCache::new(Arc::clone(&device)));
        device.fail_allocations_after(Some(2));
        let result = BufferChain::allocate(Arc::clone(&device), cache, 8, 8, 3);
        assert!(result.is_err());
        assert_eq!(device.log().destroyed_buffers.len(), 2, "partial chain freed");
    }
}
