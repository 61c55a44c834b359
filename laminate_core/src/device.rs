// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display device contract.
//!
//! [`Device`] is the only seam between the hardware-independent compositor
//! and a real display controller. A backend implements it once; the plane
//! registry, buffer chains, render workers, and commit scheduler all go
//! through it.
//!
//! The device is shared (`Arc`) between the scheduler thread and every render
//! worker thread, so all methods take `&self`.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::geometry::SurfaceRect;
use crate::id::{BufferId, FramebufferId, PlaneId, PropertyId};
use crate::output::Output;

/// Framebuffer color depth registered for every scan-out buffer.
pub const FRAMEBUFFER_DEPTH: u32 = 32;

/// Framebuffer bits per pixel registered for every scan-out buffer.
pub const FRAMEBUFFER_BPP: u32 = 32;

/// Bytes per XRGB8888 pixel.
pub const BYTES_PER_PIXEL: u32 = 4;

/// A scan-out capable buffer owned by a backend.
pub trait Buffer: Send + 'static {
    /// Everything needed to register and identify the buffer.
    fn info(&self) -> BufferInfo;

    /// Lifetime-unique identity.
    fn id(&self) -> BufferId {
        self.info().id
    }
}

/// Description of a scan-out buffer, as needed for framebuffer registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    /// Identity of the buffer.
    pub id: BufferId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Driver memory handle.
    pub handle: u32,
}

/// One plane update inside a [`CommitBatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommitEntry {
    /// Plane being updated.
    pub plane: PlaneId,
    /// The plane's framebuffer attachment property (`FB_ID`).
    pub property: PropertyId,
    /// Framebuffer to attach.
    pub framebuffer: FramebufferId,
}

/// The set of plane updates applied together in one atomic transaction.
///
/// Built fresh every cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitBatch {
    entries: Vec<CommitEntry>,
}

impl CommitBatch {
    /// Creates an empty batch with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds an entry.
    pub fn push(&mut self, entry: CommitEntry) {
        self.entries.push(entry);
    }

    /// The staged entries, in staging order.
    #[must_use]
    pub fn entries(&self) -> &[CommitEntry] {
        &self.entries
    }

    /// Number of staged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Count of submitted commits whose completion event has not arrived yet.
///
/// Incremented by the scheduler before submission and decremented from the
/// device's event path.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
}

impl InFlight {
    /// Creates a zero counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    /// Records a commit about to be submitted.
    pub fn begin(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Records one completion event. Spurious events never underflow.
    pub fn complete(&self) {
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Undoes [`begin`](Self::begin) after a rejected submission.
    pub fn rollback(&self) {
        self.complete();
    }

    /// Outstanding completions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Result of one bounded wait on the device's event source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// This many completion events were delivered to the [`InFlight`] counter.
    Events(usize),
    /// The slice elapsed with no events.
    TimedOut,
}

/// Mutable CPU view of a mapped XRGB8888 buffer.
///
/// Pixels are stored as little-endian `u32` values `0x00RRGGBB`.
#[derive(Debug)]
pub struct PixelTarget<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: u32,
}

impl<'a> PixelTarget<'a> {
    /// Wraps mapped memory.
    ///
    /// Returns `None` if `data` is too short for `height` rows of `stride`
    /// bytes, or if a row of `width` pixels does not fit in `stride`.
    #[must_use]
    pub fn new(data: &'a mut [u8], width: u32, height: u32, stride: u32) -> Option<Self> {
        let row_bytes = u64::from(width) * u64::from(BYTES_PER_PIXEL);
        let needed = u64::from(stride) * u64::from(height);
        if row_bytes > u64::from(stride) || needed > data.len() as u64 {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// The visible pixels of row `y`, or `None` past the last row.
    #[must_use]
    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        let len = self.width as usize * BYTES_PER_PIXEL as usize;
        self.data.get_mut(start..start + len)
    }

    /// Writes one pixel. Out-of-range coordinates are ignored.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, xrgb: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let at = y as usize * self.stride as usize + x as usize * BYTES_PER_PIXEL as usize;
        if let Some(px) = self.data.get_mut(at..at + BYTES_PER_PIXEL as usize) {
            px.copy_from_slice(&xrgb.to_le_bytes());
        }
    }

    /// Reads one pixel, or `None` out of range.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.stride as usize + x as usize * BYTES_PER_PIXEL as usize;
        let px = self.data.get(at..at + BYTES_PER_PIXEL as usize)?;
        Some(u32::from_le_bytes([px[0], px[1], px[2], px[3]]))
    }

    /// Fills every visible pixel with one color.
    pub fn fill(&mut self, xrgb: u32) {
        let bytes = xrgb.to_le_bytes();
        for y in 0..self.height {
            if let Some(row) = self.row_mut(y) {
                for px in row.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
                    px.copy_from_slice(&bytes);
                }
            }
        }
    }
}

/// A display controller.
pub trait Device: Send + Sync + 'static {
    /// The backend's scan-out buffer type.
    type Buffer: Buffer;

    /// The output this device was opened on.
    fn output(&self) -> Output;

    /// Allocates an XRGB8888 scan-out buffer.
    fn allocate_buffer(&self, width: u32, height: u32) -> io::Result<Self::Buffer>;

    /// Maps `buffer` for CPU access and calls `draw` with its pixels.
    fn map_buffer(
        &self,
        buffer: &mut Self::Buffer,
        draw: &mut dyn FnMut(PixelTarget<'_>),
    ) -> io::Result<()>;

    /// Frees a buffer. Its framebuffer must already be removed.
    fn destroy_buffer(&self, buffer: Self::Buffer);

    /// Registers `buffer` as a framebuffer with depth
    /// [`FRAMEBUFFER_DEPTH`] and [`FRAMEBUFFER_BPP`] bits per pixel.
    fn add_framebuffer(&self, buffer: &BufferInfo) -> io::Result<FramebufferId>;

    /// Deregisters a framebuffer.
    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> io::Result<()>;

    /// Writes a plane property immediately, outside any atomic commit.
    fn set_plane_property(&self, plane: PlaneId, property: PropertyId, value: u64)
    -> io::Result<()>;

    /// Legacy (non-atomic) plane update placing `framebuffer` at `rect`, with
    /// the whole framebuffer as source.
    fn set_plane(
        &self,
        plane: PlaneId,
        framebuffer: FramebufferId,
        rect: SurfaceRect,
    ) -> io::Result<()>;

    /// Asks the driver whether `batch` would be accepted, without applying it.
    fn test_commit(&self, batch: &CommitBatch) -> io::Result<()>;

    /// Submits `batch` without blocking and requests a completion event.
    fn commit(&self, batch: &CommitBatch) -> io::Result<()>;

    /// Waits up to `timeout` (forever if `None`) for completion events and
    /// calls [`InFlight::complete`] once for each one delivered.
    fn wait_for_completion(
        &self,
        in_flight: &InFlight,
        timeout: Option<Duration>,
    ) -> io::Result<WaitOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_counts_and_saturates() {
        let in_flight = InFlight::new();
        in_flight.begin();
        in_flight.begin();
        assert_eq!(in_flight.pending(), 2);
        in_flight.complete();
        in_flight.rollback();
        assert_eq!(in_flight.pending(), 0);
        in_flight.complete();
        assert_eq!(in_flight.pending(), 0, "spurious completion must not wrap");
    }

    #[test]
    fn pixel_target_rejects_short_memory() {
        let mut data = vec![0_u8; 15];
        assert!(PixelTarget::new(&mut data, 2, 2, 8).is_none(), "needs 16 bytes");
        let mut data = vec![0_u8; 16];
        assert!(PixelTarget::new(&mut data, 3, 2, 8).is_none(), "row wider than stride");
        assert!(PixelTarget::new(&mut data, 2, 2, 8).is_some());
    }

    #[test]
    fn pixel_target_honors_stride() {
        // Two visible pixels per row, one pixel of padding.
        let mut data = vec![0xAA_u8; 24];
        let mut target = PixelTarget::new(&mut data, 2, 2, 12).unwrap();
        target.fill(0x0011_2233);
        target.put_pixel(1, 1, 0x00FF_0000);
        target.put_pixel(2, 1, 0x0000_FF00);
        assert_eq!(target.pixel(0, 0), Some(0x0011_2233));
        assert_eq!(target.pixel(1, 1), Some(0x00FF_0000));
        assert_eq!(target.pixel(2, 0), None, "padding is not addressable");
        assert_eq!(&data[8..12], &[0xAA; 4], "padding untouched");
        assert_eq!(&data[0..4], &[0x33, 0x22, 0x11, 0x00], "little-endian XRGB");
    }

    #[test]
    fn batch_preserves_order() {
        let mut batch = CommitBatch::with_capacity(2);
        for plane in [40, 41] {
            batch.push(CommitEntry {
                plane: PlaneId(plane),
                property: PropertyId(7),
                framebuffer: FramebufferId(plane + 100),
            });
        }
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.entries()[1].plane, PlaneId(41));
    }
}
