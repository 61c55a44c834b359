// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memoized buffer to framebuffer registration.
//!
//! Buffers recirculate through their chain every frame, so a buffer is
//! registered with the driver the first time it is committed and the handle is
//! reused for every later commit. The cache owns every binding; the buffer
//! chain calls [`FramebufferCache::release`] for each buffer before freeing
//! its memory, so no framebuffer outlives its buffer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::device::{BufferInfo, Device};
use crate::error::FramebufferError;
use crate::id::{BufferId, FramebufferId};

/// Buffer to framebuffer bindings for one device.
pub struct FramebufferCache<D: Device> {
    device: Arc<D>,
    bindings: Mutex<HashMap<BufferId, FramebufferId>>,
    registrations: AtomicU64,
}

impl<D: Device> core::fmt::Debug for FramebufferCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FramebufferCache")
            .field("bindings", &self.len())
            .field("registrations", &self.registrations())
            .finish_non_exhaustive()
    }
}

impl<D: Device> FramebufferCache<D> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            bindings: Mutex::new(HashMap::new()),
            registrations: AtomicU64::new(0),
        }
    }

    fn bindings(&self) -> MutexGuard<'_, HashMap<BufferId, FramebufferId>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the buffer's framebuffer, registering it on first use.
    ///
    /// On failure nothing is cached, so the next call retries.
    pub fn get_or_create(&self, buffer: &BufferInfo) -> Result<FramebufferId, FramebufferError> {
        let mut bindings = self.bindings();
        if let Some(&framebuffer) = bindings.get(&buffer.id) {
            return Ok(framebuffer);
        }
        let framebuffer =
            self.device
                .add_framebuffer(buffer)
                .map_err(|source| FramebufferError::Register {
                    buffer: buffer.id,
                    source,
                })?;
        bindings.insert(buffer.id, framebuffer);
        self.registrations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            buffer = ?buffer.id,
            ?framebuffer,
            width = buffer.width,
            height = buffer.height,
            stride = buffer.stride,
            "registered framebuffer"
        );
        Ok(framebuffer)
    }

    /// The cached framebuffer for `buffer`, without registering.
    #[must_use]
    pub fn binding(&self, buffer: BufferId) -> Option<FramebufferId> {
        self.bindings().get(&buffer).copied()
    }

    /// Deregisters the buffer's framebuffer, if it has one.
    ///
    /// Must be called before the buffer's memory is freed. A driver error is
    /// logged; the binding is dropped either way.
    pub fn release(&self, buffer: BufferId) {
        let Some(framebuffer) = self.bindings().remove(&buffer) else {
            return;
        };
        if let Err(err) = self.device.remove_framebuffer(framebuffer) {
            tracing::warn!(?buffer, ?framebuffer, %err, "failed to remove framebuffer");
        } else {
            tracing::debug!(?buffer, ?framebuffer, "removed framebuffer");
        }
    }

    /// Total successful registrations since creation.
    #[must_use]
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings().len()
    }

    /// Returns `true` when no binding is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings().is_empty()
    }
}
