// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dumb scan-out buffers.

use drm::buffer::{Buffer as _, DrmFourcc};
use drm::control::dumbbuffer::DumbBuffer;

use laminate_core::device::{Buffer, BufferInfo};
use laminate_core::id::BufferId;

/// A CPU-mappable XRGB8888 buffer allocated with `DRM_IOCTL_MODE_CREATE_DUMB`.
#[derive(Debug)]
pub struct DumbScanoutBuffer {
    pub(crate) id: BufferId,
    pub(crate) dumb: DumbBuffer,
}

impl Buffer for DumbScanoutBuffer {
    fn info(&self) -> BufferInfo {
        let (width, height) = self.dumb.size();
        BufferInfo {
            id: self.id,
            width,
            height,
            stride: self.dumb.pitch(),
            handle: u32::from(self.dumb.handle()),
        }
    }

    fn id(&self) -> BufferId {
        self.id
    }
}

/// What framebuffer registration needs to know about a live dumb buffer.
///
/// Kept by the device per [`BufferId`] so that a framebuffer can be added
/// from a [`BufferInfo`] while the buffer itself is owned by its chain.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ScanoutSource {
    size: (u32, u32),
    pitch: u32,
    handle: drm::buffer::Handle,
}

impl ScanoutSource {
    pub(crate) fn of(dumb: &DumbBuffer) -> Self {
        Self {
            size: dumb.size(),
            pitch: dumb.pitch(),
            handle: dumb.handle(),
        }
    }
}

impl drm::buffer::Buffer for ScanoutSource {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn format(&self) -> DrmFourcc {
        DrmFourcc::Xrgb8888
    }

    fn pitch(&self) -> u32 {
        self.pitch
    }

    fn handle(&self) -> drm::buffer::Handle {
        self.handle
    }
}
