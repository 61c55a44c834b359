// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surfaces bound to planes.

use std::sync::Arc;

use crate::chain::BufferChain;
use crate::device::Device;
use crate::geometry::SurfaceRect;
use crate::id::PlaneId;

/// A renderable region of the output bound to one overlay plane.
///
/// Shared between the render worker that fills it and the scheduler that
/// commits it.
pub struct Surface<D: Device> {
    plane: PlaneId,
    rect: SurfaceRect,
    chain: BufferChain<D>,
}

impl<D: Device> core::fmt::Debug for Surface<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Surface")
            .field("plane", &self.plane)
            .field("rect", &self.rect)
            .field("chain", &self.chain)
            .finish()
    }
}

impl<D: Device> Surface<D> {
    pub(crate) fn new(plane: PlaneId, rect: SurfaceRect, chain: BufferChain<D>) -> Arc<Self> {
        Arc::new(Self { plane, rect, chain })
    }

    /// The plane this surface is bound to.
    #[must_use]
    pub fn plane(&self) -> PlaneId {
        self.plane
    }

    /// Placement on the output.
    #[must_use]
    pub fn rect(&self) -> SurfaceRect {
        self.rect
    }

    /// The surface's buffer chain.
    #[must_use]
    pub fn chain(&self) -> &BufferChain<D> {
        &self.chain
    }
}
