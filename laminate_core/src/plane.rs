// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane registry and surface allocator.
//!
//! A [`PlaneRegistry`] is built from the planes a backend discovered on the
//! active pipe. Building it only *computes* the stacking order:
//!
//! - primary planes get `0..k` in discovery order,
//! - the overlay with zero-based discovery index `i` gets `max_overlays - i`,
//! - cursor planes get no order and are never allocated.
//!
//! With one primary and four overlays discovered as `P, O1, O2, O3, O4` and
//! `max_overlays = 4`, the orders are `0, 4, 3, 2, 1`: the first overlay
//! discovered is frontmost.
//!
//! Writing the orders to the hardware is a separate, explicit step,
//! [`PlaneRegistry::apply_stacking_order`].
//!
//! [`PlaneRegistry::allocate`] binds a surface to the first free overlay
//! plane. Planes are never released, so each plane becomes occupied at most
//! once.

use std::sync::Arc;

use crate::chain::BufferChain;
use crate::device::Device;
use crate::error::{AllocError, DeviceError};
use crate::framebuffer::FramebufferCache;
use crate::geometry::SurfaceRect;
use crate::id::{PlaneId, PropertyId};
use crate::output::Output;
use crate::surface::Surface;

/// Hardware plane classification, from the plane's `type` property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    /// Covers the whole output; never allocated to a surface.
    Primary,
    /// Composites a sub-region on top of the primary.
    Overlay,
    /// Hardware cursor; ignored.
    Cursor,
}

impl PlaneKind {
    /// Decodes a `type` property value (`0` overlay, `1` primary, `2` cursor).
    #[must_use]
    pub const fn from_type_property(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Overlay),
            1 => Some(Self::Primary),
            2 => Some(Self::Cursor),
            _ => None,
        }
    }
}

/// What a backend reports about one plane during discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneDescriptor {
    /// Hardware id.
    pub id: PlaneId,
    /// Classification.
    pub kind: PlaneKind,
    /// The `FB_ID` attachment property.
    pub fb_property: PropertyId,
    /// The stacking-order property, if the driver exposes one.
    pub zorder_property: Option<PropertyId>,
}

/// One discovered plane and its binding.
pub struct Plane<D: Device> {
    descriptor: PlaneDescriptor,
    stacking_order: Option<i64>,
    surface: Option<Arc<Surface<D>>>,
}

impl<D: Device> core::fmt::Debug for Plane<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Plane")
            .field("descriptor", &self.descriptor)
            .field("stacking_order", &self.stacking_order)
            .field("occupied", &self.is_occupied())
            .finish()
    }
}

impl<D: Device> Plane<D> {
    /// Hardware id.
    #[must_use]
    pub fn id(&self) -> PlaneId {
        self.descriptor.id
    }

    /// Classification.
    #[must_use]
    pub fn kind(&self) -> PlaneKind {
        self.descriptor.kind
    }

    /// The cached `FB_ID` property.
    #[must_use]
    pub fn fb_property(&self) -> PropertyId {
        self.descriptor.fb_property
    }

    /// Computed stacking order. `None` for cursor planes.
    #[must_use]
    pub fn stacking_order(&self) -> Option<i64> {
        self.stacking_order
    }

    /// Returns `true` once a surface has been bound.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.surface.is_some()
    }

    /// The bound surface, if any.
    #[must_use]
    pub fn surface(&self) -> Option<&Arc<Surface<D>>> {
        self.surface.as_ref()
    }
}

/// All planes usable on the active pipe.
pub struct PlaneRegistry<D: Device> {
    device: Arc<D>,
    cache: Arc<FramebufferCache<D>>,
    planes: Vec<Plane<D>>,
}

impl<D: Device> core::fmt::Debug for PlaneRegistry<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlaneRegistry")
            .field("output", &self.device.output())
            .field("planes", &self.planes)
            .finish_non_exhaustive()
    }
}

impl<D: Device> PlaneRegistry<D> {
    /// Builds the registry and computes stacking orders. Has no effect on the
    /// device.
    #[must_use]
    pub fn from_discovery(
        device: Arc<D>,
        descriptors: impl IntoIterator<Item = PlaneDescriptor>,
        max_overlays: u32,
    ) -> Self {
        let mut primaries = 0_i64;
        let mut overlays = 0_i64;
        let planes = descriptors
            .into_iter()
            .map(|descriptor| {
                let stacking_order = match descriptor.kind {
                    PlaneKind::Primary => {
                        primaries += 1;
                        Some(primaries - 1)
                    }
                    PlaneKind::Overlay => {
                        overlays += 1;
                        Some(i64::from(max_overlays) - (overlays - 1))
                    }
                    PlaneKind::Cursor => None,
                };
                Plane {
                    descriptor,
                    stacking_order,
                    surface: None,
                }
            })
            .collect::<Vec<_>>();

        if overlays > i64::from(max_overlays) {
            tracing::warn!(
                overlays,
                max_overlays,
                "more overlays than stacking slots; later overlays sort behind the primary"
            );
        }
        tracing::info!(
            planes = planes.len(),
            primaries,
            overlays,
            "plane registry built"
        );

        let cache = Arc::new(FramebufferCache::new(Arc::clone(&device)));
        Self {
            device,
            cache,
            planes,
        }
    }

    /// Writes every computed stacking order to its plane's `zorder` property.
    ///
    /// Planes without the property are skipped. Returns how many planes were
    /// written.
    pub fn apply_stacking_order(&self) -> Result<usize, DeviceError> {
        let mut written = 0;
        for plane in &self.planes {
            let (Some(order), Some(property)) =
                (plane.stacking_order, plane.descriptor.zorder_property)
            else {
                continue;
            };
            // Overlay orders past `max_overlays` discoveries go negative; the
            // property is unsigned so they clamp to the back.
            let value = u64::try_from(order).unwrap_or(0);
            self.device
                .set_plane_property(plane.id(), property, value)
                .map_err(|source| DeviceError::Property {
                    plane: plane.id(),
                    property,
                    source,
                })?;
            tracing::debug!(plane = ?plane.id(), order, "stacking order applied");
            written += 1;
        }
        Ok(written)
    }

    /// Binds a new surface at `rect` to the first free overlay plane, with a
    /// chain of `chain_len` buffers.
    ///
    /// Bounds are checked before any plane is considered, and a failed buffer
    /// allocation leaves the plane free.
    pub fn allocate(
        &mut self,
        rect: SurfaceRect,
        chain_len: usize,
    ) -> Result<Arc<Surface<D>>, AllocError> {
        let output = self.device.output();
        if !rect.fits_within(&output) {
            return Err(AllocError::OutOfBounds {
                rect,
                width: output.width,
                height: output.height,
            });
        }

        let plane = self
            .planes
            .iter_mut()
            .find(|p| p.descriptor.kind == PlaneKind::Overlay && p.surface.is_none())
            .ok_or(AllocError::NoFreePlane)?;

        let chain = BufferChain::allocate(
            Arc::clone(&self.device),
            Arc::clone(&self.cache),
            rect.width,
            rect.height,
            chain_len,
        )
        .map_err(AllocError::Buffer)?;

        let surface = Surface::new(plane.descriptor.id, rect, chain);
        plane.surface = Some(Arc::clone(&surface));
        tracing::info!(plane = ?plane.descriptor.id, ?rect, chain_len, "surface allocated");
        Ok(surface)
    }

    /// Every plane, in discovery order.
    #[must_use]
    pub fn planes(&self) -> &[Plane<D>] {
        &self.planes
    }

    /// Planes with a bound surface, in discovery order.
    pub fn occupied(&self) -> impl Iterator<Item = &Plane<D>> {
        self.planes.iter().filter(|p| p.is_occupied())
    }

    /// `(plane, order)` for every plane that has a stacking order.
    pub fn stacking_orders(&self) -> impl Iterator<Item = (PlaneId, i64)> + '_ {
        self.planes
            .iter()
            .filter_map(|p| p.stacking_order.map(|order| (p.id(), order)))
    }

    /// Number of overlay planes, free or not.
    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.planes
            .iter()
            .filter(|p| p.kind() == PlaneKind::Overlay)
            .count()
    }

    /// Number of overlay planes still free.
    #[must_use]
    pub fn free_overlays(&self) -> usize {
        self.planes
            .iter()
            .filter(|p| p.kind() == PlaneKind::Overlay && !p.is_occupied())
            .count()
    }

    /// The output the registry allocates within.
    #[must_use]
    pub fn output(&self) -> Output {
        self.device.output()
    }

    /// The device.
    #[must_use]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// The framebuffer cache shared by every surface's chain.
    #[must_use]
    pub fn cache(&self) -> &Arc<FramebufferCache<D>> {
        &self.cache
    }
}
