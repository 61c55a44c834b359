// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`Device`] implementation on a DRM card node.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use drm::{ClientCapability, Device as _};
use drm::buffer::DrmFourcc;
use drm::control::{
    AtomicCommitFlags, Device as ControlDevice, Event, RawResourceHandle, atomic, connector, crtc,
    framebuffer, plane, property,
};
use rustix::event::{PollFd, PollFlags, poll};
use tracing::{debug, info, warn};

use laminate_core::device::{
    Buffer as _, BufferInfo, CommitBatch, Device, FRAMEBUFFER_BPP, FRAMEBUFFER_DEPTH, InFlight,
    PixelTarget, WaitOutcome,
};
use laminate_core::error::DeviceError;
use laminate_core::geometry::SurfaceRect;
use laminate_core::id::{BufferId, ConnectorId, FramebufferId, PipeId, PlaneId, PropertyId};
use laminate_core::output::Output;
use laminate_core::plane::PlaneDescriptor;

use crate::buffer::{DumbScanoutBuffer, ScanoutSource};
use crate::card::Card;
use crate::planes::describe_plane;
use crate::time::duration_to_timespec;

/// Bits per pixel of the dumb buffers handed to render workers.
const DUMB_BPP: u32 = 32;

/// A DRM card opened as master, with one connector's pipe resolved.
pub struct DrmDevice {
    card: Card,
    crtc: crtc::Handle,
    output: Output,
    next_buffer: AtomicU64,
    sources: Mutex<HashMap<BufferId, ScanoutSource>>,
}

impl core::fmt::Debug for DrmDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DrmDevice")
            .field("card", &self.card)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl DrmDevice {
    /// Opens the card at `path` and resolves `connector` to its pipe.
    ///
    /// Becomes DRM master and enables universal planes and atomic
    /// modesetting before touching any resource. The output size is the
    /// pipe's active mode; no modeset is performed.
    pub fn open(path: impl AsRef<Path>, connector: ConnectorId) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let card = Card::open(path).map_err(|source| DeviceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        card.acquire_master_lock().map_err(DeviceError::Master)?;
        for capability in [ClientCapability::UniversalPlanes, ClientCapability::Atomic] {
            card.set_client_capability(capability, true)
                .map_err(DeviceError::AtomicUnsupported)?;
        }
        let (crtc, output) = resolve_output(&card, connector)?;
        info!(
            connector = connector.raw(),
            pipe = output.pipe.raw(),
            width = output.width,
            height = output.height,
            "display device opened"
        );
        Ok(Self {
            card,
            crtc,
            output,
            next_buffer: AtomicU64::new(1),
            sources: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying card node.
    #[must_use]
    pub fn card(&self) -> &Card {
        &self.card
    }

    /// Describes every plane that can scan out on this device's pipe, in
    /// the driver's enumeration order.
    ///
    /// Planes without a recognizable `type` or an `FB_ID` property are
    /// skipped.
    pub fn discover_planes(&self) -> Result<Vec<PlaneDescriptor>, DeviceError> {
        let resources = self
            .card
            .resource_handles()
            .map_err(DeviceError::Resources)?;
        let handles = self.card.plane_handles().map_err(DeviceError::Resources)?;
        let mut descriptors = Vec::with_capacity(handles.len());
        for handle in handles {
            let info = self.card.get_plane(handle).map_err(DeviceError::Resources)?;
            if !resources
                .filter_crtcs(info.possible_crtcs())
                .contains(&self.crtc)
            {
                continue;
            }
            let id = PlaneId(u32::from(handle));
            let mut named = Vec::new();
            let values = self
                .card
                .get_properties(handle)
                .map_err(DeviceError::Resources)?;
            for (property, value) in values {
                let name = self
                    .card
                    .get_property(property)
                    .map_err(DeviceError::Resources)?
                    .name()
                    .to_string_lossy()
                    .into_owned();
                named.push((name, PropertyId(u32::from(property)), value));
            }
            match describe_plane(id, named) {
                Some(descriptor) => {
                    debug!(plane = id.raw(), kind = ?descriptor.kind, "plane discovered");
                    descriptors.push(descriptor);
                }
                None => debug!(plane = id.raw(), "plane skipped: incomplete properties"),
            }
        }
        Ok(descriptors)
    }

    fn sources(&self) -> MutexGuard<'_, HashMap<BufferId, ScanoutSource>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, batch: &CommitBatch) -> io::Result<atomic::AtomicModeReq> {
        let mut request = atomic::AtomicModeReq::new();
        for entry in batch.entries() {
            request.add_property(
                handle::<plane::Handle>(entry.plane.raw())?,
                handle::<property::Handle>(entry.property.raw())?,
                property::Value::Framebuffer(Some(handle::<framebuffer::Handle>(
                    entry.framebuffer.raw(),
                )?)),
            );
        }
        Ok(request)
    }
}

fn resolve_output(card: &Card, id: ConnectorId) -> Result<(crtc::Handle, Output), DeviceError> {
    let resources = card.resource_handles().map_err(DeviceError::Resources)?;
    let handle = resources
        .connectors()
        .iter()
        .copied()
        .find(|handle| u32::from(*handle) == id.raw())
        .ok_or(DeviceError::ConnectorNotFound(id))?;
    let info = card
        .get_connector(handle, false)
        .map_err(DeviceError::Resources)?;
    if info.state() != connector::State::Connected {
        return Err(DeviceError::ConnectorDisconnected(id));
    }
    let encoder = info
        .current_encoder()
        .ok_or(DeviceError::NoActivePipe(id))?;
    let crtc = card
        .get_encoder(encoder)
        .map_err(DeviceError::Resources)?
        .crtc()
        .ok_or(DeviceError::NoActivePipe(id))?;
    let mode = card
        .get_crtc(crtc)
        .map_err(DeviceError::Resources)?
        .mode()
        .ok_or(DeviceError::NoActivePipe(id))?;
    let (width, height) = mode.size();
    Ok((
        crtc,
        Output {
            connector: id,
            pipe: PipeId(u32::from(crtc)),
            width: width.into(),
            height: height.into(),
        },
    ))
}

fn handle<H: From<RawResourceHandle>>(raw: u32) -> io::Result<H> {
    drm::control::from_u32(raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "zero resource handle"))
}

impl Device for DrmDevice {
    type Buffer = DumbScanoutBuffer;

    fn output(&self) -> Output {
        self.output
    }

    fn allocate_buffer(&self, width: u32, height: u32) -> io::Result<DumbScanoutBuffer> {
        let dumb = self
            .card
            .create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, DUMB_BPP)?;
        let id = BufferId(self.next_buffer.fetch_add(1, Ordering::Relaxed));
        self.sources().insert(id, ScanoutSource::of(&dumb));
        Ok(DumbScanoutBuffer { id, dumb })
    }

    fn map_buffer(
        &self,
        buffer: &mut DumbScanoutBuffer,
        draw: &mut dyn FnMut(PixelTarget<'_>),
    ) -> io::Result<()> {
        let info = buffer.info();
        let mut mapping = self.card.map_dumb_buffer(&mut buffer.dumb)?;
        let target = PixelTarget::new(&mut mapping[..], info.width, info.height, info.stride)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short buffer mapping"))?;
        draw(target);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: DumbScanoutBuffer) {
        self.sources().remove(&buffer.id);
        let id = buffer.id;
        if let Err(err) = self.card.destroy_dumb_buffer(buffer.dumb) {
            warn!(buffer = id.raw(), %err, "failed to destroy dumb buffer");
        }
    }

    fn add_framebuffer(&self, buffer: &BufferInfo) -> io::Result<FramebufferId> {
        let source = self
            .sources()
            .get(&buffer.id)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "buffer is not live"))?;
        let framebuffer = self
            .card
            .add_framebuffer(&source, FRAMEBUFFER_DEPTH, FRAMEBUFFER_BPP)?;
        Ok(FramebufferId(u32::from(framebuffer)))
    }

    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> io::Result<()> {
        self.card
            .destroy_framebuffer(handle::<framebuffer::Handle>(framebuffer.raw())?)
    }

    fn set_plane_property(
        &self,
        plane: PlaneId,
        property: PropertyId,
        value: u64,
    ) -> io::Result<()> {
        self.card.set_property(
            handle::<plane::Handle>(plane.raw())?,
            handle::<property::Handle>(property.raw())?,
            value,
        )
    }

    fn set_plane(
        &self,
        plane: PlaneId,
        framebuffer: FramebufferId,
        rect: SurfaceRect,
    ) -> io::Result<()> {
        self.card.set_plane(
            handle::<plane::Handle>(plane.raw())?,
            self.crtc,
            Some(handle::<framebuffer::Handle>(framebuffer.raw())?),
            0,
            (rect.x, rect.y, rect.width, rect.height),
            rect.source_fixed(),
        )
    }

    fn test_commit(&self, batch: &CommitBatch) -> io::Result<()> {
        self.card
            .atomic_commit(AtomicCommitFlags::TEST_ONLY, self.request(batch)?)
    }

    fn commit(&self, batch: &CommitBatch) -> io::Result<()> {
        self.card.atomic_commit(
            AtomicCommitFlags::NONBLOCK | AtomicCommitFlags::PAGE_FLIP_EVENT,
            self.request(batch)?,
        )
    }

    fn wait_for_completion(
        &self,
        in_flight: &InFlight,
        timeout: Option<Duration>,
    ) -> io::Result<WaitOutcome> {
        let timeout = timeout.map(duration_to_timespec);
        let mut fds = [PollFd::new(&self.card, PollFlags::IN)];
        if poll(&mut fds, timeout.as_ref())? == 0 {
            return Ok(WaitOutcome::TimedOut);
        }
        let mut delivered = 0;
        for event in self.card.receive_events()? {
            if let Event::PageFlip(flip) = event
                && flip.crtc == self.crtc
            {
                in_flight.complete();
                delivered += 1;
            }
        }
        Ok(WaitOutcome::Events(delivered))
    }
}
