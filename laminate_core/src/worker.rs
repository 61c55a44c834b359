// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render workers.
//!
//! A [`RenderWorker`] owns one [`Surface`] and one [`ContentProducer`] and
//! fills the surface's buffer chain as fast as the chain lets it, on its own
//! thread. Workers never talk to the scheduler; the buffer chain is the only
//! handoff.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::cancel::CancelToken;
use crate::device::{Device, PixelTarget};
use crate::error::RenderError;
use crate::geometry::SurfaceRect;
use crate::surface::Surface;

/// Generates frame content for one surface.
pub trait ContentProducer: Send + 'static {
    /// Per-surface state built by [`setup`](Self::setup) and threaded through
    /// every [`render`](Self::render).
    type State: Send + 'static;

    /// Prepares to render into a surface of the given geometry.
    fn setup(&self, geometry: SurfaceRect) -> Result<Self::State, RenderError>;

    /// Draws the next frame.
    fn render(&self, state: &mut Self::State, target: &mut PixelTarget<'_>)
    -> Result<(), RenderError>;
}

/// Counters returned when a worker thread exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Frames presented.
    pub frames: u64,
    /// Frames abandoned after a render or map error.
    pub failures: u64,
}

/// One producer bound to one surface.
pub struct RenderWorker<D: Device, P: ContentProducer> {
    surface: Arc<Surface<D>>,
    device: Arc<D>,
    producer: P,
    state: P::State,
}

impl<D: Device, P: ContentProducer> core::fmt::Debug for RenderWorker<D, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderWorker")
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl<D: Device, P: ContentProducer> RenderWorker<D, P> {
    /// Runs the producer's setup for `surface`.
    ///
    /// A setup failure is returned and no worker exists.
    pub fn new(surface: Arc<Surface<D>>, producer: P) -> Result<Self, RenderError> {
        let state = producer.setup(surface.rect())?;
        Ok(Self {
            device: Arc::clone(surface.chain().device()),
            surface,
            producer,
            state,
        })
    }

    /// Renders until `cancel` fires, on the calling thread.
    pub fn run(self, cancel: &CancelToken) -> WorkerStats {
        let Self {
            surface,
            device,
            producer,
            mut state,
        } = self;
        let chain = surface.chain();
        let mut stats = WorkerStats::default();

        while !cancel.is_cancelled() {
            let Some(mut back) = chain.acquire_back(cancel) else {
                break;
            };
            let mut rendered = Ok(());
            let mapped = device.map_buffer(back.buffer_mut(), &mut |mut target| {
                rendered = producer.render(&mut state, &mut target);
            });
            match mapped.map_err(RenderError::Map).and(rendered) {
                Ok(()) => {
                    chain.present(back);
                    stats.frames += 1;
                }
                Err(err) => {
                    tracing::warn!(plane = ?surface.plane(), %err, "frame abandoned");
                    chain.abandon(back);
                    stats.failures += 1;
                }
            }
        }
        tracing::debug!(
            plane = ?surface.plane(),
            frames = stats.frames,
            failures = stats.failures,
            "render worker stopped"
        );
        stats
    }

    /// Starts the worker on a named thread.
    pub fn spawn(self, cancel: CancelToken) -> io::Result<JoinHandle<WorkerStats>> {
        let name = format!("render-{}", self.surface.plane().raw());
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run(&cancel))
    }
}
