// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! [`DeviceError`] is fatal at startup. Everything else is reported per call,
//! per plane, or per cycle, and the caller decides whether to skip or stop.

use std::io;

use crate::geometry::SurfaceRect;
use crate::id::{BufferId, ConnectorId, PlaneId, PropertyId};

/// Failure to open or configure the display device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device node could not be opened.
    #[error("failed to open display device {path}")]
    Open {
        /// Path of the device node.
        path: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Another process holds display mastership.
    #[error("display device is busy (could not become master)")]
    Master(#[source] io::Error),
    /// The driver refused universal planes or atomic modesetting.
    #[error("atomic modesetting is not supported by this device")]
    AtomicUnsupported(#[source] io::Error),
    /// Reading the device's mode resources failed.
    #[error("failed to read display resources")]
    Resources(#[source] io::Error),
    /// No connector with the requested id exists.
    #[error("connector {0:?} not found")]
    ConnectorNotFound(ConnectorId),
    /// The connector exists but nothing is plugged in.
    #[error("connector {0:?} is not connected")]
    ConnectorDisconnected(ConnectorId),
    /// The connector has no encoder or pipe currently driving it.
    #[error("connector {0:?} has no active pipe")]
    NoActivePipe(ConnectorId),
    /// Writing a plane property failed.
    #[error("failed to set property {property:?} on plane {plane:?}")]
    Property {
        /// Target plane.
        plane: PlaneId,
        /// Property being written.
        property: PropertyId,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Failure to bind a surface to a plane.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The requested rectangle is empty or extends past the output.
    #[error("surface {rect:?} does not fit within the {width}x{height} output")]
    OutOfBounds {
        /// Requested placement.
        rect: SurfaceRect,
        /// Output width.
        width: u32,
        /// Output height.
        height: u32,
    },
    /// Every overlay plane is already occupied.
    #[error("no free overlay plane")]
    NoFreePlane,
    /// A scan-out buffer for the surface's chain could not be allocated.
    #[error("failed to allocate scan-out buffer")]
    Buffer(#[source] io::Error),
}

/// Failure to register a buffer as a driver framebuffer.
#[derive(Debug, thiserror::Error)]
pub enum FramebufferError {
    /// The driver rejected the registration.
    #[error("failed to register framebuffer for {buffer:?}")]
    Register {
        /// Buffer that could not be registered.
        buffer: BufferId,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Failure of one commit cycle.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The cancel token fired while the cycle was blocked.
    #[error("commit cycle cancelled")]
    Cancelled,
    /// The non-blocking commit was rejected.
    #[error("atomic commit failed")]
    Submit(#[source] io::Error),
    /// Waiting for completion events failed after all retries.
    #[error("waiting for commit completion failed")]
    Wait(#[source] io::Error),
    /// Completion did not arrive within the configured timeout.
    #[error("commit completion timed out with {pending} event(s) outstanding")]
    Timeout {
        /// Completions still outstanding when the wait gave up.
        pending: usize,
    },
}

/// Failure inside a content producer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Producer setup failed; the worker cannot start.
    #[error("producer setup failed: {0}")]
    Setup(String),
    /// The back buffer could not be mapped for CPU access.
    #[error("failed to map back buffer")]
    Map(#[source] io::Error),
    /// Drawing one frame failed.
    #[error("render failed: {0}")]
    Render(String),
}
