// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display output description.
//!
//! An [`Output`] is the resolved result of opening a device on one connector:
//! the pipe that drives it and the pipe's active resolution.

use crate::id::{ConnectorId, PipeId};

/// The active output a device was opened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Output {
    /// Connector the caller selected.
    pub connector: ConnectorId,
    /// Pipe currently routed to the connector.
    pub pipe: PipeId,
    /// Active horizontal resolution in pixels.
    pub width: u32,
    /// Active vertical resolution in pixels.
    pub height: u32,
}

impl Output {
    /// Returns `(width, height)`.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
