// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linux DRM/KMS backend for laminate.
//!
//! [`DrmDevice`] implements [`laminate_core::device::Device`] on a DRM card
//! node:
//!
//! - **Open**: [`DrmDevice::open`] becomes DRM master, enables the universal
//!   planes and atomic client capabilities, and resolves the requested
//!   connector through its encoder to the CRTC driving it. The CRTC's active
//!   mode is the [`Output`](laminate_core::output::Output) size.
//! - **Planes**: [`DrmDevice::discover_planes`] reads every plane's `type`,
//!   `FB_ID` and `zorder` (or `zpos`) properties, skipping planes that cannot
//!   scan out on the active CRTC.
//! - **Buffers**: XRGB8888 dumb buffers, mapped for CPU rendering.
//! - **Commits**: atomic test-only and non-blocking page-flip commits; the
//!   page-flip events are read from the card descriptor after a `poll`.
//!
//! ```no_run
//! use laminate_backend_drm::DrmDevice;
//! use laminate_core::id::ConnectorId;
//!
//! let device = DrmDevice::open("/dev/dri/card0", ConnectorId(24))?;
//! let planes = device.discover_planes()?;
//! # Ok::<(), laminate_core::error::DeviceError>(())
//! ```
//!
//! Host times from [`now`] are `CLOCK_MONOTONIC` nanoseconds
//! ([`timebase`] is [`Timebase::NANOS`](laminate_core::time::Timebase::NANOS)).

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod buffer;
mod card;
mod device;
mod planes;
mod time;

pub use buffer::DumbScanoutBuffer;
pub use card::Card;
pub use device::DrmDevice;
pub use planes::describe_plane;
pub use time::{now, timebase};
