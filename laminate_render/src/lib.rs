// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU content producers for laminate surfaces.
//!
//! Each producer implements
//! [`ContentProducer`](laminate_core::worker::ContentProducer) and draws
//! straight into a mapped XRGB8888 scan-out buffer:
//!
//! - [`CubeProducer`]: a flat-shaded rotating cube over a background color
//!   that walks up and down each channel from a per-surface seed.
//! - [`YuvTileProducer`]: a scrolling tile pattern computed in YUV 4:2:0
//!   and converted back to XRGB.
//!
//! The supporting pieces are public for reuse:
//!
//! - [`Transform3d`]: column-major 4×4 transform with rotations and a
//!   perspective frustum.
//! - [`raster`]: convex polygon scan conversion.
//! - [`yuv`]: BT.601 conversions and the tile pattern.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod cube;
pub mod raster;
mod transform;
pub mod yuv;

pub use cube::{CubeProducer, CubeState};
pub use transform::Transform3d;
pub use yuv::{YuvTileProducer, YuvTileState};
