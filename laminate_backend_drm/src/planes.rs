// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane property classification.

use laminate_core::id::{PlaneId, PropertyId};
use laminate_core::plane::{PlaneDescriptor, PlaneKind};

const TYPE: &str = "type";
const FB_ID: &str = "FB_ID";
const ZORDER: &str = "zorder";
const ZPOS: &str = "zpos";

/// Builds a [`PlaneDescriptor`] from a plane's `(name, property, value)`
/// triples.
///
/// Returns `None` if the plane lacks a `type` or `FB_ID` property or has an
/// unknown type. The stacking-order property is `zorder` if present,
/// otherwise `zpos`.
pub fn describe_plane<N, I>(id: PlaneId, properties: I) -> Option<PlaneDescriptor>
where
    N: AsRef<str>,
    I: IntoIterator<Item = (N, PropertyId, u64)>,
{
    let mut kind = None;
    let mut fb_property = None;
    let mut zorder = None;
    let mut zpos = None;
    for (name, property, value) in properties {
        match name.as_ref() {
            TYPE => kind = PlaneKind::from_type_property(value),
            FB_ID => fb_property = Some(property),
            ZORDER => zorder = Some(property),
            ZPOS => zpos = Some(property),
            _ => {}
        }
    }
    Some(PlaneDescriptor {
        id,
        kind: kind?,
        fb_property: fb_property?,
        zorder_property: zorder.or(zpos),
    })
}
