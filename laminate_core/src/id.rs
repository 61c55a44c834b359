// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity types for display objects.
//!
//! Backends assign these from the driver's object ids. Core code passes them
//! through without interpreting the value.

use core::fmt;

macro_rules! display_id {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            /// Returns the raw id value.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> $repr {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

display_id! {
    /// A display connector (physical output port).
    ConnectorId(u32)
}

display_id! {
    /// A display pipe (CRTC) driving one output.
    PipeId(u32)
}

display_id! {
    /// A hardware scan-out plane.
    PlaneId(u32)
}

display_id! {
    /// A driver object property, such as a plane's `FB_ID`.
    PropertyId(u32)
}

display_id! {
    /// A driver framebuffer registered from a scan-out buffer.
    FramebufferId(u32)
}

display_id! {
    /// Identity of one scan-out buffer for its whole lifetime.
    ///
    /// Unlike the driver's memory handle, a `BufferId` is never reused.
    BufferId(u64)
}
