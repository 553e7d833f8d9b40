/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Identifiers shared between the layer builder, layout and the compositor.

use std::fmt;

/// Identifies a frame (a box produced by layout). Frames are created and destroyed by layout;
/// the layer builder only ever uses them as lookup keys.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrameId(pub u64);

/// The stable identity of a display item across paints: the frame that created it and a key
/// that is unique among that frame's items.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DisplayItemKey {
    pub frame: FrameId,
    pub per_frame_key: u32,
}

impl DisplayItemKey {
    pub fn new(frame: FrameId, per_frame_key: u32) -> Self {
        Self {
            frame,
            per_frame_key,
        }
    }
}

impl fmt::Display for DisplayItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.frame.0, self.per_frame_key)
    }
}

/// Identifies a retained layer. Layer ids are never reused within one layer manager.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer{}", self.0)
    }
}

/// Identifies a scroll frame that the compositor can scroll asynchronously.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ScrollId(pub u64);

/// Identifies decoded image content that an image layer can present without painting.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ImageKey(pub u64);
