/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Turns display lists into retained layer trees.
//!
//! Each paint, the [`FrameLayerBuilder`] walks a display list, decides which items get a layer
//! of their own and which are painted together into shared painted layers, and computes the
//! pixels of every retained painted layer that changed since the previous paint. The result is
//! committed to the compositor as a whole [`layer_traits::LayerTree`].

// Listed first because of macro definitions.
#[macro_use]
mod macros {
    /// Panic in debug builds only. Used for internal invariants whose violation is a bug in
    /// the builder, but which release builds can survive by skipping the offending item.
    macro_rules! debug_panic {
        ($($arg:tt)*) => {
            if cfg!(debug_assertions) {
                panic!($($arg)*)
            }
        };
    }
}

mod container_state;
pub mod display_list;
mod frame_layer_builder;
mod invalidation;
mod layer_manager;
pub mod layer_state;
mod mask;
mod painted_layer_data;
mod painted_layer_data_tree;
mod retained;

use std::fmt;

pub use crate::frame_layer_builder::{FrameLayerBuilder, PaintCallback, PaintParameters};
pub use crate::invalidation::DisplayItemGeometry;
pub use crate::layer_state::{ItemDisposition, LayerState};

/// Reasons a container could not be turned into a layer.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerBuildError {
    /// The container's transform cannot be inverted, so nothing in it can be drawn.
    SingularTransform,
    /// The item asked for a layer of its own but has no content that a layer can represent.
    LayerCreationFailed(layer_traits::DisplayItemKey),
    /// A flattened effect was closed without being opened, or left open.
    UnbalancedEffectMarkers,
    /// The item is tagged with an AGR or ASR that is not in the display list's trees.
    UnknownRoot(layer_traits::DisplayItemKey),
}

impl fmt::Display for LayerBuildError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LayerBuildError::SingularTransform => {
                write!(formatter, "container transform is not invertible")
            },
            LayerBuildError::LayerCreationFailed(key) => {
                write!(formatter, "could not create a layer for item {}", key)
            },
            LayerBuildError::UnbalancedEffectMarkers => {
                write!(formatter, "unbalanced effect markers in display list")
            },
            LayerBuildError::UnknownRoot(key) => {
                write!(formatter, "item {} refers to an unknown scroll or geometry root", key)
            },
        }
    }
}

impl std::error::Error for LayerBuildError {}
