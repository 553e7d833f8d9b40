/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The retained layer tree handed to the compositor.

use bitflags::bitflags;
use servo_geometry::{DeviceIntPoint, DeviceIntRect, DeviceIntRegion, LayoutTransform};
use smallvec::SmallVec;
use strum::IntoStaticStr;

use crate::color::Color;
use crate::id::{DisplayItemKey, ImageKey, LayerId, ScrollId};
use crate::print_tree::PrintTree;

bitflags! {
    /// Hints to the compositor about the content of a layer.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ContentFlags: u8 {
        /// Every pixel of the visible region is opaque.
        const OPAQUE = 1 << 0;
        /// The layer contains text that wants subpixel antialiasing and must be composited
        /// with component alpha.
        const COMPONENT_ALPHA = 1 << 1;
        /// A descendant of this container needs component alpha.
        const COMPONENT_ALPHA_DESCENDANT = 1 << 2;
        /// The layer must not be flattened into its parent by the compositor.
        const DISABLE_FLATTENING = 1 << 3;
        /// The layer is not drawn when its back face is turned towards the viewer.
        const BACKFACE_HIDDEN = 1 << 4;
    }
}

/// A clip that moves with a scroll frame, with an optional index into the layer's ancestor
/// mask layers for rounded corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerClip {
    pub clip_rect: DeviceIntRect,
    pub mask_layer_index: Option<usize>,
}

impl LayerClip {
    pub fn new(clip_rect: DeviceIntRect) -> Self {
        Self {
            clip_rect,
            mask_layer_index: None,
        }
    }
}

/// Describes one scroll frame that moves a layer on the compositor. A layer's metadata list is
/// ordered from the innermost scroll frame outwards.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrollMetadata {
    pub scroll_id: ScrollId,
    /// The scroll port of the scroll frame, in the container's device pixels.
    pub composition_bounds: DeviceIntRect,
    /// The clip applied to the scroll frame by its ancestors, if any.
    pub scroll_clip: Option<LayerClip>,
}

impl ScrollMetadata {
    /// The clip that stays in place while this scroll frame scrolls.
    pub fn clip_rect(&self) -> Option<DeviceIntRect> {
        self.scroll_clip.map(|clip| clip.clip_rect)
    }
}

/// Marks a layer as fixed relative to a scroll frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedPositionData {
    /// The scroll frame that the layer does not move with.
    pub scroll_id: ScrollId,
    pub anchor: DeviceIntPoint,
    pub is_fixed_to_root_scroll_frame: bool,
}

/// Hit-testing information for a painted layer, in the layer's device pixels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventRegions {
    /// Points that definitely hit content.
    pub hit_region: DeviceIntRegion,
    /// Points that might hit content, for example near rounded corners.
    pub maybe_hit_region: DeviceIntRegion,
    /// Points where the content process must be asked before handling input.
    pub dispatch_to_content_region: DeviceIntRegion,
    pub no_action_region: DeviceIntRegion,
    pub horizontal_pan_region: DeviceIntRegion,
    pub vertical_pan_region: DeviceIntRegion,
    pub dispatch_to_content_requires_target_confirmation: bool,
}

impl EventRegions {
    pub fn is_empty(&self) -> bool {
        self.hit_region.is_empty() &&
            self.maybe_hit_region.is_empty() &&
            self.dispatch_to_content_region.is_empty() &&
            self.no_action_region.is_empty() &&
            self.horizontal_pan_region.is_empty() &&
            self.vertical_pan_region.is_empty()
    }
}

/// What a painted layer entry does when it is replayed.
#[derive(Clone, Debug, IntoStaticStr, PartialEq)]
pub enum PaintedEntryKind {
    Item,
    PushOpacity(f32),
    /// An opacity group containing component alpha text, which needs an opaque background to
    /// be drawn into.
    PushOpacityWithBackground(f32),
    PopOpacity,
    PushTransform(LayoutTransform),
    PopTransform,
}

/// One entry of a painted layer's item list.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintedItem {
    pub key: DisplayItemKey,
    pub kind: PaintedEntryKind,
    /// The item's clip rect in the layer's device pixels.
    pub clip_rect: Option<DeviceIntRect>,
    pub bounds: DeviceIntRect,
}

#[derive(Clone, Debug, Default)]
pub struct ContainerLayerData {
    pub children: Vec<LayerId>,
    pub opacity: f32,
    pub transform: Option<LayoutTransform>,
    pub pre_x_scale: f32,
    pub pre_y_scale: f32,
}

#[derive(Clone, Debug, Default)]
pub struct PaintedLayerData {
    /// The pixels of the layer's backing store that hold up to date content.
    pub valid_region: DeviceIntRegion,
    /// Pixels invalidated since the layer was last committed.
    pub invalid_region: DeviceIntRegion,
    pub items: Vec<PaintedItem>,
    /// An opaque color painted under the items, or transparent.
    pub background_color: Color,
}

#[derive(Clone, Debug)]
pub struct MaskLayerData {
    /// Rounded rects whose intersection is the visible area, in device pixels.
    pub rounded_rects: SmallVec<[DeviceIntRect; 1]>,
    /// Corner radii for each rect, as (top left, top right, bottom right, bottom left).
    pub radii: SmallVec<[[i32; 4]; 1]>,
    pub bounds: DeviceIntRect,
}

#[derive(Clone, Debug, IntoStaticStr)]
pub enum LayerKind {
    Container(ContainerLayerData),
    Painted(PaintedLayerData),
    Color { color: Color, bounds: DeviceIntRect },
    Image { image: ImageKey, bounds: DeviceIntRect },
    Mask(MaskLayerData),
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
    pub parent: Option<LayerId>,
    pub clip_rect: Option<DeviceIntRect>,
    pub scrolled_clip: Option<LayerClip>,
    pub visible_region: DeviceIntRegion,
    pub content_flags: ContentFlags,
    pub mask_layer: Option<LayerId>,
    pub ancestor_mask_layers: Vec<LayerId>,
    pub scroll_metadata: Vec<ScrollMetadata>,
    pub fixed_position: Option<FixedPositionData>,
    /// Where input events hit the layer's content. Only painted, color and image layers
    /// have any.
    pub event_regions: EventRegions,
}

impl Layer {
    pub fn new(id: LayerId, kind: LayerKind) -> Self {
        Self {
            id,
            kind,
            parent: None,
            clip_rect: None,
            scrolled_clip: None,
            visible_region: DeviceIntRegion::new(),
            content_flags: ContentFlags::empty(),
            mask_layer: None,
            ancestor_mask_layers: Vec::new(),
            scroll_metadata: Vec::new(),
            fixed_position: None,
            event_regions: EventRegions::default(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        (&self.kind).into()
    }

    pub fn as_painted(&self) -> Option<&PaintedLayerData> {
        match &self.kind {
            LayerKind::Painted(painted) => Some(painted),
            _ => None,
        }
    }

    pub fn as_painted_mut(&mut self) -> Option<&mut PaintedLayerData> {
        match &mut self.kind {
            LayerKind::Painted(painted) => Some(painted),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerLayerData> {
        match &self.kind {
            LayerKind::Container(container) => Some(container),
            _ => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut ContainerLayerData> {
        match &mut self.kind {
            LayerKind::Container(container) => Some(container),
            _ => None,
        }
    }

    pub fn is_painted(&self) -> bool {
        matches!(self.kind, LayerKind::Painted(_))
    }

    pub fn is_mask(&self) -> bool {
        matches!(self.kind, LayerKind::Mask(_))
    }

    /// The clip that does not move when any of the layer's scroll frames scrolls: the clip of
    /// the outermost scroll metadata, or the layer's own clip.
    pub fn stationary_clip_in_container(&self) -> Option<DeviceIntRect> {
        match self.scroll_metadata.last() {
            Some(metadata) => metadata.clip_rect(),
            None => self.clip_rect,
        }
    }

    /// The intersection of the layer clip and the scrolled clip.
    pub fn combined_clip_rect(&self) -> Option<DeviceIntRect> {
        let scrolled = self.scrolled_clip.map(|clip| clip.clip_rect);
        match (self.clip_rect, scrolled) {
            (Some(clip), Some(scrolled)) => {
                Some(clip.intersection(&scrolled).unwrap_or(DeviceIntRect::zero()))
            },
            (clip, None) => clip,
            (None, scrolled) => scrolled,
        }
    }

    /// Mark the whole visible region of a painted layer as needing to be repainted.
    pub fn invalidate_whole_layer(&mut self) {
        let bounds = self.visible_region.bounds();
        if let LayerKind::Painted(painted) = &mut self.kind {
            let valid = painted.valid_region.clone();
            painted.invalid_region.union(&valid);
            painted.invalid_region.union_rect(&bounds);
            painted.valid_region.set_empty();
        }
    }

    pub fn print(&self, tree: &mut PrintTree, children: &dyn Fn(&LayerId, &mut PrintTree)) {
        let mut description = format!(
            "{} {} visible={:?} flags={:?}",
            self.kind_name(),
            self.id,
            self.visible_region,
            self.content_flags
        );
        if let Some(clip) = self.clip_rect {
            description.push_str(&format!(" clip={:?}", clip));
        }
        if !self.scroll_metadata.is_empty() {
            let ids: Vec<_> = self
                .scroll_metadata
                .iter()
                .map(|metadata| metadata.scroll_id.0)
                .collect();
            description.push_str(&format!(" scroll={:?}", ids));
        }
        if let Some(mask) = self.mask_layer {
            description.push_str(&format!(" mask={}", mask));
        }
        match &self.kind {
            LayerKind::Container(container) => {
                tree.new_level(description);
                for child in &container.children {
                    children(child, tree);
                }
                tree.end_level();
            },
            LayerKind::Painted(painted) => {
                tree.new_level(description);
                tree.add_item(format!("invalid={:?}", painted.invalid_region));
                for item in &painted.items {
                    let kind: &'static str = (&item.kind).into();
                    tree.add_item(format!("{} {} {:?}", kind, item.key, item.bounds));
                }
                tree.end_level();
            },
            LayerKind::Color { color, .. } => {
                tree.add_item(format!("{} color={:?}", description, color));
            },
            LayerKind::Image { image, .. } => {
                tree.add_item(format!("{} image={:?}", description, image));
            },
            LayerKind::Mask(_) => tree.add_item(description),
        }
    }
}
