/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The display list consumed by the layer builder.
//!
//! A display list is produced by layout once per paint. Items refer to three shared trees,
//! kept in [`DisplayListTrees`]: animated geometry roots, active scrolled roots and clip
//! chains.

use bitflags::bitflags;
use layer_traits::{Color, DisplayItemKey, FrameId, ImageKey};
use servo_geometry::{AuPoint, AuRect, LayoutTransform, au_rect_union};
use smallvec::SmallVec;
use strum::IntoStaticStr;

pub mod clip;
pub mod iterator;
pub mod roots;

use self::clip::{ClipChainId, ClipChainStore};
use self::roots::{ActiveScrolledRootStore, AgrId, AnimatedGeometryRootStore, AsrId};
use crate::LayerBuildError;
use crate::layer_state::LayerState;

/// The trees shared by every item of a display list and its nested lists.
#[derive(Clone, Debug, Default)]
pub struct DisplayListTrees {
    pub agrs: AnimatedGeometryRootStore,
    pub asrs: ActiveScrolledRootStore,
    pub clip_chains: ClipChainStore,
}

impl DisplayListTrees {
    /// Check that every item of `list`, nested ones included, is tagged with roots that exist
    /// in these trees.
    pub fn check_roots(&self, list: &DisplayList) -> Result<(), LayerBuildError> {
        for item in &list.items {
            if !self.agrs.contains(item.agr) || !self.asrs.contains(item.asr) {
                return Err(LayerBuildError::UnknownRoot(item.key));
            }
            let mut links = std::iter::successors(self.clip_chains.get(item.clip_chain), |node| {
                self.clip_chains.get(node.parent)
            })
            .take(self.clip_chains.0.len());
            if links.any(|node| !self.asrs.contains(node.asr)) {
                return Err(LayerBuildError::UnknownRoot(item.key));
            }
            if let Some(children) = item.children() {
                self.check_roots(children)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct DisplayList {
    pub items: Vec<DisplayItem>,
}

impl DisplayList {
    pub fn new(items: Vec<DisplayItem>) -> Self {
        Self { items }
    }

    /// The union of the bounds of every item.
    pub fn bounds(&self) -> AuRect {
        self.items
            .iter()
            .fold(AuRect::zero(), |bounds, item| au_rect_union(&bounds, &item.bounds))
    }
}

impl From<Vec<DisplayItem>> for DisplayList {
    fn from(items: Vec<DisplayItem>) -> Self {
        Self::new(items)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ItemFlags: u8 {
        /// The item is not drawn when its back face is turned towards the viewer.
        const BACKFACE_HIDDEN = 1 << 0;
        /// Build the item's own layer even when nothing of it is visible, so that animations
        /// can start without a new display list.
        const BUILD_EVEN_IF_INVISIBLE = 1 << 1;
        /// A transform whose content is rendered beyond its visible area because it may be
        /// animated by the compositor.
        const PRERENDERED_TRANSFORM = 1 << 2;
        /// The item must be drawn onto a surface with an alpha channel.
        const FORCE_TRANSPARENT_SURFACE = 1 << 3;
    }
}

bitflags! {
    /// How the compositor should treat input events over a hit test area.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct HitTestFlags: u8 {
        /// Input events must be sent to the content thread before being handled.
        const DISPATCH_TO_CONTENT = 1 << 0;
        /// The content thread has to confirm the target of the event.
        const REQUIRES_TARGET_CONFIRMATION = 1 << 1;
        const TOUCH_ACTION_PAN_X_DISABLED = 1 << 2;
        const TOUCH_ACTION_PAN_Y_DISABLED = 1 << 3;
        const TOUCH_ACTION_PINCH_ZOOM_DISABLED = 1 << 4;
        const TOUCH_ACTION_DOUBLE_TAP_ZOOM_DISABLED = 1 << 5;
        const TOUCH_ACTION_MASK = Self::TOUCH_ACTION_PAN_X_DISABLED.bits() |
            Self::TOUCH_ACTION_PAN_Y_DISABLED.bits() |
            Self::TOUCH_ACTION_PINCH_ZOOM_DISABLED.bits() |
            Self::TOUCH_ACTION_DOUBLE_TAP_ZOOM_DISABLED.bits();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HitTestInfo {
    pub area: AuRect,
    pub flags: HitTestFlags,
    /// The element has rounded corners or non-rectangular geometry, so the area is only
    /// approximate.
    pub irregular_shape: bool,
}

/// Marks an item as fixed relative to a scroll frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedPosition {
    pub anchor: AuPoint,
    /// The item is fixed to the viewport rather than to an inner scroll frame.
    pub is_fixed_to_root_scroll_frame: bool,
}

/// A change to an item that its geometry alone does not reveal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ItemInvalidation {
    #[default]
    None,
    /// Everything the item draws has changed.
    Whole,
    /// The given part of the item has changed.
    Rect(AuRect),
}

#[derive(Clone, Debug, IntoStaticStr)]
pub enum DisplayItemContent {
    SolidColor(Color),
    Image {
        image: ImageKey,
        /// Every pixel of the image is opaque.
        opaque: bool,
    },
    /// Any other drawing. The hash changes whenever what is drawn changes.
    Painted { content_hash: u64 },
    /// An area that receives input events. Draws nothing.
    HitTest(HitTestInfo),
    Opacity {
        opacity: f32,
        children: DisplayList,
    },
    Transform {
        transform: LayoutTransform,
        children: DisplayList,
    },
    /// A group that only exists to tag its children. Always flattened into its parent list.
    Wrapper(DisplayList),
    /// A group that has to be composited as a whole, such as a filter or blend group. Never
    /// flattened: it either gets a layer of its own or is drawn into its painted layer from a
    /// nested layer tree.
    Filter(DisplayList),
}

#[derive(Clone, Debug)]
pub struct DisplayItem {
    pub key: DisplayItemKey,
    pub bounds: AuRect,
    /// The area the item was built for. Anything outside it may be missing.
    pub building_rect: AuRect,
    pub clip_chain: ClipChainId,
    pub agr: AgrId,
    pub asr: AsrId,
    pub layer_state: LayerState,
    pub content: DisplayItemContent,
    /// Areas known to be opaque beyond what the content reveals.
    pub opaque_rects: SmallVec<[AuRect; 1]>,
    /// The area containing text drawn with subpixel antialiasing.
    pub component_alpha_bounds: Option<AuRect>,
    pub invalidation: ItemInvalidation,
    /// Adjacent items of the same frame and merge group are combined into one.
    pub merge_group: Option<u32>,
    pub flags: ItemFlags,
    pub fixed_position: Option<FixedPosition>,
}

impl DisplayItem {
    pub fn new(key: DisplayItemKey, bounds: AuRect, content: DisplayItemContent) -> Self {
        Self {
            key,
            bounds,
            building_rect: bounds,
            clip_chain: ClipChainId::NONE,
            agr: AgrId::ROOT,
            asr: AsrId::ROOT,
            layer_state: LayerState::None,
            content,
            opaque_rects: SmallVec::new(),
            component_alpha_bounds: None,
            invalidation: ItemInvalidation::None,
            merge_group: None,
            flags: ItemFlags::empty(),
            fixed_position: None,
        }
    }

    pub fn solid_color(key: DisplayItemKey, bounds: AuRect, color: Color) -> Self {
        Self::new(key, bounds, DisplayItemContent::SolidColor(color))
    }

    pub fn painted(key: DisplayItemKey, bounds: AuRect, content_hash: u64) -> Self {
        Self::new(key, bounds, DisplayItemContent::Painted { content_hash })
    }

    pub fn image(key: DisplayItemKey, bounds: AuRect, image: ImageKey, opaque: bool) -> Self {
        Self::new(key, bounds, DisplayItemContent::Image { image, opaque })
    }

    pub fn hit_test(key: DisplayItemKey, area: AuRect, flags: HitTestFlags) -> Self {
        Self::new(
            key,
            area,
            DisplayItemContent::HitTest(HitTestInfo {
                area,
                flags,
                irregular_shape: false,
            }),
        )
    }

    pub fn opacity(key: DisplayItemKey, opacity: f32, children: Vec<DisplayItem>) -> Self {
        let children = DisplayList::new(children);
        Self::new(
            key,
            children.bounds(),
            DisplayItemContent::Opacity { opacity, children },
        )
    }

    /// A transformed group. `children` are in the coordinate space inside the transform; the
    /// bounds are those of the transformed children.
    pub fn transform(
        key: DisplayItemKey,
        transform: LayoutTransform,
        children: Vec<DisplayItem>,
    ) -> Self {
        let children = DisplayList::new(children);
        let bounds = servo_geometry::transform_au_rect(&transform, &children.bounds())
            .unwrap_or_else(AuRect::zero);
        Self::new(
            key,
            bounds,
            DisplayItemContent::Transform {
                transform,
                children,
            },
        )
    }

    pub fn wrapper(key: DisplayItemKey, children: Vec<DisplayItem>) -> Self {
        let children = DisplayList::new(children);
        Self::new(key, children.bounds(), DisplayItemContent::Wrapper(children))
    }

    pub fn filter(key: DisplayItemKey, children: Vec<DisplayItem>) -> Self {
        let children = DisplayList::new(children);
        Self::new(key, children.bounds(), DisplayItemContent::Filter(children))
    }

    pub fn with_clip_chain(mut self, clip_chain: ClipChainId) -> Self {
        self.clip_chain = clip_chain;
        self
    }

    pub fn with_roots(mut self, agr: AgrId, asr: AsrId) -> Self {
        self.agr = agr;
        self.asr = asr;
        self
    }

    pub fn with_layer_state(mut self, layer_state: LayerState) -> Self {
        self.layer_state = layer_state;
        self
    }

    pub fn with_opaque_rect(mut self, rect: AuRect) -> Self {
        self.opaque_rects.push(rect);
        self
    }

    pub fn with_component_alpha_bounds(mut self, bounds: AuRect) -> Self {
        self.component_alpha_bounds = Some(bounds);
        self
    }

    pub fn with_invalidation(mut self, invalidation: ItemInvalidation) -> Self {
        self.invalidation = invalidation;
        self
    }

    pub fn with_merge_group(mut self, group: u32) -> Self {
        self.merge_group = Some(group);
        self
    }

    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_fixed_position(mut self, fixed_position: FixedPosition) -> Self {
        self.fixed_position = Some(fixed_position);
        self
    }

    pub fn frame(&self) -> FrameId {
        self.key.frame
    }

    pub fn type_name(&self) -> &'static str {
        (&self.content).into()
    }

    /// The color of every pixel inside the bounds, if the item paints a single color.
    pub fn is_uniform(&self) -> Option<Color> {
        match self.content {
            DisplayItemContent::SolidColor(color) => Some(color),
            _ => None,
        }
    }

    /// Whether the item can be given a layer of its own. Anything else is drawn into a
    /// painted layer whatever its layer state says.
    pub fn can_build_layer(&self) -> bool {
        !matches!(
            self.content,
            DisplayItemContent::Painted { .. } | DisplayItemContent::HitTest(_)
        )
    }

    /// The areas every pixel of which the item paints opaquely.
    pub fn opaque_region(&self) -> SmallVec<[AuRect; 1]> {
        let mut region = self.opaque_rects.clone();
        match self.content {
            DisplayItemContent::SolidColor(color) if color.is_opaque() => region.push(self.bounds),
            DisplayItemContent::Image { opaque: true, .. } => region.push(self.bounds),
            _ => {},
        }
        region
    }

    pub fn children(&self) -> Option<&DisplayList> {
        match &self.content {
            DisplayItemContent::Opacity { children, .. } |
            DisplayItemContent::Transform { children, .. } |
            DisplayItemContent::Wrapper(children) |
            DisplayItemContent::Filter(children) => Some(children),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut DisplayList> {
        match &mut self.content {
            DisplayItemContent::Opacity { children, .. } |
            DisplayItemContent::Transform { children, .. } |
            DisplayItemContent::Wrapper(children) |
            DisplayItemContent::Filter(children) => Some(children),
            _ => None,
        }
    }

    pub fn backface_hidden(&self) -> bool {
        self.flags.contains(ItemFlags::BACKFACE_HIDDEN)
    }

    /// Whether `other`, which follows this item, can be merged into it.
    pub fn can_merge(&self, other: &DisplayItem) -> bool {
        self.merge_group.is_some() &&
            self.merge_group == other.merge_group &&
            self.frame() == other.frame() &&
            self.type_name() == other.type_name() &&
            self.children().is_some() &&
            self.clip_chain == other.clip_chain &&
            self.asr == other.asr
    }

    /// Combine consecutive mergeable items into one item with the key of the first.
    pub fn merge<'a>(items: impl IntoIterator<Item = &'a DisplayItem>) -> Option<DisplayItem> {
        let mut items = items.into_iter();
        let mut merged = items.next()?.clone();
        for item in items {
            merged.bounds = au_rect_union(&merged.bounds, &item.bounds);
            merged.building_rect = au_rect_union(&merged.building_rect, &item.building_rect);
            if let (Some(children), Some(more)) = (merged.children_mut(), item.children()) {
                children.items.extend(more.items.iter().cloned());
            }
        }
        Some(merged)
    }
}

/// Shorthand used by tests and by embedders that build lists by hand.
pub fn item_key(frame: u64, per_frame_key: u32) -> DisplayItemKey {
    DisplayItemKey::new(FrameId(frame), per_frame_key)
}
