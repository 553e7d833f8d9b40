/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Working out which pixels of a painted layer changed between two paints of an item.

use layer_traits::{Color, ImageKey};
use servo_geometry::{AuRect, DeviceIntRegion, DeviceScale};

use crate::display_list::clip::DisplayItemClip;
use crate::display_list::{DisplayItem, DisplayItemContent, ItemInvalidation};

/// The part of an item's content that decides whether its pixels changed.
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryContent {
    SolidColor(Color),
    Image(ImageKey),
    Painted(u64),
    /// Opacity and transform groups drawn into a painted layer. Their children are tracked
    /// by a nested builder.
    Group { opacity: Option<u32> },
    Other,
}

/// What is retained about an item between paints, in the app units of the painted layer's
/// container.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayItemGeometry {
    pub bounds: AuRect,
    pub content: GeometryContent,
}

impl DisplayItemGeometry {
    /// The geometry of `item`, in the item's own coordinate space.
    pub fn new(item: &DisplayItem) -> Self {
        let content = match &item.content {
            DisplayItemContent::SolidColor(color) => GeometryContent::SolidColor(*color),
            DisplayItemContent::Image { image, .. } => GeometryContent::Image(*image),
            DisplayItemContent::Painted { content_hash } => GeometryContent::Painted(*content_hash),
            DisplayItemContent::Opacity { opacity, .. } => GeometryContent::Group {
                opacity: Some(opacity.to_bits()),
            },
            DisplayItemContent::Transform { .. } | DisplayItemContent::Filter(_) => {
                GeometryContent::Group { opacity: None }
            },
            DisplayItemContent::HitTest(_) | DisplayItemContent::Wrapper(_) => {
                GeometryContent::Other
            },
        };
        Self {
            bounds: item.bounds,
            content,
        }
    }

    /// Move the geometry into the space of an enclosing flattened transform. Clips of the
    /// transform items are applied by `transform_bounds`.
    pub(crate) fn transformed(mut self, transform_bounds: impl FnOnce(&AuRect) -> AuRect) -> Self {
        self.bounds = transform_bounds(&self.bounds);
        self
    }

    fn clipped_pixels(&self, clip: &DisplayItemClip, scale: &DeviceScale) -> DeviceIntRegion {
        DeviceIntRegion::from_rect(
            &scale.to_outside_pixels(&clip.apply_non_rounded_intersection(&self.bounds)),
        )
    }

    /// The pixels the item covered, to be repainted when it goes away.
    pub fn invalidation_region(
        &self,
        clip: &DisplayItemClip,
        scale: &DeviceScale,
    ) -> DeviceIntRegion {
        self.clipped_pixels(clip, scale)
    }
}

/// The device pixels that must be repainted for an item whose geometry went from `old` to
/// `new`. A missing `old` means the item is new to its layer.
pub(crate) fn compute_geometry_change(
    old: Option<(&DisplayItemGeometry, &DisplayItemClip)>,
    new: &DisplayItemGeometry,
    new_clip: &DisplayItemClip,
    invalidation: ItemInvalidation,
    scale: &DeviceScale,
) -> DeviceIntRegion {
    let new_pixels = new.clipped_pixels(new_clip, scale);
    let Some((old, old_clip)) = old else {
        return new_pixels;
    };
    let old_pixels = old.clipped_pixels(old_clip, scale);

    let mut changed = DeviceIntRegion::new();
    let rounded_changed = old_clip.rounded_rects != new_clip.rounded_rects;
    if invalidation == ItemInvalidation::Whole || old.content != new.content {
        changed = old_pixels;
        changed.union(&new_pixels);
    } else if old.bounds != new.bounds || old_clip != new_clip {
        let is_solid = matches!(new.content, GeometryContent::SolidColor(_));
        if (is_solid || old.bounds == new.bounds) && !rounded_changed {
            // Only the pixels that were covered before or after, but not both, changed.
            changed = DeviceIntRegion::xor(&old_pixels, &new_pixels);
        } else {
            changed = old_pixels;
            changed.union(&new_pixels);
        }
    }

    if let ItemInvalidation::Rect(rect) = invalidation {
        let rect = new_clip.apply_non_rounded_intersection(&rect);
        changed.union_rect(&scale.to_outside_pixels(&rect));
    }
    changed
}

#[cfg(test)]
mod tests {
    use euclid::{Box2D, Point2D};
    use servo_geometry::au_rect_from_px;

    use super::*;
    use crate::display_list::item_key;

    fn solid(x: i32) -> DisplayItemGeometry {
        let bounds = au_rect_from_px(x, 0, 100, 100);
        DisplayItemGeometry::new(&DisplayItem::solid_color(item_key(1, 1), bounds, Color::WHITE))
    }

    #[test]
    fn unchanged_item_invalidates_nothing() {
        let clip = DisplayItemClip::no_clip();
        let geometry = solid(0);
        let changed = compute_geometry_change(
            Some((&geometry, &clip)),
            &geometry,
            &clip,
            ItemInvalidation::None,
            &DeviceScale::default(),
        );
        assert!(changed.is_empty());
    }

    #[test]
    fn moved_solid_color_invalidates_symmetric_difference() {
        let clip = DisplayItemClip::no_clip();
        let changed = compute_geometry_change(
            Some((&solid(0), &clip)),
            &solid(1),
            &clip,
            ItemInvalidation::None,
            &DeviceScale::default(),
        );
        let mut expected = DeviceIntRegion::from_rect(&Box2D::new(
            Point2D::new(0, 0),
            Point2D::new(1, 100),
        ));
        expected.union_rect(&Box2D::new(Point2D::new(100, 0), Point2D::new(101, 100)));
        assert_eq!(changed, expected);
    }

    #[test]
    fn new_item_invalidates_clipped_bounds() {
        let clip = DisplayItemClip::from_rect(au_rect_from_px(0, 0, 50, 50));
        let changed = compute_geometry_change(
            None,
            &solid(0),
            &clip,
            ItemInvalidation::None,
            &DeviceScale::default(),
        );
        assert!(changed.is_equal_to_rect(&Box2D::new(Point2D::new(0, 0), Point2D::new(50, 50))));
    }

    #[test]
    fn changed_content_invalidates_old_and_new() {
        let clip = DisplayItemClip::no_clip();
        let old = DisplayItemGeometry::new(
            &DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 10, 10), 1),
        );
        let new = DisplayItemGeometry::new(
            &DisplayItem::painted(item_key(1, 1), au_rect_from_px(20, 0, 10, 10), 2),
        );
        let changed = compute_geometry_change(
            Some((&old, &clip)),
            &new,
            &clip,
            ItemInvalidation::None,
            &DeviceScale::default(),
        );
        assert_eq!(changed.area(), 200);
    }
}
