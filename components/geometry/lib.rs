/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

mod region;

use app_units::{Au, MAX_AU, MIN_AU};
use euclid::{Box2D, Point2D, Rect, Size2D, Transform3D, Vector2D};
pub use region::DeviceIntRegion;

// Units for use with euclid typed geometry.

/// The coordinate space of display items: app units relative to the reference frame of the
/// container that is being layerized.
///
/// An app unit is 1/60th of a CSS pixel. Items keep their geometry in this space so that
/// retained geometry never drifts through repeated scaling; conversion to [`DevicePixel`]
/// happens only through a [`DeviceScale`].
#[derive(Clone, Copy, Debug)]
pub enum LayoutSpace {}

/// One pixel of a layer's backing surface after the container's resolution scale has been
/// applied.
#[derive(Clone, Copy, Debug)]
pub enum DevicePixel {}

pub type AuRect = Rect<Au, LayoutSpace>;
pub type AuPoint = Point2D<Au, LayoutSpace>;
pub type AuSize = Size2D<Au, LayoutSpace>;

pub type DeviceIntRect = Box2D<i32, DevicePixel>;
pub type DeviceIntPoint = Point2D<i32, DevicePixel>;
pub type DeviceIntSize = Size2D<i32, DevicePixel>;
pub type DeviceIntVector = Vector2D<i32, DevicePixel>;

/// A transform between two points in [`LayoutSpace`], expressed in CSS pixels.
pub type LayoutTransform = Transform3D<f32, LayoutSpace, LayoutSpace>;

/// The number of app units in a device pixel at a device scale of 1.
pub const DEFAULT_APP_UNITS_PER_DEV_PIXEL: i32 = 60;

#[inline(always)]
pub fn max_au_rect() -> AuRect {
    Rect::new(
        Point2D::new(MIN_AU / 2, MIN_AU / 2),
        Size2D::new(MAX_AU, MAX_AU),
    )
}

/// Build an app unit rect out of CSS pixel values.
pub fn au_rect_from_px(x: i32, y: i32, width: i32, height: i32) -> AuRect {
    Rect::new(
        Point2D::new(Au::from_px(x), Au::from_px(y)),
        Size2D::new(Au::from_px(width), Au::from_px(height)),
    )
}

/// A helper function to convert a rect of `f32` pixels to a rect of app units.
pub fn f32_rect_to_au_rect(rect: Rect<f32, LayoutSpace>) -> AuRect {
    Rect::new(
        Point2D::new(Au::from_f32_px(rect.origin.x), Au::from_f32_px(rect.origin.y)),
        Size2D::new(
            Au::from_f32_px(rect.size.width),
            Au::from_f32_px(rect.size.height),
        ),
    )
}

/// A helper function to convert a rect of `Au` pixels to a rect of f32 units.
pub fn au_rect_to_f32_rect(rect: AuRect) -> Rect<f32, LayoutSpace> {
    Rect::new(
        Point2D::new(rect.origin.x.to_f32_px(), rect.origin.y.to_f32_px()),
        Size2D::new(rect.size.width.to_f32_px(), rect.size.height.to_f32_px()),
    )
}

/// Whether `rect` has no area. Degenerate rects with negative sizes count as empty.
pub fn au_rect_is_empty(rect: &AuRect) -> bool {
    rect.size.width <= Au(0) || rect.size.height <= Au(0)
}

/// The intersection of two app unit rects, or an empty rect at the origin of `a`.
pub fn au_rect_intersection(a: &AuRect, b: &AuRect) -> AuRect {
    let min_x = a.origin.x.max(b.origin.x);
    let min_y = a.origin.y.max(b.origin.y);
    let max_x = (a.origin.x + a.size.width).min(b.origin.x + b.size.width);
    let max_y = (a.origin.y + a.size.height).min(b.origin.y + b.size.height);
    if max_x <= min_x || max_y <= min_y {
        return Rect::new(a.origin, Size2D::new(Au(0), Au(0)));
    }
    Rect::new(
        Point2D::new(min_x, min_y),
        Size2D::new(max_x - min_x, max_y - min_y),
    )
}

/// The bounding rect of two app unit rects. Empty inputs are ignored.
pub fn au_rect_union(a: &AuRect, b: &AuRect) -> AuRect {
    if au_rect_is_empty(a) {
        return *b;
    }
    if au_rect_is_empty(b) {
        return *a;
    }
    let min_x = a.origin.x.min(b.origin.x);
    let min_y = a.origin.y.min(b.origin.y);
    let max_x = (a.origin.x + a.size.width).max(b.origin.x + b.size.width);
    let max_y = (a.origin.y + a.size.height).max(b.origin.y + b.size.height);
    Rect::new(
        Point2D::new(min_x, min_y),
        Size2D::new(max_x - min_x, max_y - min_y),
    )
}

/// Whether `outer` fully covers `inner`. An empty `inner` is always covered.
pub fn au_rect_contains(outer: &AuRect, inner: &AuRect) -> bool {
    au_rect_is_empty(inner) ||
        (outer.origin.x <= inner.origin.x &&
            outer.origin.y <= inner.origin.y &&
            inner.origin.x + inner.size.width <= outer.origin.x + outer.size.width &&
            inner.origin.y + inner.size.height <= outer.origin.y + outer.size.height)
}

/// Transform `rect` by `transform` and return the app unit bounds of the result. Returns
/// `None` when the transform projects the rect to infinity.
pub fn transform_au_rect(transform: &LayoutTransform, rect: &AuRect) -> Option<AuRect> {
    transform
        .outer_transformed_rect(&au_rect_to_f32_rect(*rect))
        .map(f32_rect_to_au_rect)
}

/// The resolution at which a container's children are rasterized: a per-axis scale on top of
/// the app unit to device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceScale {
    pub x_scale: f32,
    pub y_scale: f32,
    pub app_units_per_dev_pixel: i32,
}

impl Default for DeviceScale {
    fn default() -> Self {
        Self::unscaled(DEFAULT_APP_UNITS_PER_DEV_PIXEL)
    }
}

impl DeviceScale {
    pub fn new(x_scale: f32, y_scale: f32, app_units_per_dev_pixel: i32) -> Self {
        Self {
            x_scale,
            y_scale,
            app_units_per_dev_pixel,
        }
    }

    pub fn unscaled(app_units_per_dev_pixel: i32) -> Self {
        Self::new(1.0, 1.0, app_units_per_dev_pixel)
    }

    fn scaled_edges(&self, rect: &AuRect) -> (f64, f64, f64, f64) {
        let app_units = self.app_units_per_dev_pixel as f64;
        let x_scale = self.x_scale as f64 / app_units;
        let y_scale = self.y_scale as f64 / app_units;
        (
            rect.origin.x.0 as f64 * x_scale,
            rect.origin.y.0 as f64 * y_scale,
            (rect.origin.x.0 as f64 + rect.size.width.0 as f64) * x_scale,
            (rect.origin.y.0 as f64 + rect.size.height.0 as f64) * y_scale,
        )
    }

    /// The smallest device rect covering every pixel touched by `rect`.
    pub fn to_outside_pixels(&self, rect: &AuRect) -> DeviceIntRect {
        if au_rect_is_empty(rect) {
            return DeviceIntRect::zero();
        }
        let (x0, y0, x1, y1) = self.scaled_edges(rect);
        Box2D::new(
            Point2D::new(x0.floor() as i32, y0.floor() as i32),
            Point2D::new(x1.ceil() as i32, y1.ceil() as i32),
        )
    }

    /// The largest device rect made only of pixels fully covered by `rect`.
    pub fn to_inside_pixels(&self, rect: &AuRect) -> DeviceIntRect {
        if au_rect_is_empty(rect) {
            return DeviceIntRect::zero();
        }
        let (x0, y0, x1, y1) = self.scaled_edges(rect);
        let result = Box2D::new(
            Point2D::new(x0.ceil() as i32, y0.ceil() as i32),
            Point2D::new(x1.floor() as i32, y1.floor() as i32),
        );
        if result.is_empty() {
            return DeviceIntRect::zero();
        }
        result
    }

    /// `rect` with each edge snapped to the nearest device pixel boundary.
    pub fn to_nearest_pixels(&self, rect: &AuRect) -> DeviceIntRect {
        if au_rect_is_empty(rect) {
            return DeviceIntRect::zero();
        }
        let (x0, y0, x1, y1) = self.scaled_edges(rect);
        let result = Box2D::new(
            Point2D::new(x0.round() as i32, y0.round() as i32),
            Point2D::new(x1.round() as i32, y1.round() as i32),
        );
        if result.is_empty() {
            return DeviceIntRect::zero();
        }
        result
    }

    /// Map a device rect back into app units. The result covers the device rect exactly.
    pub fn to_app_units(&self, rect: &DeviceIntRect) -> AuRect {
        if rect.is_empty() {
            return AuRect::zero();
        }
        let app_units = self.app_units_per_dev_pixel as f32;
        let to_au_x = |value: i32| Au((value as f32 * app_units / self.x_scale).floor() as i32);
        let to_au_y = |value: i32| Au((value as f32 * app_units / self.y_scale).floor() as i32);
        let origin: AuPoint = Point2D::new(to_au_x(rect.min.x), to_au_y(rect.min.y));
        let far: AuPoint = Point2D::new(to_au_x(rect.max.x), to_au_y(rect.max.y));
        Rect::new(origin, Size2D::new(far.x - origin.x, far.y - origin.y))
    }

    /// Scale every rect of an app unit region to the pixels fully inside it.
    pub fn region_to_inside_pixels(&self, rects: &[AuRect]) -> DeviceIntRegion {
        let mut region = DeviceIntRegion::new();
        for rect in rects {
            region.union_rect(&self.to_inside_pixels(rect));
        }
        region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_pixels_round_away_from_the_rect() {
        let scale = DeviceScale::default();
        let rect = AuRect::new(Point2D::new(Au(30), Au(30)), Size2D::new(Au(60), Au(60)));
        let device = scale.to_outside_pixels(&rect);
        assert_eq!(device, Box2D::new(Point2D::new(0, 0), Point2D::new(2, 2)));
        let inside = scale.to_inside_pixels(&rect);
        assert!(inside.is_empty());
    }

    #[test]
    fn nearest_pixels_respect_scale() {
        let scale = DeviceScale::new(2.0, 2.0, DEFAULT_APP_UNITS_PER_DEV_PIXEL);
        let device = scale.to_nearest_pixels(&au_rect_from_px(1, 2, 10, 10));
        assert_eq!(device, Box2D::new(Point2D::new(2, 4), Point2D::new(22, 24)));
    }

    #[test]
    fn app_unit_conversion_covers_device_rect() {
        let scale = DeviceScale::default();
        let device = Box2D::new(Point2D::new(3, 4), Point2D::new(10, 12));
        let au = scale.to_app_units(&device);
        assert_eq!(scale.to_outside_pixels(&au), device);
    }

    #[test]
    fn au_rect_helpers() {
        let a = au_rect_from_px(0, 0, 10, 10);
        let b = au_rect_from_px(5, 5, 10, 10);
        assert_eq!(au_rect_intersection(&a, &b), au_rect_from_px(5, 5, 5, 5));
        assert_eq!(au_rect_union(&a, &b), au_rect_from_px(0, 0, 15, 15));
        assert!(au_rect_contains(&au_rect_union(&a, &b), &b));
        assert!(au_rect_is_empty(&au_rect_intersection(
            &a,
            &au_rect_from_px(20, 20, 1, 1)
        )));
    }

    #[test]
    fn translation_transform_moves_rect() {
        let transform = LayoutTransform::translation(10.0, 5.0, 0.0);
        let moved = transform_au_rect(&transform, &au_rect_from_px(0, 0, 10, 10));
        assert_eq!(moved, Some(au_rect_from_px(10, 5, 10, 10)));
    }
}
