/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! An integer region made of non-overlapping device rectangles.

use std::fmt;

use euclid::{Box2D, Point2D};
use smallvec::SmallVec;

use crate::{DeviceIntRect, DeviceIntVector};

/// A set of device pixels, stored as a list of pairwise disjoint, non-empty rects.
///
/// Operations keep the list disjoint and merge rects that share a full edge, so the rect count
/// stays a reasonable measure of the region's complexity. [`DeviceIntRegion::simplify_outward`]
/// bounds that complexity by growing the region.
#[derive(Clone, Default)]
pub struct DeviceIntRegion {
    rects: SmallVec<[DeviceIntRect; 4]>,
}

impl fmt::Debug for DeviceIntRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Region[")?;
        for (index, rect) in self.rects.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(
                f,
                "({},{})-({},{})",
                rect.min.x, rect.min.y, rect.max.x, rect.max.y
            )?;
        }
        f.write_str("]")
    }
}

/// Two regions are equal when they cover the same pixels, regardless of how they are split.
impl PartialEq for DeviceIntRegion {
    fn eq(&self, other: &Self) -> bool {
        self.contains_region(other) && other.contains_region(self)
    }
}

fn union_of_boxes(a: &DeviceIntRect, b: &DeviceIntRect) -> DeviceIntRect {
    if a.is_empty() {
        return *b;
    }
    if b.is_empty() {
        return *a;
    }
    Box2D::new(
        Point2D::new(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
        Point2D::new(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
    )
}

fn box_area(rect: &DeviceIntRect) -> i64 {
    if rect.is_empty() {
        return 0;
    }
    rect.width() as i64 * rect.height() as i64
}

/// The parts of `rect` not covered by `hole`, as at most four disjoint rects.
fn subtract_box(rect: &DeviceIntRect, hole: &DeviceIntRect) -> SmallVec<[DeviceIntRect; 4]> {
    let mut pieces = SmallVec::new();
    if !rect.intersects(hole) {
        pieces.push(*rect);
        return pieces;
    }

    let top = rect.min.y.max(hole.min.y);
    let bottom = rect.max.y.min(hole.max.y);
    if hole.min.y > rect.min.y {
        pieces.push(Box2D::new(rect.min, Point2D::new(rect.max.x, top)));
    }
    if hole.min.x > rect.min.x {
        pieces.push(Box2D::new(
            Point2D::new(rect.min.x, top),
            Point2D::new(hole.min.x, bottom),
        ));
    }
    if hole.max.x < rect.max.x {
        pieces.push(Box2D::new(
            Point2D::new(hole.max.x, top),
            Point2D::new(rect.max.x, bottom),
        ));
    }
    if hole.max.y < rect.max.y {
        pieces.push(Box2D::new(Point2D::new(rect.min.x, bottom), rect.max));
    }
    pieces
}

fn can_merge(a: &DeviceIntRect, b: &DeviceIntRect) -> bool {
    let horizontal = a.min.y == b.min.y &&
        a.max.y == b.max.y &&
        (a.max.x == b.min.x || b.max.x == a.min.x);
    let vertical = a.min.x == b.min.x &&
        a.max.x == b.max.x &&
        (a.max.y == b.min.y || b.max.y == a.min.y);
    horizontal || vertical
}

impl DeviceIntRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: &DeviceIntRect) -> Self {
        let mut region = Self::new();
        if !rect.is_empty() {
            region.rects.push(*rect);
        }
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn set_empty(&mut self) {
        self.rects.clear();
    }

    pub fn num_rects(&self) -> usize {
        self.rects.len()
    }

    pub fn rects(&self) -> impl Iterator<Item = &DeviceIntRect> {
        self.rects.iter()
    }

    /// The bounding rect of the region, or an empty rect when the region is empty.
    pub fn bounds(&self) -> DeviceIntRect {
        self.rects
            .iter()
            .fold(DeviceIntRect::zero(), |bounds, rect| union_of_boxes(&bounds, rect))
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(box_area).sum()
    }

    /// Merge rects sharing a full edge until no such pair remains.
    fn coalesce(&mut self) {
        'restart: loop {
            for i in 0..self.rects.len() {
                for j in (i + 1)..self.rects.len() {
                    if can_merge(&self.rects[i], &self.rects[j]) {
                        let merged = union_of_boxes(&self.rects[i], &self.rects[j]);
                        self.rects.swap_remove(j);
                        self.rects[i] = merged;
                        continue 'restart;
                    }
                }
            }
            return;
        }
    }

    pub fn union_rect(&mut self, rect: &DeviceIntRect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces: SmallVec<[DeviceIntRect; 4]> = SmallVec::new();
        pieces.push(*rect);
        for existing in &self.rects {
            pieces = pieces
                .iter()
                .flat_map(|piece| subtract_box(piece, existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
        self.coalesce();
    }

    pub fn union(&mut self, other: &DeviceIntRegion) {
        for rect in &other.rects {
            self.union_rect(rect);
        }
    }

    pub fn subtract_rect(&mut self, hole: &DeviceIntRect) {
        if hole.is_empty() || !self.intersects_rect(hole) {
            return;
        }
        self.rects = self
            .rects
            .iter()
            .flat_map(|rect| subtract_box(rect, hole))
            .collect();
        self.coalesce();
    }

    pub fn subtract(&mut self, other: &DeviceIntRegion) {
        for hole in &other.rects {
            self.subtract_rect(hole);
        }
    }

    pub fn intersect_rect(&mut self, clip: &DeviceIntRect) {
        self.rects = self
            .rects
            .iter()
            .filter_map(|rect| rect.intersection(clip))
            .filter(|rect| !rect.is_empty())
            .collect();
        self.coalesce();
    }

    pub fn intersect(&mut self, other: &DeviceIntRegion) {
        let mut rects: SmallVec<[DeviceIntRect; 4]> = SmallVec::new();
        for a in &self.rects {
            for b in &other.rects {
                if let Some(rect) = a.intersection(b) {
                    if !rect.is_empty() {
                        rects.push(rect);
                    }
                }
            }
        }
        self.rects = rects;
        self.coalesce();
    }

    pub fn intersects_rect(&self, rect: &DeviceIntRect) -> bool {
        !rect.is_empty() && self.rects.iter().any(|existing| existing.intersects(rect))
    }

    pub fn intersects(&self, other: &DeviceIntRegion) -> bool {
        other.rects.iter().any(|rect| self.intersects_rect(rect))
    }

    /// Whether every pixel of `rect` is in the region. Empty rects are always contained.
    pub fn contains_rect(&self, rect: &DeviceIntRect) -> bool {
        if rect.is_empty() {
            return true;
        }
        let mut remaining: SmallVec<[DeviceIntRect; 4]> = SmallVec::new();
        remaining.push(*rect);
        for existing in &self.rects {
            remaining = remaining
                .iter()
                .flat_map(|piece| subtract_box(piece, existing))
                .collect();
            if remaining.is_empty() {
                return true;
            }
        }
        false
    }

    pub fn contains_region(&self, other: &DeviceIntRegion) -> bool {
        other.rects.iter().all(|rect| self.contains_rect(rect))
    }

    /// Whether the region covers exactly the pixels of `rect`.
    pub fn is_equal_to_rect(&self, rect: &DeviceIntRect) -> bool {
        if rect.is_empty() {
            return self.is_empty();
        }
        self.bounds() == *rect && self.area() == box_area(rect)
    }

    pub fn translate(&mut self, offset: DeviceIntVector) {
        for rect in self.rects.iter_mut() {
            *rect = rect.translate(offset);
        }
    }

    /// Grow the region until it has at most `max_rects` rects. The result always contains the
    /// original region. The pair of rects whose bounding box wastes the least area is merged
    /// first.
    pub fn simplify_outward(&mut self, max_rects: usize) {
        let max_rects = max_rects.max(1);
        while self.rects.len() > max_rects {
            let mut best = (0, 1);
            let mut best_waste = i64::MAX;
            for i in 0..self.rects.len() {
                for j in (i + 1)..self.rects.len() {
                    let merged = union_of_boxes(&self.rects[i], &self.rects[j]);
                    let waste =
                        box_area(&merged) - box_area(&self.rects[i]) - box_area(&self.rects[j]);
                    if waste < best_waste {
                        best_waste = waste;
                        best = (i, j);
                    }
                }
            }

            let (i, j) = best;
            let mut merged = union_of_boxes(&self.rects[i], &self.rects[j]);
            self.rects.swap_remove(j);
            self.rects.swap_remove(i);

            // Absorb anything the bounding box now overlaps so the rects stay disjoint.
            while let Some(index) = self.rects.iter().position(|rect| rect.intersects(&merged)) {
                merged = union_of_boxes(&merged, &self.rects.swap_remove(index));
            }
            self.rects.push(merged);
            self.coalesce();
        }
    }

    /// The pixels in exactly one of `a` and `b`.
    pub fn xor(a: &DeviceIntRegion, b: &DeviceIntRegion) -> DeviceIntRegion {
        let mut only_a = a.clone();
        only_a.subtract(b);
        let mut only_b = b.clone();
        only_b.subtract(a);
        only_a.union(&only_b);
        only_a
    }
}

impl From<DeviceIntRect> for DeviceIntRegion {
    fn from(rect: DeviceIntRect) -> Self {
        Self::from_rect(&rect)
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;

    fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> DeviceIntRect {
        Box2D::new(Point2D::new(x0, y0), Point2D::new(x1, y1))
    }

    fn arbitrary_rect(values: (u8, u8, u8, u8)) -> DeviceIntRect {
        let x = (values.0 % 64) as i32;
        let y = (values.1 % 64) as i32;
        rect(x, y, x + (values.2 % 32) as i32, y + (values.3 % 32) as i32)
    }

    fn region_from(values: &[(u8, u8, u8, u8)]) -> DeviceIntRegion {
        let mut region = DeviceIntRegion::new();
        for value in values {
            region.union_rect(&arbitrary_rect(*value));
        }
        region
    }

    fn is_disjoint(region: &DeviceIntRegion) -> bool {
        let rects: Vec<_> = region.rects().collect();
        rects.iter().enumerate().all(|(i, a)| {
            !a.is_empty() && rects[i + 1..].iter().all(|b| !a.intersects(b))
        })
    }

    #[test]
    fn union_merges_adjacent_rects() {
        let mut region = DeviceIntRegion::from_rect(&rect(0, 0, 10, 10));
        region.union_rect(&rect(10, 0, 20, 10));
        assert_eq!(region.num_rects(), 1);
        assert!(region.is_equal_to_rect(&rect(0, 0, 20, 10)));
    }

    #[test]
    fn contains_rect_across_several_rects() {
        let mut region = DeviceIntRegion::from_rect(&rect(0, 0, 10, 10));
        region.union_rect(&rect(10, 5, 20, 10));
        assert!(region.contains_rect(&rect(5, 5, 15, 10)));
        assert!(!region.contains_rect(&rect(5, 0, 15, 10)));
        assert!(region.contains_rect(&rect(3, 3, 3, 3)));
    }

    #[test]
    fn one_pixel_shift_xor_is_two_slivers() {
        let old = DeviceIntRegion::from_rect(&rect(0, 0, 100, 100));
        let new = DeviceIntRegion::from_rect(&rect(1, 0, 101, 100));
        let difference = DeviceIntRegion::xor(&old, &new);
        assert_eq!(difference.area(), 200);
        assert!(difference.contains_rect(&rect(0, 0, 1, 100)));
        assert!(difference.contains_rect(&rect(100, 0, 101, 100)));
        assert!(!difference.intersects_rect(&rect(1, 0, 100, 100)));
    }

    #[test]
    fn region_equality_ignores_decomposition() {
        let mut a = DeviceIntRegion::from_rect(&rect(0, 0, 10, 5));
        a.union_rect(&rect(0, 5, 10, 10));
        let b = DeviceIntRegion::from_rect(&rect(0, 0, 10, 10));
        assert_eq!(a, b);
    }

    #[test]
    fn union_contains_both_operands() {
        fn prop(a: Vec<(u8, u8, u8, u8)>, b: Vec<(u8, u8, u8, u8)>) -> bool {
            let first = region_from(&a);
            let second = region_from(&b);
            let mut union = first.clone();
            union.union(&second);
            union.contains_region(&first) && union.contains_region(&second) && is_disjoint(&union)
        }
        quickcheck(prop as fn(_, _) -> bool);
    }

    #[test]
    fn subtract_removes_the_hole() {
        fn prop(a: Vec<(u8, u8, u8, u8)>, hole: (u8, u8, u8, u8)) -> bool {
            let original = region_from(&a);
            let hole = arbitrary_rect(hole);
            let mut result = original.clone();
            result.subtract_rect(&hole);
            !result.intersects_rect(&hole) &&
                original.contains_region(&result) &&
                is_disjoint(&result)
        }
        quickcheck(prop as fn(_, _) -> bool);
    }

    #[test]
    fn simplify_outward_only_grows() {
        fn prop(a: Vec<(u8, u8, u8, u8)>, max: u8) -> bool {
            let original = region_from(&a);
            let max = (max % 6) as usize + 1;
            let mut simplified = original.clone();
            simplified.simplify_outward(max);
            simplified.contains_region(&original) &&
                simplified.num_rects() <= max &&
                is_disjoint(&simplified)
        }
        quickcheck(prop as fn(_, _) -> bool);
    }

    #[test]
    fn intersection_is_inside_both() {
        fn prop(a: Vec<(u8, u8, u8, u8)>, b: Vec<(u8, u8, u8, u8)>) -> bool {
            let first = region_from(&a);
            let second = region_from(&b);
            let mut intersection = first.clone();
            intersection.intersect(&second);
            first.contains_region(&intersection) &&
                second.contains_region(&intersection) &&
                intersection.is_empty() != first.intersects(&second)
        }
        quickcheck(prop as fn(_, _) -> bool);
    }
}
