/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use app_units::Au;
use euclid::{Point2D, Size2D};
use servo_geometry::{
    AuRect, DeviceIntRect, DeviceScale, au_rect_contains, au_rect_intersection, au_rect_is_empty,
};
use smallvec::SmallVec;

use super::roots::{ActiveScrolledRootStore, AsrId};

/// A rect with circular corners. Radii are in the order top left, top right, bottom right,
/// bottom left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundedRect {
    pub rect: AuRect,
    pub radii: [Au; 4],
}

impl RoundedRect {
    pub fn new(rect: AuRect, radius: Au) -> Self {
        Self {
            rect,
            radii: [radius; 4],
        }
    }

    /// The two largest axis aligned rects that avoid every corner: one inset horizontally and
    /// one inset vertically.
    fn inner_rects(&self) -> [AuRect; 2] {
        let [top_left, top_right, bottom_right, bottom_left] = self.radii;
        let left = top_left.max(bottom_left);
        let right = top_right.max(bottom_right);
        let top = top_left.max(top_right);
        let bottom = bottom_left.max(bottom_right);
        let rect = self.rect;
        let horizontal = AuRect::new(
            Point2D::new(rect.origin.x + left, rect.origin.y),
            Size2D::new(rect.size.width - left - right, rect.size.height),
        );
        let vertical = AuRect::new(
            Point2D::new(rect.origin.x, rect.origin.y + top),
            Size2D::new(rect.size.width, rect.size.height - top - bottom),
        );
        [horizontal, vertical]
    }

    /// The largest part of `rect` that is certainly inside this rounded rect.
    fn intersect_inward(&self, rect: &AuRect) -> AuRect {
        let area = |rect: &AuRect| {
            if au_rect_is_empty(rect) {
                0
            } else {
                rect.size.width.0 as i64 * rect.size.height.0 as i64
            }
        };
        let [horizontal, vertical] = self.inner_rects();
        let a = au_rect_intersection(rect, &horizontal);
        let b = au_rect_intersection(rect, &vertical);
        if area(&a) >= area(&b) { a } else { b }
    }
}

/// The clip of a single display item: an optional rect and any number of rounded rects, all
/// of which apply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayItemClip {
    pub clip_rect: Option<AuRect>,
    pub rounded_rects: SmallVec<[RoundedRect; 1]>,
}

impl DisplayItemClip {
    pub fn no_clip() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: AuRect) -> Self {
        Self {
            clip_rect: Some(rect),
            rounded_rects: SmallVec::new(),
        }
    }

    pub fn from_rounded_rect(rounded_rect: RoundedRect) -> Self {
        let mut rounded_rects = SmallVec::new();
        rounded_rects.push(rounded_rect);
        Self {
            clip_rect: Some(rounded_rect.rect),
            rounded_rects,
        }
    }

    pub fn has_clip(&self) -> bool {
        self.clip_rect.is_some()
    }

    pub fn rounded_rect_count(&self) -> usize {
        self.rounded_rects.len()
    }

    pub fn intersect_with(&mut self, other: &DisplayItemClip) {
        self.clip_rect = match (self.clip_rect, other.clip_rect) {
            (Some(a), Some(b)) => Some(au_rect_intersection(&a, &b)),
            (a, None) => a,
            (None, b) => b,
        };
        self.rounded_rects.extend(other.rounded_rects.iter().copied());
    }

    /// `rect` clipped by the clip rect, ignoring rounded corners.
    pub fn apply_non_rounded_intersection(&self, rect: &AuRect) -> AuRect {
        match self.clip_rect {
            Some(clip_rect) => au_rect_intersection(rect, &clip_rect),
            None => *rect,
        }
    }

    /// The largest part of `rect` that is certainly not clipped away.
    pub fn approximate_intersect_inward(&self, rect: &AuRect) -> AuRect {
        let mut result = self.apply_non_rounded_intersection(rect);
        for rounded_rect in &self.rounded_rects {
            result = rounded_rect.intersect_inward(&result);
        }
        result
    }

    /// Whether any part of `rect` could be clipped away.
    pub fn is_rect_affected_by_clip(&self, rect: &AuRect) -> bool {
        if !self.has_clip() {
            return false;
        }
        let inward = self.approximate_intersect_inward(rect);
        !au_rect_contains(&inward, rect)
    }

    /// The clip rect snapped to the nearest device pixels, if there is one.
    pub fn device_clip_rect(&self, scale: &DeviceScale) -> Option<DeviceIntRect> {
        self.clip_rect.map(|rect| scale.to_nearest_pixels(&rect))
    }
}

/// An identifier for a clip chain: an index into a [`ClipChainStore`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClipChainId(pub usize);

impl ClipChainId {
    /// The empty clip chain. This means "no clip."
    pub const NONE: ClipChainId = ClipChainId(usize::MAX);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

/// One link of a clip chain: the intersection of the clips that move with `asr`.
#[derive(Clone, Debug)]
pub struct ClipChainNode {
    pub clip: DisplayItemClip,
    pub asr: AsrId,
    pub parent: ClipChainId,
}

/// All clip chains referenced by a display list. Nodes are appended as the list is built and
/// chains share their tails.
#[derive(Clone, Debug, Default)]
pub struct ClipChainStore(pub Vec<ClipChainNode>);

impl ClipChainStore {
    pub fn add(&mut self, clip: DisplayItemClip, asr: AsrId, parent: ClipChainId) -> ClipChainId {
        self.0.push(ClipChainNode { clip, asr, parent });
        ClipChainId(self.0.len() - 1)
    }

    pub fn get(&self, id: ClipChainId) -> Option<&ClipChainNode> {
        if id.is_none() {
            return None;
        }
        self.0.get(id.0)
    }

    pub fn parent(&self, id: ClipChainId) -> ClipChainId {
        self.get(id)
            .map(|node| node.parent)
            .unwrap_or(ClipChainId::NONE)
    }

    /// The clip of the chain link that moves with exactly `asr`, skipping links that move with
    /// descendants of `asr`. Links for ancestors of `asr` are applied by the compositor.
    pub fn clip_for_asr(
        &self,
        id: ClipChainId,
        asr: AsrId,
        asrs: &ActiveScrolledRootStore,
    ) -> DisplayItemClip {
        let mut current = self.get(id);
        while let Some(node) = current {
            if asrs.is_ancestor(node.asr, asr) {
                break;
            }
            current = self.get(node.parent);
        }
        match current {
            Some(node) if node.asr == asr => node.clip.clone(),
            _ => DisplayItemClip::no_clip(),
        }
    }

    /// The chain starting at the first link that moves with `asr` or one of its ancestors,
    /// with the links of deeper ASRs fused into it. Used for content whose scrolling is handled
    /// by the container rather than by the compositor.
    pub fn fused_clip_up_to(
        &self,
        id: ClipChainId,
        asr: AsrId,
        asrs: &ActiveScrolledRootStore,
    ) -> DisplayItemClip {
        let mut clip = DisplayItemClip::no_clip();
        let mut current = self.get(id);
        while let Some(node) = current {
            if asrs.is_ancestor(node.asr, asr) && node.asr != asr {
                break;
            }
            clip.intersect_with(&node.clip);
            current = self.get(node.parent);
        }
        clip
    }

    /// Whether two chains apply the same clips with the same ASRs.
    pub fn equal(&self, a: ClipChainId, b: ClipChainId) -> bool {
        let (mut a, mut b) = (a, b);
        loop {
            if a == b {
                return true;
            }
            match (self.get(a), self.get(b)) {
                (Some(node_a), Some(node_b)) => {
                    if node_a.asr != node_b.asr || node_a.clip != node_b.clip {
                        return false;
                    }
                    a = node_a.parent;
                    b = node_b.parent;
                },
                _ => return false,
            }
        }
    }
}
