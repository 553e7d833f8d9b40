/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The two trees display items are tagged with.
//!
//! An *animated geometry root* (AGR) is the nearest ancestor whose geometry can change without
//! a new display list: a scroll frame, or an element with an animated transform. Items with
//! different AGRs move relative to each other and can never share a painted layer.
//!
//! An *active scrolled root* (ASR) is a scroll frame the compositor can scroll on its own. The
//! chain of ASRs above an item decides the scroll metadata of the layer it ends up in.

use layer_traits::ScrollId;
use servo_geometry::AuRect;

/// An index into an [`AnimatedGeometryRootStore`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AgrId(pub usize);

impl AgrId {
    /// The root reference frame, which never moves.
    pub const ROOT: AgrId = AgrId(0);
}

/// Information about an AGR that is a scroll frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollFrameInfo {
    /// The scroll port in the coordinate space of the parent AGR.
    pub scroll_port: AuRect,
    /// The area the compositor keeps rendered around the scroll port, if any.
    pub display_port: Option<AuRect>,
}

#[derive(Clone, Debug)]
pub struct AnimatedGeometryRoot {
    pub parent: Option<AgrId>,
    pub scroll_frame: Option<ScrollFrameInfo>,
    depth: usize,
}

#[derive(Clone, Debug)]
pub struct AnimatedGeometryRootStore(Vec<AnimatedGeometryRoot>);

impl Default for AnimatedGeometryRootStore {
    fn default() -> Self {
        Self(vec![AnimatedGeometryRoot {
            parent: None,
            scroll_frame: None,
            depth: 0,
        }])
    }
}

impl AnimatedGeometryRootStore {
    pub fn add(&mut self, parent: AgrId, scroll_frame: Option<ScrollFrameInfo>) -> AgrId {
        let depth = self.get(parent).depth + 1;
        self.0.push(AnimatedGeometryRoot {
            parent: Some(parent),
            scroll_frame,
            depth,
        });
        AgrId(self.0.len() - 1)
    }

    pub fn contains(&self, id: AgrId) -> bool {
        id.0 < self.0.len()
    }

    /// The AGR `id`, or the root for ids this store never handed out.
    pub fn get(&self, id: AgrId) -> &AnimatedGeometryRoot {
        match self.0.get(id.0) {
            Some(agr) => agr,
            None => {
                debug_panic!("Unknown {:?}", id);
                &self.0[AgrId::ROOT.0]
            },
        }
    }

    pub fn parent(&self, id: AgrId) -> Option<AgrId> {
        self.get(id).parent
    }

    /// Whether `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: AgrId, descendant: AgrId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// The AGR path from the root down to `id`, inclusive.
    pub fn path_from_root(&self, id: AgrId) -> Vec<AgrId> {
        let mut path = Vec::with_capacity(self.get(id).depth + 1);
        let mut current = Some(id);
        while let Some(agr) = current {
            path.push(agr);
            current = self.parent(agr);
        }
        path.reverse();
        path
    }
}

/// An index into an [`ActiveScrolledRootStore`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AsrId(pub usize);

impl AsrId {
    /// Content that is not inside any asynchronously scrollable frame.
    pub const ROOT: AsrId = AsrId(0);
}

#[derive(Clone, Debug)]
pub struct ActiveScrolledRoot {
    pub parent: Option<AsrId>,
    pub scroll_id: ScrollId,
    /// The scroll port of the scroll frame, in the coordinate space of the container being
    /// layerized.
    pub scroll_port: AuRect,
    /// The AGR of the scrolled contents, if known.
    pub agr: Option<AgrId>,
    depth: usize,
}

#[derive(Clone, Debug)]
pub struct ActiveScrolledRootStore(Vec<ActiveScrolledRoot>);

impl Default for ActiveScrolledRootStore {
    fn default() -> Self {
        Self(vec![ActiveScrolledRoot {
            parent: None,
            scroll_id: ScrollId(0),
            scroll_port: AuRect::zero(),
            agr: Some(AgrId::ROOT),
            depth: 0,
        }])
    }
}

impl ActiveScrolledRootStore {
    pub fn add(&mut self, parent: AsrId, scroll_id: ScrollId, scroll_port: AuRect) -> AsrId {
        let depth = self.get(parent).depth + 1;
        self.0.push(ActiveScrolledRoot {
            parent: Some(parent),
            scroll_id,
            scroll_port,
            agr: None,
            depth,
        });
        AsrId(self.0.len() - 1)
    }

    /// Add a scroll frame whose contents move with `agr`.
    pub fn add_for_agr(
        &mut self,
        parent: AsrId,
        scroll_id: ScrollId,
        scroll_port: AuRect,
        agr: AgrId,
    ) -> AsrId {
        let id = self.add(parent, scroll_id, scroll_port);
        if let Some(asr) = self.0.last_mut() {
            asr.agr = Some(agr);
        }
        id
    }

    pub fn contains(&self, id: AsrId) -> bool {
        id.0 < self.0.len()
    }

    /// The ASR `id`, or the root for ids this store never handed out.
    pub fn get(&self, id: AsrId) -> &ActiveScrolledRoot {
        match self.0.get(id.0) {
            Some(asr) => asr,
            None => {
                debug_panic!("Unknown {:?}", id);
                &self.0[AsrId::ROOT.0]
            },
        }
    }

    pub fn parent(&self, id: AsrId) -> Option<AsrId> {
        self.get(id).parent
    }

    pub fn depth(&self, id: AsrId) -> usize {
        self.get(id).depth
    }

    /// Whether `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: AsrId, descendant: AsrId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if self.depth(id) < self.depth(ancestor) {
                return false;
            }
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Of two ASRs on the same ancestor chain, the one further from the root.
    pub fn pick_descendant(&self, a: AsrId, b: AsrId) -> AsrId {
        if !self.is_ancestor(a, b) && !self.is_ancestor(b, a) {
            debug_panic!("{:?} and {:?} are not on the same ASR chain", a, b);
        }
        if self.depth(a) >= self.depth(b) {
            a
        } else {
            b
        }
    }

    /// Of two ASRs on the same ancestor chain, the one closer to the root.
    pub fn pick_ancestor(&self, a: AsrId, b: AsrId) -> AsrId {
        if self.depth(a) <= self.depth(b) {
            a
        } else {
            b
        }
    }

    /// The child of `ancestor` on the chain leading to `descendant`.
    pub fn direct_child(&self, ancestor: AsrId, descendant: AsrId) -> AsrId {
        let mut current = descendant;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                return current;
            }
            current = parent;
        }
        debug_panic!("{:?} is not an ancestor of {:?}", ancestor, descendant);
        descendant
    }
}

#[cfg(test)]
mod tests {
    use servo_geometry::au_rect_from_px;

    use super::*;

    #[test]
    fn asr_ancestry() {
        let mut store = ActiveScrolledRootStore::default();
        let outer = store.add(AsrId::ROOT, ScrollId(1), au_rect_from_px(0, 0, 100, 100));
        let inner = store.add(outer, ScrollId(2), au_rect_from_px(10, 10, 50, 50));
        let sibling = store.add(AsrId::ROOT, ScrollId(3), au_rect_from_px(0, 0, 10, 10));

        assert!(store.is_ancestor(AsrId::ROOT, inner));
        assert!(store.is_ancestor(outer, inner));
        assert!(store.is_ancestor(inner, inner));
        assert!(!store.is_ancestor(inner, outer));
        assert!(!store.is_ancestor(sibling, inner));
        assert_eq!(store.pick_descendant(outer, inner), inner);
        assert_eq!(store.pick_ancestor(outer, inner), outer);
        assert_eq!(store.direct_child(AsrId::ROOT, inner), outer);
    }

    #[test]
    fn agr_paths() {
        let mut store = AnimatedGeometryRootStore::default();
        let a = store.add(AgrId::ROOT, None);
        let b = store.add(a, None);
        assert_eq!(store.path_from_root(b), vec![AgrId::ROOT, a, b]);
        assert!(store.is_ancestor(AgrId::ROOT, b));
        assert!(!store.is_ancestor(b, a));
    }
}
