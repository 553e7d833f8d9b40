/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Finding the painted layer an item can be drawn into.
//!
//! Candidate painted layers are kept in a tree that mirrors the animated geometry roots of
//! the container. Each node holds a stack of painted layers, bottom to top, for content that
//! moves with the node's AGR. Content of different AGRs may move relative to each other, so a
//! node is finished, and its layers handed back, as soon as content of a sibling subtree is
//! drawn over it.

use layer_traits::Color;
use log::trace;
use rustc_hash::FxHashMap;
use servo_geometry::{DeviceIntRect, DeviceIntRegion, DeviceScale};

use crate::display_list::DisplayListTrees;
use crate::display_list::clip::ClipChainId;
use crate::display_list::roots::{AgrId, AsrId};
use crate::painted_layer_data::{PaintedLayerData, rects_intersect};

/// Identifies a painted layer on the stack of a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PaintedLayerHandle {
    agr: AgrId,
    index: usize,
}

/// A painted layer that can no longer receive items, with the color it can assume is
/// beneath it.
pub(crate) struct FinishedPaintedLayer<'a> {
    pub data: PaintedLayerData<'a>,
    pub background_color: Color,
}

struct Node<'a> {
    parent: Option<AgrId>,
    children: Vec<AgrId>,
    stack: Vec<PaintedLayerData<'a>>,
    /// What content above the whole stack covers, when the stack is empty.
    visible_above_background_region: DeviceIntRegion,
    /// The area the node's content is confined to relative to the parent, if known.
    clip_rect: Option<DeviceIntRect>,
    /// Something of unknown extent was drawn above the node's background.
    all_drawing_above_background: bool,
}

impl<'a> Node<'a> {
    fn new(parent: Option<AgrId>, clip_rect: Option<DeviceIntRect>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            stack: Vec::new(),
            visible_above_background_region: DeviceIntRegion::new(),
            clip_rect,
            all_drawing_above_background: false,
        }
    }

    fn intersects(&self, rect: &DeviceIntRect) -> bool {
        self.clip_rect
            .is_none_or(|clip_rect| rects_intersect(&clip_rect, rect))
    }
}

/// Settings of a [`PaintedLayerDataTree`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct TreeOptions {
    pub scale: DeviceScale,
    /// Building a nested tree: every item goes to a single node.
    pub for_inactive_layer: bool,
    /// Prefer a new painted layer over reusing one further down the stack.
    pub smaller_painted_layers: bool,
    pub visible_above_max_rects: usize,
    /// The color under everything in the container.
    pub background_color: Color,
}

pub(crate) struct PaintedLayerDataTree<'a> {
    trees: &'a DisplayListTrees,
    options: TreeOptions,
    nodes: FxHashMap<AgrId, Node<'a>>,
    root: Option<AgrId>,
    finished: Vec<FinishedPaintedLayer<'a>>,
}

impl<'a> PaintedLayerDataTree<'a> {
    /// A tree for a container whose content moves with `container_agr`.
    pub(crate) fn new(
        trees: &'a DisplayListTrees,
        options: TreeOptions,
        container_agr: AgrId,
    ) -> Self {
        let mut tree = Self {
            trees,
            options,
            nodes: FxHashMap::default(),
            root: None,
            finished: Vec::new(),
        };
        if options.for_inactive_layer {
            tree.nodes.insert(container_agr, Node::new(None, None));
            tree.root = Some(container_agr);
        }
        tree
    }

    pub(crate) fn get_mut(
        &mut self,
        handle: PaintedLayerHandle,
    ) -> Option<&mut PaintedLayerData<'a>> {
        self.nodes.get_mut(&handle.agr)?.stack.get_mut(handle.index)
    }

    /// Painted layers finished since the last call, in the order they were finished.
    pub(crate) fn take_finished(&mut self) -> Vec<FinishedPaintedLayer<'a>> {
        std::mem::take(&mut self.finished)
    }

    /// The painted layer that an item with the given properties and visible area should be
    /// drawn into. `new_data` creates a new layer when none of the existing ones can be used.
    pub(crate) fn find_painted_layer_for(
        &mut self,
        agr: AgrId,
        asr: AsrId,
        clip_chain: ClipChainId,
        visible_rect: &DeviceIntRect,
        backface_hidden: bool,
        new_data: impl FnOnce() -> PaintedLayerData<'a>,
    ) -> PaintedLayerHandle {
        let node_agr = match self.root.filter(|_| self.options.for_inactive_layer) {
            Some(root) => root,
            None => {
                self.finish_potentially_intersecting_nodes(agr, Some(visible_rect));
                self.ensure_node_for(agr);
                agr
            },
        };

        let lowest_usable = self
            .nodes
            .get(&node_agr)
            .and_then(|node| {
                self.lowest_usable_layer(node, asr, clip_chain, visible_rect, backface_hidden)
            });
        let node = self
            .nodes
            .entry(node_agr)
            .or_insert_with(|| Node::new(None, None));
        let index = match lowest_usable {
            Some(index) => index,
            None => {
                node.stack.push(new_data());
                node.stack.len() - 1
            },
        };
        PaintedLayerHandle {
            agr: node_agr,
            index,
        }
    }

    /// The lowest painted layer of the stack that an item can be drawn into without changing
    /// what is drawn over what.
    fn lowest_usable_layer(
        &self,
        node: &Node,
        asr: AsrId,
        clip_chain: ClipChainId,
        visible_rect: &DeviceIntRect,
        backface_hidden: bool,
    ) -> Option<usize> {
        let mut lowest_usable = None;
        for (index, data) in node.stack.iter().enumerate().rev() {
            if data.visible_above_region.intersects_rect(visible_rect) {
                break;
            }
            if data.backface_hidden == backface_hidden &&
                data.asr == asr &&
                self.trees.clip_chains.equal(data.clip_chain, clip_chain)
            {
                lowest_usable = Some(index);
            }
            // Hit regions are only known approximately, so an item must not go below one.
            if !self.options.for_inactive_layer &&
                (rects_intersect(&data.scaled_hit_region_bounds, visible_rect) ||
                    rects_intersect(&data.scaled_maybe_hit_region_bounds, visible_rect))
            {
                break;
            }
            if data.visible_region.intersects_rect(visible_rect) {
                break;
            }
            if self.options.smaller_painted_layers {
                lowest_usable = None;
            }
        }
        lowest_usable
    }

    /// Account for a layer of its own that is about to be added for content moving with
    /// `agr` and covering `rect`, or an unknown area if `rect` is `None`. Returns the color
    /// known to be beneath the layer when `want_background_color` is set.
    pub(crate) fn adding_own_layer(
        &mut self,
        agr: AgrId,
        rect: Option<&DeviceIntRect>,
        want_background_color: bool,
    ) -> Color {
        let node_agr = match self.root.filter(|_| self.options.for_inactive_layer) {
            Some(root) => root,
            None => {
                self.finish_potentially_intersecting_nodes(agr, rect);
                self.ensure_node_for(agr);
                agr
            },
        };

        let background = match rect {
            _ if !want_background_color => Color::TRANSPARENT,
            Some(rect) => {
                self.find_opaque_background_color(node_agr, &DeviceIntRegion::from_rect(rect), None)
            },
            None => self.find_opaque_background_color_covering_everything(node_agr),
        };
        match rect {
            Some(rect) => self.add_to_visible_above_region(node_agr, rect),
            None => self.set_all_drawing_above(node_agr),
        }
        background
    }

    /// Finish every remaining node.
    pub(crate) fn finish(&mut self) {
        if let Some(root) = self.root {
            self.finish_node(root, false);
        }
    }

    fn clip_with_respect_to_parent(&self, agr: AgrId) -> Option<DeviceIntRect> {
        if self.options.for_inactive_layer {
            return None;
        }
        let scroll_frame = self.trees.agrs.get(agr).scroll_frame?;
        Some(self.options.scale.to_nearest_pixels(&scroll_frame.scroll_port))
    }

    fn ensure_node_for(&mut self, agr: AgrId) {
        if self.nodes.contains_key(&agr) {
            return;
        }
        let clip_rect = self.clip_with_respect_to_parent(agr);
        match self.trees.agrs.parent(agr) {
            Some(parent) => {
                self.ensure_node_for(parent);
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.push(agr);
                }
                self.nodes.insert(agr, Node::new(Some(parent), clip_rect));
            },
            None => {
                self.nodes.insert(agr, Node::new(None, clip_rect));
                self.root = Some(agr);
            },
        }
    }

    /// The closest node for `agr` or one of its ancestors, and the child of that node on the
    /// path towards `agr`.
    fn find_node_for_ancestor(&self, agr: AgrId) -> (Option<AgrId>, Option<AgrId>) {
        let mut last_child = None;
        let mut current = Some(agr);
        while let Some(id) = current {
            if self.nodes.contains_key(&id) {
                return (Some(id), last_child);
            }
            last_child = Some(id);
            current = self.trees.agrs.parent(id);
        }
        (None, last_child)
    }

    /// Finish the nodes of other AGRs that content of `agr` covering `rect` could be drawn
    /// over.
    fn finish_potentially_intersecting_nodes(&mut self, agr: AgrId, rect: Option<&DeviceIntRect>) {
        let (ancestor, child) = self.find_node_for_ancestor(agr);
        let Some(ancestor) = ancestor else {
            return;
        };
        if ancestor == agr {
            match rect {
                Some(rect) => self.finish_children_intersecting(ancestor, rect),
                None => self.finish_all_children(ancestor, true),
            }
            return;
        }
        match child.and_then(|child| self.clip_with_respect_to_parent(child)) {
            Some(clip) => self.finish_children_intersecting(ancestor, &clip),
            None => self.finish_all_children(ancestor, true),
        }
    }

    fn finish_children_intersecting(&mut self, agr: AgrId, rect: &DeviceIntRect) {
        let children = self
            .nodes
            .get(&agr)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in children.into_iter().rev() {
            let intersects = self
                .nodes
                .get(&child)
                .is_some_and(|node| node.intersects(rect));
            if intersects {
                self.finish_node(child, true);
                if let Some(node) = self.nodes.get_mut(&agr) {
                    node.children.retain(|id| *id != child);
                }
            }
        }
    }

    fn finish_all_children(&mut self, agr: AgrId, needs_accurate_visible_above_region: bool) {
        let children = self
            .nodes
            .get_mut(&agr)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default();
        for child in children.into_iter().rev() {
            self.finish_node(child, needs_accurate_visible_above_region);
        }
    }

    fn finish_node(&mut self, agr: AgrId, parent_needs_accurate_visible_above_region: bool) {
        self.finish_all_children(agr, false);
        self.pop_all_painted_layer_data(agr);
        let Some(node) = self.nodes.remove(&agr) else {
            return;
        };
        if self.root == Some(agr) {
            self.root = None;
        }
        trace!("Finished painted layer node {:?}", agr);
        if let Some(parent) = node.parent {
            if parent_needs_accurate_visible_above_region {
                match node.clip_rect {
                    Some(clip_rect) => self.add_to_visible_above_region(parent, &clip_rect),
                    None => self.set_all_drawing_above(parent),
                }
            }
        }
    }

    /// Finish every painted layer of the node, topmost first.
    fn pop_all_painted_layer_data(&mut self, agr: AgrId) {
        let Some(node) = self.nodes.get(&agr) else {
            return;
        };
        let mut backgrounds = Vec::with_capacity(node.stack.len());
        for (index, data) in node.stack.iter().enumerate().rev() {
            let background = if data.is_opaque_region_covering() {
                Color::TRANSPARENT
            } else {
                self.find_opaque_background_color(agr, &data.visible_region, Some(index))
            };
            backgrounds.push(background);
        }
        let stack = self
            .nodes
            .get_mut(&agr)
            .map(|node| std::mem::take(&mut node.stack))
            .unwrap_or_default();
        for (data, background_color) in stack.into_iter().rev().zip(backgrounds) {
            self.finished.push(FinishedPaintedLayer {
                data,
                background_color,
            });
        }
    }

    fn add_to_visible_above_region(&mut self, agr: AgrId, rect: &DeviceIntRect) {
        let max_rects = self.options.visible_above_max_rects;
        let Some(node) = self.nodes.get_mut(&agr) else {
            return;
        };
        let region = match node.stack.last_mut() {
            Some(top) => &mut top.visible_above_region,
            None => &mut node.visible_above_background_region,
        };
        region.union_rect(rect);
        region.simplify_outward(max_rects);
    }

    fn set_all_drawing_above(&mut self, agr: AgrId) {
        self.pop_all_painted_layer_data(agr);
        if let Some(node) = self.nodes.get_mut(&agr) {
            node.all_drawing_above_background = true;
            node.visible_above_background_region.set_empty();
        }
    }

    /// The color known to be beneath `region` when drawn into the node of `agr`, below the
    /// painted layer at `under_index`, or above the whole stack if `None`.
    fn find_opaque_background_color(
        &self,
        agr: AgrId,
        region: &DeviceIntRegion,
        under_index: Option<usize>,
    ) -> Color {
        let Some(node) = self.nodes.get(&agr) else {
            return Color::TRANSPARENT;
        };
        let under_index = under_index.unwrap_or(node.stack.len());
        for candidate in node.stack[..under_index].iter().rev() {
            if candidate.visible_above_region.intersects(region) {
                // Something of another AGR is between us and the candidate.
                return Color::TRANSPARENT;
            }
            if !candidate.visible_region.intersects(region) {
                continue;
            }
            if let Some(color) =
                candidate.opaque_background_color_in_layer(&region.bounds(), &self.options.scale)
            {
                return color;
            }
        }
        if node.all_drawing_above_background ||
            node.visible_above_background_region.intersects(region)
        {
            return Color::TRANSPARENT;
        }
        self.find_opaque_background_color_in_parent(node)
    }

    fn find_opaque_background_color_in_parent(&self, node: &Node) -> Color {
        let Some(parent) = node.parent else {
            return self.options.background_color;
        };
        match node.clip_rect {
            Some(clip_rect) => self.find_opaque_background_color(
                parent,
                &DeviceIntRegion::from_rect(&clip_rect),
                None,
            ),
            None => self.find_opaque_background_color_covering_everything(parent),
        }
    }

    fn find_opaque_background_color_covering_everything(&self, agr: AgrId) -> Color {
        let Some(node) = self.nodes.get(&agr) else {
            return Color::TRANSPARENT;
        };
        if !node.stack.is_empty() ||
            node.all_drawing_above_background ||
            !node.visible_above_background_region.is_empty()
        {
            return Color::TRANSPARENT;
        }
        self.find_opaque_background_color_in_parent(node)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use euclid::{Box2D, Point2D};
    use servo_config::opts::Opts;
    use servo_geometry::{AuRect, au_rect_from_px};

    use super::*;
    use crate::display_list::clip::DisplayItemClip;
    use crate::display_list::item_key;
    use crate::display_list::iterator::EntryType;
    use crate::display_list::roots::ScrollFrameInfo;
    use crate::display_list::DisplayItem;
    use crate::painted_layer_data::{AssignedDisplayItem, ContainerInfo};

    fn device_rect(x: i32, y: i32, width: i32, height: i32) -> DeviceIntRect {
        Box2D::new(Point2D::new(x, y), Point2D::new(x + width, y + height))
    }

    fn options() -> TreeOptions {
        TreeOptions {
            scale: DeviceScale::default(),
            for_inactive_layer: false,
            smaller_painted_layers: false,
            visible_above_max_rects: 8,
            background_color: Color::WHITE,
        }
    }

    fn info<'a>(opts: &'a Opts, trees: &'a DisplayListTrees) -> ContainerInfo<'a> {
        ContainerInfo {
            opts,
            trees,
            scale: DeviceScale::default(),
            agr: AgrId::ROOT,
            asr: AsrId::ROOT,
            bounds: au_rect_from_px(0, 0, 800, 600),
            in_inactive_layer: false,
            in_active_transformed_subtree: false,
            is_root: true,
        }
    }

    /// Find a layer for `rect` and accumulate a painted item covering it.
    fn draw(
        tree: &mut PaintedLayerDataTree<'_>,
        info: &ContainerInfo,
        agr: AgrId,
        asr: AsrId,
        bounds: AuRect,
        next_index: &mut usize,
    ) -> PaintedLayerHandle {
        let rect = DeviceScale::default().to_outside_pixels(&bounds);
        let handle = tree.find_painted_layer_for(agr, asr, ClipChainId::NONE, &rect, false, || {
            *next_index += 1;
            PaintedLayerData::new(agr, asr, ClipChainId::NONE, false, *next_index)
        });
        if let Some(data) = tree.get_mut(handle) {
            data.accumulate(
                info,
                &mut DeviceIntRegion::new(),
                AssignedDisplayItem::new(
                    Cow::Owned(DisplayItem::painted(item_key(1, 1), bounds, 1)),
                    EntryType::Item,
                    DisplayItemClip::no_clip(),
                    None,
                ),
                rect,
                &mut Vec::new(),
            );
        }
        handle
    }

    #[test]
    fn different_asrs_never_share_a_layer() {
        let opts = Opts::default();
        let mut trees = DisplayListTrees::default();
        let scrolled = trees.asrs.add(
            AsrId::ROOT,
            layer_traits::ScrollId(1),
            au_rect_from_px(0, 0, 100, 100),
        );
        let info = info(&opts, &trees);
        let mut tree = PaintedLayerDataTree::new(&trees, options(), AgrId::ROOT);
        let mut next = 0;
        let a = draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            AsrId::ROOT,
            au_rect_from_px(0, 0, 10, 10),
            &mut next,
        );
        let b = draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            scrolled,
            au_rect_from_px(50, 50, 10, 10),
            &mut next,
        );
        let c = draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            AsrId::ROOT,
            au_rect_from_px(80, 0, 10, 10),
            &mut next,
        );
        assert_ne!(a, b);
        // Nothing of `b` is under `c`, so `c` can go into the first layer.
        assert_eq!(a, c);
    }

    #[test]
    fn overlapping_content_goes_on_top() {
        let opts = Opts::default();
        let mut trees = DisplayListTrees::default();
        let scrolled = trees.asrs.add(
            AsrId::ROOT,
            layer_traits::ScrollId(1),
            au_rect_from_px(0, 0, 100, 100),
        );
        let info = info(&opts, &trees);
        let mut tree = PaintedLayerDataTree::new(&trees, options(), AgrId::ROOT);
        let mut next = 0;
        let a = draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            AsrId::ROOT,
            au_rect_from_px(0, 0, 50, 50),
            &mut next,
        );
        let b = draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            scrolled,
            au_rect_from_px(20, 20, 50, 50),
            &mut next,
        );
        let c = draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            AsrId::ROOT,
            au_rect_from_px(40, 40, 50, 50),
            &mut next,
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn content_of_another_agr_finishes_intersecting_nodes() {
        let opts = Opts::default();
        let mut trees = DisplayListTrees::default();
        let scroller = trees.agrs.add(
            AgrId::ROOT,
            Some(ScrollFrameInfo {
                scroll_port: au_rect_from_px(0, 0, 100, 100),
                display_port: None,
            }),
        );
        let info = info(&opts, &trees);
        let mut tree = PaintedLayerDataTree::new(&trees, options(), AgrId::ROOT);
        let mut next = 0;
        draw(&mut tree, &info, scroller, AsrId::ROOT, au_rect_from_px(0, 0, 50, 50), &mut next);
        assert!(tree.take_finished().is_empty());

        // Root content over the scroll port finishes the scrolled node.
        draw(
            &mut tree,
            &info,
            AgrId::ROOT,
            AsrId::ROOT,
            au_rect_from_px(10, 10, 10, 10),
            &mut next,
        );
        let finished = tree.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].data.agr, scroller);
        assert_eq!(finished[0].background_color, Color::WHITE);

        tree.finish();
        assert_eq!(tree.take_finished().len(), 1);
    }

    #[test]
    fn own_layers_hide_the_background() {
        let opts = Opts::default();
        let trees = DisplayListTrees::default();
        let info = info(&opts, &trees);
        let mut tree = PaintedLayerDataTree::new(&trees, options(), AgrId::ROOT);
        let rect = device_rect(0, 0, 100, 100);
        assert_eq!(
            tree.adding_own_layer(AgrId::ROOT, Some(&rect), true),
            Color::WHITE
        );
        let mut next = 0;
        draw(&mut tree, &info, AgrId::ROOT, AsrId::ROOT, au_rect_from_px(0, 0, 20, 20), &mut next);
        tree.finish();
        let finished = tree.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].background_color, Color::TRANSPARENT);
    }

    #[test]
    fn unbounded_own_layers_still_find_the_background() {
        let opts = Opts::default();
        let trees = DisplayListTrees::default();
        let info = info(&opts, &trees);
        let mut tree = PaintedLayerDataTree::new(&trees, options(), AgrId::ROOT);
        assert_eq!(tree.adding_own_layer(AgrId::ROOT, None, true), Color::WHITE);
        assert_eq!(
            tree.adding_own_layer(AgrId::ROOT, None, true),
            Color::TRANSPARENT
        );

        let mut covered = PaintedLayerDataTree::new(&trees, options(), AgrId::ROOT);
        let mut next = 0;
        draw(
            &mut covered,
            &info,
            AgrId::ROOT,
            AsrId::ROOT,
            au_rect_from_px(0, 0, 20, 20),
            &mut next,
        );
        assert_eq!(
            covered.adding_own_layer(AgrId::ROOT, None, true),
            Color::TRANSPARENT
        );
    }
}
