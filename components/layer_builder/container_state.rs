/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Turning the display list of one container into its child layers.
//!
//! Items are visited in paint order. Active items get layers of their own, everything else is
//! grouped into painted layers by the [`PaintedLayerDataTree`]. Once all items are assigned,
//! the new children get their scroll metadata, are culled against opaque layers above them,
//! and replace the container's previous children.

use app_units::Au;
use layer_traits::{
    Color, ContainerLayerData, ContentFlags, DisplayItemKey, EventRegions, FixedPositionData,
    Layer, LayerClip, LayerId, LayerKind, PaintedEntryKind, PaintedItem, ScrollMetadata,
};
use log::{debug, trace, warn};
use rustc_hash::FxHashSet;
use servo_geometry::{
    AuRect, AuSize, DeviceIntRect, DeviceIntRegion, LayoutTransform, au_rect_intersection,
    au_rect_is_empty, transform_au_rect,
};

use crate::LayerBuildError;
use crate::display_list::clip::{ClipChainId, DisplayItemClip};
use crate::display_list::iterator::{DisplayItemEntry, EntryType, FlattenedDisplayList};
use crate::display_list::roots::{AgrId, AsrId};
use crate::display_list::{DisplayItem, DisplayItemContent, DisplayList, ItemFlags};
use crate::invalidation::DisplayItemGeometry;
use crate::layer_state::{ItemDisposition, LayerDecisionContext, LayerState, decide};
use crate::painted_layer_data::{
    AssignedDisplayItem, ContainerInfo, HoistPlacement, PaintedLayerData, TransformNodeId,
    intersect_rects, merge_event_regions, transform_device_rect,
};
use crate::painted_layer_data_tree::{
    FinishedPaintedLayer, PaintedLayerDataTree, PaintedLayerHandle, TreeOptions,
};
use crate::retained::{InactiveLayerData, RetainedLayers};

/// A painted layer that is drawing a nested layer tree, and the event regions hoisted into it
/// from that tree.
pub(crate) struct BuilderContext {
    pub placement: HoistPlacement,
    pub event_regions: EventRegions,
}

/// State shared by every container of one paint.
#[derive(Default)]
pub(crate) struct BuildSession {
    pub contexts: Vec<BuilderContext>,
    /// What the root container has covered with opaque content so far.
    pub window_opaque_region: DeviceIntRegion,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ContainerParameters {
    pub background_color: Color,
    /// The ASR whose scrolling the container's own layer already accounts for.
    pub scroll_metadata_asr: AsrId,
    /// The ASR the compositor will move the container with.
    pub compositor_asr: AsrId,
    /// From the container's space to the space of the root of the nested tree it is in.
    pub to_inactive_root: Option<LayoutTransform>,
}

impl ContainerParameters {
    pub(crate) fn new(background_color: Color, asr: AsrId) -> Self {
        Self {
            background_color,
            scroll_metadata_asr: asr,
            compositor_asr: asr,
            to_inactive_root: None,
        }
    }
}

/// What the parent needs to know about a finished container.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ContainerResult {
    pub content_flags: ContentFlags,
    /// The container's children cover its bounds with opaque content.
    pub opaque: bool,
}

/// A layer that will become a child of the container.
#[derive(Debug)]
struct NewLayerEntry {
    layer: Option<LayerId>,
    agr: AgrId,
    asr: AsrId,
    clip_chain: ClipChainId,
    scroll_metadata_asr: AsrId,
    visible_region: DeviceIntRegion,
    opaque_region: DeviceIntRegion,
    hide_all_layers_below: bool,
    opaque_for_agr_parent: bool,
    is_fixed_to_root_scroll_frame: bool,
}

impl NewLayerEntry {
    fn new(agr: AgrId, asr: AsrId, clip_chain: ClipChainId, scroll_metadata_asr: AsrId) -> Self {
        Self {
            layer: None,
            agr,
            asr,
            clip_chain,
            scroll_metadata_asr,
            visible_region: DeviceIntRegion::new(),
            opaque_region: DeviceIntRegion::new(),
            hide_all_layers_below: false,
            opaque_for_agr_parent: false,
            is_fixed_to_root_scroll_frame: false,
        }
    }
}

/// A flattened transform item that later items are drawn inside of.
struct TransformNode {
    parent: Option<TransformNodeId>,
    transform: LayoutTransform,
    /// The clip of the transform item, in the parent's space.
    clip: Option<AuRect>,
}

/// Where an item that gets a layer of its own sits.
struct OwnLayerPlacement {
    agr: AgrId,
    asr: AsrId,
    clip_chain: ClipChainId,
    clip: DisplayItemClip,
    clip_rect: Option<DeviceIntRect>,
    visible_rect: DeviceIntRect,
    scroll_metadata_asr: AsrId,
    prerendered: bool,
}

/// The properties an effect item gives to its container layer.
fn container_properties(content: &DisplayItemContent) -> (f32, Option<LayoutTransform>) {
    match content {
        DisplayItemContent::Opacity { opacity, .. } => (*opacity, None),
        DisplayItemContent::Transform { transform, .. } => (1.0, Some(*transform)),
        _ => (1.0, None),
    }
}

fn compose_transforms(
    inner: Option<LayoutTransform>,
    outer: Option<LayoutTransform>,
) -> Option<LayoutTransform> {
    match (inner, outer) {
        (Some(inner), Some(outer)) => Some(inner.then(&outer)),
        (inner, outer) => inner.or(outer),
    }
}

/// Forget everything a layer was given by the previous paint, before it is set up again.
fn reset_layer_for_reuse(layer: &mut Layer) {
    layer.clip_rect = None;
    layer.scrolled_clip = None;
    layer.mask_layer = None;
    layer.ancestor_mask_layers.clear();
    layer.scroll_metadata.clear();
    layer.fixed_position = None;
    layer.event_regions = EventRegions::default();
}

pub(crate) struct ContainerState<'a, 's> {
    info: ContainerInfo<'a>,
    params: ContainerParameters,
    retained: &'s mut RetainedLayers,
    session: &'s mut BuildSession,
    container_layer: LayerId,
    tree: PaintedLayerDataTree<'a>,
    new_child_layers: Vec<NewLayerEntry>,
    /// Painted layers of the previous paint that no item has claimed yet.
    recyclable_painted_layers: FxHashSet<LayerId>,
    transform_nodes: Vec<TransformNode>,
    cached_scroll_metadata: Option<(AsrId, Option<DisplayItemClip>, ScrollMetadata)>,
}

impl<'a, 's> ContainerState<'a, 's> {
    pub(crate) fn new(
        info: ContainerInfo<'a>,
        params: ContainerParameters,
        retained: &'s mut RetainedLayers,
        session: &'s mut BuildSession,
        container_layer: LayerId,
    ) -> Self {
        let recyclable_painted_layers = retained
            .layers
            .children(container_layer)
            .iter()
            .copied()
            .filter(|id| retained.layers.layer(*id).is_some_and(Layer::is_painted))
            .collect();
        let options = TreeOptions {
            scale: info.scale,
            for_inactive_layer: info.in_inactive_layer,
            smaller_painted_layers: info.opts.smaller_painted_layers,
            visible_above_max_rects: info.opts.visible_above_max_rects,
            background_color: params.background_color,
        };
        Self {
            info,
            params,
            retained,
            session,
            container_layer,
            tree: PaintedLayerDataTree::new(info.trees, options, info.agr),
            new_child_layers: Vec::new(),
            recyclable_painted_layers,
            transform_nodes: Vec::new(),
            cached_scroll_metadata: None,
        }
    }

    /// Layerize `list` into `container_layer`.
    pub(crate) fn build(
        info: ContainerInfo<'a>,
        params: ContainerParameters,
        retained: &'s mut RetainedLayers,
        session: &'s mut BuildSession,
        container_layer: LayerId,
        list: &'a DisplayList,
    ) -> ContainerResult {
        let mut state = Self::new(info, params, retained, session, container_layer);
        state.process_display_items(list);
        state.finish()
    }

    /// The roots and clips an item is layerized with: the layer's clip chain, and the clip the
    /// item applies itself.
    fn item_roots(
        &self,
        item: &DisplayItem,
        effect_roots: Option<(AgrId, AsrId)>,
    ) -> (AgrId, AsrId, ClipChainId, DisplayItemClip) {
        let trees = self.info.trees;
        let fused_roots = match effect_roots {
            Some(roots) => Some(roots),
            None if self.info.in_inactive_layer => Some((self.info.agr, self.info.asr)),
            None => None,
        };
        if let Some((agr, asr)) = fused_roots {
            let clip = trees
                .clip_chains
                .fused_clip_up_to(item.clip_chain, asr, &trees.asrs);
            return (agr, asr, ClipChainId::NONE, clip);
        }

        let layer_clip_chain = match trees.clip_chains.get(item.clip_chain) {
            Some(node) if node.asr == item.asr => node.parent,
            _ => item.clip_chain,
        };
        let clip = trees
            .clip_chains
            .clip_for_asr(item.clip_chain, item.asr, &trees.asrs);
        (item.agr, item.asr, layer_clip_chain, clip)
    }

    fn transform_rect(&self, node: TransformNodeId, rect: &AuRect) -> AuRect {
        let mut rect = *rect;
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(node) = self.transform_nodes.get(id) else {
                break;
            };
            rect = transform_au_rect(&node.transform, &rect).unwrap_or(AuRect::zero());
            if let Some(clip) = &node.clip {
                rect = au_rect_intersection(&rect, clip);
            }
            current = node.parent;
        }
        rect
    }

    /// The product of the transforms from `node` out to the container.
    fn accumulated_transform(&self, node: TransformNodeId) -> LayoutTransform {
        let mut transform = LayoutTransform::identity();
        let mut current = Some(node);
        while let Some(node) = current.and_then(|id| self.transform_nodes.get(id)) {
            transform = transform.then(&node.transform);
            current = node.parent;
        }
        transform
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "ContainerState::process_display_items",
            skip_all,
            fields(servo_profiling = true),
            level = "trace",
        )
    )]
    pub(crate) fn process_display_items(&mut self, list: &'a DisplayList) {
        let trees = self.info.trees;
        let opts = self.info.opts;
        let scale = self.info.scale;
        let mut selected: Option<PaintedLayerHandle> = None;
        let mut effect_roots = (self.info.agr, self.info.asr);
        let mut opacity_indices = Vec::new();
        let mut transform_node: Option<TransformNodeId> = None;
        let mut layer_count = 0;

        let items = FlattenedDisplayList::new(
            list,
            self.info.in_inactive_layer,
            opts.force_active_layers,
        );
        for DisplayItemEntry { item, entry_type } in items {
            let (agr, asr, layer_clip_chain, item_clip) =
                self.item_roots(&item, selected.map(|_| effect_roots));

            let hit_test_area = match &item.content {
                DisplayItemContent::HitTest(info) => Some(info.area),
                _ => None,
            };
            if hit_test_area.is_some_and(|area| au_rect_is_empty(&area)) {
                continue;
            }

            if entry_type == EntryType::PopTransform {
                transform_node = transform_node.and_then(|id| self.transform_nodes[id].parent);
            }

            let scroll_metadata_asr = match trees.clip_chains.get(layer_clip_chain) {
                Some(node) => trees.asrs.pick_descendant(asr, node.asr),
                None => asr,
            };
            let prerendered = matches!(item.content, DisplayItemContent::Transform { .. }) &&
                item.flags.contains(ItemFlags::PRERENDERED_TRANSFORM);

            let mut content_rect = hit_test_area.unwrap_or(item.bounds);
            let mut draw_rect = scale.to_outside_pixels(&content_rect);
            let mut clip_rect = None;
            if let Some(rect) = &item_clip.clip_rect {
                content_rect = au_rect_intersection(&content_rect, rect);
                let device_clip = scale.to_nearest_pixels(rect);
                if !prerendered {
                    draw_rect = intersect_rects(&draw_rect, &device_clip);
                }
                clip_rect = Some(device_clip);
            }
            let mut building_rect = item.building_rect;
            if let Some(node) = transform_node {
                content_rect = self.transform_rect(node, &content_rect);
                let draw_area = self.transform_rect(node, &scale.to_app_units(&draw_rect));
                draw_rect = scale.to_outside_pixels(&draw_area);
                building_rect = self.transform_rect(node, &building_rect);
            }
            let visible_rect = if prerendered {
                draw_rect
            } else {
                intersect_rects(&draw_rect, &scale.to_outside_pixels(&building_rect))
            };

            let layer_state = match entry_type {
                EntryType::Item if item.can_build_layer() => {
                    item.layer_state.resolve(opts.force_active_layers)
                },
                _ => LayerState::None,
            };
            let disposition = if selected.is_some() {
                ItemDisposition::Merge
            } else {
                decide(
                    layer_state,
                    &LayerDecisionContext {
                        is_item: entry_type == EntryType::Item,
                        force_active_layers: opts.force_active_layers,
                        in_inactive_layer: self.info.in_inactive_layer,
                        layer_count,
                        max_layers: opts.max_active_layers,
                    },
                )
            };
            match disposition {
                ItemDisposition::OwnLayer => {
                    layer_count += 1;
                    self.add_own_layer_item(
                        &item,
                        OwnLayerPlacement {
                            agr,
                            asr,
                            clip_chain: layer_clip_chain,
                            clip: item_clip,
                            clip_rect,
                            visible_rect,
                            scroll_metadata_asr,
                            prerendered,
                        },
                    );
                    continue;
                },
                ItemDisposition::ForcedInactive => {
                    debug!(
                        "{} {} painted, the layer budget is used up",
                        item.type_name(),
                        item.key
                    );
                },
                ItemDisposition::Merge => {},
            }

            let handle = match selected {
                Some(handle) => handle,
                None => {
                    let backface_hidden = item.backface_hidden();
                    let new_child_layers = &mut self.new_child_layers;
                    let handle = self.tree.find_painted_layer_for(
                        agr,
                        asr,
                        layer_clip_chain,
                        &visible_rect,
                        backface_hidden,
                        || {
                            let index = new_child_layers.len();
                            // The second entry is for a color or image layer replacing it.
                            for _ in 0..2 {
                                new_child_layers.push(NewLayerEntry::new(
                                    agr,
                                    asr,
                                    layer_clip_chain,
                                    scroll_metadata_asr,
                                ));
                            }
                            PaintedLayerData::new(
                                agr,
                                asr,
                                layer_clip_chain,
                                backface_hidden,
                                index,
                            )
                        },
                    );
                    self.finish_painted_layers();
                    handle
                },
            };

            let item_key = item.key;
            let item_roots = (item.agr, item.asr);
            let pushed_transform = match &item.content {
                DisplayItemContent::Transform { transform, .. } => Some(*transform),
                _ => None,
            };
            let transform_clip = item_clip.clip_rect;

            let Some(data) = self.tree.get_mut(handle) else {
                debug_panic!("Lost the painted layer of {}", item_key);
                continue;
            };
            if let DisplayItemContent::HitTest(info) = &item.content {
                data.accumulate_hit_test_info(&self.info, info, &content_rect, &item_clip);
            } else {
                let assigned = AssignedDisplayItem::new(
                    item,
                    entry_type,
                    item_clip,
                    transform_node,
                );
                data.accumulate(
                    &self.info,
                    &mut self.session.window_opaque_region,
                    assigned,
                    visible_rect,
                    &mut opacity_indices,
                );
                if data.layer.is_none() {
                    let index = data.new_child_layers_index;
                    if let Some(layer) = self.attempt_to_recycle_painted_layer(agr, &item_key) {
                        if let Some(data) = self.tree.get_mut(handle) {
                            data.layer = Some(layer);
                        }
                        self.new_child_layers[index].layer = Some(layer);
                    }
                }
            }

            if entry_type == EntryType::PushTransform {
                if let Some(transform) = pushed_transform {
                    self.transform_nodes.push(TransformNode {
                        parent: transform_node,
                        transform,
                        clip: transform_clip,
                    });
                    transform_node = Some(self.transform_nodes.len() - 1);
                }
            }
            if entry_type.is_effect_start() && selected.is_none() {
                selected = Some(handle);
                effect_roots = item_roots;
            }
            if entry_type.is_effect_end() && opacity_indices.is_empty() && transform_node.is_none()
            {
                selected = None;
            }
        }

        if selected.is_some() {
            debug_panic!("Flattened effect was never closed");
            warn!("{}", LayerBuildError::UnbalancedEffectMarkers);
        }
    }

    /// Finish the painted layers the tree is done with.
    fn finish_painted_layers(&mut self) {
        for finished in self.tree.take_finished() {
            self.finish_painted_layer_data(finished);
        }
    }

    /// Claim the painted layer the item was drawn into by the previous paint, if it was a
    /// child of this container and nothing else claimed it yet.
    fn attempt_to_recycle_painted_layer(
        &mut self,
        agr: AgrId,
        key: &DisplayItemKey,
    ) -> Option<LayerId> {
        if self.info.opts.debug.disable_layer_recycling {
            return None;
        }
        let old = self.retained.old_layer_for(key)?;
        if !self.recyclable_painted_layers.remove(&old) {
            return None;
        }
        self.recycle_painted_layer(old, agr);
        Some(old)
    }

    fn recycle_painted_layer(&mut self, layer: LayerId, agr: AgrId) {
        let scale = self.info.scale;
        let layers = &mut self.retained.layers;
        if let Some(layer) = layers.layer_mut(layer) {
            reset_layer_for_reuse(layer);
        }
        let Some(user_data) = layers.painted_user_data_mut(layer) else {
            return;
        };
        let moved = user_data.scale != scale || user_data.agr != agr;
        let pending = std::mem::take(&mut user_data.region_to_invalidate);
        user_data.scale = scale;
        user_data.agr = agr;
        if moved {
            trace!("Painted layer {} changed resolution or AGR", layer);
            layers.invalidate_whole_layer(layer);
        } else {
            layers.invalidate_region(layer, &pending);
        }
    }

    /// A layer of `kind` for the item, reusing the item's layer from the previous paint when
    /// it has the same kind.
    fn recycle_or_create(&mut self, key: &DisplayItemKey, kind: LayerKind) -> LayerId {
        let old = self.retained.old_layer_for(key);
        let layers = &mut self.retained.layers;
        if let Some(layer) = old.and_then(|id| layers.layer_mut(id)) {
            if layer.kind_name() == <&'static str>::from(&kind) {
                reset_layer_for_reuse(layer);
                layer.kind = kind;
                return layer.id;
            }
        }
        layers.create_layer(kind)
    }

    fn add_own_layer_item(&mut self, item: &DisplayItem, placement: OwnLayerPlacement) {
        let trees = self.info.trees;
        let scale = self.info.scale;
        self.retained.invalidate_for_layer_change(&item.key, None);
        if placement.visible_rect.is_empty() &&
            !item.flags.contains(ItemFlags::BUILD_EVEN_IF_INVISIBLE)
        {
            trace!("Skipping invisible layer for {}", item.key);
            return;
        }

        let want_background_color = !self.info.in_inactive_layer;
        let scrolled_clip = trees
            .clip_chains
            .get(placement.clip_chain)
            .filter(|node| {
                node.clip.has_clip() && !trees.asrs.is_ancestor(node.asr, placement.asr)
            });
        let background_color = if let Some(node) = scrolled_clip {
            let clip_agr = trees.asrs.get(node.asr).agr.unwrap_or(placement.agr);
            let rect = node.clip.clip_rect.map(|rect| scale.to_nearest_pixels(&rect));
            self.tree
                .adding_own_layer(clip_agr, rect.as_ref(), want_background_color)
        } else if placement.prerendered {
            // The whole transformed content may become visible while the compositor animates it.
            match trees.agrs.parent(placement.agr) {
                Some(parent) => self.tree.adding_own_layer(
                    parent,
                    placement.clip_rect.as_ref(),
                    want_background_color,
                ),
                None => self
                    .tree
                    .adding_own_layer(placement.agr, None, want_background_color),
            }
        } else {
            self.tree.adding_own_layer(
                placement.agr,
                Some(&placement.visible_rect),
                want_background_color,
            )
        };
        self.finish_painted_layers();

        let container_scroll_metadata_asr = self.params.scroll_metadata_asr;
        let scroll_metadata_asr = if trees
            .asrs
            .is_ancestor(placement.scroll_metadata_asr, container_scroll_metadata_asr)
        {
            container_scroll_metadata_asr
        } else {
            placement.scroll_metadata_asr
        };
        let mut params = ContainerParameters {
            background_color,
            scroll_metadata_asr,
            compositor_asr: if scroll_metadata_asr != container_scroll_metadata_asr {
                scroll_metadata_asr
            } else {
                self.params.compositor_asr
            },
            to_inactive_root: None,
        };
        if item.fixed_position.is_some() {
            params.compositor_asr = placement.asr;
        }

        let layer = match self.build_layer(item, params) {
            Ok(layer) => layer,
            Err(error) => {
                warn!("No layer for {} {}: {}", item.type_name(), item.key, error);
                return;
            },
        };

        let mask = self
            .retained
            .masks
            .get_or_create(&placement.clip, &scale, &mut self.retained.layers);
        if let Some(layer) = self.retained.layers.layer_mut(layer) {
            layer.clip_rect = placement.clip_rect;
            layer.mask_layer = mask;
            layer
                .content_flags
                .set(ContentFlags::BACKFACE_HIDDEN, item.backface_hidden());
            layer.fixed_position = item.fixed_position.map(|fixed| FixedPositionData {
                scroll_id: trees.asrs.get(AsrId::ROOT).scroll_id,
                anchor: scale
                    .to_nearest_pixels(&AuRect::new(fixed.anchor, AuSize::new(Au(0), Au(0))))
                    .min,
                is_fixed_to_root_scroll_frame: fixed.is_fixed_to_root_scroll_frame,
            });
        }
        self.apply_scrolled_clip(layer, placement.clip_chain, placement.asr);

        let opaque = self.info.compute_opaque_rect(
            item,
            placement.agr,
            placement.asr,
            &placement.clip,
            &mut self.session.window_opaque_region,
        );
        let covers_visible = !placement.visible_rect.is_empty() &&
            opaque.pixels.contains_rect(&placement.visible_rect);
        if let Some(layer) = self.retained.layers.layer_mut(layer) {
            // Containers keep what their children reported.
            if layer.as_container().is_none() {
                layer.content_flags.set(ContentFlags::OPAQUE, covers_visible);
            } else if covers_visible {
                layer.content_flags.insert(ContentFlags::OPAQUE);
            }
        }
        let mut entry = NewLayerEntry::new(
            placement.agr,
            placement.asr,
            placement.clip_chain,
            placement.scroll_metadata_asr,
        );
        entry.layer = Some(layer);
        entry.visible_region = DeviceIntRegion::from_rect(&placement.visible_rect);
        entry.opaque_region = opaque.pixels;
        entry.hide_all_layers_below = opaque.hide_all_layers_below;
        entry.opaque_for_agr_parent = opaque.opaque_for_agr_parent;
        entry.is_fixed_to_root_scroll_frame = item
            .fixed_position
            .is_some_and(|fixed| fixed.is_fixed_to_root_scroll_frame);
        self.new_child_layers.push(entry);
        self.retained.store_own_layer(item.key, layer);
    }

    /// Give `layer` the clip of the first link of `clip_chain` if that link scrolls with a
    /// descendant of `asr`, so the compositor moves the clip rather than the layer.
    fn apply_scrolled_clip(&mut self, layer: LayerId, clip_chain: ClipChainId, asr: AsrId) {
        let trees = self.info.trees;
        let scale = self.info.scale;
        let Some(node) = trees
            .clip_chains
            .get(clip_chain)
            .filter(|node| node.clip.has_clip() && !trees.asrs.is_ancestor(node.asr, asr))
        else {
            return;
        };
        let Some(clip_rect) = node.clip.clip_rect else {
            return;
        };
        let mut layer_clip = LayerClip::new(scale.to_nearest_pixels(&clip_rect));
        let mask = self
            .retained
            .masks
            .get_or_create(&node.clip, &scale, &mut self.retained.layers);
        if let Some(layer) = self.retained.layers.layer_mut(layer) {
            if let Some(mask) = mask {
                layer.ancestor_mask_layers.push(mask);
                layer_clip.mask_layer_index = Some(layer.ancestor_mask_layers.len() - 1);
            }
            layer.scrolled_clip = Some(layer_clip);
        }
    }

    fn build_layer(
        &mut self,
        item: &DisplayItem,
        params: ContainerParameters,
    ) -> Result<LayerId, LayerBuildError> {
        let bounds = self.info.scale.to_outside_pixels(&item.bounds);
        match &item.content {
            DisplayItemContent::SolidColor(color) => Ok(self.recycle_or_create(
                &item.key,
                LayerKind::Color {
                    color: *color,
                    bounds,
                },
            )),
            DisplayItemContent::Image { image, .. } => Ok(self.recycle_or_create(
                &item.key,
                LayerKind::Image {
                    image: *image,
                    bounds,
                },
            )),
            DisplayItemContent::Opacity { children, .. } |
            DisplayItemContent::Transform { children, .. } |
            DisplayItemContent::Wrapper(children) |
            DisplayItemContent::Filter(children) => {
                let (_, transform) = container_properties(&item.content);
                let info = ContainerInfo {
                    agr: item.agr,
                    asr: item.asr,
                    bounds: children.bounds(),
                    in_active_transformed_subtree: self.info.in_active_transformed_subtree ||
                        transform.is_some(),
                    is_root: false,
                    ..self.info
                };
                let params = ContainerParameters {
                    to_inactive_root: if self.info.in_inactive_layer {
                        compose_transforms(transform, self.params.to_inactive_root)
                    } else {
                        None
                    },
                    ..params
                };
                let previous = self.retained.old_layer_for(&item.key);
                build_container_layer(
                    self.retained,
                    self.session,
                    info,
                    params,
                    item,
                    children,
                    previous,
                )
            },
            DisplayItemContent::Painted { .. } | DisplayItemContent::HitTest(_) => {
                Err(LayerBuildError::LayerCreationFailed(item.key))
            },
        }
    }

    fn create_painted_layer(&mut self, data: &PaintedLayerData) -> LayerId {
        let layer = self
            .retained
            .layers
            .create_painted_layer(self.info.scale, data.agr);
        trace!("New painted layer {} for {:?}", layer, data.agr);
        layer
    }

    /// Whether a color or image layer may replace the painted layer. A painted layer with
    /// valid content is kept unless layer tree compression is on.
    fn can_optimize_away_painted_layer(&self, painted: LayerId) -> bool {
        if self.info.in_inactive_layer {
            return false;
        }
        let has_valid_content = self
            .retained
            .layers
            .layer(painted)
            .and_then(Layer::as_painted)
            .is_some_and(|content| !content.valid_region.is_empty());
        !has_valid_content || self.info.opts.layer_tree_compression
    }

    fn prepare_color_layer(&mut self, painted: LayerId, data: &PaintedLayerData) -> LayerId {
        let kind = LayerKind::Color {
            color: data.solid_color,
            bounds: data.visible_region.bounds(),
        };
        let layers = &mut self.retained.layers;
        let old = layers
            .painted_user_data(painted)
            .and_then(|user_data| user_data.color_layer)
            .filter(|id| layers.contains(*id));
        match old.and_then(|id| layers.layer_mut(id)) {
            Some(layer) => {
                reset_layer_for_reuse(layer);
                layer.kind = kind;
                layer.id
            },
            None => {
                let layer = layers.create_layer(kind);
                if let Some(user_data) = layers.painted_user_data_mut(painted) {
                    user_data.color_layer = Some(layer);
                }
                layer
            },
        }
    }

    fn prepare_image_layer(
        &mut self,
        painted: LayerId,
        data: &PaintedLayerData,
    ) -> Option<LayerId> {
        let candidate = data.image?;
        let kind = LayerKind::Image {
            image: candidate.image,
            bounds: candidate.bounds,
        };
        let clip_rect = data
            .item_clip
            .as_ref()
            .and_then(|clip| clip.device_clip_rect(&self.info.scale));
        let layers = &mut self.retained.layers;
        let old = layers
            .painted_user_data(painted)
            .and_then(|user_data| user_data.image_layer)
            .filter(|id| layers.contains(*id));
        let layer = match old.and_then(|id| layers.layer_mut(id)) {
            Some(layer) => {
                reset_layer_for_reuse(layer);
                layer.kind = kind;
                layer.id
            },
            None => {
                let layer = layers.create_layer(kind);
                if let Some(user_data) = layers.painted_user_data_mut(painted) {
                    user_data.image_layer = Some(layer);
                }
                layer
            },
        };
        if let Some(layer) = layers.layer_mut(layer) {
            layer.clip_rect = clip_rect;
        }
        Some(layer)
    }

    fn finish_painted_layer_data(&mut self, finished: FinishedPaintedLayer<'a>) {
        let FinishedPaintedLayer {
            mut data,
            background_color,
        } = finished;
        let scale = self.info.scale;
        let opts = self.info.opts;
        let index = data.new_child_layers_index;

        let painted = match data.layer {
            Some(layer) => layer,
            None => self.create_painted_layer(&data),
        };
        data.layer = Some(painted);
        self.new_child_layers[index].layer = Some(painted);

        let use_image = data.image.is_some() && !opts.debug.disable_image_layers;
        let use_color = data.is_solid_color_in_visible_region && !opts.debug.disable_color_layers;
        let optimized = if (use_image || use_color) &&
            self.can_optimize_away_painted_layer(painted)
        {
            let layer = if use_image {
                self.prepare_image_layer(painted, &data)
            } else {
                Some(self.prepare_color_layer(painted, &data))
            };
            if let Some(layer) = layer {
                let entry = &self.new_child_layers[index];
                let replacement = NewLayerEntry {
                    layer: Some(layer),
                    ..NewLayerEntry::new(
                        entry.agr,
                        entry.asr,
                        entry.clip_chain,
                        entry.scroll_metadata_asr,
                    )
                };
                self.new_child_layers[index + 1] = replacement;

                let layers = &mut self.retained.layers;
                if let Some(painted_layer) = layers.layer_mut(painted) {
                    painted_layer.clip_rect = Some(DeviceIntRect::zero());
                    painted_layer.visible_region.set_empty();
                }
                layers.invalidate_whole_layer(painted);
                if let Some(painted_layer) = layers.layer_mut(painted) {
                    painted_layer.event_regions = EventRegions::default();
                }
            }
            layer
        } else {
            None
        };
        let target = optimized.unwrap_or(painted);
        if optimized.is_none() {
            if let Some(layer) = self.retained.layers.layer_mut(painted) {
                layer.clip_rect = None;
            }
        }

        let assigned_items = std::mem::take(&mut data.assigned_items);
        let mut items = Vec::with_capacity(assigned_items.len());
        for assigned in &assigned_items {
            if !assigned.entry_type.is_effect_end() {
                self.retained
                    .invalidate_for_layer_change(&assigned.item.key, Some(painted));
            }
            items.push(self.add_painted_display_item(&mut data, assigned, painted, optimized));
        }
        let item_count = items.len();
        if let Some(content) = self
            .retained
            .layers
            .layer_mut(painted)
            .and_then(Layer::as_painted_mut)
        {
            content.items = items;
        }

        let entry = &mut self.new_child_layers[if optimized.is_some() { index + 1 } else { index }];
        entry.visible_region = data.visible_region.clone();
        entry.opaque_region = data.opaque_region.clone();
        entry.hide_all_layers_below = data.hide_all_layers_below;
        entry.opaque_for_agr_parent = data.opaque_for_agr_parent;

        let mut is_opaque = data.is_opaque_region_covering();
        if optimized.is_none() {
            let mut forced_background = Color::TRANSPARENT;
            if !is_opaque {
                forced_background = background_color;
                is_opaque = forced_background.is_opaque();
            }
            let layers = &mut self.retained.layers;
            let changed = layers
                .painted_user_data(painted)
                .is_some_and(|user_data| user_data.forced_background_color != forced_background);
            if changed {
                layers.invalidate_whole_layer(painted);
            }
            if let Some(user_data) = layers.painted_user_data_mut(painted) {
                user_data.forced_background_color = forced_background;
            }
            if let Some(content) = layers.layer_mut(painted).and_then(Layer::as_painted_mut) {
                content.background_color = forced_background;
            }
        } else if let Some(clip) = &data.item_clip {
            let mask = self
                .retained
                .masks
                .get_or_create(clip, &scale, &mut self.retained.layers);
            if let Some(layer) = self.retained.layers.layer_mut(target) {
                layer.mask_layer = mask;
            }
        }
        self.apply_scrolled_clip(target, data.clip_chain, data.asr);

        let mut flags = ContentFlags::empty();
        if is_opaque && !data.force_transparent_surface {
            flags |= ContentFlags::OPAQUE;
        } else if data.need_component_alpha {
            flags |= ContentFlags::COMPONENT_ALPHA;
        }
        if data.disable_flattening {
            flags |= ContentFlags::DISABLE_FLATTENING;
        }
        if data.backface_hidden {
            flags |= ContentFlags::BACKFACE_HIDDEN;
        }
        if let Some(layer) = self.retained.layers.layer_mut(target) {
            layer.content_flags = flags;
        }
        if let Some(layer) = optimized.and_then(|_| self.retained.layers.layer_mut(painted)) {
            layer
                .content_flags
                .set(ContentFlags::BACKFACE_HIDDEN, data.backface_hidden);
        }

        let event_regions = std::mem::take(&mut data.event_regions);
        let max_rects = self.info.opts.hit_region_max_rects;
        match self.session.contexts.last_mut() {
            Some(context) if self.info.in_inactive_layer => {
                let placement = HoistPlacement {
                    transform: compose_transforms(
                        self.params.to_inactive_root,
                        context.placement.transform,
                    ),
                    ..context.placement.clone()
                };
                let hoisted = placement.hoist(&event_regions, &scale);
                merge_event_regions(&mut context.event_regions, &hoisted, max_rects);
            },
            _ => {
                if let Some(layer) = self.retained.layers.layer_mut(target) {
                    layer.event_regions = event_regions;
                }
            },
        }

        let layers = &mut self.retained.layers;
        if let Some(user_data) = layers.painted_user_data_mut(painted) {
            trace!(
                "Finished painted layer {} with {} entries (previously {})",
                painted, item_count, user_data.last_item_count
            );
            user_data.last_item_count = item_count;
        }
    }

    /// Record an item drawn into `painted` and produce its entry in the layer's item list.
    fn add_painted_display_item(
        &mut self,
        data: &mut PaintedLayerData<'a>,
        assigned: &AssignedDisplayItem<'a>,
        painted: LayerId,
        optimized: Option<LayerId>,
    ) -> PaintedItem {
        let scale = self.info.scale;
        let item = &*assigned.item;
        let kind = match (assigned.entry_type, &item.content) {
            (EntryType::PushOpacity, DisplayItemContent::Opacity { opacity, .. }) => {
                PaintedEntryKind::PushOpacity(*opacity)
            },
            (EntryType::PushOpacityWithBackground, DisplayItemContent::Opacity { opacity, .. }) => {
                PaintedEntryKind::PushOpacityWithBackground(*opacity)
            },
            (EntryType::PushOpacity, _) => PaintedEntryKind::PushOpacity(1.0),
            (EntryType::PushOpacityWithBackground, _) => {
                PaintedEntryKind::PushOpacityWithBackground(1.0)
            },
            (EntryType::PopOpacity, _) => PaintedEntryKind::PopOpacity,
            (EntryType::PushTransform, DisplayItemContent::Transform { transform, .. }) => {
                PaintedEntryKind::PushTransform(*transform)
            },
            (EntryType::PushTransform, _) => {
                PaintedEntryKind::PushTransform(LayoutTransform::identity())
            },
            (EntryType::PopTransform, _) => PaintedEntryKind::PopTransform,
            (EntryType::Item, _) => PaintedEntryKind::Item,
        };
        let painted_item = PaintedItem {
            key: item.key,
            kind,
            clip_rect: assigned.clip.device_clip_rect(&scale),
            bounds: scale.to_outside_pixels(&item.bounds),
        };
        if assigned.entry_type.is_effect_end() {
            return painted_item;
        }

        let mut geometry = DisplayItemGeometry::new(item);
        let mut clip = assigned.clip.clone();
        if let Some(node) = assigned.transform {
            let clipped = clip.apply_non_rounded_intersection(&geometry.bounds);
            geometry = geometry.transformed(|_| self.transform_rect(node, &clipped));
            clip = DisplayItemClip::no_clip();
        }
        self.retained.update_painted_item(
            item.key,
            painted,
            optimized,
            geometry,
            clip,
            item.invalidation,
        );

        if assigned.entry_type == EntryType::Item {
            if let Some(children) = item.children() {
                self.paint_inactive_item(data, assigned, children);
            }
        }
        painted_item
    }

    /// Build the nested layer tree of an inactive container item that is drawn into a painted
    /// layer, and work out which of its pixels changed.
    fn paint_inactive_item(
        &mut self,
        data: &mut PaintedLayerData<'a>,
        assigned: &AssignedDisplayItem<'a>,
        children: &DisplayList,
    ) {
        let scale = self.info.scale;
        let item = &*assigned.item;
        let mut inactive = self
            .retained
            .take_inactive_layers(&item.key)
            .unwrap_or_else(|| Box::new(InactiveLayerData::default()));
        inactive.layers.layers.dump_invalidations = self.info.opts.debug.dump_invalidations;

        let outer_transform = assigned
            .transform
            .map(|node| self.accumulated_transform(node));
        let clip_rect = assigned.clip.device_clip_rect(&scale);
        self.session.contexts.push(BuilderContext {
            placement: HoistPlacement {
                clip: clip_rect,
                clip_is_rounded: assigned.clip.rounded_rect_count() > 0,
                transform: outer_transform,
            },
            event_regions: EventRegions::default(),
        });

        let (_, transform) = container_properties(&item.content);
        let info = ContainerInfo {
            agr: item.agr,
            asr: item.asr,
            bounds: children.bounds(),
            in_inactive_layer: true,
            is_root: false,
            ..self.info
        };
        let params = ContainerParameters {
            to_inactive_root: transform,
            ..ContainerParameters::new(Color::TRANSPARENT, item.asr)
        };
        let previous = inactive.layers.root;
        let result = build_container_layer(
            &mut inactive.layers,
            self.session,
            info,
            params,
            item,
            children,
            previous,
        );
        let context = self.session.contexts.pop();
        match result {
            Ok(root) => inactive.layers.root = Some(root),
            Err(error) => warn!("Nothing drawn for {} {}: {}", item.type_name(), item.key, error),
        }

        inactive.layers.will_end_transaction();
        let mut invalid = inactive.layers.take_invalid_region();
        let signature = inactive.layers.signature();
        if signature != inactive.signature {
            trace!("Layers of {} changed, invalidating all of it", item.key);
            invalid.union_rect(&scale.to_outside_pixels(&item.bounds));
            inactive.signature = signature;
        }
        if let Some(clip) = &clip_rect {
            invalid.intersect_rect(clip);
        }
        if let Some(transform) = &outer_transform {
            let mut transformed = DeviceIntRegion::new();
            for rect in invalid.rects() {
                transformed.union_rect(&transform_device_rect(transform, rect, &scale));
            }
            invalid = transformed;
        }

        if let Some(context) = context {
            merge_event_regions(
                &mut data.event_regions,
                &context.event_regions,
                self.info.opts.hit_region_max_rects,
            );
        }
        self.retained.set_inactive_layers(&item.key, inactive, invalid);
    }

    /// Give the layer the scroll metadata of every ASR between its own and the container's,
    /// innermost first.
    fn setup_scrolling_metadata(&mut self, index: usize) {
        let trees = self.info.trees;
        let asrs = &trees.asrs;
        let scale = self.info.scale;
        let entry = &self.new_child_layers[index];
        let Some(layer_id) = entry.layer else {
            return;
        };
        let (entry_asr, mut clip_chain, is_fixed_to_root) =
            (entry.asr, entry.clip_chain, entry.is_fixed_to_root_scroll_frame);

        let mut start = entry.scroll_metadata_asr;
        let mut stop = self.params.scroll_metadata_asr;
        if !asrs.is_ancestor(stop, start) {
            if asrs.is_ancestor(start, stop) {
                start = stop;
            } else {
                while let Some(parent) = asrs.parent(stop) {
                    stop = parent;
                    if asrs.is_ancestor(stop, start) {
                        break;
                    }
                }
            }
        }
        self.fix_up_fixed_position_layer(layer_id, entry_asr, start, is_fixed_to_root);

        let Some(layer) = self.retained.layers.layer(layer_id) else {
            return;
        };
        let mut mask_layers = layer.ancestor_mask_layers.clone();
        let mut metadata = Vec::new();
        let mut current = start;
        while current != stop {
            let Some(parent) = asrs.parent(current) else {
                debug_panic!("{:?} is not an ancestor of {:?}", stop, start);
                break;
            };
            let own_link = trees.clip_chains.get(clip_chain).filter(|node| node.asr == current);
            if let Some(node) = own_link {
                clip_chain = node.parent;
            }
            let clip = trees
                .clip_chains
                .get(clip_chain)
                .filter(|node| node.asr == parent)
                .map(|node| node.clip.clone());

            let cached = self
                .cached_scroll_metadata
                .as_ref()
                .filter(|(asr, cached_clip, _)| *asr == current && *cached_clip == clip)
                .map(|(_, _, cached)| cached.clone());
            let mut scroll_metadata = match cached {
                Some(cached) => cached,
                None => {
                    let scroll_root = asrs.get(current);
                    let computed = ScrollMetadata {
                        scroll_id: scroll_root.scroll_id,
                        composition_bounds: scale.to_nearest_pixels(&scroll_root.scroll_port),
                        scroll_clip: clip
                            .as_ref()
                            .and_then(|clip| clip.device_clip_rect(&scale))
                            .map(LayerClip::new),
                    };
                    self.cached_scroll_metadata = Some((current, clip.clone(), computed.clone()));
                    computed
                },
            };
            if let Some(clip) = clip.as_ref().filter(|clip| clip.rounded_rect_count() > 0) {
                let mask = self
                    .retained
                    .masks
                    .get_or_create(clip, &scale, &mut self.retained.layers);
                let scroll_clip = scroll_metadata.scroll_clip.as_mut();
                if let (Some(mask), Some(scroll_clip)) = (mask, scroll_clip) {
                    scroll_clip.mask_layer_index = Some(mask_layers.len());
                    mask_layers.push(mask);
                }
            }
            metadata.push(scroll_metadata);
            current = parent;
        }

        if let Some(layer) = self.retained.layers.layer_mut(layer_id) {
            layer.scroll_metadata = metadata;
            layer.ancestor_mask_layers = mask_layers;
        }
    }

    /// Point a fixed layer at the scroll frame it must not move with, which is the one right
    /// below `target_asr` on the way to the ASR the compositor moves the layer with.
    fn fix_up_fixed_position_layer(
        &mut self,
        layer: LayerId,
        target_asr: AsrId,
        leaf_scroll_metadata_asr: AsrId,
        is_fixed_to_root_scroll_frame: bool,
    ) {
        let asrs = &self.info.trees.asrs;
        let compositor_asr = if leaf_scroll_metadata_asr == self.params.scroll_metadata_asr {
            self.params.compositor_asr
        } else {
            leaf_scroll_metadata_asr
        };
        let Some(layer) = self.retained.layers.layer_mut(layer) else {
            return;
        };
        let Some(fixed) = layer.fixed_position.as_mut() else {
            return;
        };
        if target_asr != compositor_asr && asrs.is_ancestor(target_asr, compositor_asr) {
            let fixed_to = asrs.direct_child(target_asr, compositor_asr);
            fixed.scroll_id = asrs.get(fixed_to).scroll_id;
            fixed.is_fixed_to_root_scroll_frame = is_fixed_to_root_scroll_frame;
        } else {
            layer.fixed_position = None;
        }
    }

    /// Set up scroll metadata and cull every new child against the opaque layers above it,
    /// from the top down. Returns the opaque area of the container's own AGR and ASR.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "ContainerState::postprocess_retained_layers",
            skip_all,
            fields(servo_profiling = true),
            level = "trace",
        )
    )]
    fn postprocess_retained_layers(&mut self) -> DeviceIntRegion {
        struct OpaqueRegionEntry {
            agr: AgrId,
            asr: AsrId,
            opaque_region: DeviceIntRegion,
        }

        let trees = self.info.trees;
        let scale = self.info.scale;
        let occlusion_culling = !self.info.opts.debug.disable_occlusion_culling;
        let mut opaque_regions: Vec<OpaqueRegionEntry> = Vec::new();
        let mut hide_all = false;
        let mut container_entry: Option<usize> = None;

        for index in (0..self.new_child_layers.len()).rev() {
            let Some(layer_id) = self.new_child_layers[index].layer else {
                continue;
            };
            self.setup_scrolling_metadata(index);
            let entry = &mut self.new_child_layers[index];
            let mut found = opaque_regions
                .iter()
                .position(|data| data.agr == entry.agr && data.asr == entry.asr);
            let Some(layer) = self.retained.layers.layer_mut(layer_id) else {
                continue;
            };
            if occlusion_culling {
                if hide_all {
                    entry.visible_region.set_empty();
                } else {
                    let stationary_clip = layer.stationary_clip_in_container();
                    let covered_by_container = stationary_clip.is_some_and(|clip| {
                        container_entry
                            .is_some_and(|i| opaque_regions[i].opaque_region.contains_rect(&clip))
                    });
                    if covered_by_container {
                        entry.visible_region.set_empty();
                    } else if let Some(i) = found {
                        entry.visible_region.subtract(&opaque_regions[i].opaque_region);
                    }
                }
            }

            let mut visible = entry.visible_region.clone();
            if let Some(transform) = layer.as_container().and_then(|data| data.transform) {
                // Containers with a transform take their visible region in their own space.
                visible = match transform.inverse() {
                    Some(inverse) => DeviceIntRegion::from_rect(&transform_device_rect(
                        &inverse,
                        &visible.bounds(),
                        &scale,
                    )),
                    None => DeviceIntRegion::new(),
                };
            }
            layer.visible_region = visible;

            if !occlusion_culling || entry.opaque_region.is_empty() {
                continue;
            }
            let (mut agr_to_cover, mut asr_to_cover) = (entry.agr, entry.asr);
            if entry.opaque_for_agr_parent &&
                trees.agrs.parent(entry.agr) == Some(self.info.agr)
            {
                agr_to_cover = self.info.agr;
                asr_to_cover = self.info.asr;
                found = opaque_regions
                    .iter()
                    .position(|data| data.agr == agr_to_cover && data.asr == asr_to_cover);
            }
            let slot = match found {
                Some(i) => i,
                None => {
                    if agr_to_cover == self.info.agr && asr_to_cover == self.info.asr {
                        container_entry = Some(opaque_regions.len());
                    }
                    opaque_regions.push(OpaqueRegionEntry {
                        agr: agr_to_cover,
                        asr: asr_to_cover,
                        opaque_region: DeviceIntRegion::new(),
                    });
                    opaque_regions.len() - 1
                },
            };
            let mut clipped_opaque = entry.opaque_region.clone();
            if let Some(clip) = layer.combined_clip_rect() {
                clipped_opaque.intersect_rect(&clip);
            }
            if layer.scrolled_clip.is_some() {
                // The clip moves on the compositor, so what it lets through may change.
                clipped_opaque.set_empty();
            } else if entry.hide_all_layers_below {
                hide_all = true;
            }
            opaque_regions[slot].opaque_region.union(&clipped_opaque);
        }

        container_entry
            .map(|i| std::mem::take(&mut opaque_regions[i].opaque_region))
            .unwrap_or_default()
    }

    /// Finish the remaining painted layers and make the new children the container's
    /// children.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "ContainerState::finish",
            skip_all,
            fields(servo_profiling = true),
            level = "trace",
        )
    )]
    pub(crate) fn finish(mut self) -> ContainerResult {
        self.tree.finish();
        self.finish_painted_layers();
        let container_opaque = self.postprocess_retained_layers();

        let bounds = self.info.scale.to_outside_pixels(&self.info.bounds);
        let mut result = ContainerResult {
            opaque: !bounds.is_empty() && container_opaque.contains_rect(&bounds),
            ..Default::default()
        };
        let mut children = Vec::with_capacity(self.new_child_layers.len());
        for layer_id in self.new_child_layers.iter().filter_map(|entry| entry.layer) {
            if children.contains(&layer_id) {
                debug_panic!("Layer {} added to {} twice", layer_id, self.container_layer);
                continue;
            }
            if let Some(layer) = self.retained.layers.layer(layer_id) {
                if !layer.visible_region.is_empty() {
                    result.content_flags |= layer.content_flags &
                        (ContentFlags::COMPONENT_ALPHA |
                            ContentFlags::COMPONENT_ALPHA_DESCENDANT |
                            ContentFlags::DISABLE_FLATTENING);
                }
            }
            children.push(layer_id);
        }
        debug!(
            "Container {} has {} children",
            self.container_layer,
            children.len()
        );
        self.retained
            .layers
            .set_children(self.container_layer, children);
        result
    }
}

/// Build, or rebuild, the container layer for an effect item and layerize its children into
/// it. `previous` is the item's container layer from the last paint.
pub(crate) fn build_container_layer<'b>(
    retained: &mut RetainedLayers,
    session: &mut BuildSession,
    info: ContainerInfo<'b>,
    params: ContainerParameters,
    item: &DisplayItem,
    children: &'b DisplayList,
    previous: Option<LayerId>,
) -> Result<LayerId, LayerBuildError> {
    let (opacity, transform) = container_properties(&item.content);
    if transform.is_some_and(|transform| !transform.is_invertible()) {
        return Err(LayerBuildError::SingularTransform);
    }

    let reusable = previous.filter(|id| {
        retained
            .layers
            .layer(*id)
            .is_some_and(|layer| layer.as_container().is_some())
    });
    let layer = match reusable {
        Some(layer) => layer,
        None => retained
            .layers
            .create_layer(LayerKind::Container(ContainerLayerData {
                pre_x_scale: 1.0,
                pre_y_scale: 1.0,
                ..Default::default()
            })),
    };
    if let Some(container) = retained.layers.layer_mut(layer) {
        reset_layer_for_reuse(container);
        if let Some(data) = container.as_container_mut() {
            data.opacity = opacity;
            data.transform = transform;
        }
    }

    let result = ContainerState::build(info, params, retained, session, layer, children);

    if let Some(container) = retained.layers.layer_mut(layer) {
        let mut flags = ContentFlags::empty();
        if result.opaque && opacity >= 1.0 {
            flags |= ContentFlags::OPAQUE;
        }
        if result
            .content_flags
            .intersects(ContentFlags::COMPONENT_ALPHA | ContentFlags::COMPONENT_ALPHA_DESCENDANT)
        {
            flags |= ContentFlags::COMPONENT_ALPHA_DESCENDANT;
        }
        if result.content_flags.contains(ContentFlags::DISABLE_FLATTENING) {
            flags |= ContentFlags::DISABLE_FLATTENING;
        }
        container.content_flags = flags;
    }
    Ok(layer)
}
