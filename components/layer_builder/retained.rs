/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! What the builder keeps between paints: the layers themselves and, for every item, the layer
//! it was drawn into and the geometry it had.

use layer_traits::{Color, DisplayItemKey, FrameId, ImageKey, LayerId, LayerKind};
use log::debug;
use rustc_hash::FxHashMap;
use servo_geometry::{DeviceIntRect, DeviceIntRegion, LayoutTransform};

use crate::display_list::ItemInvalidation;
use crate::display_list::clip::DisplayItemClip;
use crate::invalidation::{DisplayItemGeometry, compute_geometry_change};
use crate::layer_manager::LayerManager;
use crate::mask::MaskLayerCache;
use crate::painted_layer_data::transform_device_rect;

/// The parts of a nested layer tree that are not tracked item by item. When they change, the
/// whole item drawing the tree is repainted.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LayerSignature {
    kind: &'static str,
    visible_bounds: DeviceIntRect,
    clip_rect: Option<DeviceIntRect>,
    content: SignatureContent,
}

#[derive(Clone, Debug, PartialEq)]
enum SignatureContent {
    Painted,
    Color(Color),
    Image(ImageKey),
    Container {
        opacity: f32,
        transform: Option<LayoutTransform>,
    },
    Mask,
}

/// The nested layer tree of an item that is drawn into a painted layer.
#[derive(Default)]
pub(crate) struct InactiveLayerData {
    pub layers: RetainedLayers,
    pub signature: Vec<LayerSignature>,
}

/// Geometry recorded during a paint, compared with the retained geometry when the
/// transaction ends.
struct PendingGeometry {
    geometry: DisplayItemGeometry,
    clip: DisplayItemClip,
    invalidation: ItemInvalidation,
    /// Pixels changed inside the item's nested layer tree.
    nested_invalid_region: DeviceIntRegion,
}

struct DisplayItemData {
    layer: LayerId,
    /// The color or image layer that replaced the painted layer `layer`.
    optimized_layer: Option<LayerId>,
    geometry: Option<DisplayItemGeometry>,
    clip: DisplayItemClip,
    inactive: Option<Box<InactiveLayerData>>,
    pending: Option<PendingGeometry>,
    used: bool,
}

impl DisplayItemData {
    fn new(layer: LayerId) -> Self {
        Self {
            layer,
            optimized_layer: None,
            geometry: None,
            clip: DisplayItemClip::no_clip(),
            inactive: None,
            pending: None,
            used: true,
        }
    }
}

/// A retained layer tree and everything known about the items drawn into it.
#[derive(Default)]
pub(crate) struct RetainedLayers {
    pub layers: LayerManager,
    pub masks: MaskLayerCache,
    pub root: Option<LayerId>,
    item_data: FxHashMap<DisplayItemKey, DisplayItemData>,
}

impl RetainedLayers {
    /// The nested layer tree the item was drawn from, if it is drawn into a painted layer.
    pub(crate) fn inactive_layers(&self, key: &DisplayItemKey) -> Option<&InactiveLayerData> {
        self.item_data.get(key)?.inactive.as_deref()
    }

    /// The layer the item was drawn into by the previous paint, if it still exists.
    pub(crate) fn old_layer_for(&self, key: &DisplayItemKey) -> Option<LayerId> {
        self.item_data
            .get(key)
            .map(|data| data.layer)
            .filter(|layer| self.layers.contains(*layer))
    }

    /// The item is moving to `new_layer`: repaint what it drew in its old painted layer.
    pub(crate) fn invalidate_for_layer_change(
        &mut self,
        key: &DisplayItemKey,
        new_layer: Option<LayerId>,
    ) {
        let Some(data) = self.item_data.get_mut(key) else {
            return;
        };
        if Some(data.layer) == new_layer {
            return;
        }
        if let Some(geometry) = data.geometry.take() {
            let Some(scale) = self.layers.painted_user_data(data.layer).map(|user| user.scale)
            else {
                return;
            };
            debug!("{} changed layers, invalidating it in {}", key, data.layer);
            let region = geometry.invalidation_region(&data.clip, &scale);
            self.layers.invalidate_region(data.layer, &region);
        }
    }

    /// Record that the item has a layer of its own this paint.
    pub(crate) fn store_own_layer(&mut self, key: DisplayItemKey, layer: LayerId) {
        let data = self
            .item_data
            .entry(key)
            .or_insert_with(|| DisplayItemData::new(layer));
        data.layer = layer;
        data.optimized_layer = None;
        data.geometry = None;
        data.pending = None;
        data.used = true;
    }

    /// Record that the item was drawn into the painted layer `layer` this paint. The change
    /// in geometry is turned into invalidation when the transaction ends.
    pub(crate) fn update_painted_item(
        &mut self,
        key: DisplayItemKey,
        layer: LayerId,
        optimized_layer: Option<LayerId>,
        geometry: DisplayItemGeometry,
        clip: DisplayItemClip,
        invalidation: ItemInvalidation,
    ) {
        let data = self
            .item_data
            .entry(key)
            .or_insert_with(|| DisplayItemData::new(layer));
        if data.used && data.pending.is_some() && data.layer != layer {
            debug!("{} was drawn into more than one layer", key);
        }
        data.layer = layer;
        data.optimized_layer = optimized_layer;
        data.used = true;
        data.pending = Some(PendingGeometry {
            geometry,
            clip,
            invalidation,
            nested_invalid_region: DeviceIntRegion::new(),
        });
    }

    /// Hand the item's nested layer tree over for the next paint, along with the pixels that
    /// changed in it.
    pub(crate) fn set_inactive_layers(
        &mut self,
        key: &DisplayItemKey,
        inactive: Box<InactiveLayerData>,
        invalid_region: DeviceIntRegion,
    ) {
        if let Some(data) = self.item_data.get_mut(key) {
            data.inactive = Some(inactive);
            if let Some(pending) = data.pending.as_mut() {
                pending.nested_invalid_region = invalid_region;
            }
        }
    }

    pub(crate) fn take_inactive_layers(
        &mut self,
        key: &DisplayItemKey,
    ) -> Option<Box<InactiveLayerData>> {
        self.item_data.get_mut(key)?.inactive.take()
    }

    /// Turn this paint's geometry changes into invalidation, forget items that were not
    /// drawn, and drop layers that are no longer used.
    pub(crate) fn will_end_transaction(&mut self) {
        let Self {
            layers, item_data, ..
        } = self;
        let mut removed = Vec::new();
        for (key, data) in item_data.iter_mut() {
            if !std::mem::replace(&mut data.used, false) {
                removed.push(*key);
                continue;
            }
            let Some(pending) = data.pending.take() else {
                continue;
            };
            if data.optimized_layer.is_some() {
                continue;
            }
            let Some(scale) = layers.painted_user_data(data.layer).map(|user| user.scale) else {
                continue;
            };
            let old = data.geometry.as_ref().map(|geometry| (geometry, &data.clip));
            let mut changed = compute_geometry_change(
                old,
                &pending.geometry,
                &pending.clip,
                pending.invalidation,
                &scale,
            );
            changed.union(&pending.nested_invalid_region);
            if !changed.is_empty() {
                debug!("{} changed: {:?}", key, changed);
                layers.invalidate_region(data.layer, &changed);
            }
            data.geometry = Some(pending.geometry);
            data.clip = pending.clip;
        }

        for key in removed {
            let Some(data) = item_data.remove(&key) else {
                continue;
            };
            let scale = layers.painted_user_data(data.layer).map(|user| user.scale);
            if let (Some(geometry), Some(scale)) = (data.geometry, scale) {
                debug!("{} was removed", key);
                let region = geometry.invalidation_region(&data.clip, &scale);
                layers.invalidate_region(data.layer, &region);
            }
        }

        self.masks.sweep();
        let retained: Vec<LayerId> = self
            .item_data
            .values()
            .flat_map(|data| std::iter::once(data.layer).chain(data.optimized_layer))
            .collect();
        self.layers.collect_garbage(self.root, retained);
        debug!(
            "{} layers and {} masks retained for {} items",
            self.layers.len(),
            self.masks.len(),
            self.item_data.len()
        );
    }

    /// Forget every item of `frame`. What they drew is repainted when their painted layers
    /// are next used.
    pub(crate) fn remove_frame(&mut self, frame: FrameId) {
        let Self {
            layers, item_data, ..
        } = self;
        item_data.retain(|key, data| {
            if let Some(inactive) = data.inactive.as_mut() {
                inactive.layers.remove_frame(frame);
            }
            if key.frame != frame {
                return true;
            }
            if let (Some(geometry), Some(user_data)) = (
                data.geometry.as_ref(),
                layers.painted_user_data_mut(data.layer),
            ) {
                let region = geometry.invalidation_region(&data.clip, &user_data.scale);
                user_data.region_to_invalidate.union(&region);
            }
            false
        });
    }

    /// Take the invalid regions of every painted layer in the tree, in the root container's
    /// parent space.
    pub(crate) fn take_invalid_region(&mut self) -> DeviceIntRegion {
        let mut region = DeviceIntRegion::new();
        if let Some(root) = self.root {
            self.collect_invalid_region(root, None, &mut region);
        }
        region
    }

    fn collect_invalid_region(
        &mut self,
        id: LayerId,
        to_parent: Option<LayoutTransform>,
        region: &mut DeviceIntRegion,
    ) {
        let Some(layer) = self.layers.layer_mut(id) else {
            return;
        };
        match &mut layer.kind {
            LayerKind::Painted(painted) => {
                let invalid = std::mem::take(&mut painted.invalid_region);
                let Some(scale) = self.layers.painted_user_data(id).map(|user| user.scale) else {
                    return;
                };
                for rect in invalid.rects() {
                    match &to_parent {
                        Some(transform) => {
                            region.union_rect(&transform_device_rect(transform, rect, &scale))
                        },
                        None => region.union_rect(rect),
                    }
                }
            },
            LayerKind::Container(container) => {
                let to_parent = match (container.transform, to_parent) {
                    (Some(transform), Some(outer)) => Some(transform.then(&outer)),
                    (transform, None) => transform,
                    (None, outer) => outer,
                };
                let children = container.children.clone();
                for child in children {
                    self.collect_invalid_region(child, to_parent, region);
                }
            },
            _ => {},
        }
    }

    /// The layers of the tree in paint order, as far as per-item invalidation does not
    /// cover them.
    pub(crate) fn signature(&self) -> Vec<LayerSignature> {
        let mut signature = Vec::new();
        if let Some(root) = self.root {
            self.collect_signature(root, &mut signature);
        }
        signature
    }

    fn collect_signature(&self, id: LayerId, signature: &mut Vec<LayerSignature>) {
        let Some(layer) = self.layers.layer(id) else {
            return;
        };
        let content = match &layer.kind {
            LayerKind::Painted(_) => SignatureContent::Painted,
            LayerKind::Color { color, .. } => SignatureContent::Color(*color),
            LayerKind::Image { image, .. } => SignatureContent::Image(*image),
            LayerKind::Container(container) => SignatureContent::Container {
                opacity: container.opacity,
                transform: container.transform,
            },
            LayerKind::Mask(_) => SignatureContent::Mask,
        };
        signature.push(LayerSignature {
            kind: layer.kind_name(),
            visible_bounds: layer.visible_region.bounds(),
            clip_rect: layer.clip_rect,
            content,
        });
        for child in self.layers.children(id) {
            self.collect_signature(*child, signature);
        }
    }
}

#[cfg(test)]
mod tests {
    use servo_geometry::{DeviceScale, au_rect_from_px};

    use super::*;
    use crate::display_list::roots::AgrId;
    use crate::display_list::{DisplayItem, item_key};

    fn painted_item(x: i32) -> DisplayItem {
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(x, 0, 10, 10), 5)
    }

    fn paint(retained: &mut RetainedLayers, layer: LayerId, item: &DisplayItem) {
        retained.update_painted_item(
            item.key,
            layer,
            None,
            DisplayItemGeometry::new(item),
            DisplayItemClip::no_clip(),
            item.invalidation,
        );
        retained.will_end_transaction();
    }

    fn setup() -> (RetainedLayers, LayerId) {
        let mut retained = RetainedLayers::default();
        let root = retained
            .layers
            .create_layer(LayerKind::Container(Default::default()));
        let painted = retained
            .layers
            .create_painted_layer(DeviceScale::default(), AgrId::ROOT);
        retained.layers.set_children(root, vec![painted]);
        retained.root = Some(root);
        (retained, painted)
    }

    #[test]
    fn unchanged_items_do_not_invalidate() {
        let (mut retained, painted) = setup();
        paint(&mut retained, painted, &painted_item(0));
        assert_eq!(retained.take_invalid_region().area(), 100);

        paint(&mut retained, painted, &painted_item(0));
        assert!(retained.take_invalid_region().is_empty());

        paint(&mut retained, painted, &painted_item(5));
        assert_eq!(retained.take_invalid_region().area(), 150);
    }

    #[test]
    fn items_that_are_not_drawn_again_are_forgotten() {
        let (mut retained, painted) = setup();
        paint(&mut retained, painted, &painted_item(0));
        retained.take_invalid_region();

        retained.will_end_transaction();
        assert!(retained.old_layer_for(&item_key(1, 1)).is_none());
        assert_eq!(retained.take_invalid_region().area(), 100);
    }

    #[test]
    fn removed_frames_are_invalidated_on_reuse() {
        let (mut retained, painted) = setup();
        paint(&mut retained, painted, &painted_item(0));
        retained.remove_frame(FrameId(1));
        assert!(retained.old_layer_for(&item_key(1, 1)).is_none());
        let pending = retained
            .layers
            .painted_user_data(painted)
            .map(|user| user.region_to_invalidate.area());
        assert_eq!(pending, Some(100));
    }
}
