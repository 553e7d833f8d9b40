/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The retained layers of one layer tree, and the builder's private data about each painted
//! layer.

use layer_traits::{
    Color, Epoch, Layer, LayerId, LayerKind, LayerTree, PaintedLayerData as PaintedLayerContent,
};
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use servo_geometry::{DeviceIntRegion, DeviceScale};

use crate::display_list::roots::AgrId;

/// What the builder remembers about a painted layer between paints.
#[derive(Clone, Debug)]
pub(crate) struct PaintedLayerUserData {
    /// The resolution the layer's content was last rendered at.
    pub scale: DeviceScale,
    pub agr: AgrId,
    /// The color the layer was last told to paint beneath its items.
    pub forced_background_color: Color,
    /// Pixels invalidated while the layer was not part of any container, applied when the
    /// layer is recycled.
    pub region_to_invalidate: DeviceIntRegion,
    /// The color or image layer that replaced this layer's content, reused across paints.
    pub color_layer: Option<LayerId>,
    pub image_layer: Option<LayerId>,
    pub last_item_count: usize,
}

impl PaintedLayerUserData {
    pub(crate) fn new(scale: DeviceScale, agr: AgrId) -> Self {
        Self {
            scale,
            agr,
            forced_background_color: Color::TRANSPARENT,
            region_to_invalidate: DeviceIntRegion::new(),
            color_layer: None,
            image_layer: None,
            last_item_count: 0,
        }
    }
}

/// Owns every layer of one retained layer tree.
#[derive(Default)]
pub(crate) struct LayerManager {
    layers: FxHashMap<LayerId, Layer>,
    painted_user_data: FxHashMap<LayerId, PaintedLayerUserData>,
    next_layer_id: u64,
    /// Log every invalidated rect.
    pub dump_invalidations: bool,
}

impl LayerManager {
    pub(crate) fn create_layer(&mut self, kind: LayerKind) -> LayerId {
        self.next_layer_id += 1;
        let id = LayerId(self.next_layer_id);
        self.layers.insert(id, Layer::new(id, kind));
        id
    }

    pub(crate) fn create_painted_layer(&mut self, scale: DeviceScale, agr: AgrId) -> LayerId {
        let id = self.create_layer(LayerKind::Painted(PaintedLayerContent::default()));
        self.painted_user_data
            .insert(id, PaintedLayerUserData::new(scale, agr));
        debug!("Created painted layer {}", id);
        id
    }

    pub(crate) fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    pub(crate) fn painted_user_data(&self, id: LayerId) -> Option<&PaintedLayerUserData> {
        self.painted_user_data.get(&id)
    }

    pub(crate) fn painted_user_data_mut(
        &mut self,
        id: LayerId,
    ) -> Option<&mut PaintedLayerUserData> {
        self.painted_user_data.get_mut(&id)
    }

    /// Mark `region` of a painted layer as needing to be repainted. Other layer kinds are
    /// redrawn by the compositor and ignore invalidation.
    pub(crate) fn invalidate_region(&mut self, id: LayerId, region: &DeviceIntRegion) {
        if region.is_empty() {
            return;
        }
        let Some(painted) = self.layers.get_mut(&id).and_then(Layer::as_painted_mut) else {
            return;
        };
        if self.dump_invalidations {
            info!("Invalidating layer {}: {:?}", id, region);
        }
        painted.invalid_region.union(region);
        painted.invalid_region.simplify_outward(20);
        painted.valid_region.subtract(region);
    }

    pub(crate) fn invalidate_whole_layer(&mut self, id: LayerId) {
        if let Some(layer) = self.layers.get_mut(&id) {
            if self.dump_invalidations {
                info!("Invalidating all of layer {}", id);
            }
            layer.invalidate_whole_layer();
        }
    }

    /// Make `children` the children of `container`, in order. Layers that are no longer
    /// children lose their parent.
    pub(crate) fn set_children(&mut self, container: LayerId, children: Vec<LayerId>) {
        let old_children = self
            .layers
            .get_mut(&container)
            .and_then(Layer::as_container_mut)
            .map(|data| std::mem::take(&mut data.children))
            .unwrap_or_default();
        for old in old_children {
            if let Some(layer) = self.layers.get_mut(&old) {
                if layer.parent == Some(container) {
                    layer.parent = None;
                }
            }
        }
        for child in &children {
            if let Some(layer) = self.layers.get_mut(child) {
                layer.parent = Some(container);
            }
        }
        if let Some(data) = self
            .layers
            .get_mut(&container)
            .and_then(Layer::as_container_mut)
        {
            data.children = children;
        }
    }

    pub(crate) fn children(&self, container: LayerId) -> &[LayerId] {
        self.layers
            .get(&container)
            .and_then(Layer::as_container)
            .map(|data| data.children.as_slice())
            .unwrap_or(&[])
    }

    fn reachable_from(&self, roots: impl IntoIterator<Item = LayerId>) -> FxHashSet<LayerId> {
        let mut reachable = FxHashSet::default();
        let mut stack: Vec<LayerId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let Some(layer) = self.layers.get(&id) else {
                continue;
            };
            if let Some(container) = layer.as_container() {
                stack.extend(container.children.iter().copied());
            }
            stack.extend(layer.mask_layer);
            stack.extend(layer.ancestor_mask_layers.iter().copied());
            if let Some(user_data) = self.painted_user_data.get(&id) {
                stack.extend(user_data.color_layer);
                stack.extend(user_data.image_layer);
            }
        }
        reachable
    }

    /// Drop every layer that is neither reachable from `root` nor in `retained`.
    pub(crate) fn collect_garbage(
        &mut self,
        root: Option<LayerId>,
        retained: impl IntoIterator<Item = LayerId>,
    ) {
        let reachable = self.reachable_from(root.into_iter().chain(retained));
        let before = self.layers.len();
        self.layers.retain(|id, _| reachable.contains(id));
        self.painted_user_data.retain(|id, _| reachable.contains(id));
        if before != self.layers.len() {
            debug!("Dropped {} unreferenced layers", before - self.layers.len());
        }
    }

    /// Copy the tree under `root` into a snapshot and hand over the pending invalidations of
    /// its painted layers.
    pub(crate) fn snapshot(&mut self, root: Option<LayerId>, epoch: Epoch) -> LayerTree {
        let reachable = self.reachable_from(root);
        let mut tree = LayerTree {
            epoch,
            root,
            ..Default::default()
        };
        let mut ids: Vec<_> = reachable.into_iter().collect();
        ids.sort();
        for id in ids {
            let Some(layer) = self.layers.get_mut(&id) else {
                continue;
            };
            if let Some(painted) = layer.as_painted_mut() {
                let invalid = std::mem::take(&mut painted.invalid_region);
                if !invalid.is_empty() {
                    tree.invalidations.push((id, invalid));
                }
            }
            tree.layers.insert(id, layer.clone());
        }
        tree
    }

    pub(crate) fn len(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use euclid::{Box2D, Point2D};
    use layer_traits::ContainerLayerData;

    use super::*;

    #[test]
    fn garbage_collection_keeps_the_tree() {
        let mut manager = LayerManager::default();
        let root = manager.create_layer(LayerKind::Container(ContainerLayerData::default()));
        let kept = manager.create_painted_layer(DeviceScale::default(), AgrId::ROOT);
        let dropped = manager.create_painted_layer(DeviceScale::default(), AgrId::ROOT);
        manager.set_children(root, vec![kept, dropped]);
        manager.set_children(root, vec![kept]);
        assert_eq!(manager.layer(dropped).and_then(|layer| layer.parent), None);

        manager.collect_garbage(Some(root), []);
        assert!(manager.contains(kept));
        assert!(!manager.contains(dropped));
        assert!(manager.painted_user_data(dropped).is_none());
    }

    #[test]
    fn snapshot_takes_invalidations() {
        let mut manager = LayerManager::default();
        let root = manager.create_layer(LayerKind::Container(ContainerLayerData::default()));
        let painted = manager.create_painted_layer(DeviceScale::default(), AgrId::ROOT);
        manager.set_children(root, vec![painted]);
        let rect = Box2D::new(Point2D::new(0, 0), Point2D::new(10, 10));
        manager.invalidate_region(painted, &DeviceIntRegion::from_rect(&rect));

        let tree = manager.snapshot(Some(root), Epoch(1));
        assert_eq!(tree.layers.len(), 2);
        assert!(tree.invalidation_for(painted).is_some());
        let again = manager.snapshot(Some(root), Epoch(2));
        assert!(again.invalidations.is_empty());
    }
}
