/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! The interface between the layer builder and the compositor: the retained layer tree, the
//! ids it refers to, and the channel used to commit it.

pub mod color;
pub mod id;
pub mod layer;
pub mod print_tree;

use crossbeam_channel::Sender;
use log::warn;
use rustc_hash::FxHashMap;
use servo_geometry::DeviceIntRegion;

pub use crate::color::Color;
pub use crate::id::{DisplayItemKey, FrameId, ImageKey, LayerId, ScrollId};
pub use crate::layer::{
    ContainerLayerData, ContentFlags, EventRegions, FixedPositionData, Layer, LayerClip,
    LayerKind, MaskLayerData, PaintedEntryKind, PaintedItem, PaintedLayerData, ScrollMetadata,
};
use crate::print_tree::PrintTree;

/// A struct for denoting the age of messages; prevents race conditions.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Epoch(pub u32);

impl Epoch {
    pub fn next(&mut self) {
        self.0 += 1;
    }
}

/// A complete, immutable snapshot of a layer tree. The compositor only ever sees whole
/// snapshots, so it can never observe a tree in the middle of an update.
#[derive(Clone, Debug, Default)]
pub struct LayerTree {
    pub epoch: Epoch,
    pub root: Option<LayerId>,
    pub layers: FxHashMap<LayerId, Layer>,
    /// The regions of painted layers that must be repainted before this tree is composited.
    pub invalidations: Vec<(LayerId, DeviceIntRegion)>,
}

impl LayerTree {
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub fn root_layer(&self) -> Option<&Layer> {
        self.root.and_then(|root| self.layer(root))
    }

    /// The children of a container layer in paint order, or nothing for other layers.
    pub fn children(&self, id: LayerId) -> impl Iterator<Item = &Layer> {
        self.layer(id)
            .and_then(Layer::as_container)
            .into_iter()
            .flat_map(|container| container.children.iter())
            .filter_map(|child| self.layer(*child))
    }

    /// Every layer reachable from the root, parents before children.
    pub fn layers_in_tree_order(&self) -> Vec<&Layer> {
        let mut result = Vec::new();
        let mut stack: Vec<LayerId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let Some(layer) = self.layer(id) else {
                continue;
            };
            result.push(layer);
            if let Some(container) = layer.as_container() {
                stack.extend(container.children.iter().rev());
            }
            if let Some(mask) = layer.mask_layer {
                stack.push(mask);
            }
            stack.extend(layer.ancestor_mask_layers.iter().rev());
        }
        result
    }

    pub fn invalidation_for(&self, id: LayerId) -> Option<&DeviceIntRegion> {
        self.invalidations
            .iter()
            .find(|(layer, _)| *layer == id)
            .map(|(_, region)| region)
    }

    fn print_layer(&self, id: &LayerId, tree: &mut PrintTree) {
        if let Some(layer) = self.layer(*id) {
            layer.print(tree, &|child, tree| self.print_layer(child, tree));
        }
    }

    pub fn print(&self) -> String {
        let mut tree = PrintTree::new(format!("Layer tree {:?}", self.epoch));
        if let Some(root) = self.root {
            self.print_layer(&root, &mut tree);
        }
        tree.into_string()
    }
}

/// Messages sent to the compositor.
#[derive(Debug)]
pub enum CompositorMsg {
    /// Replace the composited tree with a new committed snapshot.
    UpdateLayerTree(Box<LayerTree>),
    /// The painting thread is going away.
    Exit,
}

/// Sends messages to the compositor.
#[derive(Clone)]
pub struct CompositorProxy {
    pub sender: Sender<CompositorMsg>,
}

impl CompositorProxy {
    pub fn new(sender: Sender<CompositorMsg>) -> Self {
        Self { sender }
    }

    pub fn send(&self, msg: CompositorMsg) {
        if let Err(err) = self.sender.send(msg) {
            warn!("Failed to send message to the compositor ({:?}).", err);
        }
    }
}
