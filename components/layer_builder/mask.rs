/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Mask layers for rounded rect clips.
//!
//! Masks are keyed by their device pixel geometry, so an unchanged clip reuses the mask layer
//! of the previous paint and the compositor can keep the mask it already rasterized.

use layer_traits::{LayerId, LayerKind, MaskLayerData};
use log::trace;
use rustc_hash::FxHashMap;
use servo_geometry::{DeviceIntRect, DeviceScale};
use smallvec::SmallVec;

use crate::display_list::clip::DisplayItemClip;
use crate::layer_manager::LayerManager;

/// The device pixel geometry of a rounded clip.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct MaskKey {
    rounded_rects: SmallVec<[DeviceIntRect; 1]>,
    radii: SmallVec<[[i32; 4]; 1]>,
}

impl MaskKey {
    pub(crate) fn new(clip: &DisplayItemClip, scale: &DeviceScale) -> Self {
        let app_units = scale.app_units_per_dev_pixel as f32;
        let to_device = |radius: app_units::Au| {
            (radius.0 as f32 * scale.x_scale.max(scale.y_scale) / app_units).round() as i32
        };
        Self {
            rounded_rects: clip
                .rounded_rects
                .iter()
                .map(|rounded_rect| scale.to_nearest_pixels(&rounded_rect.rect))
                .collect(),
            radii: clip
                .rounded_rects
                .iter()
                .map(|rounded_rect| rounded_rect.radii.map(to_device))
                .collect(),
        }
    }

    fn bounds(&self) -> DeviceIntRect {
        self.rounded_rects
            .iter()
            .fold(None, |bounds: Option<DeviceIntRect>, rect| match bounds {
                Some(bounds) => Some(bounds.intersection(rect).unwrap_or(DeviceIntRect::zero())),
                None => Some(*rect),
            })
            .unwrap_or(DeviceIntRect::zero())
    }
}

struct MaskEntry {
    layer: LayerId,
    used: bool,
}

/// The mask layers of one layer manager, reused across paints while their geometry stays
/// the same.
#[derive(Default)]
pub(crate) struct MaskLayerCache {
    entries: FxHashMap<MaskKey, MaskEntry>,
}

impl MaskLayerCache {
    /// A mask layer for the rounded rects of `clip`, or `None` if the clip has none.
    pub(crate) fn get_or_create(
        &mut self,
        clip: &DisplayItemClip,
        scale: &DeviceScale,
        layers: &mut LayerManager,
    ) -> Option<LayerId> {
        if clip.rounded_rect_count() == 0 {
            return None;
        }
        let key = MaskKey::new(clip, scale);
        if let Some(entry) = self.entries.get_mut(&key) {
            if layers.layer(entry.layer).is_some() {
                entry.used = true;
                return Some(entry.layer);
            }
        }

        let bounds = key.bounds();
        let layer = layers.create_layer(LayerKind::Mask(MaskLayerData {
            rounded_rects: key.rounded_rects.clone(),
            radii: key.radii.clone(),
            bounds,
        }));
        if let Some(mask) = layers.layer_mut(layer) {
            mask.visible_region.union_rect(&bounds);
        }
        trace!("Created mask layer {} for {:?}", layer, key);
        self.entries.insert(key, MaskEntry { layer, used: true });
        Some(layer)
    }

    /// Forget masks that were not used since the last sweep. Their layers are collected with
    /// the rest of the unreferenced layers.
    pub(crate) fn sweep(&mut self) {
        self.entries.retain(|_, entry| std::mem::replace(&mut entry.used, false));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
