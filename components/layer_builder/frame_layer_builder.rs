/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use layer_traits::{
    Color, CompositorMsg, CompositorProxy, ContainerLayerData, ContentFlags, DisplayItemKey, Epoch,
    FrameId, ImageKey, Layer, LayerId, LayerKind, LayerTree, PaintedEntryKind,
};
use log::{debug, info};
use servo_config::opts::Opts;
use servo_geometry::{AuRect, DeviceIntRect, DeviceIntRegion, DeviceScale, LayoutTransform};

use crate::LayerBuildError;
use crate::container_state::{BuildSession, ContainerParameters, ContainerState};
use crate::display_list::roots::{AgrId, AsrId};
use crate::display_list::{DisplayList, DisplayListTrees};
use crate::painted_layer_data::ContainerInfo;
use crate::retained::RetainedLayers;

/// How the root container of a paint is drawn.
#[derive(Clone, Debug)]
pub struct PaintParameters {
    pub scale: DeviceScale,
    /// The area of the root container, in app units.
    pub container_bounds: AuRect,
    /// The color behind everything, used for the background of painted layers.
    pub background_color: Color,
    /// A transform applied to the root container by the compositor.
    pub transform: Option<LayoutTransform>,
}

impl PaintParameters {
    pub fn new(scale: DeviceScale, container_bounds: AuRect) -> Self {
        Self {
            scale,
            container_bounds,
            background_color: Color::TRANSPARENT,
            transform: None,
        }
    }
}

/// Receives the drawing commands of a painted layer, in paint order.
pub trait PaintCallback {
    /// Draw the display item `key`. `bounds` and `clip` are in the device pixels of the
    /// innermost pushed transform.
    fn paint_item(
        &mut self,
        key: DisplayItemKey,
        bounds: &DeviceIntRect,
        clip: Option<&DeviceIntRect>,
    );

    /// Start a group composited with `opacity`. `needs_background` is set when the group
    /// contains subpixel text, which must be drawn onto an opaque copy of what is below.
    fn push_opacity(&mut self, opacity: f32, needs_background: bool);

    fn pop_opacity(&mut self);

    fn push_transform(&mut self, transform: &LayoutTransform);

    fn pop_transform(&mut self);

    /// Fill `rect` with `color`. Used for layer backgrounds and for nested color layers.
    fn fill_rect(&mut self, _color: Color, _rect: &DeviceIntRect) {}

    /// Draw a nested image layer.
    fn paint_image(&mut self, _image: ImageKey, _bounds: &DeviceIntRect) {}
}

/// Builds and retains the layer tree of one document across paints.
pub struct FrameLayerBuilder {
    opts: Opts,
    retained: RetainedLayers,
    epoch: Epoch,
    compositor: Option<CompositorProxy>,
}

impl FrameLayerBuilder {
    pub fn new(opts: Opts) -> Self {
        let mut retained = RetainedLayers::default();
        retained.layers.dump_invalidations = opts.debug.dump_invalidations;
        Self {
            opts,
            retained,
            epoch: Epoch::default(),
            compositor: None,
        }
    }

    /// Send every committed tree to `compositor`.
    pub fn with_compositor(mut self, compositor: CompositorProxy) -> Self {
        self.compositor = Some(compositor);
        self
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn root_layer(&self) -> Option<LayerId> {
        self.retained.root
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.retained.layers.layer(id)
    }

    /// Assign the items of `list` to layers, reusing the layers of the previous paint where
    /// possible. Returns the root container layer.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "FrameLayerBuilder::build",
            skip_all,
            fields(servo_profiling = true),
            level = "trace",
        )
    )]
    pub fn build(
        &mut self,
        list: &DisplayList,
        trees: &DisplayListTrees,
        params: &PaintParameters,
    ) -> Result<LayerId, LayerBuildError> {
        if params
            .transform
            .is_some_and(|transform| !transform.is_invertible())
        {
            return Err(LayerBuildError::SingularTransform);
        }
        trees.check_roots(list)?;

        let layers = &mut self.retained.layers;
        let previous_root = self.retained.root.filter(|root| {
            layers
                .layer(*root)
                .is_some_and(|layer| layer.as_container().is_some())
        });
        let root = match previous_root {
            Some(root) => root,
            None => layers.create_layer(LayerKind::Container(ContainerLayerData {
                opacity: 1.0,
                pre_x_scale: 1.0,
                pre_y_scale: 1.0,
                ..Default::default()
            })),
        };
        let bounds = params.scale.to_outside_pixels(&params.container_bounds);
        if let Some(layer) = layers.layer_mut(root) {
            layer.visible_region = DeviceIntRegion::from_rect(&bounds);
            if let Some(container) = layer.as_container_mut() {
                container.transform = params.transform;
            }
        }

        let info = ContainerInfo {
            opts: &self.opts,
            trees,
            scale: params.scale,
            agr: AgrId::ROOT,
            asr: AsrId::ROOT,
            bounds: params.container_bounds,
            in_inactive_layer: false,
            in_active_transformed_subtree: params.transform.is_some(),
            is_root: true,
        };
        let mut session = BuildSession::default();
        let result = ContainerState::build(
            info,
            ContainerParameters::new(params.background_color, AsrId::ROOT),
            &mut self.retained,
            &mut session,
            root,
            list,
        );
        if let Some(layer) = self.retained.layers.layer_mut(root) {
            layer.content_flags = result.content_flags;
            layer.content_flags.set(ContentFlags::OPAQUE, result.opaque);
        }
        self.retained.root = Some(root);
        debug!(
            "Built {} items into {} layers",
            list.items.len(),
            self.retained.layers.len()
        );
        Ok(root)
    }

    /// Turn the geometry changes of this paint into invalidation and drop everything the paint
    /// did not use.
    pub fn will_end_transaction(&mut self) {
        self.retained.will_end_transaction();
    }

    /// Snapshot the tree for the compositor, along with the regions of painted layers that
    /// must be repainted.
    pub fn commit(&mut self) -> LayerTree {
        self.epoch.next();
        let tree = self.retained.layers.snapshot(self.retained.root, self.epoch);
        if self.opts.debug.dump_layer_tree {
            info!("{}", tree.print());
        }
        if let Some(compositor) = &self.compositor {
            compositor.send(CompositorMsg::UpdateLayerTree(Box::new(tree.clone())));
        }
        tree
    }

    /// Build, end the transaction and commit in one go.
    pub fn paint(
        &mut self,
        list: &DisplayList,
        trees: &DisplayListTrees,
        params: &PaintParameters,
    ) -> Result<LayerTree, LayerBuildError> {
        self.build(list, trees, params)?;
        self.will_end_transaction();
        Ok(self.commit())
    }

    /// Forget everything drawn for `frame`. What it drew is invalidated when the layers it
    /// was in are used again.
    pub fn remove_frame(&mut self, frame: FrameId) {
        self.retained.remove_frame(frame);
    }

    /// Replay the part of a painted layer within `region` into `callback`, and mark it valid.
    pub fn draw_painted_layer<C: PaintCallback + ?Sized>(
        &mut self,
        layer: LayerId,
        region: &DeviceIntRegion,
        callback: &mut C,
    ) {
        replay_painted_layer(&self.retained, layer, Some(region), callback);
        if let Some(painted) = self
            .retained
            .layers
            .layer_mut(layer)
            .and_then(Layer::as_painted_mut)
        {
            painted.valid_region.union(region);
            painted.invalid_region.subtract(region);
        }
    }
}

impl Drop for FrameLayerBuilder {
    fn drop(&mut self) {
        if let Some(compositor) = &self.compositor {
            compositor.send(CompositorMsg::Exit);
        }
    }
}

/// Replay the items of a painted layer. Items outside `region` are skipped, unless they are
/// inside a transform.
fn replay_painted_layer<C: PaintCallback + ?Sized>(
    retained: &RetainedLayers,
    layer: LayerId,
    region: Option<&DeviceIntRegion>,
    callback: &mut C,
) {
    let Some(content) = retained.layers.layer(layer).and_then(Layer::as_painted) else {
        return;
    };
    if !content.background_color.is_transparent() {
        let background = match region {
            Some(region) => region.bounds(),
            None => retained
                .layers
                .layer(layer)
                .map(|layer| layer.visible_region.bounds())
                .unwrap_or(DeviceIntRect::zero()),
        };
        callback.fill_rect(content.background_color, &background);
    }

    let mut transform_depth = 0;
    for entry in &content.items {
        match &entry.kind {
            PaintedEntryKind::Item => {
                let culled = transform_depth == 0 &&
                    region.is_some_and(|region| !region.intersects_rect(&entry.bounds));
                if culled {
                    continue;
                }
                let nested = retained
                    .inactive_layers(&entry.key)
                    .and_then(|inactive| inactive.layers.root.map(|root| (inactive, root)));
                match nested {
                    Some((inactive, root)) => replay_layer(&inactive.layers, root, callback),
                    None => callback.paint_item(entry.key, &entry.bounds, entry.clip_rect.as_ref()),
                }
            },
            PaintedEntryKind::PushOpacity(opacity) => callback.push_opacity(*opacity, false),
            PaintedEntryKind::PushOpacityWithBackground(opacity) => {
                callback.push_opacity(*opacity, true)
            },
            PaintedEntryKind::PopOpacity => callback.pop_opacity(),
            PaintedEntryKind::PushTransform(transform) => {
                transform_depth += 1;
                callback.push_transform(transform);
            },
            PaintedEntryKind::PopTransform => {
                transform_depth -= 1;
                callback.pop_transform();
            },
        }
    }
}

/// Replay a layer of a nested tree, and everything below it.
fn replay_layer<C: PaintCallback + ?Sized>(
    retained: &RetainedLayers,
    layer: LayerId,
    callback: &mut C,
) {
    let Some(current) = retained.layers.layer(layer) else {
        return;
    };
    match &current.kind {
        LayerKind::Container(container) => {
            let opacity = container.opacity < 1.0;
            if opacity {
                callback.push_opacity(container.opacity, false);
            }
            if let Some(transform) = &container.transform {
                callback.push_transform(transform);
            }
            for child in &container.children {
                replay_layer(retained, *child, callback);
            }
            if container.transform.is_some() {
                callback.pop_transform();
            }
            if opacity {
                callback.pop_opacity();
            }
        },
        LayerKind::Painted(_) => replay_painted_layer(retained, layer, None, callback),
        LayerKind::Color { color, bounds } => callback.fill_rect(*color, bounds),
        LayerKind::Image { image, bounds } => callback.paint_image(*image, bounds),
        LayerKind::Mask(_) => {},
    }
}

#[cfg(test)]
mod tests {
    use servo_geometry::au_rect_from_px;

    use super::*;
    use crate::display_list::{DisplayItem, item_key};

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl PaintCallback for Recorder {
        fn paint_item(
            &mut self,
            key: DisplayItemKey,
            _bounds: &DeviceIntRect,
            _clip: Option<&DeviceIntRect>,
        ) {
            self.0.push(format!("item {}", key.per_frame_key));
        }

        fn push_opacity(&mut self, opacity: f32, _needs_background: bool) {
            self.0.push(format!("push opacity {}", opacity));
        }

        fn pop_opacity(&mut self) {
            self.0.push("pop opacity".into());
        }

        fn push_transform(&mut self, _transform: &LayoutTransform) {
            self.0.push("push transform".into());
        }

        fn pop_transform(&mut self) {
            self.0.push("pop transform".into());
        }
    }

    #[test]
    fn singular_root_transforms_are_rejected() {
        let mut builder = FrameLayerBuilder::new(Opts::default());
        let params = PaintParameters {
            transform: Some(LayoutTransform::scale(0.0, 1.0, 1.0)),
            ..PaintParameters::new(DeviceScale::default(), au_rect_from_px(0, 0, 100, 100))
        };
        let result = builder.build(
            &DisplayList::default(),
            &DisplayListTrees::default(),
            &params,
        );
        assert_eq!(result, Err(LayerBuildError::SingularTransform));
        assert_eq!(builder.root_layer(), None);
    }

    #[test]
    fn replay_culls_items_outside_the_region() {
        let mut builder = FrameLayerBuilder::new(Opts::default());
        let list = DisplayList::new(vec![
            DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 10, 10), 1),
            DisplayItem::painted(item_key(1, 2), au_rect_from_px(50, 50, 10, 10), 2),
        ]);
        let params =
            PaintParameters::new(DeviceScale::default(), au_rect_from_px(0, 0, 100, 100));
        let tree = builder
            .paint(&list, &DisplayListTrees::default(), &params)
            .expect("paint failed");
        let painted = tree
            .children(tree.root.expect("no root"))
            .map(|layer| layer.id)
            .next()
            .expect("no painted layer");

        let mut recorder = Recorder::default();
        let region = DeviceIntRegion::from_rect(&DeviceIntRect::new(
            euclid::Point2D::new(0, 0),
            euclid::Point2D::new(20, 20),
        ));
        builder.draw_painted_layer(painted, &region, &mut recorder);
        assert_eq!(recorder.0, vec!["item 1".to_owned()]);
        let valid = builder
            .layer(painted)
            .and_then(Layer::as_painted)
            .map(|content| content.valid_region.clone())
            .unwrap_or_default();
        assert!(valid.contains_rect(&region.bounds()));
    }
}
