/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use app_units::Au;
use euclid::{Box2D, Point2D};
use layer_builder::display_list::clip::{ClipChainId, DisplayItemClip, RoundedRect};
use layer_builder::display_list::roots::{AgrId, AsrId, ScrollFrameInfo};
use layer_builder::display_list::{
    DisplayItem, DisplayList, DisplayListTrees, HitTestFlags, item_key,
};
use layer_builder::{
    FrameLayerBuilder, LayerBuildError, LayerState, PaintCallback, PaintParameters,
};
use layer_traits::{
    Color, CompositorMsg, CompositorProxy, ContentFlags, DisplayItemKey, ImageKey, Layer,
    LayerId, LayerKind, LayerTree, ScrollId,
};
use servo_config::opts::Opts;
use servo_geometry::{
    DeviceIntRect, DeviceIntRegion, DeviceScale, LayoutTransform, au_rect_from_px,
};

const RED: Color = Color::rgba(255, 0, 0, 255);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn viewport() -> PaintParameters {
    PaintParameters::new(DeviceScale::default(), au_rect_from_px(0, 0, 800, 600))
}

fn device_rect(x: i32, y: i32, width: i32, height: i32) -> DeviceIntRect {
    Box2D::new(Point2D::new(x, y), Point2D::new(x + width, y + height))
}

fn paint(
    builder: &mut FrameLayerBuilder,
    list: &DisplayList,
    trees: &DisplayListTrees,
) -> LayerTree {
    builder.paint(list, trees, &viewport()).expect("paint failed")
}

fn child_kinds(tree: &LayerTree) -> Vec<&'static str> {
    let root = tree.root.expect("no root layer");
    tree.children(root).map(|layer| layer.kind_name()).collect()
}

fn child_ids(tree: &LayerTree) -> Vec<LayerId> {
    let root = tree.root.expect("no root layer");
    tree.children(root).map(|layer| layer.id).collect()
}

fn painted_layers(tree: &LayerTree) -> Vec<&Layer> {
    let root = tree.root.expect("no root layer");
    tree.children(root).filter(|layer| layer.is_painted()).collect()
}

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
fn items_above_an_active_layer_get_a_new_painted_layer() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 100, 100), 1),
        DisplayItem::solid_color(item_key(1, 2), au_rect_from_px(50, 50, 100, 100), RED)
            .with_layer_state(LayerState::Active),
        DisplayItem::painted(item_key(1, 3), au_rect_from_px(120, 120, 20, 20), 3),
    ]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());

    assert_eq!(child_kinds(&tree), vec!["Painted", "Color", "Painted"]);
    let root = tree.root.expect("no root layer");
    let ids: Vec<_> = tree.children(root).map(|layer| layer.id).collect();
    assert_ne!(ids[0], ids[2]);
}

#[test]
fn full_background_produces_one_opaque_painted_layer() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let background = au_rect_from_px(0, 0, 800, 600);
    let mut items =
        vec![DisplayItem::painted(item_key(1, 1), background, 1).with_opaque_rect(background)];
    for index in 0..10 {
        items.push(DisplayItem::painted(
            item_key(1, 2 + index as u32),
            au_rect_from_px(20 + index * 30, 20, 20, 20),
            index as u64,
        ));
    }
    let tree = paint(&mut builder, &DisplayList::new(items), &DisplayListTrees::default());

    let root = tree.root.expect("no root layer");
    let children: Vec<_> = tree.children(root).collect();
    assert_eq!(children.len(), 1);
    let painted = children[0];
    assert!(painted.content_flags.contains(ContentFlags::OPAQUE));
    let content = painted.as_painted().expect("not a painted layer");
    assert_eq!(content.items.len(), 11);
}

#[test]
fn opaque_active_layers_hide_what_is_below() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(10, 10, 50, 50), 1),
        DisplayItem::solid_color(item_key(1, 2), au_rect_from_px(0, 0, 100, 100), RED)
            .with_layer_state(LayerState::Active),
    ]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());

    let root = tree.root.expect("no root layer");
    let color = tree
        .children(root)
        .find(|layer| matches!(layer.kind, LayerKind::Color { .. }))
        .expect("no color layer");
    assert!(color.visible_region.contains_rect(&device_rect(0, 0, 100, 100)));
    assert!(color.content_flags.contains(ContentFlags::OPAQUE));
    assert!(
        tree.children(root)
            .filter(|layer| layer.is_painted())
            .all(|layer| layer.visible_region.is_empty())
    );
}

#[test]
fn solid_color_painted_layers_become_color_layers() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![DisplayItem::solid_color(
        item_key(1, 1),
        au_rect_from_px(10, 10, 30, 30),
        RED,
    )]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());

    let root = tree.root.expect("no root layer");
    let color = tree
        .children(root)
        .find_map(|layer| match layer.kind {
            LayerKind::Color { color, bounds } => Some((color, bounds)),
            _ => None,
        })
        .expect("no color layer");
    assert_eq!(color, (RED, device_rect(10, 10, 30, 30)));
    assert!(
        tree.children(root)
            .filter(|layer| layer.is_painted())
            .all(|layer| layer.visible_region.is_empty())
    );
}

#[test]
fn disabled_color_layers_keep_the_painted_layer() {
    init_logging();
    let mut opts = Opts::default();
    opts.debug.disable_color_layers = true;
    let mut builder = FrameLayerBuilder::new(opts);
    let list = DisplayList::new(vec![DisplayItem::solid_color(
        item_key(1, 1),
        au_rect_from_px(10, 10, 30, 30),
        RED,
    )]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());
    assert_eq!(child_kinds(&tree), vec!["Painted"]);
}

#[test]
fn different_scroll_frames_never_share_a_painted_layer() {
    init_logging();
    let mut trees = DisplayListTrees::default();
    let inner = trees
        .asrs
        .add(AsrId::ROOT, ScrollId(7), au_rect_from_px(0, 100, 200, 200));
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 50, 50), 1),
        DisplayItem::painted(item_key(1, 2), au_rect_from_px(0, 100, 50, 50), 2)
            .with_roots(AgrId::ROOT, inner),
    ]);
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let tree = paint(&mut builder, &list, &trees);

    let root = tree.root.expect("no root layer");
    let painted: Vec<_> = tree.children(root).filter(|layer| layer.is_painted()).collect();
    assert_eq!(painted.len(), 2);
    assert!(painted[0].scroll_metadata.is_empty());
    let scroll_ids: Vec<_> = painted[1]
        .scroll_metadata
        .iter()
        .map(|metadata| metadata.scroll_id)
        .collect();
    assert_eq!(scroll_ids, vec![ScrollId(7)]);
    assert_eq!(
        painted[1].scroll_metadata[0].composition_bounds,
        device_rect(0, 100, 200, 200)
    );
}

#[test]
fn rounded_scrolled_clips_get_one_ancestor_mask() {
    init_logging();
    let mut trees = DisplayListTrees::default();
    let scroll_port = au_rect_from_px(0, 0, 400, 400);
    let agr = trees.agrs.add(
        AgrId::ROOT,
        Some(ScrollFrameInfo {
            scroll_port,
            display_port: None,
        }),
    );
    let inner = trees
        .asrs
        .add_for_agr(AsrId::ROOT, ScrollId(3), scroll_port, agr);
    let clip = DisplayItemClip::from_rounded_rect(RoundedRect::new(
        au_rect_from_px(10, 10, 200, 200),
        Au::from_px(8),
    ));
    let clip_chain = trees.clip_chains.add(clip, inner, ClipChainId::NONE);
    let list = DisplayList::new(vec![
        DisplayItem::solid_color(item_key(1, 1), au_rect_from_px(20, 20, 100, 100), RED)
            .with_layer_state(LayerState::Active)
            .with_clip_chain(clip_chain),
    ]);
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let tree = paint(&mut builder, &list, &trees);

    let root = tree.root.expect("no root layer");
    let color = tree
        .children(root)
        .find(|layer| matches!(layer.kind, LayerKind::Color { .. }))
        .expect("no color layer");
    assert_eq!(color.ancestor_mask_layers.len(), 1);
    assert_eq!(color.mask_layer, None);
    let scrolled_clip = color.scrolled_clip.expect("no scrolled clip");
    assert_eq!(scrolled_clip.clip_rect, device_rect(10, 10, 200, 200));
    assert_eq!(scrolled_clip.mask_layer_index, Some(0));
    let mask = tree
        .layer(color.ancestor_mask_layers[0])
        .expect("mask layer was not committed");
    assert!(mask.is_mask());
}

#[test]
fn flattened_opacity_is_replayed_around_its_children() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![
        DisplayItem::opacity(
            item_key(1, 1),
            0.5,
            vec![
                DisplayItem::painted(item_key(1, 2), au_rect_from_px(0, 0, 10, 10), 2),
                DisplayItem::painted(item_key(1, 3), au_rect_from_px(20, 0, 10, 10), 3),
            ],
        )
        .with_layer_state(LayerState::Inactive),
    ]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());
    assert_eq!(child_kinds(&tree), vec!["Painted"]);

    let root = tree.root.expect("no root layer");
    let painted = tree.children(root).next().expect("no painted layer").id;
    let mut recorder = Recorder::default();
    let region = DeviceIntRegion::from_rect(&device_rect(0, 0, 800, 600));
    builder.draw_painted_layer(painted, &region, &mut recorder);
    assert_eq!(
        recorder.0,
        vec!["push opacity 0.5", "item 2", "item 3", "pop opacity"]
    );
}

#[test]
fn inactive_groups_are_replayed_from_their_nested_tree() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![DisplayItem::filter(
        item_key(1, 1),
        vec![
            DisplayItem::painted(item_key(1, 2), au_rect_from_px(0, 0, 10, 10), 2),
            DisplayItem::painted(item_key(1, 3), au_rect_from_px(20, 0, 10, 10), 3),
        ],
    )]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());
    assert_eq!(child_kinds(&tree), vec!["Painted"]);

    let root = tree.root.expect("no root layer");
    let painted = tree.children(root).next().expect("no painted layer").id;
    let mut recorder = Recorder::default();
    let region = DeviceIntRegion::from_rect(&device_rect(0, 0, 800, 600));
    builder.draw_painted_layer(painted, &region, &mut recorder);
    assert_eq!(recorder.0, vec!["item 2", "item 3"]);
}

#[test]
fn committed_trees_are_sent_to_the_compositor() {
    init_logging();
    let (sender, receiver) = crossbeam_channel::unbounded();
    let mut builder =
        FrameLayerBuilder::new(Opts::default()).with_compositor(CompositorProxy::new(sender));
    let list = DisplayList::new(vec![DisplayItem::painted(
        item_key(1, 1),
        au_rect_from_px(0, 0, 10, 10),
        1,
    )]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());

    match receiver.try_recv() {
        Ok(CompositorMsg::UpdateLayerTree(sent)) => {
            assert_eq!(sent.epoch, tree.epoch);
            assert_eq!(sent.root, tree.root);
            assert_eq!(sent.layers.len(), tree.layers.len());
        },
        other => panic!("Unexpected compositor message {:?}", other),
    }
    drop(builder);
    assert!(matches!(receiver.try_recv(), Ok(CompositorMsg::Exit)));
}

#[test]
fn translucent_own_layers_are_not_opaque() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![
        DisplayItem::solid_color(
            item_key(1, 1),
            au_rect_from_px(0, 0, 100, 100),
            Color::rgba(255, 0, 0, 128),
        )
        .with_layer_state(LayerState::Active),
    ]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());

    let root = tree.root.expect("no root layer");
    let color = tree
        .children(root)
        .find(|layer| matches!(layer.kind, LayerKind::Color { .. }))
        .expect("no color layer");
    assert!(!color.content_flags.contains(ContentFlags::OPAQUE));
}

#[test]
fn many_small_opaque_layers_only_hide_what_they_cover() {
    init_logging();
    let mut items = vec![DisplayItem::painted(
        item_key(1, 1),
        au_rect_from_px(0, 0, 400, 400),
        1,
    )];
    for index in 0..6 {
        items.push(
            DisplayItem::solid_color(
                item_key(1, 2 + index as u32),
                au_rect_from_px(60 * index, 60 * index, 20, 20),
                RED,
            )
            .with_layer_state(LayerState::Active),
        );
    }
    let opts = Opts::default();
    assert!(opts.opaque_region_max_rects < 6);
    let mut builder = FrameLayerBuilder::new(opts);
    let tree = paint(&mut builder, &DisplayList::new(items), &DisplayListTrees::default());

    let painted = painted_layers(&tree);
    assert_eq!(painted.len(), 1);
    let visible = &painted[0].visible_region;
    for index in 0..6 {
        let square = device_rect(60 * index, 60 * index, 20, 20);
        assert!(!visible.intersects_rect(&square), "{:?} covers {:?}", visible, square);
    }
    assert!(visible.contains_rect(&device_rect(80, 80, 40, 40)), "{:?}", visible);
    assert!(visible.contains_rect(&device_rect(20, 20, 40, 40)), "{:?}", visible);
}

#[test]
fn scrolled_clips_do_not_hide_what_is_below() {
    init_logging();
    let mut trees = DisplayListTrees::default();
    let inner = trees
        .asrs
        .add(AsrId::ROOT, ScrollId(5), au_rect_from_px(0, 0, 400, 400));
    let clip = DisplayItemClip::from_rect(au_rect_from_px(0, 0, 100, 100));
    let clip_chain = trees.clip_chains.add(clip, inner, ClipChainId::NONE);
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 400, 400), 1),
        DisplayItem::solid_color(item_key(1, 2), au_rect_from_px(0, 0, 100, 100), RED)
            .with_layer_state(LayerState::Active)
            .with_clip_chain(clip_chain),
    ]);
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let tree = paint(&mut builder, &list, &trees);

    let root = tree.root.expect("no root layer");
    let color = tree
        .children(root)
        .find(|layer| matches!(layer.kind, LayerKind::Color { .. }))
        .expect("no color layer");
    assert!(color.scrolled_clip.is_some());
    let painted = painted_layers(&tree);
    assert_eq!(painted.len(), 1);
    assert!(
        painted[0]
            .visible_region
            .contains_rect(&device_rect(0, 0, 400, 400)),
        "{}",
        tree.print()
    );
}

#[test]
fn active_items_without_a_layer_of_their_own_are_painted() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 100, 100), 1),
        DisplayItem::painted(item_key(1, 2), au_rect_from_px(50, 50, 100, 100), 2)
            .with_layer_state(LayerState::Active),
    ]);
    let tree = paint(&mut builder, &list, &DisplayListTrees::default());

    assert_eq!(child_kinds(&tree), vec!["Painted"]);
    let painted = painted_layers(&tree);
    let content = painted[0].as_painted().expect("not a painted layer");
    let keys: Vec<_> = content.items.iter().map(|item| item.key).collect();
    assert_eq!(keys, vec![item_key(1, 1), item_key(1, 2)]);
}

#[test]
fn items_with_unknown_roots_are_rejected() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 10, 10), 1)
            .with_roots(AgrId(42), AsrId::ROOT),
    ]);
    let result = builder.paint(&list, &DisplayListTrees::default(), &viewport());
    assert_eq!(result.err(), Some(LayerBuildError::UnknownRoot(item_key(1, 1))));

    let nested = DisplayList::new(vec![DisplayItem::opacity(
        item_key(1, 2),
        0.5,
        vec![
            DisplayItem::painted(item_key(1, 3), au_rect_from_px(0, 0, 10, 10), 3)
                .with_roots(AgrId::ROOT, AsrId(9)),
        ],
    )]);
    let result = builder.paint(&nested, &DisplayListTrees::default(), &viewport());
    assert_eq!(result.err(), Some(LayerBuildError::UnknownRoot(item_key(1, 3))));
}

#[test]
fn repainting_mixed_content_reuses_every_layer() {
    init_logging();
    let mut trees = DisplayListTrees::default();
    let inner = trees
        .asrs
        .add(AsrId::ROOT, ScrollId(4), au_rect_from_px(0, 300, 200, 200));
    let list = DisplayList::new(vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 800, 600), 1),
        DisplayItem::hit_test(
            item_key(1, 2),
            au_rect_from_px(0, 0, 50, 50),
            HitTestFlags::DISPATCH_TO_CONTENT,
        ),
        DisplayItem::opacity(
            item_key(1, 3),
            0.5,
            vec![DisplayItem::painted(item_key(1, 4), au_rect_from_px(10, 10, 20, 20), 4)],
        )
        .with_layer_state(LayerState::Inactive),
        DisplayItem::filter(
            item_key(1, 5),
            vec![DisplayItem::painted(item_key(1, 6), au_rect_from_px(40, 10, 20, 20), 6)],
        ),
        DisplayItem::transform(
            item_key(1, 7),
            LayoutTransform::translation(5.0, 0.0, 0.0),
            vec![DisplayItem::painted(item_key(1, 8), au_rect_from_px(100, 0, 30, 30), 8)],
        )
        .with_layer_state(LayerState::Active),
        DisplayItem::solid_color(item_key(1, 9), au_rect_from_px(200, 0, 50, 50), RED)
            .with_layer_state(LayerState::Active),
        DisplayItem::image(
            item_key(1, 10),
            au_rect_from_px(300, 0, 50, 50),
            ImageKey(1),
            false,
        )
        .with_layer_state(LayerState::Active),
        DisplayItem::painted(item_key(1, 11), au_rect_from_px(0, 300, 50, 50), 11)
            .with_roots(AgrId::ROOT, inner),
    ]);
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let first = paint(&mut builder, &list, &trees);
    let second = paint(&mut builder, &list, &trees);

    assert_eq!(child_kinds(&first), child_kinds(&second));
    assert_eq!(child_ids(&first), child_ids(&second));
    assert!(child_kinds(&second).contains(&"Container"));
    assert!(child_kinds(&second).contains(&"Image"));
    assert!(second.invalidations.is_empty(), "{:?}", second.invalidations);
}
