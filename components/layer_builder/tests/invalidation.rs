/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::{Box2D, Point2D};
use layer_builder::display_list::{
    DisplayItem, DisplayList, DisplayListTrees, ItemInvalidation, item_key,
};
use layer_builder::{FrameLayerBuilder, PaintParameters};
use layer_traits::{Color, FrameId, LayerId, LayerTree};
use servo_config::opts::Opts;
use servo_geometry::{DeviceIntRect, DeviceScale, au_rect_from_px};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn device_rect(x: i32, y: i32, width: i32, height: i32) -> DeviceIntRect {
    Box2D::new(Point2D::new(x, y), Point2D::new(x + width, y + height))
}

fn paint(builder: &mut FrameLayerBuilder, items: Vec<DisplayItem>) -> LayerTree {
    let params = PaintParameters::new(DeviceScale::default(), au_rect_from_px(0, 0, 800, 600));
    builder
        .paint(&DisplayList::new(items), &DisplayListTrees::default(), &params)
        .expect("paint failed")
}

fn only_painted_layer(tree: &LayerTree) -> LayerId {
    let root = tree.root.expect("no root layer");
    let painted: Vec<_> = tree
        .children(root)
        .filter(|layer| layer.is_painted())
        .map(|layer| layer.id)
        .collect();
    assert_eq!(painted.len(), 1, "{}", tree.print());
    painted[0]
}

fn two_items() -> Vec<DisplayItem> {
    vec![
        DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 100, 100), 1),
        DisplayItem::painted(item_key(1, 2), au_rect_from_px(200, 0, 50, 50), 2),
    ]
}

#[test]
fn first_paint_invalidates_every_item() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let tree = paint(&mut builder, two_items());
    let painted = only_painted_layer(&tree);
    let invalid = tree.invalidation_for(painted).expect("nothing invalidated");
    assert!(invalid.contains_rect(&device_rect(0, 0, 100, 100)));
    assert!(invalid.contains_rect(&device_rect(200, 0, 50, 50)));
}

#[test]
fn repainting_the_same_list_invalidates_nothing() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    let first = paint(&mut builder, two_items());
    let second = paint(&mut builder, two_items());

    assert_eq!(only_painted_layer(&first), only_painted_layer(&second));
    assert!(second.invalidations.is_empty(), "{:?}", second.invalidations);
    assert!(second.epoch > first.epoch);
}

#[test]
fn moving_a_solid_color_invalidates_the_uncovered_and_newly_covered_strips() {
    init_logging();
    let red = Color::rgba(255, 0, 0, 255);
    let list = |x| {
        vec![
            DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 10, 10), 1),
            DisplayItem::solid_color(item_key(1, 2), au_rect_from_px(x, 0, 10, 10), red),
        ]
    };
    let mut builder = FrameLayerBuilder::new(Opts::default());
    paint(&mut builder, list(20));
    let tree = paint(&mut builder, list(21));

    let painted = only_painted_layer(&tree);
    let invalid = tree.invalidation_for(painted).expect("nothing invalidated");
    assert_eq!(invalid.area(), 20);
    assert!(invalid.contains_rect(&device_rect(20, 0, 1, 10)));
    assert!(invalid.contains_rect(&device_rect(30, 0, 1, 10)));
}

#[test]
fn explicit_invalidation_rects_are_repainted() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    paint(&mut builder, two_items());
    let mut items = two_items();
    items[0] = items[0]
        .clone()
        .with_invalidation(ItemInvalidation::Rect(au_rect_from_px(10, 10, 5, 5)));
    let tree = paint(&mut builder, items);

    let painted = only_painted_layer(&tree);
    let invalid = tree.invalidation_for(painted).expect("nothing invalidated");
    assert!(invalid.is_equal_to_rect(&device_rect(10, 10, 5, 5)));
}

#[test]
fn changed_content_repaints_the_whole_item() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    paint(&mut builder, two_items());
    let mut items = two_items();
    items[1] = DisplayItem::painted(item_key(1, 2), au_rect_from_px(200, 0, 50, 50), 99);
    let tree = paint(&mut builder, items);

    let painted = only_painted_layer(&tree);
    let invalid = tree.invalidation_for(painted).expect("nothing invalidated");
    assert!(invalid.is_equal_to_rect(&device_rect(200, 0, 50, 50)));
}

#[test]
fn removed_items_invalidate_where_they_were() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    paint(&mut builder, two_items());
    let mut items = two_items();
    items.truncate(1);
    let tree = paint(&mut builder, items);

    let painted = only_painted_layer(&tree);
    let invalid = tree.invalidation_for(painted).expect("nothing invalidated");
    assert!(invalid.is_equal_to_rect(&device_rect(200, 0, 50, 50)));
}

#[test]
fn removed_frames_are_repainted_when_their_layer_is_reused() {
    init_logging();
    let mut builder = FrameLayerBuilder::new(Opts::default());
    paint(
        &mut builder,
        vec![
            DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 100, 100), 1),
            DisplayItem::painted(item_key(2, 1), au_rect_from_px(200, 0, 50, 50), 2),
        ],
    );
    builder.remove_frame(FrameId(2));
    let tree = paint(
        &mut builder,
        vec![DisplayItem::painted(item_key(1, 1), au_rect_from_px(0, 0, 100, 100), 1)],
    );

    let painted = only_painted_layer(&tree);
    let invalid = tree.invalidation_for(painted).expect("nothing invalidated");
    assert!(invalid.is_equal_to_rect(&device_rect(200, 0, 50, 50)));
}

#[test]
fn disabled_recycling_creates_new_painted_layers() {
    init_logging();
    let mut opts = Opts::default();
    opts.debug.disable_layer_recycling = true;
    let mut builder = FrameLayerBuilder::new(opts);
    let first = paint(&mut builder, two_items());
    let second = paint(&mut builder, two_items());

    let old = only_painted_layer(&first);
    assert_ne!(old, only_painted_layer(&second));
    assert!(second.layer(old).is_none());
}
