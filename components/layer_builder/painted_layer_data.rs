/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Accumulating display items into a candidate painted layer.

use std::borrow::Cow;

use layer_traits::{Color, EventRegions, ImageKey, LayerId};
use log::trace;
use servo_config::opts::Opts;
use servo_geometry::{
    AuRect, DeviceIntRect, DeviceIntRegion, DeviceScale, LayoutTransform, au_rect_contains,
    au_rect_intersection, au_rect_is_empty, transform_au_rect,
};
use smallvec::SmallVec;

use crate::display_list::clip::{ClipChainId, DisplayItemClip};
use crate::display_list::iterator::EntryType;
use crate::display_list::roots::{AgrId, AsrId};
use crate::display_list::{
    DisplayItem, DisplayItemContent, DisplayListTrees, HitTestFlags, HitTestInfo, ItemFlags,
};

/// An index into the transform nodes of the container being built.
pub(crate) type TransformNodeId = usize;

/// Whether two device rects share at least one pixel.
pub(crate) fn rects_intersect(a: &DeviceIntRect, b: &DeviceIntRect) -> bool {
    !a.is_empty() && !b.is_empty() && a.intersects(b)
}

pub(crate) fn intersect_rects(a: &DeviceIntRect, b: &DeviceIntRect) -> DeviceIntRect {
    a.intersection(b)
        .filter(|rect| !rect.is_empty())
        .unwrap_or(DeviceIntRect::zero())
}

/// The device pixel bounds of `rect` after `transform`.
pub(crate) fn transform_device_rect(
    transform: &LayoutTransform,
    rect: &DeviceIntRect,
    scale: &DeviceScale,
) -> DeviceIntRect {
    if rect.is_empty() {
        return DeviceIntRect::zero();
    }
    transform_au_rect(transform, &scale.to_app_units(rect))
        .map(|rect| scale.to_outside_pixels(&rect))
        .unwrap_or(DeviceIntRect::zero())
}

/// Whether `transform` maps rects to rects.
pub(crate) fn preserves_axis_alignment(transform: &LayoutTransform) -> bool {
    transform.is_2d() && transform.m12 == 0.0 && transform.m21 == 0.0
}

/// The facts about the container being layerized that item accumulation depends on.
#[derive(Clone, Copy)]
pub(crate) struct ContainerInfo<'a> {
    pub opts: &'a Opts,
    pub trees: &'a DisplayListTrees,
    pub scale: DeviceScale,
    pub agr: AgrId,
    pub asr: AsrId,
    /// The bounds of the container's content, in its app units.
    pub bounds: AuRect,
    /// The container is a nested tree drawn into a painted layer of an outer tree.
    pub in_inactive_layer: bool,
    pub in_active_transformed_subtree: bool,
    /// The container is the root of the layer tree.
    pub is_root: bool,
}

/// The opaque part of an item, and what it reveals about the layers below.
#[derive(Debug, Default)]
pub(crate) struct OpaqueArea {
    pub pixels: DeviceIntRegion,
    /// The item covers the whole container, so nothing beneath it can be seen.
    pub hide_all_layers_below: bool,
    /// The item covers the display port of its scroll frame.
    pub opaque_for_agr_parent: bool,
}

impl<'a> ContainerInfo<'a> {
    /// The area of `agr` kept rendered by the compositor, if `agr` is a scroll frame.
    fn display_port(&self, agr: AgrId) -> Option<AuRect> {
        let scroll_frame = self.trees.agrs.get(agr).scroll_frame?;
        Some(scroll_frame.display_port.unwrap_or(scroll_frame.scroll_port))
    }

    pub(crate) fn compute_opaque_rect(
        &self,
        item: &DisplayItem,
        agr: AgrId,
        asr: AsrId,
        clip: &DisplayItemClip,
        window_opaque_region: &mut DeviceIntRegion,
    ) -> OpaqueArea {
        let opaque = item.opaque_region();
        if opaque.is_empty() {
            return OpaqueArea::default();
        }
        let clipped: SmallVec<[AuRect; 1]> = opaque
            .iter()
            .map(|rect| clip.approximate_intersect_inward(rect))
            .filter(|rect| !au_rect_is_empty(rect))
            .collect();

        let mut area = OpaqueArea {
            pixels: self.scale.region_to_inside_pixels(&clipped),
            ..Default::default()
        };
        if agr == self.agr &&
            asr == self.asr &&
            clipped
                .iter()
                .any(|rect| au_rect_contains(rect, &self.bounds))
        {
            area.hide_all_layers_below = true;
        }
        if self.is_root {
            window_opaque_region.union(&area.pixels);
        }
        if self.in_inactive_layer {
            return area;
        }
        if let Some(display_port) = self.display_port(agr) {
            let display_port = self.scale.to_nearest_pixels(&display_port);
            if !display_port.is_empty() && area.pixels.contains_rect(&display_port) {
                area.opaque_for_agr_parent = true;
            }
        }
        area
    }

    /// Whether the window is opaque behind `rect`. Content documents are always drawn onto an
    /// opaque window.
    fn is_area_in_window_opaque_region(
        &self,
        rect: &DeviceIntRect,
        window_opaque_region: &DeviceIntRegion,
    ) -> bool {
        if !self.opts.is_chrome {
            return true;
        }
        self.is_root && window_opaque_region.contains_rect(rect)
    }
}

/// A display item, or effect marker, assigned to a painted layer.
#[derive(Clone, Debug)]
pub(crate) struct AssignedDisplayItem<'a> {
    pub item: Cow<'a, DisplayItem>,
    pub entry_type: EntryType,
    pub clip: DisplayItemClip,
    /// The innermost flattened transform the item is inside of.
    pub transform: Option<TransformNodeId>,
    /// The item is inside a flattened opacity group.
    pub has_opacity: bool,
}

impl<'a> AssignedDisplayItem<'a> {
    pub(crate) fn new(
        item: Cow<'a, DisplayItem>,
        entry_type: EntryType,
        clip: DisplayItemClip,
        transform: Option<TransformNodeId>,
    ) -> Self {
        Self {
            item,
            entry_type,
            clip,
            transform,
            has_opacity: false,
        }
    }
}

/// An image item that could replace the whole painted layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ImageCandidate {
    pub image: ImageKey,
    pub bounds: DeviceIntRect,
}

/// A painted layer under construction: the items assigned to it so far and what is known
/// about the pixels they cover.
#[derive(Debug)]
pub(crate) struct PaintedLayerData<'a> {
    pub agr: AgrId,
    pub asr: AsrId,
    /// The clips applied to the layer by the compositor.
    pub clip_chain: ClipChainId,
    pub backface_hidden: bool,
    /// Where the layer goes among the container's new children.
    pub new_child_layers_index: usize,
    pub layer: Option<LayerId>,
    pub visible_region: DeviceIntRegion,
    pub opaque_region: DeviceIntRegion,
    /// What layers above this one, in the same AGR, draw over it.
    pub visible_above_region: DeviceIntRegion,
    pub assigned_items: Vec<AssignedDisplayItem<'a>>,
    pub solid_color: Color,
    /// Every visible pixel has the color `solid_color`.
    pub is_solid_color_in_visible_region: bool,
    pub image: Option<ImageCandidate>,
    /// The clip of the last item accumulated.
    pub item_clip: Option<DisplayItemClip>,
    pub need_component_alpha: bool,
    pub force_transparent_surface: bool,
    pub hide_all_layers_below: bool,
    pub opaque_for_agr_parent: bool,
    pub disable_flattening: bool,
    pub event_regions: EventRegions,
    pub scaled_hit_region_bounds: DeviceIntRect,
    pub scaled_maybe_hit_region_bounds: DeviceIntRect,
    /// Touch action areas were folded into the dispatch-to-content region.
    pub collapsed_touch_actions: bool,
}

impl<'a> PaintedLayerData<'a> {
    pub(crate) fn new(
        agr: AgrId,
        asr: AsrId,
        clip_chain: ClipChainId,
        backface_hidden: bool,
        new_child_layers_index: usize,
    ) -> Self {
        Self {
            agr,
            asr,
            clip_chain,
            backface_hidden,
            new_child_layers_index,
            layer: None,
            visible_region: DeviceIntRegion::new(),
            opaque_region: DeviceIntRegion::new(),
            visible_above_region: DeviceIntRegion::new(),
            assigned_items: Vec::new(),
            solid_color: Color::TRANSPARENT,
            is_solid_color_in_visible_region: false,
            image: None,
            item_clip: None,
            need_component_alpha: false,
            force_transparent_surface: false,
            hide_all_layers_below: false,
            opaque_for_agr_parent: false,
            disable_flattening: false,
            event_regions: EventRegions::default(),
            scaled_hit_region_bounds: DeviceIntRect::zero(),
            scaled_maybe_hit_region_bounds: DeviceIntRect::zero(),
            collapsed_touch_actions: false,
        }
    }

    /// Whether the opaque region covers everything visible.
    pub(crate) fn is_opaque_region_covering(&self) -> bool {
        let mut uncovered = self.visible_region.clone();
        uncovered.subtract(&self.opaque_region);
        uncovered.is_empty()
    }

    fn update_effect_status(&mut self, entry_type: EntryType, opacity_indices: &mut Vec<usize>) {
        match entry_type {
            EntryType::PushOpacity | EntryType::PushOpacityWithBackground => {
                opacity_indices.push(self.assigned_items.len())
            },
            EntryType::PopOpacity => {
                if opacity_indices.pop().is_none() {
                    debug_panic!("Opacity group closed without being opened");
                }
            },
            _ => {},
        }
    }

    /// Add an item to the layer. `visible_rect` is the part of the item that is visible, in
    /// device pixels.
    pub(crate) fn accumulate(
        &mut self,
        info: &ContainerInfo,
        window_opaque_region: &mut DeviceIntRegion,
        mut assigned: AssignedDisplayItem<'a>,
        visible_rect: DeviceIntRect,
        opacity_indices: &mut Vec<usize>,
    ) {
        assigned.has_opacity = !opacity_indices.is_empty();
        let clip_matches = self.item_clip.as_ref() == Some(&assigned.clip);
        self.item_clip = Some(assigned.clip.clone());
        self.update_effect_status(assigned.entry_type, opacity_indices);

        if assigned.entry_type.is_effect_end() {
            self.assigned_items.push(assigned);
            return;
        }

        let has_component_alpha = assigned
            .item
            .component_alpha_bounds
            .is_some_and(|bounds| !au_rect_is_empty(&bounds));
        self.accumulate_content(
            info,
            window_opaque_region,
            &assigned,
            visible_rect,
            clip_matches,
        );
        self.assigned_items.push(assigned);

        if has_component_alpha {
            // Groups around subpixel text need an opaque background to draw it into.
            for &index in opacity_indices.iter() {
                if let Some(entry) = self.assigned_items.get_mut(index) {
                    entry.entry_type = EntryType::PushOpacityWithBackground;
                }
            }
        }
    }

    fn accumulate_content(
        &mut self,
        info: &ContainerInfo,
        window_opaque_region: &mut DeviceIntRegion,
        assigned: &AssignedDisplayItem,
        visible_rect: DeviceIntRect,
        clip_matches: bool,
    ) {
        let item = &*assigned.item;
        if item.flags.contains(ItemFlags::FORCE_TRANSPARENT_SURFACE) {
            self.force_transparent_surface = true;
        }

        // Opaque and visible areas of transformed items are not tracked.
        if assigned.transform.is_some() && assigned.entry_type == EntryType::Item {
            return;
        }

        if !self.is_solid_color_in_visible_region &&
            self.opaque_region.contains_rect(&visible_rect) &&
            self.visible_region.contains_rect(&visible_rect) &&
            self.image.is_none()
        {
            // The item is hidden behind content already in the layer.
            return;
        }

        let opaque_pixels = if assigned.has_opacity {
            DeviceIntRegion::new()
        } else {
            let area = info.compute_opaque_rect(
                item,
                self.agr,
                self.asr,
                &assigned.clip,
                window_opaque_region,
            );
            self.hide_all_layers_below |= area.hide_all_layers_below;
            self.opaque_for_agr_parent |= area.opaque_for_agr_parent;
            let mut pixels = area.pixels;
            pixels.intersect_rect(&visible_rect);
            pixels
        };

        let visible_bounds = self.visible_region.bounds();
        let rect_covers_visible = self.visible_region.is_empty() ||
            visible_rect
                .intersection(&visible_bounds)
                .is_some_and(|rect| rect == visible_bounds);
        self.image = match item.content {
            DisplayItemContent::Image { image, .. }
                if rect_covers_visible && opaque_pixels.contains_region(&self.visible_region) =>
            {
                Some(ImageCandidate {
                    image,
                    bounds: info.scale.to_nearest_pixels(&item.bounds),
                })
            },
            _ => None,
        };

        let is_first = self.visible_region.is_empty();
        let mut uniform = if assigned.has_opacity {
            None
        } else {
            item.is_uniform()
        };
        if uniform.is_none_or(|color| color.a > 0) {
            if uniform.is_some() &&
                !info
                    .scale
                    .to_inside_pixels(&item.bounds)
                    .contains_box(&visible_rect)
            {
                // The edges are not pixel aligned, so the item is not truly uniform.
                uniform = None;
            }
            match uniform {
                Some(color) if is_first => {
                    self.solid_color = color;
                    self.is_solid_color_in_visible_region = true;
                },
                Some(color)
                    if self.is_solid_color_in_visible_region &&
                        self.visible_region.is_equal_to_rect(&visible_rect) &&
                        clip_matches =>
                {
                    self.solid_color = self.solid_color.compose(color);
                },
                _ => self.is_solid_color_in_visible_region = false,
            }
            self.visible_region.union_rect(&visible_rect);
            self.visible_region
                .simplify_outward(info.opts.visible_region_max_rects);
        }

        for rect in opaque_pixels.rects() {
            let mut combined = self.opaque_region.clone();
            combined.union_rect(rect);
            if combined.num_rects() <= info.opts.opaque_region_max_rects || info.opts.is_chrome {
                self.opaque_region = combined;
            }
        }

        let component_alpha_bounds = item
            .component_alpha_bounds
            .filter(|bounds| !au_rect_is_empty(bounds));
        if let Some(bounds) = component_alpha_bounds {
            let component_alpha_rect =
                intersect_rects(&info.scale.to_outside_pixels(&bounds), &visible_rect);
            if !self.opaque_region.contains_rect(&component_alpha_rect) {
                let building_area = info.scale.to_outside_pixels(&au_rect_intersection(
                    &bounds,
                    &item.building_rect,
                ));
                if info.is_area_in_window_opaque_region(&building_area, window_opaque_region) {
                    self.need_component_alpha = true;
                } else {
                    trace!("Disabling subpixel text of {}", item.key);
                }
            }
        }
        if info.in_active_transformed_subtree &&
            (self.need_component_alpha || component_alpha_bounds.is_some())
        {
            self.disable_flattening = true;
        }
    }

    /// Add a hit test area, already clipped and in the container's app units, to the event
    /// regions.
    pub(crate) fn accumulate_hit_test_info(
        &mut self,
        info: &ContainerInfo,
        hit_test: &HitTestInfo,
        area: &AuRect,
        clip: &DisplayItemClip,
    ) {
        let rect = info.scale.to_outside_pixels(area);
        if rect.is_empty() {
            return;
        }
        let regions = &mut self.event_regions;
        if clip.rounded_rect_count() > 0 || hit_test.irregular_shape {
            regions.maybe_hit_region.union_rect(&rect);
        } else {
            regions.hit_region.union_rect(&rect);
        }

        let flags = hit_test.flags;
        if flags.contains(HitTestFlags::DISPATCH_TO_CONTENT) {
            regions.dispatch_to_content_region.union_rect(&rect);
        }
        if flags.contains(HitTestFlags::REQUIRES_TARGET_CONFIRMATION) {
            regions.dispatch_to_content_requires_target_confirmation = true;
        }

        let touch = flags & HitTestFlags::TOUCH_ACTION_MASK;
        if !touch.is_empty() {
            if self.collapsed_touch_actions {
                regions.dispatch_to_content_region.union_rect(&rect);
            } else if touch == HitTestFlags::TOUCH_ACTION_MASK {
                regions.no_action_region.union_rect(&rect);
            } else if touch != HitTestFlags::TOUCH_ACTION_DOUBLE_TAP_ZOOM_DISABLED {
                if !touch.contains(HitTestFlags::TOUCH_ACTION_PAN_X_DISABLED) {
                    regions.horizontal_pan_region.union_rect(&rect);
                }
                if !touch.contains(HitTestFlags::TOUCH_ACTION_PAN_Y_DISABLED) {
                    regions.vertical_pan_region.union_rect(&rect);
                }
            }
        }

        if !self.collapsed_touch_actions {
            // Overlapping touch-action areas of unrelated elements cannot be combined, so the
            // content thread has to decide.
            let touch_rects = regions.no_action_region.num_rects() +
                regions.horizontal_pan_region.num_rects() +
                regions.vertical_pan_region.num_rects();
            if touch_rects > 1 {
                let combined = combined_touch_action_region(regions);
                regions.dispatch_to_content_region.union(&combined);
                regions.no_action_region.set_empty();
                regions.horizontal_pan_region.set_empty();
                regions.vertical_pan_region.set_empty();
                self.collapsed_touch_actions = true;
            }
        }

        let max_rects = info.opts.hit_region_max_rects;
        regions.maybe_hit_region.simplify_outward(max_rects);
        regions.dispatch_to_content_region.simplify_outward(max_rects);
        self.scaled_hit_region_bounds = regions.hit_region.bounds();
        self.scaled_maybe_hit_region_bounds = regions.maybe_hit_region.bounds();
    }

    /// The color of the topmost item covering all of `rect`, if that item is opaque and
    /// uniform. `None` means no item of the layer intersects `rect`.
    pub(crate) fn opaque_background_color_in_layer(
        &self,
        rect: &DeviceIntRect,
        scale: &DeviceScale,
    ) -> Option<Color> {
        let app_unit_rect = scale.to_app_units(rect);
        for assigned in self.assigned_items.iter().rev() {
            // The background of content in flattened effects is not known.
            if assigned.has_opacity || assigned.transform.is_some() {
                continue;
            }
            if assigned.entry_type.is_effect_end() {
                continue;
            }
            let item = &*assigned.item;
            if au_rect_is_empty(&au_rect_intersection(&item.bounds, &app_unit_rect)) {
                continue;
            }
            if !au_rect_contains(&item.bounds, &app_unit_rect) ||
                assigned.clip.is_rect_affected_by_clip(&app_unit_rect)
            {
                return Some(Color::TRANSPARENT);
            }
            return Some(
                item.is_uniform()
                    .filter(|color| color.is_opaque())
                    .unwrap_or(Color::TRANSPARENT),
            );
        }
        None
    }
}

/// The union of the touch-action regions.
fn combined_touch_action_region(regions: &EventRegions) -> DeviceIntRegion {
    let mut combined = regions.no_action_region.clone();
    combined.union(&regions.horizontal_pan_region);
    combined.union(&regions.vertical_pan_region);
    combined
}

/// Add `source` to `target`. Touch-action areas added to a layer that already has some are
/// also sent to the content thread.
pub(crate) fn merge_event_regions(
    target: &mut EventRegions,
    source: &EventRegions,
    max_rects: usize,
) {
    let already_had_touch_regions = !combined_touch_action_region(target).is_empty();
    target.hit_region.union(&source.hit_region);
    target.maybe_hit_region.union(&source.maybe_hit_region);
    target
        .dispatch_to_content_region
        .union(&source.dispatch_to_content_region);
    target.no_action_region.union(&source.no_action_region);
    target
        .horizontal_pan_region
        .union(&source.horizontal_pan_region);
    target.vertical_pan_region.union(&source.vertical_pan_region);
    target.dispatch_to_content_requires_target_confirmation |=
        source.dispatch_to_content_requires_target_confirmation;
    if already_had_touch_regions {
        let combined = combined_touch_action_region(target);
        target.dispatch_to_content_region.union(&combined);
    }
    target.maybe_hit_region.simplify_outward(max_rects);
    target.dispatch_to_content_region.simplify_outward(max_rects);
}

/// Where the event regions of a nested tree end up in the painted layer that draws it.
#[derive(Clone, Debug, Default)]
pub(crate) struct HoistPlacement {
    pub clip: Option<DeviceIntRect>,
    pub clip_is_rounded: bool,
    /// From the nested container's space to the painted layer's space.
    pub transform: Option<LayoutTransform>,
}

impl HoistPlacement {
    fn place(&self, region: &DeviceIntRegion, scale: &DeviceScale) -> DeviceIntRegion {
        let mut bounds = region.bounds();
        if let Some(transform) = &self.transform {
            bounds = transform_device_rect(transform, &bounds, scale);
        }
        if let Some(clip) = &self.clip {
            bounds = intersect_rects(&bounds, clip);
        }
        DeviceIntRegion::from_rect(&bounds)
    }

    fn is_precise(&self) -> bool {
        !self.clip_is_rounded &&
            self.transform
                .as_ref()
                .is_none_or(preserves_axis_alignment)
    }

    /// The event regions of a nested painted layer, approximated in the containing painted
    /// layer's space.
    pub(crate) fn hoist(&self, source: &EventRegions, scale: &DeviceScale) -> EventRegions {
        let mut hoisted = EventRegions {
            maybe_hit_region: self.place(&source.maybe_hit_region, scale),
            dispatch_to_content_region: self.place(&source.dispatch_to_content_region, scale),
            dispatch_to_content_requires_target_confirmation: source
                .dispatch_to_content_requires_target_confirmation,
            ..Default::default()
        };
        let hit = self.place(&source.hit_region, scale);
        if self.is_precise() {
            hoisted.hit_region = hit;
            hoisted.no_action_region = self.place(&source.no_action_region, scale);
            hoisted.horizontal_pan_region = self.place(&source.horizontal_pan_region, scale);
            hoisted.vertical_pan_region = self.place(&source.vertical_pan_region, scale);
        } else {
            hoisted.maybe_hit_region.union(&hit);
            let touch = self.place(&combined_touch_action_region(source), scale);
            hoisted.dispatch_to_content_region.union(&touch);
        }
        hoisted
    }
}

#[cfg(test)]
mod tests {
    use euclid::{Box2D, Point2D};
    use servo_geometry::au_rect_from_px;

    use super::*;
    use crate::display_list::item_key;

    fn device_rect(x: i32, y: i32, width: i32, height: i32) -> DeviceIntRect {
        Box2D::new(Point2D::new(x, y), Point2D::new(x + width, y + height))
    }

    struct Fixture {
        opts: Opts,
        trees: DisplayListTrees,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                opts: Opts::default(),
                trees: DisplayListTrees::default(),
            }
        }

        fn info(&self) -> ContainerInfo<'_> {
            ContainerInfo {
                opts: &self.opts,
                trees: &self.trees,
                scale: DeviceScale::default(),
                agr: AgrId::ROOT,
                asr: AsrId::ROOT,
                bounds: au_rect_from_px(0, 0, 800, 600),
                in_inactive_layer: false,
                in_active_transformed_subtree: false,
                is_root: true,
            }
        }
    }

    fn add(
        data: &mut PaintedLayerData<'static>,
        info: &ContainerInfo,
        item: DisplayItem,
        opacity_indices: &mut Vec<usize>,
    ) {
        let visible = info.scale.to_outside_pixels(&item.bounds);
        let assigned = AssignedDisplayItem::new(
            Cow::Owned(item),
            EntryType::Item,
            DisplayItemClip::no_clip(),
            None,
        );
        data.accumulate(
            info,
            &mut DeviceIntRegion::new(),
            assigned,
            visible,
            opacity_indices,
        );
    }

    #[test]
    fn identical_colors_stay_solid() {
        let fixture = Fixture::new();
        let info = fixture.info();
        let mut data = PaintedLayerData::new(AgrId::ROOT, AsrId::ROOT, ClipChainId::NONE, false, 0);
        let bounds = au_rect_from_px(0, 0, 100, 100);
        add(
            &mut data,
            &info,
            DisplayItem::solid_color(item_key(1, 1), bounds, Color::WHITE),
            &mut Vec::new(),
        );
        assert!(data.is_solid_color_in_visible_region);
        assert_eq!(data.solid_color, Color::WHITE);
        assert!(data.is_opaque_region_covering());

        add(
            &mut data,
            &info,
            DisplayItem::solid_color(item_key(1, 2), au_rect_from_px(0, 0, 50, 50), Color::BLACK),
            &mut Vec::new(),
        );
        assert!(!data.is_solid_color_in_visible_region);
    }

    #[test]
    fn first_image_is_a_candidate_until_something_else_is_drawn() {
        let fixture = Fixture::new();
        let info = fixture.info();
        let mut data = PaintedLayerData::new(AgrId::ROOT, AsrId::ROOT, ClipChainId::NONE, false, 0);
        add(
            &mut data,
            &info,
            DisplayItem::image(item_key(1, 1), au_rect_from_px(0, 0, 40, 40), ImageKey(3), true),
            &mut Vec::new(),
        );
        assert_eq!(data.image.map(|image| image.image), Some(ImageKey(3)));

        add(
            &mut data,
            &info,
            DisplayItem::painted(item_key(1, 2), au_rect_from_px(30, 30, 40, 40), 1),
            &mut Vec::new(),
        );
        assert_eq!(data.image, None);
    }

    #[test]
    fn opaque_region_respects_rect_budget() {
        let fixture = Fixture::new();
        let info = fixture.info();
        let mut data = PaintedLayerData::new(AgrId::ROOT, AsrId::ROOT, ClipChainId::NONE, false, 0);
        for n in 0..8 {
            add(
                &mut data,
                &info,
                DisplayItem::solid_color(
                    item_key(1, n),
                    au_rect_from_px(n as i32 * 20, n as i32 * 20, 10, 10),
                    Color::BLACK,
                ),
                &mut Vec::new(),
            );
        }
        assert!(data.opaque_region.num_rects() <= fixture.opts.opaque_region_max_rects);
        assert!(data.visible_region.num_rects() <= fixture.opts.visible_region_max_rects);
    }

    #[test]
    fn component_alpha_inside_opacity_needs_background() {
        let fixture = Fixture::new();
        let info = fixture.info();
        let mut data = PaintedLayerData::new(AgrId::ROOT, AsrId::ROOT, ClipChainId::NONE, false, 0);
        let mut opacity_indices = Vec::new();
        let group = DisplayItem::opacity(item_key(1, 1), 0.5, vec![]);
        data.accumulate(
            &info,
            &mut DeviceIntRegion::new(),
            AssignedDisplayItem::new(
                Cow::Owned(group),
                EntryType::PushOpacity,
                DisplayItemClip::no_clip(),
                None,
            ),
            device_rect(0, 0, 50, 50),
            &mut opacity_indices,
        );
        assert_eq!(opacity_indices, vec![0]);

        let text = DisplayItem::painted(item_key(1, 2), au_rect_from_px(0, 0, 50, 20), 9)
            .with_component_alpha_bounds(au_rect_from_px(0, 0, 50, 20));
        add(&mut data, &info, text, &mut opacity_indices);
        assert_eq!(
            data.assigned_items[0].entry_type,
            EntryType::PushOpacityWithBackground
        );
        assert!(data.need_component_alpha);
        assert!(data.assigned_items[1].has_opacity);
    }

    #[test]
    fn many_touch_action_areas_collapse_into_dispatch_to_content() {
        let fixture = Fixture::new();
        let info = fixture.info();
        let mut data = PaintedLayerData::new(AgrId::ROOT, AsrId::ROOT, ClipChainId::NONE, false, 0);
        let hit = |flags| HitTestInfo {
            area: AuRect::zero(),
            flags,
            irregular_shape: false,
        };
        let clip = DisplayItemClip::no_clip();
        data.accumulate_hit_test_info(
            &info,
            &hit(HitTestFlags::TOUCH_ACTION_PAN_X_DISABLED),
            &au_rect_from_px(0, 0, 10, 10),
            &clip,
        );
        assert!(!data.event_regions.vertical_pan_region.is_empty());
        assert!(data.event_regions.horizontal_pan_region.is_empty());

        data.accumulate_hit_test_info(
            &info,
            &hit(HitTestFlags::TOUCH_ACTION_MASK),
            &au_rect_from_px(50, 50, 10, 10),
            &clip,
        );
        assert!(data.collapsed_touch_actions);
        assert!(data.event_regions.no_action_region.is_empty());
        assert!(data
            .event_regions
            .dispatch_to_content_region
            .contains_rect(&device_rect(50, 50, 10, 10)));
        assert_eq!(data.scaled_hit_region_bounds, device_rect(0, 0, 60, 60));
    }

    #[test]
    fn background_color_comes_from_covering_uniform_item() {
        let fixture = Fixture::new();
        let info = fixture.info();
        let mut data = PaintedLayerData::new(AgrId::ROOT, AsrId::ROOT, ClipChainId::NONE, false, 0);
        add(
            &mut data,
            &info,
            DisplayItem::solid_color(item_key(1, 1), au_rect_from_px(0, 0, 100, 100), Color::WHITE),
            &mut Vec::new(),
        );
        let scale = DeviceScale::default();
        assert_eq!(
            data.opaque_background_color_in_layer(&device_rect(10, 10, 10, 10), &scale),
            Some(Color::WHITE)
        );
        assert_eq!(
            data.opaque_background_color_in_layer(&device_rect(90, 90, 20, 20), &scale),
            Some(Color::TRANSPARENT)
        );
        assert_eq!(
            data.opaque_background_color_in_layer(&device_rect(200, 200, 10, 10), &scale),
            None
        );
    }

    #[test]
    fn rounded_clip_hoists_hits_as_maybe_hits() {
        let source = EventRegions {
            hit_region: DeviceIntRegion::from_rect(&device_rect(0, 0, 20, 20)),
            ..Default::default()
        };
        let placement = HoistPlacement {
            clip: Some(device_rect(5, 5, 100, 100)),
            clip_is_rounded: true,
            transform: None,
        };
        let hoisted = placement.hoist(&source, &DeviceScale::default());
        assert!(hoisted.hit_region.is_empty());
        assert!(hoisted
            .maybe_hit_region
            .is_equal_to_rect(&device_rect(5, 5, 15, 15)));
    }
}
