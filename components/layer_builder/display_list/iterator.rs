/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Walking a display list in paint order while flattening effects into their parent list.

use std::borrow::Cow;
use std::collections::VecDeque;

use strum::IntoStaticStr;

use super::{DisplayItem, DisplayItemContent, DisplayList};
use crate::layer_state::LayerState;

/// What an entry produced by [`FlattenedDisplayList`] stands for.
#[derive(Clone, Copy, Debug, Eq, IntoStaticStr, PartialEq)]
pub enum EntryType {
    Item,
    PushOpacity,
    /// An opacity group with subpixel antialiased text, which must be drawn onto an opaque
    /// background.
    PushOpacityWithBackground,
    PopOpacity,
    PushTransform,
    PopTransform,
}

impl EntryType {
    pub fn is_effect_start(self) -> bool {
        matches!(
            self,
            EntryType::PushOpacity | EntryType::PushOpacityWithBackground | EntryType::PushTransform
        )
    }

    pub fn is_effect_end(self) -> bool {
        matches!(self, EntryType::PopOpacity | EntryType::PopTransform)
    }
}

/// An item, or a marker for the start or end of a flattened effect. Markers carry the
/// effect's item.
#[derive(Clone, Debug)]
pub struct DisplayItemEntry<'a> {
    pub item: Cow<'a, DisplayItem>,
    pub entry_type: EntryType,
}

struct ListFrame<'a> {
    items: &'a [DisplayItem],
    next: usize,
    /// The item this list was flattened out of, and whether a start marker was emitted for it.
    container: Option<(&'a DisplayItem, bool)>,
}

/// Produces the entries of a display list in paint order.
///
/// Wrapper items are replaced by their children. Opacity and transform items that would be
/// drawn into a painted layer anyway are replaced by their children surrounded by start and
/// end markers, so their children can be layerized with their neighbours. Consecutive
/// mergeable items are combined into one.
pub struct FlattenedDisplayList<'a> {
    stack: Vec<ListFrame<'a>>,
    markers: VecDeque<DisplayItemEntry<'a>>,
    in_inactive_layer: bool,
    force_active_layers: bool,
}

impl<'a> FlattenedDisplayList<'a> {
    pub fn new(list: &'a DisplayList, in_inactive_layer: bool, force_active_layers: bool) -> Self {
        let mut iterator = Self {
            stack: vec![ListFrame {
                items: &list.items,
                next: 0,
                container: None,
            }],
            markers: VecDeque::new(),
            in_inactive_layer,
            force_active_layers,
        };
        iterator.resolve_flattening();
        iterator
    }

    fn should_flatten(&self, item: &DisplayItem) -> bool {
        match item.content {
            DisplayItemContent::Wrapper(_) => true,
            DisplayItemContent::Opacity { .. } | DisplayItemContent::Transform { .. } => {
                !self.in_inactive_layer &&
                    item.layer_state.resolve(self.force_active_layers) == LayerState::Inactive
            },
            _ => false,
        }
    }

    fn start_marker(item: &DisplayItem) -> Option<EntryType> {
        match item.content {
            DisplayItemContent::Opacity { .. } => Some(EntryType::PushOpacity),
            DisplayItemContent::Transform { .. } => Some(EntryType::PushTransform),
            _ => None,
        }
    }

    fn end_marker(item: &DisplayItem) -> Option<EntryType> {
        match item.content {
            DisplayItemContent::Opacity { .. } => Some(EntryType::PopOpacity),
            DisplayItemContent::Transform { .. } => Some(EntryType::PopTransform),
            _ => None,
        }
    }

    /// Enter and leave nested lists until the next item to return is one that is not
    /// flattened, or the whole list is done.
    fn resolve_flattening(&mut self) {
        loop {
            let Some(frame) = self.stack.last() else {
                return;
            };
            if frame.next >= frame.items.len() {
                if self.stack.len() == 1 {
                    return;
                }
                let Some(frame) = self.stack.pop() else {
                    return;
                };
                if let Some((container, true)) = frame.container {
                    if let Some(entry_type) = Self::end_marker(container) {
                        self.markers.push_back(DisplayItemEntry {
                            item: Cow::Borrowed(container),
                            entry_type,
                        });
                    }
                }
                continue;
            }

            let items = frame.items;
            let container = &items[frame.next];
            if !self.should_flatten(container) {
                return;
            }
            let Some(children) = container.children() else {
                return;
            };

            if let Some(frame) = self.stack.last_mut() {
                frame.next += 1;
            }
            let start = Self::start_marker(container);
            if let Some(entry_type) = start {
                self.markers.push_back(DisplayItemEntry {
                    item: Cow::Borrowed(container),
                    entry_type,
                });
            }
            self.stack.push(ListFrame {
                items: &children.items,
                next: 0,
                container: Some((container, start.is_some())),
            });
        }
    }

    fn next_item(&mut self) -> Option<Cow<'a, DisplayItem>> {
        let frame = self.stack.last_mut()?;
        let items = frame.items;
        let start = frame.next;
        if start >= items.len() {
            return None;
        }
        let mut end = start + 1;
        while end < items.len() && items[start].can_merge(&items[end]) {
            end += 1;
        }
        frame.next = end;

        let item = if end - start > 1 {
            Cow::Owned(DisplayItem::merge(&items[start..end])?)
        } else {
            Cow::Borrowed(&items[start])
        };
        self.resolve_flattening();
        Some(item)
    }
}

impl<'a> Iterator for FlattenedDisplayList<'a> {
    type Item = DisplayItemEntry<'a>;

    fn next(&mut self) -> Option<DisplayItemEntry<'a>> {
        if let Some(marker) = self.markers.pop_front() {
            return Some(marker);
        }
        let item = self.next_item()?;
        Some(DisplayItemEntry {
            item,
            entry_type: EntryType::Item,
        })
    }
}

#[cfg(test)]
mod tests {
    use layer_traits::Color;
    use quickcheck::{Arbitrary, Gen, quickcheck};
    use servo_geometry::{LayoutTransform, au_rect_from_px};

    use super::*;
    use crate::display_list::item_key;

    fn random_items(g: &mut Gen, depth: u32, next_key: &mut u32) -> Vec<DisplayItem> {
        let count = u8::arbitrary(g) % 5;
        let mut items = Vec::new();
        for _ in 0..count {
            *next_key += 1;
            let key = item_key(1, *next_key);
            let state = *g
                .choose(&[LayerState::None, LayerState::Inactive, LayerState::Active])
                .unwrap_or(&LayerState::None);
            let kind = u8::arbitrary(g) % if depth == 0 { 1 } else { 5 };
            let item = match kind {
                0 => DisplayItem::solid_color(key, au_rect_from_px(0, 0, 10, 10), Color::BLACK),
                1 => DisplayItem::opacity(key, 0.5, random_items(g, depth - 1, next_key)),
                2 => DisplayItem::transform(
                    key,
                    LayoutTransform::translation(5.0, 0.0, 0.0),
                    random_items(g, depth - 1, next_key),
                ),
                3 => DisplayItem::wrapper(key, random_items(g, depth - 1, next_key)),
                _ => DisplayItem::filter(key, random_items(g, depth - 1, next_key)),
            };
            items.push(item.with_layer_state(state));
        }
        items
    }

    #[derive(Clone, Debug)]
    struct RandomList(DisplayList);

    impl Arbitrary for RandomList {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut next_key = 0;
            RandomList(DisplayList::new(random_items(g, 3, &mut next_key)))
        }
    }

    #[test]
    fn effect_markers_are_balanced() {
        fn prop(list: RandomList, in_inactive_layer: bool) -> bool {
            let mut open = Vec::new();
            for entry in FlattenedDisplayList::new(&list.0, in_inactive_layer, false) {
                match entry.entry_type {
                    EntryType::PushOpacity | EntryType::PushOpacityWithBackground => {
                        open.push(EntryType::PopOpacity)
                    },
                    EntryType::PushTransform => open.push(EntryType::PopTransform),
                    EntryType::PopOpacity | EntryType::PopTransform => {
                        if open.pop() != Some(entry.entry_type) {
                            return false;
                        }
                    },
                    EntryType::Item => {},
                }
            }
            open.is_empty()
        }
        quickcheck(prop as fn(RandomList, bool) -> bool);
    }

    #[test]
    fn inactive_effects_are_flattened_with_markers() {
        let list = DisplayList::new(vec![
            DisplayItem::solid_color(item_key(1, 1), au_rect_from_px(0, 0, 10, 10), Color::WHITE),
            DisplayItem::opacity(
                item_key(2, 1),
                0.5,
                vec![DisplayItem::painted(item_key(3, 1), au_rect_from_px(0, 0, 5, 5), 7)],
            )
            .with_layer_state(LayerState::Inactive),
            DisplayItem::wrapper(
                item_key(4, 1),
                vec![DisplayItem::painted(item_key(5, 1), au_rect_from_px(0, 0, 5, 5), 8)],
            ),
        ]);
        let entries: Vec<_> = FlattenedDisplayList::new(&list, false, false)
            .map(|entry| (entry.item.key, entry.entry_type))
            .collect();
        assert_eq!(
            entries,
            vec![
                (item_key(1, 1), EntryType::Item),
                (item_key(2, 1), EntryType::PushOpacity),
                (item_key(3, 1), EntryType::Item),
                (item_key(2, 1), EntryType::PopOpacity),
                (item_key(5, 1), EntryType::Item),
            ]
        );

        // Inside an inactive layer, effects are not flattened.
        let nested: Vec<_> = FlattenedDisplayList::new(&list, true, false)
            .map(|entry| entry.entry_type)
            .collect();
        assert_eq!(nested, vec![EntryType::Item; 3]);
    }

    #[test]
    fn active_effects_are_not_flattened() {
        let list = DisplayList::new(vec![
            DisplayItem::opacity(
                item_key(1, 1),
                0.5,
                vec![DisplayItem::painted(item_key(2, 1), au_rect_from_px(0, 0, 5, 5), 1)],
            )
            .with_layer_state(LayerState::Active),
        ]);
        let entries: Vec<_> = FlattenedDisplayList::new(&list, false, false).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item.key, item_key(1, 1));
    }

    #[test]
    fn mergeable_siblings_are_combined() {
        let child = |n| DisplayItem::painted(item_key(9, n), au_rect_from_px(0, 0, 5, 5), 1);
        let list = DisplayList::new(vec![
            DisplayItem::filter(item_key(1, 1), vec![child(1)]).with_merge_group(3),
            DisplayItem::filter(item_key(1, 1), vec![child(2)]).with_merge_group(3),
            DisplayItem::filter(item_key(2, 1), vec![child(3)]).with_merge_group(3),
        ]);
        let entries: Vec<_> = FlattenedDisplayList::new(&list, false, false).collect();
        assert_eq!(entries.len(), 2);
        let merged = entries[0].item.children().map(|list| list.items.len());
        assert_eq!(merged, Some(2));
    }
}
