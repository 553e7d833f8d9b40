/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Deciding whether a display item gets a layer of its own.

use strum::IntoStaticStr;

/// What an item would like to happen to it, as reported by the item.
#[derive(Clone, Copy, Debug, Default, Eq, IntoStaticStr, PartialEq)]
pub enum LayerState {
    /// Painted into a painted layer with its neighbours.
    #[default]
    None,
    /// An effect that can be drawn into a painted layer, but could also have its own layer.
    Inactive,
    /// Wants its own layer, unless the container already has too many.
    Active,
    /// Must have its own layer.
    ActiveForce,
    /// Wants its own layer even though it currently draws nothing.
    ActiveEmpty,
}

/// What the builder does with an item.
#[derive(Clone, Copy, Debug, Eq, IntoStaticStr, PartialEq)]
pub enum ItemDisposition {
    /// The item gets a dedicated layer.
    OwnLayer,
    /// The item is painted into a shared painted layer.
    Merge,
    /// The item wanted a layer but the container ran out of its layer budget, so it is
    /// painted into a shared painted layer.
    ForcedInactive,
}

/// The parts of the builder state a layer decision depends on.
#[derive(Clone, Copy, Debug)]
pub struct LayerDecisionContext {
    /// Whether the item is a real item rather than an effect marker.
    pub is_item: bool,
    pub force_active_layers: bool,
    /// The builder is building a nested tree for an item that is drawn into a painted layer.
    pub in_inactive_layer: bool,
    pub layer_count: usize,
    pub max_layers: Option<usize>,
}

impl LayerState {
    /// The state once debug preferences are applied.
    pub fn resolve(self, force_active_layers: bool) -> LayerState {
        match self {
            LayerState::Inactive if force_active_layers => LayerState::Active,
            state => state,
        }
    }
}

/// Decide what happens to an item with `state`.
pub fn decide(state: LayerState, context: &LayerDecisionContext) -> ItemDisposition {
    if !context.is_item {
        return ItemDisposition::Merge;
    }
    let budget_exhausted = context
        .max_layers
        .is_some_and(|max| context.layer_count >= max);
    match state.resolve(context.force_active_layers) {
        LayerState::ActiveForce => ItemDisposition::OwnLayer,
        LayerState::Inactive if context.in_inactive_layer => ItemDisposition::OwnLayer,
        LayerState::Active | LayerState::ActiveEmpty if budget_exhausted => {
            ItemDisposition::ForcedInactive
        },
        LayerState::Active | LayerState::ActiveEmpty => ItemDisposition::OwnLayer,
        LayerState::None | LayerState::Inactive => ItemDisposition::Merge,
    }
}
