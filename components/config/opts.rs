/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Configuration options for a single layer builder.

use log::warn;
use serde::{Deserialize, Serialize};

/// Tuning knobs for layerization. The defaults match long standing values; none of them is
/// load-bearing for correctness, they only trade rasterization area against CPU time.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Opts {
    /// Once this many items have been given their own layer in one container, remaining items
    /// that would like an active layer are painted into painted layers instead. `None` means
    /// no limit.
    pub max_active_layers: Option<usize>,

    /// Prefer painting items into a painted layer they actually overlap instead of the lowest
    /// compatible one. This produces more, but smaller, painted layers.
    pub smaller_painted_layers: bool,

    /// The rect budget of a painted layer's visible region.
    pub visible_region_max_rects: usize,

    /// The rect budget of the approximate hit-test and dispatch-to-content regions.
    pub hit_region_max_rects: usize,

    /// The rect budget of the "visible above" regions used for occlusion.
    pub visible_above_max_rects: usize,

    /// An opaque rect is only added to a painted layer's opaque region if the result stays
    /// within this many rects.
    pub opaque_region_max_rects: usize,

    /// Allow discarding painted layers with valid content in favour of color and image layers.
    pub layer_tree_compression: bool,

    /// Treat every item that would accept an inactive layer as active.
    pub force_active_layers: bool,

    /// Whether this builder paints chrome content. Non-chrome content is always assumed to sit
    /// over the window's opaque region.
    pub is_chrome: bool,

    pub debug: DebugOptions,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            max_active_layers: None,
            smaller_painted_layers: false,
            visible_region_max_rects: 4,
            hit_region_max_rects: 8,
            visible_above_max_rects: 8,
            opaque_region_max_rects: 4,
            layer_tree_compression: false,
            force_active_layers: false,
            is_chrome: false,
            debug: DebugOptions::default(),
        }
    }
}

impl Opts {
    /// Read options from a JSON object. Missing fields keep their default value.
    pub fn from_json_str(json: &str) -> Result<Opts, serde_json::Error> {
        let opts: Opts = serde_json::from_str(json)?;
        if opts.visible_region_max_rects == 0 || opts.opaque_region_max_rects == 0 {
            warn!("Region rect budgets of zero are treated as one");
        }
        Ok(opts)
    }

    /// Apply a comma separated list of debug flags, as given on a command line.
    pub fn apply_debug_string(&mut self, debug_string: &str) -> Result<(), String> {
        self.debug.extend(debug_string.to_owned())?;
        if self.debug.help {
            print_debug_options_usage("layer-builder");
        }
        Ok(())
    }
}

/// Debug options for the layer builder, set with a comma separated string of flags.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DebugOptions {
    /// List all the debug options.
    pub help: bool,

    /// Print the layer tree after each transaction.
    pub dump_layer_tree: bool,

    /// Log every rect invalidated in a painted layer.
    pub dump_invalidations: bool,

    /// Never subtract opaque regions of layers above from visible regions below.
    pub disable_occlusion_culling: bool,

    /// Never turn solid color painted layers into color layers.
    pub disable_color_layers: bool,

    /// Never turn single image painted layers into image layers.
    pub disable_image_layers: bool,

    /// Create fresh painted layers instead of recycling the previous paint's layers.
    pub disable_layer_recycling: bool,
}

impl DebugOptions {
    pub fn extend(&mut self, debug_string: String) -> Result<(), String> {
        for option in debug_string.split(',') {
            match option {
                "help" => self.help = true,
                "dump-layer-tree" => self.dump_layer_tree = true,
                "dump-invalidations" => self.dump_invalidations = true,
                "disable-occlusion-culling" => self.disable_occlusion_culling = true,
                "disable-color-layers" => self.disable_color_layers = true,
                "disable-image-layers" => self.disable_image_layers = true,
                "disable-layer-recycling" => self.disable_layer_recycling = true,
                "" => {},
                _ => return Err(String::from(option)),
            };
        }

        Ok(())
    }
}

pub fn print_debug_options_usage(app: &str) {
    fn print_option(name: &str, description: &str) {
        println!("\t{:<35} {}", name, description);
    }

    println!(
        "Usage: {} debug option,[options,...]\n\twhere options include\n\nOptions:",
        app
    );

    print_option("dump-layer-tree", "Print the layer tree after each transaction.");
    print_option(
        "dump-invalidations",
        "Log every rect invalidated in a painted layer.",
    );
    print_option(
        "disable-occlusion-culling",
        "Keep the full visible region of layers covered by opaque layers.",
    );
    print_option(
        "disable-color-layers",
        "Never turn solid color content into color layers.",
    );
    print_option(
        "disable-image-layers",
        "Never turn single image content into image layers.",
    );
    print_option(
        "disable-layer-recycling",
        "Create fresh painted layers on every paint.",
    );

    println!();
}
