/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

/// A non-premultiplied 8-bit RGBA color.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// The color seen when `foreground` is drawn over `self` with source-over blending.
    pub fn compose(self, foreground: Color) -> Color {
        let background_alpha = self.a as u32;
        let foreground_alpha = foreground.a as u32;
        let alpha = foreground_alpha + divide_by_255(background_alpha * (255 - foreground_alpha));
        let blend_alpha = if alpha == 0 {
            0
        } else {
            foreground_alpha * 255 / alpha
        };
        let blend = |background: u8, foreground: u8| -> u8 {
            let background = background as i32;
            let foreground = foreground as i32;
            (background + (foreground - background) * blend_alpha as i32 / 255) as u8
        };
        Color {
            r: blend(self.r, foreground.r),
            g: blend(self.g, foreground.g),
            b: blend(self.b, foreground.b),
            a: alpha as u8,
        }
    }
}

fn divide_by_255(value: u32) -> u32 {
    let value = value + 128;
    (value + (value >> 8)) >> 8
}
