/*
 *  plugin/intro.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Splash screen shown for a fixed time
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde_json::json;

use crate::display::canvas::Canvas;
use crate::draw::{draw_text_centered, FONT_7X13, SKY_BLUE};
use crate::plugin::{defaults, ConfigExt, Plugin, PluginBase, PluginConfig, PluginContext, PluginError};

pub struct IntroPlugin {
    base: PluginBase,
    height: u32,
    shown_for: f32,
}

impl IntroPlugin {
    pub fn new(ctx: &PluginContext, overrides: PluginConfig) -> Self {
        Self {
            base: PluginBase::new(
                "intro",
                "Introduction screen",
                defaults(json!({ "display_time": 10, "text": "InfoCube" })),
                overrides,
            ),
            height: ctx.height,
            shown_for: 0.0,
        }
    }
}

impl Plugin for IntroPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn setup(&mut self) -> Result<(), PluginError> {
        self.shown_for = 0.0;
        Ok(())
    }

    fn update(&mut self, delta: f32) {
        self.shown_for += delta;
        if self.is_running() && self.shown_for >= self.config().u64_or("display_time", 10) as f32 {
            self.stop();
        }
    }

    fn render(&mut self, canvas: &mut Canvas) {
        let text = self.config().str_or("text", "InfoCube").to_string();
        let y = (self.height as i32 - FONT_7X13.character_size.height as i32) / 2;
        let _ = draw_text_centered(canvas, &text, y, &FONT_7X13, SKY_BLUE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_after_display_time() {
        let mut intro = IntroPlugin::new(&PluginContext::new(64, 32), defaults(json!({ "display_time": 2 })));
        intro.setup().unwrap();
        intro.start();
        intro.update(1.0);
        assert!(intro.is_running());
        intro.update(1.5);
        assert!(!intro.is_running());

        let mut canvas = Canvas::new(64, 32);
        intro.render(&mut canvas);
        assert!(canvas.lit_pixels() > 0);
    }
}
