/*
 *  plugin/clock.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Clock plugin - time and date
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

use core::fmt::Write;

use arrayvec::ArrayString;
use chrono::{DateTime, Local, TimeZone};
use embedded_graphics::pixelcolor::Rgb888;
use serde_json::json;

use crate::display::canvas::Canvas;
use crate::draw::{color_from_value, draw_text_centered, FONT_5X8, FONT_7X13, SKY_BLUE};
use crate::plugin::{defaults, ConfigExt, Plugin, PluginBase, PluginConfig, PluginContext};

const ORANGE: Rgb888 = Rgb888::new(255, 165, 0);

pub struct ClockPlugin {
    base: PluginBase,
    height: u32,
    /// reformatted several times a second, kept off the heap
    time_text: ArrayString<16>,
    date_text: ArrayString<16>,
    since_format: f32,
}

impl ClockPlugin {
    pub fn new(ctx: &PluginContext, overrides: PluginConfig) -> Self {
        let base = PluginBase::new(
            "clock",
            "Clock with date",
            defaults(json!({
                "show_seconds": false,
                "format_24h": true,
                "show_date": true,
                "color": [255, 165, 0],
                "date_color": [0, 191, 255]
            })),
            overrides,
        );
        let mut plugin = Self {
            base,
            height: ctx.height,
            time_text: ArrayString::new(),
            date_text: ArrayString::new(),
            since_format: 0.0,
        };
        plugin.refresh_text(&Local::now());
        plugin
    }

    fn time_pattern(&self) -> &'static str {
        let cfg = self.config();
        match (cfg.bool_or("format_24h", true), cfg.bool_or("show_seconds", false)) {
            (true, true) => "%H:%M:%S",
            (true, false) => "%H:%M",
            (false, true) => "%I:%M:%S%P",
            (false, false) => "%I:%M%P",
        }
    }

    /// Time string per `format_24h` / `show_seconds`
    pub fn format_time<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        now.format(self.time_pattern()).to_string()
    }

    fn refresh_text<Tz: TimeZone>(&mut self, now: &DateTime<Tz>)
    where
        Tz::Offset: std::fmt::Display,
    {
        let pattern = self.time_pattern();
        self.time_text.clear();
        let _ = write!(self.time_text, "{}", now.format(pattern));
        self.date_text.clear();
        let _ = write!(self.date_text, "{}", now.format("%a %b %d"));
    }
}

impl Plugin for ClockPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn setup(&mut self) -> Result<(), crate::plugin::PluginError> {
        self.since_format = 0.0;
        self.refresh_text(&Local::now());
        Ok(())
    }

    fn update(&mut self, delta: f32) {
        // reformat four times a second
        self.since_format += delta;
        if self.since_format >= 0.25 {
            self.since_format = 0.0;
            self.refresh_text(&Local::now());
        }
    }

    fn render(&mut self, canvas: &mut Canvas) {
        let cfg = self.config();
        let time_color = color_from_value(cfg.get("color"), ORANGE);
        let date_color = color_from_value(cfg.get("date_color"), SKY_BLUE);
        let show_date = cfg.bool_or("show_date", true);

        let h = self.height as i32;
        let time_h = FONT_7X13.character_size.height as i32;
        let time_y = if show_date { h / 2 - time_h + 2 } else { (h - time_h) / 2 };
        let _ = draw_text_centered(canvas, &self.time_text, time_y, &FONT_7X13, time_color);
        if show_date {
            let _ = draw_text_centered(canvas, &self.date_text, h / 2 + 4, &FONT_5X8, date_color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn clock(overrides: serde_json::Value) -> ClockPlugin {
        ClockPlugin::new(&PluginContext::new(64, 32), defaults(overrides))
    }

    #[test]
    fn test_time_formats() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let t = tz.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        assert_eq!(clock(json!({})).format_time(&t), "14:05");
        assert_eq!(clock(json!({ "show_seconds": true })).format_time(&t), "14:05:07");
        assert_eq!(clock(json!({ "format_24h": false })).format_time(&t), "02:05pm");
    }

    #[test]
    fn test_render_draws_something() {
        let mut plugin = clock(json!({}));
        plugin.setup().unwrap();
        plugin.update(1.0);
        let mut canvas = Canvas::new(64, 32);
        plugin.render(&mut canvas);
        assert!(canvas.lit_pixels() > 0);
    }
}
