/*
 *  plugin/moon.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Moon phase plugin
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

use std::f64::consts::TAU;

use chrono::{DateTime, Local, TimeZone, Utc};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use log::info;
use serde_json::json;

use crate::display::canvas::Canvas;
use crate::draw::{color_from_value, draw_text, FONT_4X6, SKY_BLUE, WHITE};
use crate::plugin::{defaults, ConfigExt, Plugin, PluginBase, PluginConfig, PluginContext, PluginError};

/// Mean synodic month in days
pub const SYNODIC_MONTH: f64 = 29.53058867;

pub const PHASE_NAMES: [&str; 8] = [
    "New Moon",
    "Waxing Crescent",
    "First Quarter",
    "Waxing Gibbous",
    "Full Moon",
    "Waning Gibbous",
    "Last Quarter",
    "Waning Crescent",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoonPhase {
    /// position in the cycle, [0,1), 0 = new, 0.5 = full
    pub fraction: f64,
    pub index: usize,
}

impl MoonPhase {
    pub fn name(&self) -> &'static str {
        PHASE_NAMES[self.index]
    }
}

fn reference_new_moon() -> DateTime<Utc> {
    // 2000-01-06 18:14 UTC
    Utc.with_ymd_and_hms(2000, 1, 6, 18, 14, 0)
        .single()
        .unwrap_or_default()
}

/// Phase of the moon at `at`
pub fn moon_phase(at: DateTime<Utc>) -> MoonPhase {
    let days = (at - reference_new_moon()).num_seconds() as f64 / 86_400.0;
    let fraction = days.rem_euclid(SYNODIC_MONTH) / SYNODIC_MONTH;
    let index = ((fraction * 8.0) as usize) % 8;
    MoonPhase { fraction, index }
}

/// True when the disc pixel at `dx` (from centre) on a row of half width
/// `half` is sunlit for the given phase fraction
fn is_lit(dx: f64, half: f64, fraction: f64) -> bool {
    let terminator = half * (TAU * fraction).cos();
    if fraction < 0.5 {
        dx >= terminator
    } else {
        dx <= -terminator
    }
}

pub struct MoonPlugin {
    base: PluginBase,
    width: u32,
    height: u32,
    phase: MoonPhase,
    since_update: f32,
}

impl MoonPlugin {
    pub fn new(ctx: &PluginContext, overrides: PluginConfig) -> Self {
        Self {
            base: PluginBase::new(
                "moon",
                "Moon phase display",
                defaults(json!({
                    "update_interval": 3600,
                    "show_text": true,
                    "color": [220, 220, 255],
                    "bg_color": [0, 0, 0]
                })),
                overrides,
            ),
            width: ctx.width,
            height: ctx.height,
            phase: moon_phase(Utc::now()),
            since_update: 0.0,
        }
    }

    pub fn phase(&self) -> MoonPhase {
        self.phase
    }

    fn recompute(&mut self) {
        self.phase = moon_phase(Utc::now());
        self.since_update = 0.0;
        info!("Current moon phase: {}", self.phase.name());
    }

    fn draw_disc(&self, canvas: &mut Canvas, center: Point, radius: i32, lit: Rgb888) {
        // the unlit side stays faintly visible
        let shade = Rgb888::new(lit.r() / 10, lit.g() / 10, lit.b() / 10);
        let r = radius as f64;
        for dy in -radius..=radius {
            let half = (r * r - (dy * dy) as f64).max(0.0).sqrt();
            let span = half.round() as i32;
            for dx in -span..=span {
                let color = if is_lit(dx as f64, half, self.phase.fraction) { lit } else { shade };
                canvas.set_pixel(center.x + dx, center.y + dy, color);
            }
        }
    }
}

impl Plugin for MoonPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn setup(&mut self) -> Result<(), PluginError> {
        self.recompute();
        Ok(())
    }

    fn update(&mut self, delta: f32) {
        self.since_update += delta;
        if self.since_update >= self.config().u64_or("update_interval", 3600) as f32 {
            self.recompute();
        }
    }

    fn render(&mut self, canvas: &mut Canvas) {
        let cfg = self.config();
        let lit = color_from_value(cfg.get("color"), Rgb888::new(220, 220, 255));
        let bg = color_from_value(cfg.get("bg_color"), Rgb888::BLACK);
        let show_text = cfg.bool_or("show_text", true);

        canvas.fill(bg);

        let (w, h) = (self.width as i32, self.height as i32);
        let diameter = h.min(w / 2) - 2;
        let radius = (diameter / 2).max(1);

        if show_text {
            // disc on the left, phase words and date on the right
            let center = Point::new(radius + 1, h / 2);
            self.draw_disc(canvas, center, radius, lit);

            let x = 2 * radius + 5;
            let line = FONT_4X6.character_size.height as i32 + 1;
            let mut y = 2;
            for word in self.phase.name().split(' ') {
                let _ = draw_text(canvas, word, x, y, &FONT_4X6, WHITE);
                y += line;
            }
            let date = Local::now().format("%b %d").to_string();
            let _ = draw_text(canvas, &date, x, h - line - 1, &FONT_4X6, SKY_BLUE);
        } else {
            self.draw_disc(canvas, Point::new(w / 2, h / 2), radius, lit);
        }
    }
}
