/*
 *  plugin/gif.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Animated GIF playback with optional clock overlay
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

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Local;
use embedded_graphics::pixelcolor::Rgb888;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use log::{info, warn};
use serde_json::{json, Value};

use crate::display::canvas::Canvas;
use crate::draw::{draw_message, draw_text_outlined, ERROR_RED, FONT_6X10, WHITE};
use crate::plugin::{defaults, ConfigExt, Plugin, PluginBase, PluginConfig, PluginContext, PluginError};

/// Frame time used when a GIF carries no delay (10 fps)
const FALLBACK_DELAY: f32 = 0.1;

/// A gif name is a bare file stem inside the gif directory
pub fn is_valid_gif_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

struct GifFrame {
    canvas: Canvas,
    delay: f32,
}

pub struct GifPlugin {
    base: PluginBase,
    width: u32,
    height: u32,
    resource_dir: PathBuf,
    frames: Vec<GifFrame>,
    current: usize,
    frame_time: f32,
    loaded: Option<String>,
    error: Option<String>,
}

impl GifPlugin {
    pub fn new(ctx: &PluginContext, overrides: PluginConfig) -> Self {
        Self {
            base: PluginBase::new(
                "gif",
                "Animated GIF display",
                defaults(json!({
                    "directory": "resources/images/gifs",
                    "current_gif": "matrix",
                    "show_clock": true,
                    "format_24h": true
                })),
                overrides,
            ),
            width: ctx.width,
            height: ctx.height,
            resource_dir: ctx.resource_dir.clone(),
            frames: Vec::new(),
            current: 0,
            frame_time: 0.0,
            loaded: None,
            error: None,
        }
    }

    pub fn current_gif(&self) -> &str {
        self.config().str_or("current_gif", "")
    }

    /// Select a GIF by name; takes effect on the next reload
    pub fn set_current_gif(&mut self, name: &str) {
        self.config_mut().insert("current_gif".to_string(), Value::String(name.to_string()));
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn gif_path(&self, name: &str) -> PathBuf {
        let dir = Path::new(self.config().str_or("directory", "resources/images/gifs"));
        let dir = if dir.is_absolute() { dir.to_path_buf() } else { self.resource_dir.join(dir) };
        dir.join(format!("{name}.gif"))
    }

    fn load(&mut self) {
        let name = self.current_gif().to_string();
        self.frames.clear();
        self.current = 0;
        self.frame_time = 0.0;
        self.loaded = Some(name.clone());
        self.error = None;

        if name.is_empty() {
            self.error = Some("No GIF".to_string());
            return;
        }
        if !is_valid_gif_name(&name) {
            warn!("Refusing GIF name outside the gif directory: {}", name);
            self.error = Some("No GIF".to_string());
            return;
        }

        let path = self.gif_path(&name);
        if !path.exists() {
            warn!("GIF file not found: {}", path.display());
            self.error = Some("No GIF".to_string());
            return;
        }

        match decode_frames(&path, self.width, self.height) {
            Ok(frames) if !frames.is_empty() => {
                info!("Loaded GIF {} ({} frames)", path.display(), frames.len());
                self.frames = frames;
            }
            Ok(_) => {
                warn!("GIF {} has no frames", path.display());
                self.error = Some("GIF Error".to_string());
            }
            Err(e) => {
                warn!("Error loading GIF {}: {}", path.display(), e);
                self.error = Some("GIF Error".to_string());
            }
        }
    }
}

/// Decode every frame and fit it to the panel (nearest neighbour, centred)
fn decode_frames(path: &Path, width: u32, height: u32) -> Result<Vec<GifFrame>, PluginError> {
    let reader = BufReader::new(File::open(path)?);
    let decoder = GifDecoder::new(reader).map_err(|e| PluginError::Decode(e.to_string()))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| PluginError::Decode(e.to_string()))?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            let ms = if den == 0 { 0.0 } else { num as f32 / den as f32 };
            let delay = if ms <= 0.0 { FALLBACK_DELAY } else { ms / 1000.0 };
            GifFrame {
                canvas: fit_to_canvas(frame.buffer(), width, height),
                delay,
            }
        })
        .collect())
}

fn fit_to_canvas(img: &RgbaImage, width: u32, height: u32) -> Canvas {
    let mut canvas = Canvas::new(width, height);
    let (gw, gh) = img.dimensions();
    if gw == 0 || gh == 0 {
        return canvas;
    }
    let scale = (width as f32 / gw as f32).min(height as f32 / gh as f32);
    let tw = ((gw as f32 * scale) as u32).max(1);
    let th = ((gh as f32 * scale) as u32).max(1);
    let ox = (width.saturating_sub(tw) / 2) as i32;
    let oy = (height.saturating_sub(th) / 2) as i32;

    for y in 0..th {
        let sy = ((y as f32 / scale) as u32).min(gh - 1);
        for x in 0..tw {
            let sx = ((x as f32 / scale) as u32).min(gw - 1);
            let [r, g, b, a] = img.get_pixel(sx, sy).0;
            if a >= 128 {
                canvas.set_pixel(ox + x as i32, oy + y as i32, Rgb888::new(r, g, b));
            }
        }
    }
    canvas
}

impl Plugin for GifPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn setup(&mut self) -> Result<(), PluginError> {
        self.load();
        Ok(())
    }

    fn update(&mut self, delta: f32) {
        if self.frames.is_empty() {
            return;
        }
        self.frame_time += delta;
        // advance at most one full loop per tick
        for _ in 0..self.frames.len() {
            let delay = self.frames[self.current].delay;
            if self.frame_time < delay {
                break;
            }
            self.frame_time -= delay;
            self.current = (self.current + 1) % self.frames.len();
        }
    }

    fn render(&mut self, canvas: &mut Canvas) {
        match self.frames.get(self.current) {
            Some(frame) => canvas.copy_from(&frame.canvas),
            None => {
                let msg = self.error.as_deref().unwrap_or("No GIF");
                let _ = draw_message(canvas, msg, ERROR_RED);
                return;
            }
        }

        if self.config().bool_or("show_clock", true) {
            let now = Local::now();
            let text = if self.config().bool_or("format_24h", true) {
                now.format("%H:%M").to_string()
            } else {
                now.format("%I:%M%P").to_string()
            };
            let y = (self.height as i32 - FONT_6X10.character_size.height as i32) / 2;
            let _ = draw_text_outlined(canvas, &text, y, &FONT_6X10, WHITE);
        }
    }

    fn cleanup(&mut self) {
        self.frames.clear();
        self.loaded = None;
        self.current = 0;
    }

    fn reload(&mut self) -> bool {
        if self.loaded.as_deref() == Some(self.current_gif()) {
            return false;
        }
        info!("GIF changed from {:?} to '{}', reloading", self.loaded, self.current_gif());
        self.load();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba};

    fn write_gif(dir: &Path, name: &str, frames: usize) {
        let file = File::create(dir.join(format!("{name}.gif"))).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = (0..frames).map(|i| {
            let shade = (i as u8).wrapping_mul(80).wrapping_add(60);
            let buf = RgbaImage::from_pixel(8, 4, Rgba([shade, 0, 0, 255]));
            Frame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(50, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }

    fn plugin(dir: &Path, gif: &str) -> GifPlugin {
        let mut ctx = PluginContext::new(16, 8);
        ctx.resource_dir = dir.to_path_buf();
        GifPlugin::new(&ctx, defaults(json!({ "directory": ".", "current_gif": gif, "show_clock": false })))
    }

    #[test]
    fn test_loads_and_fits_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_gif(dir.path(), "fire", 3);

        let mut gif = plugin(dir.path(), "fire");
        gif.setup().unwrap();
        assert_eq!(gif.frame_count(), 3);
        assert!(gif.error().is_none());

        let mut canvas = Canvas::new(16, 8);
        gif.render(&mut canvas);
        // 8x4 scaled by 2 fills the panel
        assert_eq!(canvas.lit_pixels(), 16 * 8);
    }

    #[test]
    fn test_frames_advance_on_delay() {
        let dir = tempfile::tempdir().unwrap();
        write_gif(dir.path(), "fire", 2);

        let mut gif = plugin(dir.path(), "fire");
        gif.setup().unwrap();
        gif.update(0.01);
        assert_eq!(gif.current, 0);
        gif.update(0.05);
        assert_eq!(gif.current, 1);
    }

    #[test]
    fn test_missing_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let mut gif = plugin(dir.path(), "nothing");
        gif.setup().unwrap();
        assert_eq!(gif.error(), Some("No GIF"));

        let mut canvas = Canvas::new(16, 8);
        gif.render(&mut canvas);
        assert!(canvas.lit_pixels() > 0);
    }

    #[test]
    fn test_corrupt_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.gif"), b"GIF89a nope").unwrap();
        let mut gif = plugin(dir.path(), "bad");
        gif.setup().unwrap();
        assert_eq!(gif.error(), Some("GIF Error"));
    }

    #[test]
    fn test_reload_on_selection_change() {
        let dir = tempfile::tempdir().unwrap();
        write_gif(dir.path(), "a", 1);
        write_gif(dir.path(), "b", 2);

        let mut gif = plugin(dir.path(), "a");
        gif.setup().unwrap();
        assert!(!gif.reload());

        gif.set_current_gif("b");
        assert!(gif.reload());
        assert_eq!(gif.frame_count(), 2);

        gif.cleanup();
        assert_eq!(gif.frame_count(), 0);
    }

    #[test]
    fn test_update_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        write_gif(dir.path(), "a", 1);
        write_gif(dir.path(), "b", 2);

        let mut gif = plugin(dir.path(), "a");
        gif.setup().unwrap();
        gif.set_current_gif("b");
        gif.update(0.01);
        assert_eq!(gif.frame_count(), 1);
        assert!(gif.reload());
        assert_eq!(gif.frame_count(), 2);
    }

    #[test]
    fn test_gif_name_stays_in_directory() {
        assert!(is_valid_gif_name("fire"));
        assert!(is_valid_gif_name("night.sky"));
        assert!(!is_valid_gif_name(""));
        assert!(!is_valid_gif_name("../../x"));
        assert!(!is_valid_gif_name("sub/fire"));
        assert!(!is_valid_gif_name("..\\fire"));

        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("gifs");
        std::fs::create_dir(&inner).unwrap();
        write_gif(dir.path(), "outside", 1);

        let mut ctx = PluginContext::new(16, 8);
        ctx.resource_dir = dir.path().to_path_buf();
        let mut gif = GifPlugin::new(&ctx, defaults(json!({ "directory": "gifs", "current_gif": "../outside" })));
        gif.setup().unwrap();
        assert_eq!(gif.frame_count(), 0);
        assert_eq!(gif.error(), Some("No GIF"));
    }
}
