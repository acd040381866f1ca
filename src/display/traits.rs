/*
 *  display/traits.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Core trait definitions for matrix surface abstraction
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

use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;

/// Surface capabilities and metadata
#[derive(Debug, Clone)]
pub struct SurfaceCapabilities {
    /// Total width in pixels (cols * chain_length)
    pub width: u32,

    /// Total height in pixels (rows * parallel)
    pub height: u32,

    /// Whether brightness can be changed while running
    pub supports_brightness: bool,
}

/// Minimal hardware abstraction - every matrix backend implements this trait
///
/// No pixel read-back: HUB75 panels are write-only. Callers that need the
/// previous frame keep their own copy of the last canvas they presented.
pub trait MatrixSurface: Send {
    /// Returns the capabilities of this surface
    fn capabilities(&self) -> &SurfaceCapabilities;

    /// Returns the surface dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Initialize the panel hardware
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Blank the panel
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Draw the canvas into the back buffer and swap it onto the panel
    fn present(&mut self, canvas: &Canvas) -> Result<(), DisplayError>;

    /// Set panel brightness (1-100)
    ///
    /// Backends that can only apply brightness at construction return
    /// `DisplayError::UnsupportedOperation`; the value then takes effect on
    /// the next restart.
    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        if !(1..=100).contains(&level) {
            return Err(DisplayError::InvalidBrightness(level));
        }
        Err(DisplayError::UnsupportedOperation)
    }

    /// Check a canvas against the surface geometry
    fn check_frame(&self, canvas: &Canvas) -> Result<(), DisplayError> {
        let expected = self.dimensions();
        let actual = (canvas.width(), canvas.height());
        if expected != actual {
            return Err(DisplayError::FrameSizeMismatch { expected, actual });
        }
        Ok(())
    }
}
