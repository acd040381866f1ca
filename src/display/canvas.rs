/*
 *  display/canvas.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Runtime-sized RGB frame canvas that plugins draw into
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Background colour of a cleared canvas
pub const BLACK: Rgb888 = Rgb888::BLACK;

/// An RGB888 framebuffer sized at runtime to the matrix geometry.
///
/// Every plugin renders one frame into a `Canvas`; the scheduler hands the
/// finished canvas to the surface with `present`. The panel itself offers no
/// pixel read-back, so the scheduler keeps a copy of the last presented
/// canvas when it needs previous content (transitions).
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    buf: Vec<Rgb888>,
    w: usize,
    h: usize,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![BLACK; w * h], w, h }
    }

    pub fn width(&self) -> u32 { self.w as u32 }
    pub fn height(&self) -> u32 { self.h as u32 }

    /// Immutable raw access, row major
    pub fn as_slice(&self) -> &[Rgb888] { &self.buf }

    /// Clear to black
    pub fn clear_black(&mut self) {
        self.buf.fill(BLACK);
    }

    /// Fill the whole canvas with one colour
    pub fn fill(&mut self, color: Rgb888) {
        self.buf.fill(color);
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb888> {
        self.idx(Point::new(x, y)).map(|i| self.buf[i])
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888) {
        if let Some(i) = self.idx(Point::new(x, y)) {
            self.buf[i] = color;
        }
    }

    /// True when every pixel is black
    pub fn is_blank(&self) -> bool {
        self.buf.iter().all(|&p| p == BLACK)
    }

    /// Number of pixels that are not black
    pub fn lit_pixels(&self) -> usize {
        self.buf.iter().filter(|&&p| p != BLACK).count()
    }

    /// Copy another canvas of the same geometry without reallocating.
    /// Mismatched geometry falls back to a full clone.
    pub fn copy_from(&mut self, other: &Canvas) {
        if self.w == other.w && self.h == other.h {
            self.buf.copy_from_slice(&other.buf);
        } else {
            *self = other.clone();
        }
    }

    /// Draw `src` with its origin at (dx, dy); pixels falling outside are dropped
    pub fn blit(&mut self, src: &Canvas, dx: i32, dy: i32) {
        for sy in 0..src.h {
            let ty = sy as i32 + dy;
            if ty < 0 || ty >= self.h as i32 {
                continue;
            }
            for sx in 0..src.w {
                let tx = sx as i32 + dx;
                if tx < 0 || tx >= self.w as i32 {
                    continue;
                }
                self.buf[ty as usize * self.w + tx as usize] = src.buf[sy * src.w + sx];
            }
        }
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // clip once, then fill row slices
        let area = area.intersection(&self.bounding_box());
        let Size { width, height } = area.size;
        if width == 0 || height == 0 { return Ok(()); }
        let x0 = area.top_left.x as usize;
        let y0 = area.top_left.y as usize;
        for row in y0..y0 + height as usize {
            let base = row * self.w + x0;
            self.buf[base..base + width as usize].fill(color);
        }
        Ok(())
    }
}
