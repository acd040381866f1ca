/*
 *  display/transition.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Time-boxed slide transition between two plugins
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

use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use log::debug;
use thiserror::Error;

use crate::config::{EasingKind, SchedulerConfig};
use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;
use crate::display::traits::MatrixSurface;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("transition frame rejected by surface: {0}")]
    Surface(#[from] DisplayError),
    #[error("transition has no steps")]
    NoSteps,
}

/// Parameters of one in-flight switch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionDescriptor {
    pub steps: u32,
    pub duration: Duration,
    pub easing: EasingKind,
}

impl Default for TransitionDescriptor {
    fn default() -> Self {
        Self {
            steps: 12,
            duration: Duration::from_millis(350),
            easing: EasingKind::Sine,
        }
    }
}

impl TransitionDescriptor {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            steps: cfg.transition_steps(),
            duration: Duration::from_millis(cfg.transition_ms()),
            easing: cfg.easing(),
        }
    }

    /// Apply the easing curve; input and output are both in [0,1]
    pub fn ease(&self, p: f32) -> f32 {
        let p = p.clamp(0.0, 1.0);
        match self.easing {
            EasingKind::Sine => (p * FRAC_PI_2).sin(),
            EasingKind::Linear => p,
        }
    }

    /// Horizontal slide offset in pixels for every step, first to last
    pub fn offsets(&self, width: u32) -> Vec<i32> {
        (1..=self.steps)
            .map(|i| {
                let p = i as f32 / self.steps as f32;
                (self.ease(p) * width as f32).round() as i32
            })
            .collect()
    }
}

/// Placeholder palette for outgoing content that was never cached
const PLACEHOLDER: [Rgb888; 6] = [
    Rgb888::new(0, 64, 160),
    Rgb888::new(160, 32, 0),
    Rgb888::new(0, 128, 48),
    Rgb888::new(128, 0, 128),
    Rgb888::new(160, 120, 0),
    Rgb888::new(0, 112, 128),
];

/// Stable colour for a plugin name (FNV-1a)
pub fn accent_color(name: &str) -> Rgb888 {
    let hash = name
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    PLACEHOLDER[hash as usize % PLACEHOLDER.len()]
}

/// Stateless renderer; each run is independent.
pub struct TransitionRenderer;

impl TransitionRenderer {
    /// Slide `from` off to the left over `desc.duration`.
    ///
    /// Without a cached frame a solid block in the outgoing plugin's accent
    /// colour stands in for it. A border and a loading bar mark the switch.
    /// On return, successful or not, the canvas and the panel are blank.
    pub fn run(
        desc: &TransitionDescriptor,
        surface: &mut dyn MatrixSurface,
        canvas: &mut Canvas,
        from: Option<&Canvas>,
        outgoing: Option<&str>,
    ) -> Result<(), TransitionError> {
        if desc.steps == 0 {
            return Err(TransitionError::NoSteps);
        }

        let result = Self::slide(desc, surface, canvas, from, outgoing);

        canvas.clear_black();
        let cleared = surface.clear();
        result?;
        cleared?;
        Ok(())
    }

    fn slide(
        desc: &TransitionDescriptor,
        surface: &mut dyn MatrixSurface,
        canvas: &mut Canvas,
        from: Option<&Canvas>,
        outgoing: Option<&str>,
    ) -> Result<(), TransitionError> {
        let (w, h) = (canvas.width(), canvas.height());
        let accent = accent_color(outgoing.unwrap_or(""));
        let start = Instant::now();

        debug!("transition from {:?}: {} steps over {:?}", outgoing, desc.steps, desc.duration);

        for (i, offset) in desc.offsets(w).into_iter().enumerate() {
            canvas.clear_black();

            match from {
                Some(prev) => canvas.blit(prev, -offset, 0),
                None => {
                    let remaining = w.saturating_sub(offset as u32);
                    if remaining > 0 {
                        let _ = Rectangle::new(Point::zero(), Size::new(remaining, h))
                            .into_styled(PrimitiveStyle::with_fill(accent))
                            .draw(canvas);
                    }
                }
            }

            let step = i as u32 + 1;
            let _ = Rectangle::new(Point::zero(), Size::new(w, h))
                .into_styled(PrimitiveStyle::with_stroke(accent, 1))
                .draw(canvas);
            let bar = (w * step) / desc.steps;
            if bar > 0 {
                let _ = Rectangle::new(Point::new(0, h as i32 - 1), Size::new(bar, 1))
                    .into_styled(PrimitiveStyle::with_fill(Rgb888::WHITE))
                    .draw(canvas);
            }

            surface.present(canvas)?;

            // paced from the start instant, not per step
            let deadline = start + desc.duration.mul_f64(step as f64 / desc.steps as f64);
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        Ok(())
    }
}
