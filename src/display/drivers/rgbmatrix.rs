/*
 *  display/drivers/rgbmatrix.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  HUB75 RGB matrix backend via rpi-rgb-led-matrix
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

use embedded_graphics::pixelcolor::RgbColor;
use log::{debug, info};
use rpi_led_matrix::{LedCanvas, LedColor, LedMatrix, LedMatrixOptions, LedRuntimeOptions};

use crate::config::MatrixConfig;
use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;
use crate::display::traits::{MatrixSurface, SurfaceCapabilities};

/// HUB75 panel chain driven by the rpi-rgb-led-matrix C library.
///
/// Brightness is a construction-time option of the library binding, so
/// runtime changes report `UnsupportedOperation` and take effect on restart.
pub struct RgbMatrixPanel {
    matrix: LedMatrix,
    offscreen: Option<LedCanvas>,
    capabilities: SurfaceCapabilities,
}

// SAFETY: the matrix and its canvases are only touched through &mut self,
// which the scheduler serialises behind its core mutex; the C library's
// refresh thread never shares these handles with Rust code.
unsafe impl Send for RgbMatrixPanel {}

impl RgbMatrixPanel {
    pub fn new(config: &MatrixConfig) -> Result<Self, DisplayError> {
        let mut options = LedMatrixOptions::new();
        options.set_rows(config.rows());
        options.set_cols(config.cols());
        options.set_chain_length(config.chain_length());
        options.set_parallel(config.parallel());
        options.set_hardware_mapping(config.hardware_mapping());
        options
            .set_brightness(config.brightness())
            .map_err(|e| DisplayError::InvalidConfiguration(e.to_string()))?;

        let mut runtime = LedRuntimeOptions::new();
        runtime.set_gpio_slowdown(config.gpio_slowdown());

        let matrix = LedMatrix::new(Some(options), Some(runtime))
            .map_err(|e| DisplayError::InitializationFailed(e.to_string()))?;
        let offscreen = Some(matrix.offscreen_canvas());

        info!(
            "RGB matrix ready: {}x{} chain={} parallel={} mapping={}",
            config.cols(), config.rows(), config.chain_length(),
            config.parallel(), config.hardware_mapping()
        );

        Ok(Self {
            matrix,
            offscreen,
            capabilities: SurfaceCapabilities {
                width: config.width(),
                height: config.height(),
                supports_brightness: false,
            },
        })
    }
}

impl MatrixSurface for RgbMatrixPanel {
    fn capabilities(&self) -> &SurfaceCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        // the library starts its refresh thread in LedMatrix::new
        debug!("RGB matrix init");
        self.clear()
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut canvas = self.offscreen.take().unwrap_or_else(|| self.matrix.offscreen_canvas());
        canvas.clear();
        self.offscreen = Some(self.matrix.swap(canvas));
        Ok(())
    }

    fn present(&mut self, frame: &Canvas) -> Result<(), DisplayError> {
        self.check_frame(frame)?;
        let mut canvas = self.offscreen.take().unwrap_or_else(|| self.matrix.offscreen_canvas());

        let w = frame.width() as usize;
        for (i, px) in frame.as_slice().iter().enumerate() {
            let color = LedColor { red: px.r(), green: px.g(), blue: px.b() };
            canvas.set((i % w) as i32, (i / w) as i32, &color);
        }

        self.offscreen = Some(self.matrix.swap(canvas));
        Ok(())
    }
}
