/*
 *  display/drivers/virtual_panel.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Headless matrix surface - keeps frames in memory
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

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::MatrixConfig;
use crate::display::canvas::Canvas;
use crate::display::error::DisplayError;
use crate::display::traits::{MatrixSurface, SurfaceCapabilities};

/// Virtual matrix panel
///
/// Simulates the LED matrix without hardware. It's used for:
/// - Unit and integration tests
/// - Development on a desktop
/// - Running the daemon on a box with no panel attached
///
/// Every operation is recorded in a shared state block so tests can hold a
/// handle to it after the panel has been boxed and handed to the scheduler.
#[derive(Debug, Clone)]
pub struct VirtualPanel {
    capabilities: SurfaceCapabilities,
    state: Arc<Mutex<VirtualPanelState>>,
}

/// Internal state for the virtual panel (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct VirtualPanelState {
    /// Number of times init() was called
    pub init_count: usize,

    /// Number of frames presented
    pub present_count: usize,

    /// Number of times clear() was called
    pub clear_count: usize,

    /// Last brightness value set
    pub last_brightness: Option<u8>,

    /// Whether the panel is initialized
    pub is_initialized: bool,

    /// Copy of the most recent frame on the panel
    pub last_frame: Option<Canvas>,

    /// Simulate failures (for error testing)
    pub simulate_present_failure: bool,
    pub simulate_init_failure: bool,

    /// Behave like a backend with construction-time brightness only
    pub brightness_unsupported: bool,
}

impl VirtualPanel {
    pub fn new(config: &MatrixConfig) -> Self {
        let capabilities = SurfaceCapabilities {
            width: config.width(),
            height: config.height(),
            supports_brightness: true,
        };
        let state = VirtualPanelState {
            last_brightness: Some(config.brightness()),
            ..Default::default()
        };

        Self {
            capabilities,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create a virtual panel with specific dimensions
    pub fn with_size(width: u32, height: u32) -> Self {
        let config = MatrixConfig {
            rows: Some(height),
            cols: Some(width),
            ..Default::default()
        };
        Self::new(&config)
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<VirtualPanelState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, VirtualPanelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count lit pixels of the frame currently on the panel
    pub fn lit_pixels(&self) -> usize {
        self.lock().last_frame.as_ref().map_or(0, Canvas::lit_pixels)
    }

    /// Save the panel contents to a binary PPM file (visual debugging)
    pub fn save_to_ppm(&self, path: &Path) -> Result<(), DisplayError> {
        use std::io::Write;

        let (w, h) = self.dimensions();
        let state = self.lock();
        let blank = Canvas::new(w, h);
        let frame = state.last_frame.as_ref().unwrap_or(&blank);

        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        write!(file, "P6\n{} {}\n255\n", w, h)?;
        for px in frame.as_slice() {
            use embedded_graphics::pixelcolor::RgbColor;
            file.write_all(&[px.r(), px.g(), px.b()])?;
        }
        file.flush()?;
        Ok(())
    }
}

impl MatrixSurface for VirtualPanel {
    fn capabilities(&self) -> &SurfaceCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock();

        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }

        state.init_count += 1;
        state.is_initialized = true;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let (w, h) = self.dimensions();
        let mut state = self.lock();
        state.clear_count += 1;
        state.last_frame = Some(Canvas::new(w, h));
        Ok(())
    }

    fn present(&mut self, canvas: &Canvas) -> Result<(), DisplayError> {
        self.check_frame(canvas)?;
        let mut state = self.lock();

        if state.simulate_present_failure {
            return Err(DisplayError::PresentFailed("Simulated present failure".to_string()));
        }

        match state.last_frame.as_mut() {
            Some(frame) => frame.copy_from(canvas),
            None => state.last_frame = Some(canvas.clone()),
        }
        state.present_count += 1;
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        if !(1..=100).contains(&level) {
            return Err(DisplayError::InvalidBrightness(level));
        }
        let mut state = self.lock();
        if state.brightness_unsupported {
            return Err(DisplayError::UnsupportedOperation);
        }
        state.last_brightness = Some(level);
        Ok(())
    }
}
