/*
 *  display/factory.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Surface factory - selects the matrix backend from configuration
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

use crate::config::{BackendKind, MatrixConfig};
use crate::display::drivers::virtual_panel::VirtualPanel;
use crate::display::error::DisplayError;
use crate::display::traits::MatrixSurface;
use log::info;

#[cfg(feature = "hardware")]
use crate::display::drivers::rgbmatrix::RgbMatrixPanel;

/// Type alias for boxed surface trait objects
pub type BoxedSurface = Box<dyn MatrixSurface>;

/// Factory for creating matrix surfaces from configuration
pub struct SurfaceFactory;

impl SurfaceFactory {
    /// Create and initialize a surface from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Matrix geometry, wiring and backend selection
    ///
    /// # Returns
    ///
    /// A boxed trait object implementing MatrixSurface, or an error if the
    /// configuration is invalid or the backend is not compiled in.
    pub fn create(config: &MatrixConfig) -> Result<BoxedSurface, DisplayError> {
        Self::validate_config(config)?;

        let mut surface: BoxedSurface = match config.backend() {
            BackendKind::Virtual => {
                info!("Creating virtual panel {}x{}", config.width(), config.height());
                Box::new(VirtualPanel::new(config))
            }

            #[cfg(feature = "hardware")]
            BackendKind::Hardware => {
                info!("Creating HUB75 panel {}x{}", config.width(), config.height());
                Box::new(RgbMatrixPanel::new(config)?)
            }

            #[cfg(not(feature = "hardware"))]
            BackendKind::Hardware => {
                return Err(DisplayError::InvalidConfiguration(
                    "hardware backend not enabled. Enable with --features hardware".to_string()
                ));
            }
        };

        surface.init()?;
        Ok(surface)
    }

    /// Validate a configuration without creating a surface
    pub fn validate_config(config: &MatrixConfig) -> Result<(), DisplayError> {
        if config.width() == 0 || config.height() == 0 {
            return Err(DisplayError::InvalidConfiguration(
                "matrix geometry must be non-zero".to_string()
            ));
        }
        if !(1..=100).contains(&config.brightness()) {
            return Err(DisplayError::InvalidBrightness(config.brightness()));
        }
        Ok(())
    }
}
