/*
 *  display/mod.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Display subsystem - matrix surfaces, transitions and the scheduler
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod canvas;
pub mod factory;

// Panel backends (HUB75 only with the hardware feature)
pub mod drivers;

// Plugin switching
pub mod transition;
pub mod cycle;
pub mod scheduler;

// Re-exports for convenience
pub use traits::{MatrixSurface, SurfaceCapabilities};
pub use error::DisplayError;
pub use canvas::Canvas;
pub use factory::{BoxedSurface, SurfaceFactory};
pub use transition::{TransitionDescriptor, TransitionError, TransitionRenderer};
pub use cycle::{CycleSettings, PluginCycler};
pub use scheduler::{
    BrightnessApplied, DisplayScheduler, SchedulerError, SchedulerOptions, SchedulerState,
    SchedulerStatus,
};
