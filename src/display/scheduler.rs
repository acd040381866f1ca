/*
 *  display/scheduler.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Display scheduler - active plugin, frame loop, switches and cycling
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;

use crate::config::SchedulerConfig;
use crate::display::canvas::Canvas;
use crate::display::cycle::{clamp_duration, CycleSettings, PluginCycler, DEFAULT_CYCLE_SECS};
use crate::display::error::DisplayError;
use crate::display::factory::BoxedSurface;
use crate::display::transition::{TransitionDescriptor, TransitionRenderer};
use crate::plugin::{ConfigExt, Plugin, PluginRegistry};
use crate::store::{ConfigStore, StoreError};

/// Name of the plugin that owns the gif sub-selection
pub const GIF_PLUGIN: &str = "gif";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Plugin {0} not found")]
    PluginNotFound(String),
    #[error("Plugin {plugin} failed to set up: {reason}")]
    PluginSetupFailure { plugin: String, reason: String },
    #[error("No plugins loaded")]
    NoPlugins,
    #[error("No plugin could be activated")]
    NoActivePlugin,
    #[error("Display scheduler is stopped")]
    Stopped,
    #[error("Invalid brightness value: {0}")]
    InvalidBrightness(i64),
    #[error("Failed to persist state: {0}")]
    Persist(#[from] StoreError),
    #[error("Display error: {0}")]
    Display(#[from] DisplayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// startup, nothing shown yet
    Idle,
    Active(String),
    Transitioning { from: Option<String>, to: String },
    Stopped,
}

impl SchedulerState {
    pub fn label(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Active(_) => "active",
            SchedulerState::Transitioning { .. } => "transitioning",
            SchedulerState::Stopped => "stopped",
        }
    }
}

/// Snapshot published after every state change
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub current_plugin: Option<String>,
    pub running: bool,
    pub current_gif: String,
    pub plugins: Vec<String>,
    pub cycle: CycleSettings,
}

/// How a brightness change reached the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessApplied {
    Immediate,
    /// stored, takes effect when the panel is next opened
    Restart,
}

impl BrightnessApplied {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrightnessApplied::Immediate => "immediate",
            BrightnessApplied::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// sleep between frame ticks
    pub frame_interval: Duration,
    pub transition: TransitionDescriptor,
    /// wins over `plugins.default` in the store
    pub default_plugin: Option<String>,
    /// one-shot startup selection (`--display-mode`)
    pub display_mode: Option<String>,
    /// one-shot gif selection (`--gif-name`)
    pub gif_name: Option<String>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(10),
            transition: TransitionDescriptor::default(),
            default_plugin: None,
            display_mode: None,
            gif_name: None,
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            frame_interval: Duration::from_millis(cfg.frame_interval_ms()),
            transition: TransitionDescriptor::from_config(cfg),
            ..Self::default()
        }
    }
}

/// Everything touched by a switch or a tick; guarded by one mutex
struct SchedulerCore {
    registry: PluginRegistry,
    surface: BoxedSurface,
    canvas: Canvas,
    last_frame: Option<Canvas>,
    active: Option<String>,
    cycle: PluginCycler,
    last_tick: Instant,
    stopped: bool,
}

/// Owns the active plugin and drives it.
///
/// A switch holds the core lock from target setup to the first frame of the
/// new plugin, and every tick of the frame loop takes the same lock, so the
/// loop never sees a plugin mid-teardown and only one switch is in flight.
/// Status reads go through a watch channel and never wait on the lock.
pub struct DisplayScheduler {
    core: Mutex<SchedulerCore>,
    store: Arc<dyn ConfigStore>,
    options: SchedulerOptions,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl DisplayScheduler {
    pub fn new(
        registry: PluginRegistry,
        surface: BoxedSurface,
        store: Arc<dyn ConfigStore>,
        options: SchedulerOptions,
    ) -> Self {
        let (w, h) = surface.dimensions();
        let status = SchedulerStatus {
            state: SchedulerState::Idle,
            current_plugin: None,
            running: false,
            current_gif: store.get_str("current_state", "current_gif").unwrap_or_default(),
            plugins: registry.names(),
            cycle: CycleSettings::default(),
        };
        let (status_tx, _) = watch::channel(status);

        Self {
            core: Mutex::new(SchedulerCore {
                registry,
                surface,
                canvas: Canvas::new(w, h),
                last_frame: None,
                active: None,
                cycle: PluginCycler::new(CycleSettings::default()),
                last_tick: Instant::now(),
                stopped: false,
            }),
            store,
            options,
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerCore> {
        self.core.lock().unwrap_or_else(|poisoned| {
            error!("Scheduler lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Latest published status; never blocks on a switch
    pub fn status(&self) -> SchedulerStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }

    pub fn active_plugin(&self) -> Option<String> {
        self.status_tx.borrow().current_plugin.clone()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.status_tx.borrow().plugins.clone()
    }

    /// Run `f` against a loaded plugin under the scheduler lock
    pub fn with_plugin<R>(&self, name: &str, f: impl FnOnce(&dyn Plugin) -> R) -> Option<R> {
        let core = self.lock();
        core.registry.get(name).map(f)
    }

    /// Pick the first plugin and restore cycling and gif state.
    ///
    /// Candidates in order: `--display-mode`, the persisted
    /// `current_state.current_plugin`, the default plugin, the first loaded
    /// plugin. A candidate that is missing or fails setup hands over to the
    /// next; when none activates startup fails.
    pub fn startup(&self) -> Result<String, SchedulerError> {
        let mut core = self.lock();
        if core.stopped {
            return Err(SchedulerError::Stopped);
        }
        if core.registry.is_empty() {
            return Err(SchedulerError::NoPlugins);
        }

        let cycle = self.restore_cycle(&core.registry);
        core.cycle.apply(cycle);

        let gif = self
            .options
            .gif_name
            .clone()
            .or_else(|| self.store.get_str("current_state", "current_gif"))
            .filter(|g| !g.is_empty());
        if let (Some(gif), Some(plugin)) = (gif, core.registry.get_mut(GIF_PLUGIN)) {
            debug!("Restoring gif selection '{}'", gif);
            plugin.config_mut().insert("current_gif".to_string(), Value::String(gif));
        }

        let candidates = [
            self.options.display_mode.clone(),
            self.store.get_str("current_state", "current_plugin"),
            self.default_plugin(),
            core.registry.first().map(str::to_string),
        ];

        for name in candidates.into_iter().flatten() {
            if !core.registry.contains(&name) {
                info!("Plugin '{}' not available, falling back", name);
                continue;
            }
            match self.switch_locked(&mut core, &name) {
                Ok(()) => {
                    core.cycle.mark_switched();
                    core.last_tick = Instant::now();
                    info!("Starting with plugin: {}", name);
                    return Ok(name);
                }
                Err(e) => warn!("Cannot start with '{}': {}", name, e),
            }
        }

        self.publish(&core, SchedulerState::Idle);
        Err(SchedulerError::NoActivePlugin)
    }

    fn default_plugin(&self) -> Option<String> {
        self.options
            .default_plugin
            .clone()
            .or_else(|| self.store.get_str("plugins", "default"))
    }

    fn restore_cycle(&self, registry: &PluginRegistry) -> CycleSettings {
        let plugins = self
            .store
            .get_str_list("plugin_cycle", "plugins")
            .into_iter()
            .filter(|name| registry.contains(name))
            .collect();
        let duration = self
            .store
            .get_i64("plugin_cycle", "duration")
            .map_or(DEFAULT_CYCLE_SECS, clamp_duration);
        CycleSettings {
            enabled: self.store.get_bool("plugin_cycle", "enabled").unwrap_or(false),
            plugins,
            duration,
        }
    }

    /// Make `name` the active plugin.
    ///
    /// Fails with `PluginNotFound` before touching anything, and with
    /// `PluginSetupFailure` while the previous plugin is still active and
    /// running. Switching to the active plugin is a no-op.
    pub fn switch_to(&self, name: &str) -> Result<(), SchedulerError> {
        let mut core = self.lock();
        self.switch_locked(&mut core, name)
    }

    fn switch_locked(&self, core: &mut SchedulerCore, name: &str) -> Result<(), SchedulerError> {
        if core.stopped {
            debug!("Ignoring switch to {} after shutdown", name);
            return Err(SchedulerError::Stopped);
        }
        if !core.registry.contains(name) {
            warn!("Plugin {} not found", name);
            return Err(SchedulerError::PluginNotFound(name.to_string()));
        }
        if core.active.as_deref() == Some(name) {
            debug!("Plugin {} already active", name);
            return Ok(());
        }

        let from = core.active.clone();
        info!("Switching plugin {:?} -> {}", from, name);
        self.publish(core, SchedulerState::Transitioning { from: from.clone(), to: name.to_string() });

        // target first, so a failure leaves the current plugin untouched
        if let Some(target) = core.registry.get_mut(name) {
            if let Err(e) = target.setup() {
                warn!("Plugin {} setup failed, keeping {:?}: {}", name, from, e);
                target.cleanup();
                let state = from.clone().map_or(SchedulerState::Idle, SchedulerState::Active);
                self.publish(core, state);
                return Err(SchedulerError::PluginSetupFailure {
                    plugin: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        if from.is_some() {
            let SchedulerCore { surface, canvas, last_frame, .. } = &mut *core;
            if let Err(e) = TransitionRenderer::run(
                &self.options.transition,
                surface.as_mut(),
                canvas,
                last_frame.as_ref(),
                from.as_deref(),
            ) {
                warn!("Transition skipped: {}", e);
            }
        }

        if let Some(outgoing) = from.as_deref().and_then(|f| core.registry.get_mut(f)) {
            outgoing.stop();
            outgoing.cleanup();
        }

        core.active = Some(name.to_string());
        let mut persisted = vec![("current_plugin".to_string(), json!(name))];
        if let Some(plugin) = core.registry.get_mut(name) {
            plugin.start();
            if name == GIF_PLUGIN {
                persisted.push(("current_gif".to_string(), json!(plugin.config().str_or("current_gif", ""))));
            }
        }

        if let Err(e) = self.store.set_many("current_state", persisted) {
            warn!("Could not persist current plugin {}: {}", name, e);
        }

        core.last_tick = Instant::now();
        Self::render_frame(core);
        self.publish(core, SchedulerState::Active(name.to_string()));
        info!("Switched to plugin: {}", name);
        Ok(())
    }

    /// One frame: cycle check, update, render, present
    pub fn tick(&self) {
        let mut core = self.lock();
        if core.stopped {
            return;
        }

        if core.cycle.is_due(Instant::now()) {
            self.advance_cycle(&mut core);
        }

        let now = Instant::now();
        let delta = now.duration_since(core.last_tick).as_secs_f32();
        core.last_tick = now;

        let Some(name) = core.active.clone() else {
            return;
        };
        let still_running = match core.registry.get_mut(&name) {
            Some(plugin) => {
                plugin.update(delta);
                plugin.is_running()
            }
            None => true,
        };
        if !still_running {
            self.hand_off(&mut core, &name);
        }

        Self::render_frame(&mut core);
    }

    /// Switch to the next cycle entry that activates; entries failing setup
    /// are skipped until the list wraps back to the active plugin
    fn advance_cycle(&self, core: &mut SchedulerCore) {
        let entries = core.cycle.settings().plugins.len();
        let mut previous = core.active.clone();
        for _ in 0..entries {
            let Some(next) = core.cycle.next_after(previous.as_deref()).map(str::to_string) else {
                break;
            };
            if core.active.as_deref() == Some(next.as_str()) {
                break;
            }
            info!("Cycling to plugin: {}", next);
            match self.switch_locked(core, &next) {
                Ok(()) => break,
                Err(e) => warn!("Cycle switch to {} failed, skipping: {}", next, e),
            }
            previous = Some(next);
        }
        core.cycle.mark_switched();
        if let Err(e) = self.store.set("plugin_cycle", "last_switch", json!(Utc::now().timestamp())) {
            warn!("Could not persist cycle timestamp: {}", e);
        }
    }

    /// The active plugin stopped itself; move on
    fn hand_off(&self, core: &mut SchedulerCore, stopped: &str) {
        let target = if core.cycle.enabled() {
            core.cycle.next_after(Some(stopped)).map(str::to_string)
        } else {
            self.default_plugin()
                .filter(|d| d != stopped && core.registry.contains(d))
                .or_else(|| core.registry.names().into_iter().find(|n| n != stopped))
        };

        if let Some(target) = target.filter(|t| t != stopped) {
            info!("Plugin {} finished, handing off to {}", stopped, target);
            match self.switch_locked(core, &target) {
                Ok(()) => {
                    if core.cycle.enabled() {
                        core.cycle.mark_switched();
                    }
                    return;
                }
                Err(e) => warn!("Hand-off to {} failed: {}", target, e),
            }
        }

        if let Some(plugin) = core.registry.get_mut(stopped) {
            debug!("Restarting plugin {}", stopped);
            if let Err(e) = plugin.setup() {
                warn!("Plugin {} restart failed: {}", stopped, e);
            }
            plugin.start();
        }
        self.publish(core, SchedulerState::Active(stopped.to_string()));
    }

    fn render_frame(core: &mut SchedulerCore) {
        let SchedulerCore { registry, surface, canvas, last_frame, active, .. } = core;
        let Some(plugin) = active.as_deref().and_then(|name| registry.get_mut(name)) else {
            return;
        };

        canvas.clear_black();
        plugin.render(canvas);
        if let Err(e) = surface.present(canvas) {
            warn!("Frame present failed: {}", e);
        }

        match last_frame {
            Some(frame) => frame.copy_from(canvas),
            None => *last_frame = Some(canvas.clone()),
        }
    }

    /// Frame loop; returns after `stop` is raised and the active plugin
    /// has been stopped and cleaned up.
    ///
    /// Runs `startup` first when nothing is active yet, and fails instead of
    /// looping over an empty panel when no plugin can be activated.
    pub fn run(&self, stop: &AtomicBool) -> Result<(), SchedulerError> {
        let needs_startup = {
            let core = self.lock();
            if core.stopped {
                return Err(SchedulerError::Stopped);
            }
            core.active.is_none()
        };
        if needs_startup {
            self.startup()?;
        }

        info!("Frame loop started ({:?} per tick)", self.options.frame_interval);
        while !stop.load(Ordering::Relaxed) {
            self.tick();
            std::thread::sleep(self.options.frame_interval);
        }
        self.shutdown();
        Ok(())
    }

    pub fn shutdown(&self) {
        let mut core = self.lock();
        if core.stopped {
            return;
        }
        if let Some(name) = core.active.take() {
            if let Some(plugin) = core.registry.get_mut(&name) {
                info!("Stopping plugin: {}", name);
                plugin.stop();
                plugin.cleanup();
            }
        }
        if let Err(e) = core.surface.clear() {
            warn!("Panel clear on shutdown failed: {}", e);
        }
        core.stopped = true;
        self.publish(&core, SchedulerState::Stopped);
        info!("Display scheduler stopped");
    }

    /// Apply a cycling policy.
    ///
    /// Unknown names are dropped and the duration clamped to 10..=3600
    /// seconds. The timer restarts now; enabling with a non-empty list
    /// switches to its first entry right away.
    pub fn set_plugin_cycling(
        &self,
        enabled: bool,
        names: &[String],
        duration: i64,
    ) -> Result<CycleSettings, SchedulerError> {
        let mut core = self.lock();
        if core.stopped {
            return Err(SchedulerError::Stopped);
        }

        let mut plugins: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !core.registry.contains(name) {
                debug!("Dropping unknown plugin '{}' from cycle", name);
            } else if !plugins.contains(name) {
                plugins.push(name.clone());
            }
        }
        let settings = CycleSettings { enabled, plugins, duration: clamp_duration(duration) };
        core.cycle.apply(settings.clone());

        let persisted = vec![
            ("enabled".to_string(), json!(settings.enabled)),
            ("plugins".to_string(), json!(settings.plugins)),
            ("duration".to_string(), json!(settings.duration)),
            ("last_switch".to_string(), json!(Utc::now().timestamp())),
        ];
        if let Err(e) = self.store.set_many("plugin_cycle", persisted) {
            warn!("Could not persist plugin cycle: {}", e);
        }

        info!(
            "Plugin cycling {}: {:?} every {}s",
            if enabled { "enabled" } else { "disabled" },
            settings.plugins,
            settings.duration
        );

        if let Some(first) = settings.plugins.first().filter(|_| enabled) {
            if let Err(e) = self.switch_locked(&mut core, first) {
                warn!("Cycle start with {} failed: {}", first, e);
            }
            core.cycle.mark_switched();
        }

        let state = core.active.clone().map_or(SchedulerState::Idle, SchedulerState::Active);
        self.publish(&core, state);
        Ok(settings)
    }

    /// Select a gif. Reloads in place when the gif plugin is showing,
    /// otherwise switches to it.
    pub fn set_gif(&self, gif: &str) -> Result<(), SchedulerError> {
        let mut core = self.lock();
        if core.stopped {
            return Err(SchedulerError::Stopped);
        }
        let Some(plugin) = core.registry.get_mut(GIF_PLUGIN) else {
            return Err(SchedulerError::PluginNotFound(GIF_PLUGIN.to_string()));
        };
        plugin.config_mut().insert("current_gif".to_string(), Value::String(gif.to_string()));

        if core.active.as_deref() == Some(GIF_PLUGIN) {
            if let Some(plugin) = core.registry.get_mut(GIF_PLUGIN) {
                plugin.reload();
            }
            Self::render_frame(&mut core);
            if let Err(e) = self.store.set("current_state", "current_gif", json!(gif)) {
                warn!("Could not persist gif selection: {}", e);
            }
            self.publish(&core, SchedulerState::Active(GIF_PLUGIN.to_string()));
        } else {
            self.switch_locked(&mut core, GIF_PLUGIN)?;
        }
        info!("GIF set to: {}", gif);
        Ok(())
    }

    /// Validate, apply to the panel when it allows, and persist
    pub fn set_brightness(&self, level: i64) -> Result<BrightnessApplied, SchedulerError> {
        if !(1..=100).contains(&level) {
            return Err(SchedulerError::InvalidBrightness(level));
        }

        let applied = {
            let mut core = self.lock();
            if !core.surface.capabilities().supports_brightness {
                debug!("Panel applies brightness at startup only");
                BrightnessApplied::Restart
            } else {
                match core.surface.set_brightness(level as u8) {
                    Ok(()) => BrightnessApplied::Immediate,
                    Err(DisplayError::UnsupportedOperation) => BrightnessApplied::Restart,
                    Err(e) => {
                        warn!("Panel rejected brightness {}: {}", level, e);
                        BrightnessApplied::Restart
                    }
                }
            }
        };

        self.store.set("matrix", "brightness", json!(level))?;
        info!("Brightness set to {} ({})", level, applied.as_str());
        Ok(applied)
    }

    fn publish(&self, core: &SchedulerCore, state: SchedulerState) {
        let running = core
            .active
            .as_deref()
            .and_then(|name| core.registry.get(name))
            .is_some_and(|p| p.is_running());
        let current_gif = core
            .registry
            .get(GIF_PLUGIN)
            .map(|p| p.config().str_or("current_gif", "").to_string())
            .or_else(|| self.store.get_str("current_state", "current_gif"))
            .unwrap_or_default();

        self.status_tx.send_replace(SchedulerStatus {
            state,
            current_plugin: core.active.clone(),
            running,
            current_gif,
            plugins: core.registry.names(),
            cycle: core.cycle.settings().clone(),
        });
    }
}
