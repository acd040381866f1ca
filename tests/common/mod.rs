/*
 *  tests/common/mod.rs
 *
 *  Shared fixtures for the integration tests
 */

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_graphics::pixelcolor::Rgb888;
use infocube::display::drivers::virtual_panel::VirtualPanel;
use infocube::display::{Canvas, DisplayScheduler, SchedulerOptions, TransitionDescriptor};
use infocube::plugin::{Plugin, PluginBase, PluginConfig, PluginError, PluginRegistry};
use infocube::store::MemoryStore;

/// Lifecycle calls in the order they happened, as "<call>:<plugin>"
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub struct Recorder {
    base: PluginBase,
    log: EventLog,
    fail_setup: bool,
    /// stops itself on its first update, like the intro plugin
    one_shot: bool,
}

impl Recorder {
    pub fn boxed(name: &str, log: &EventLog) -> Box<dyn Plugin> {
        Box::new(Self {
            base: PluginBase::new(name, "recorder", PluginConfig::new(), PluginConfig::new()),
            log: Arc::clone(log),
            fail_setup: false,
            one_shot: false,
        })
    }

    pub fn failing(name: &str, log: &EventLog) -> Box<dyn Plugin> {
        Box::new(Self {
            base: PluginBase::new(name, "recorder", PluginConfig::new(), PluginConfig::new()),
            log: Arc::clone(log),
            fail_setup: true,
            one_shot: false,
        })
    }

    pub fn one_shot(name: &str, log: &EventLog) -> Box<dyn Plugin> {
        Box::new(Self {
            base: PluginBase::new(name, "recorder", PluginConfig::new(), PluginConfig::new()),
            log: Arc::clone(log),
            fail_setup: false,
            one_shot: true,
        })
    }

    fn record(&self, call: &str) {
        let entry = format!("{}:{}", call, self.name());
        self.log.lock().unwrap().push(entry);
    }
}

impl Plugin for Recorder {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn setup(&mut self) -> Result<(), PluginError> {
        self.record("setup");
        if self.fail_setup {
            return Err(PluginError::Setup { plugin: self.name().to_string(), reason: "always fails".into() });
        }
        Ok(())
    }

    fn start(&mut self) {
        self.record("start");
        self.base.set_running(true);
    }

    fn stop(&mut self) {
        self.record("stop");
        self.base.set_running(false);
    }

    fn update(&mut self, _delta: f32) {
        if self.one_shot {
            self.base.set_running(false);
        }
    }

    fn render(&mut self, canvas: &mut Canvas) {
        canvas.set_pixel(0, 0, Rgb888::new(0, 255, 0));
    }

    fn cleanup(&mut self) {
        self.record("cleanup");
    }
}

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn take(log: &EventLog) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

pub fn quick_options() -> SchedulerOptions {
    SchedulerOptions {
        frame_interval: Duration::from_millis(1),
        transition: TransitionDescriptor { steps: 3, duration: Duration::from_millis(6), ..Default::default() },
        ..Default::default()
    }
}

pub struct Rig {
    pub scheduler: Arc<DisplayScheduler>,
    pub store: Arc<MemoryStore>,
    pub panel: VirtualPanel,
    pub log: EventLog,
}

/// Scheduler over recording plugins named `names`, on a 32x16 virtual panel
pub fn rig(names: &[&str], store: MemoryStore, options: SchedulerOptions) -> Rig {
    let log = new_log();
    let plugins = names.iter().map(|n| Recorder::boxed(n, &log)).collect();
    rig_with(plugins, log, store, options)
}

pub fn rig_with(plugins: Vec<Box<dyn Plugin>>, log: EventLog, store: MemoryStore, options: SchedulerOptions) -> Rig {
    let store = Arc::new(store);
    let panel = VirtualPanel::with_size(32, 16);
    let scheduler = Arc::new(DisplayScheduler::new(
        PluginRegistry::from_plugins(plugins),
        Box::new(panel.clone()),
        store.clone(),
        options,
    ));
    Rig { scheduler, store, panel, log }
}
