/*
 *  plugin/mod.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Display plugin contract
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

use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::display::canvas::Canvas;

pub mod registry;
pub mod refresh;

pub mod clock;
pub mod gif;
pub mod intro;
pub mod moon;
pub mod weather;

pub use registry::{PluginCatalog, PluginFactory, PluginRegistry};

/// String-keyed configuration map of one plugin
pub type PluginConfig = Map<String, Value>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{plugin}: setup failed: {reason}")]
    Setup { plugin: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no async runtime available for background refresh")]
    NoRuntime,
}

/// What a plugin may know about its environment at construction
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub width: u32,
    pub height: u32,
    /// runtime for background data refresh; None in purely sync tests
    pub runtime: Option<tokio::runtime::Handle>,
    /// base for relative resource paths (gif directory)
    pub resource_dir: PathBuf,
    /// `api_keys` section of the state document
    pub api_keys: PluginConfig,
}

impl PluginContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            runtime: None,
            resource_dir: PathBuf::from("."),
            api_keys: PluginConfig::new(),
        }
    }
}

/// State every plugin carries
#[derive(Debug, Clone)]
pub struct PluginBase {
    name: String,
    description: String,
    pub config: PluginConfig,
    running: bool,
}

impl PluginBase {
    /// Build with `defaults` overlaid by persisted `overrides`
    pub fn new(name: &str, description: &str, defaults: PluginConfig, overrides: PluginConfig) -> Self {
        let mut config = defaults;
        merge_config(&mut config, overrides);
        Self {
            name: name.to_string(),
            description: description.to_string(),
            config,
            running: false,
        }
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }
}

/// Overlay `src` onto `dst`; nested maps merge key by key
pub fn merge_config(dst: &mut PluginConfig, src: PluginConfig) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Object(d)), Value::Object(s)) => merge_config(d, s),
            (_, value) => {
                dst.insert(key, value);
            }
        }
    }
}

/// A unit of display behaviour.
///
/// The scheduler drives the lifecycle: `setup` on activation (once per
/// activation), `start`, then `update`/`render` every tick, then `stop` and
/// `cleanup` on deactivation. Data source failures are handled inside the
/// plugin, which renders a degraded message instead; `setup` only returns an
/// error when the plugin cannot be shown at all.
pub trait Plugin: Send {
    fn base(&self) -> &PluginBase;
    fn base_mut(&mut self) -> &mut PluginBase;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn description(&self) -> &str {
        &self.base().description
    }

    fn config(&self) -> &PluginConfig {
        &self.base().config
    }

    fn config_mut(&mut self) -> &mut PluginConfig {
        &mut self.base_mut().config
    }

    fn is_running(&self) -> bool {
        self.base().running
    }

    fn start(&mut self) {
        self.base_mut().set_running(true);
    }

    fn stop(&mut self) {
        self.base_mut().set_running(false);
    }

    /// Per-activation initialisation; may block on I/O
    fn setup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Advance timers by `delta` seconds; must not block
    fn update(&mut self, delta: f32);

    /// Draw one frame; safe to call after a failed or skipped setup
    fn render(&mut self, canvas: &mut Canvas);

    /// Drop per-activation resources; safe without a prior setup
    fn cleanup(&mut self) {}

    /// Re-read configuration in place; true when something changed
    fn reload(&mut self) -> bool {
        false
    }
}

/// Typed reads from a plugin configuration map
pub trait ConfigExt {
    fn bool_or(&self, key: &str, default: bool) -> bool;
    fn u64_or(&self, key: &str, default: u64) -> u64;
    fn f64_or(&self, key: &str, default: f64) -> f64;
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
}

impl ConfigExt for PluginConfig {
    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }
}

/// Shorthand for building default maps from `json!` object literals
pub fn defaults(value: Value) -> PluginConfig {
    match value {
        Value::Object(map) => map,
        _ => PluginConfig::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Blank(PluginBase);

    impl Plugin for Blank {
        fn base(&self) -> &PluginBase { &self.0 }
        fn base_mut(&mut self) -> &mut PluginBase { &mut self.0 }
        fn update(&mut self, _delta: f32) {}
        fn render(&mut self, _canvas: &mut Canvas) {}
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let base = PluginBase::new(
            "blank",
            "test",
            defaults(json!({ "a": 1, "nested": { "x": 1, "y": 2 } })),
            defaults(json!({ "a": 5, "nested": { "y": 9 }, "extra": true })),
        );
        assert_eq!(base.config["a"], json!(5));
        assert_eq!(base.config["nested"], json!({ "x": 1, "y": 9 }));
        assert_eq!(base.config["extra"], json!(true));
    }

    #[test]
    fn test_start_stop_flip_running() {
        let mut p = Blank(PluginBase::new("blank", "test", PluginConfig::new(), PluginConfig::new()));
        assert!(!p.is_running());
        p.start();
        assert!(p.is_running());
        p.stop();
        assert!(!p.is_running());
        assert_eq!(p.name(), "blank");
    }

    #[test]
    fn test_config_ext() {
        let cfg = defaults(json!({ "on": true, "n": 7, "s": "x" }));
        assert!(cfg.bool_or("on", false));
        assert_eq!(cfg.u64_or("n", 0), 7);
        assert_eq!(cfg.u64_or("missing", 3), 3);
        assert_eq!(cfg.str_or("s", "y"), "x");
        assert_eq!(cfg.str_or("n", "y"), "y");
    }
}
