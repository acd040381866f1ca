/*
 *  plugin/registry.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Plugin catalogue and the registry of loaded plugins
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

use log::{info, warn};

use crate::plugin::{Plugin, PluginConfig, PluginContext, PluginError};
use crate::plugin::{clock::ClockPlugin, gif::GifPlugin, intro::IntroPlugin, moon::MoonPlugin, weather::WeatherPlugin};
use crate::store::ConfigStore;

/// Constructor for one plugin kind
pub type PluginFactory =
    Box<dyn Fn(&PluginContext, PluginConfig) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync>;

/// Fixed mapping from plugin name to constructor
pub struct PluginCatalog {
    factories: Vec<(String, PluginFactory)>,
}

impl PluginCatalog {
    pub fn empty() -> Self {
        Self { factories: Vec::new() }
    }

    /// Every plugin shipped with InfoCube
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register("clock", |ctx, cfg| Ok(Box::new(ClockPlugin::new(ctx, cfg))));
        catalog.register("gif", |ctx, cfg| Ok(Box::new(GifPlugin::new(ctx, cfg))));
        catalog.register("moon", |ctx, cfg| Ok(Box::new(MoonPlugin::new(ctx, cfg))));
        catalog.register("intro", |ctx, cfg| Ok(Box::new(IntroPlugin::new(ctx, cfg))));
        catalog.register("weather", |ctx, cfg| Ok(Box::new(WeatherPlugin::new(ctx, cfg)?)));
        catalog
    }

    /// Add or replace the constructor for `name`
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginContext, PluginConfig) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        self.factories.retain(|(n, _)| n != name);
        self.factories.push((name.to_string(), Box::new(factory)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn factory(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }
}

/// Loaded plugins, in load order. The set is fixed once `load` returns.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// Instantiate every enabled plugin with its persisted settings.
    /// Unknown names, duplicates and failing constructors are logged and
    /// skipped; the rest still load.
    pub fn load(
        enabled: &[String],
        catalog: &PluginCatalog,
        store: &dyn ConfigStore,
        ctx: &PluginContext,
    ) -> Self {
        let mut registry = Self::default();

        for name in enabled {
            if registry.contains(name) {
                warn!("Plugin '{}' listed twice, ignoring duplicate", name);
                continue;
            }
            let Some(factory) = catalog.factory(name) else {
                warn!("Unknown plugin '{}', skipping", name);
                continue;
            };
            match factory(ctx, store.plugin_settings(name)) {
                Ok(plugin) if plugin.name() == name.as_str() => {
                    info!("Loaded plugin: {} ({})", plugin.name(), plugin.description());
                    registry.plugins.push(plugin);
                }
                Ok(plugin) => {
                    warn!("Factory for '{}' produced plugin '{}', skipping", name, plugin.name());
                }
                Err(e) => {
                    warn!("Failed to load plugin '{}': {}", name, e);
                }
            }
        }

        info!("{} plugin(s) available: {:?}", registry.len(), registry.names());
        registry
    }

    /// Build from ready-made plugins (duplicate names keep the first)
    pub fn from_plugins(plugins: Vec<Box<dyn Plugin>>) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            if registry.contains(plugin.name()) {
                warn!("Plugin '{}' listed twice, ignoring duplicate", plugin.name());
                continue;
            }
            registry.plugins.push(plugin);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.iter().find(|p| p.name() == name).map(|p| &**p)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Plugin>> {
        self.plugins.iter_mut().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in load order
    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn first(&self) -> Option<&str> {
        self.plugins.first().map(|p| p.name())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::canvas::Canvas;
    use crate::plugin::PluginBase;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Stub(PluginBase);

    impl Plugin for Stub {
        fn base(&self) -> &PluginBase { &self.0 }
        fn base_mut(&mut self) -> &mut PluginBase { &mut self.0 }
        fn update(&mut self, _delta: f32) {}
        fn render(&mut self, _canvas: &mut Canvas) {}
    }

    fn catalog() -> PluginCatalog {
        let mut catalog = PluginCatalog::empty();
        for name in ["a", "b", "c"] {
            catalog.register(name, move |_, cfg| {
                Ok(Box::new(Stub(PluginBase::new(name, "stub", PluginConfig::new(), cfg))))
            });
        }
        catalog.register("broken", |_, _| {
            Err(PluginError::Setup { plugin: "broken".into(), reason: "no".into() })
        });
        catalog
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_skips_unknown_and_failing() {
        let store = MemoryStore::new(json!({}));
        let ctx = PluginContext::new(64, 32);
        let registry = PluginRegistry::load(
            &names(&["a", "missing", "broken", "c", "a"]),
            &catalog(),
            &store,
            &ctx,
        );
        assert_eq!(registry.names(), vec!["a", "c"]);
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.first(), Some("a"));
    }

    #[test]
    fn test_load_merges_persisted_settings() {
        let store = MemoryStore::new(json!({
            "plugins": { "settings": { "b": { "speed": 3 } } }
        }));
        let ctx = PluginContext::new(64, 32);
        let registry = PluginRegistry::load(&names(&["b"]), &catalog(), &store, &ctx);
        assert_eq!(registry.get("b").unwrap().config()["speed"], json!(3));
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = PluginCatalog::builtin();
        for name in ["clock", "gif", "moon", "intro", "weather"] {
            assert!(catalog.contains(name), "{name} missing");
        }
    }

    #[test]
    fn test_builtin_load_without_runtime() {
        let store = MemoryStore::with_defaults();
        let ctx = PluginContext::new(64, 32);
        let registry = PluginRegistry::load(
            &names(&["clock", "gif", "moon", "intro"]),
            &PluginCatalog::builtin(),
            &store,
            &ctx,
        );
        assert_eq!(registry.len(), 4);
    }
}
