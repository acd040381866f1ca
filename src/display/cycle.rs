/*
 *  display/cycle.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Plugin cycler - timed auto-advance through a configured plugin list
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

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const MIN_CYCLE_SECS: u64 = 10;
pub const MAX_CYCLE_SECS: u64 = 3600;
pub const DEFAULT_CYCLE_SECS: u64 = 30;

/// Clamp a requested cycle duration into the supported window
pub fn clamp_duration(secs: i64) -> u64 {
    secs.clamp(MIN_CYCLE_SECS as i64, MAX_CYCLE_SECS as i64) as u64
}

/// Cycling policy as stored under `plugin_cycle`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSettings {
    pub enabled: bool,
    pub plugins: Vec<String>,
    pub duration: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            plugins: Vec::new(),
            duration: DEFAULT_CYCLE_SECS,
        }
    }
}

/// Plugin cycler - decides when and where the scheduler auto-advances
#[derive(Debug)]
pub struct PluginCycler {
    settings: CycleSettings,
    last_switch: Instant,
}

impl PluginCycler {
    pub fn new(settings: CycleSettings) -> Self {
        Self {
            settings,
            last_switch: Instant::now(),
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled && !self.settings.plugins.is_empty()
    }

    /// Replace the policy and restart the timer
    pub fn apply(&mut self, settings: CycleSettings) {
        self.settings = settings;
        self.last_switch = Instant::now();
    }

    /// Restart the timer
    pub fn mark_switched(&mut self) {
        self.last_switch = Instant::now();
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.settings.duration)
    }

    /// True once the current plugin has been shown for a full period
    pub fn is_due(&self, now: Instant) -> bool {
        self.enabled() && now.saturating_duration_since(self.last_switch) >= self.period()
    }

    /// Next plugin after `current`, wrapping. A current plugin that is not
    /// in the list restarts the cycle at its first entry.
    pub fn next_after(&self, current: Option<&str>) -> Option<&str> {
        let plugins = &self.settings.plugins;
        if plugins.is_empty() {
            return None;
        }
        let next = current
            .and_then(|c| plugins.iter().position(|p| p == c))
            .map_or(0, |i| (i + 1) % plugins.len());
        Some(plugins[next].as_str())
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        if let Some(t) = self.last_switch.checked_sub(by) {
            self.last_switch = t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycler(names: &[&str], duration: u64) -> PluginCycler {
        PluginCycler::new(CycleSettings {
            enabled: true,
            plugins: names.iter().map(|s| s.to_string()).collect(),
            duration,
        })
    }

    #[test]
    fn test_clamp_duration() {
        assert_eq!(clamp_duration(5), 10);
        assert_eq!(clamp_duration(-3), 10);
        assert_eq!(clamp_duration(9999), 3600);
        assert_eq!(clamp_duration(45), 45);
    }

    #[test]
    fn test_next_after_wraps() {
        let c = cycler(&["clock", "moon", "gif"], 30);
        assert_eq!(c.next_after(Some("clock")), Some("moon"));
        assert_eq!(c.next_after(Some("gif")), Some("clock"));
        // not in list: restart at the head
        assert_eq!(c.next_after(Some("weather")), Some("clock"));
        assert_eq!(c.next_after(None), Some("clock"));
    }

    #[test]
    fn test_due_timing() {
        let mut c = cycler(&["clock", "moon"], 10);
        assert!(!c.is_due(Instant::now()));

        c.backdate(Duration::from_secs(11));
        assert!(c.is_due(Instant::now()));

        c.mark_switched();
        assert!(!c.is_due(Instant::now()));
    }

    #[test]
    fn test_disabled_never_due() {
        let mut c = cycler(&["clock"], 10);
        c.apply(CycleSettings { enabled: false, ..c.settings().clone() });
        c.backdate(Duration::from_secs(60));
        assert!(!c.is_due(Instant::now()));

        let mut empty = cycler(&[], 10);
        empty.backdate(Duration::from_secs(60));
        assert!(!empty.is_due(Instant::now()));
    }
}
