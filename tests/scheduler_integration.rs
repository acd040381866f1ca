/*
 *  tests/scheduler_integration.rs
 *
 *  Plugin lifecycle and scheduling against a virtual panel
 */

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use infocube::display::{SchedulerError, SchedulerOptions, SchedulerState};
use infocube::store::{ConfigStore, MemoryStore};
use serde_json::json;

use common::{new_log, quick_options, rig, rig_with, take, Recorder};

fn default_clock() -> SchedulerOptions {
    SchedulerOptions { default_plugin: Some("clock".into()), ..quick_options() }
}

#[test]
fn test_fresh_start_uses_default_plugin() {
    let r = rig(&["clock", "gif", "moon"], MemoryStore::new(json!({})), default_clock());

    assert_eq!(r.scheduler.startup().unwrap(), "clock");
    r.scheduler.tick();

    let status = r.scheduler.status();
    assert_eq!(status.current_plugin.as_deref(), Some("clock"));
    assert!(status.running);
    assert_eq!(status.state, SchedulerState::Active("clock".into()));
    assert_eq!(take(&r.log), vec!["setup:clock", "start:clock"]);
    assert!(r.panel.state().lock().unwrap().present_count >= 2);
}

#[test]
fn test_switch_runs_lifecycle_in_order_and_persists() {
    let r = rig(&["clock", "gif", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    take(&r.log);

    r.scheduler.switch_to("gif").unwrap();

    assert_eq!(take(&r.log), vec!["setup:gif", "stop:clock", "cleanup:clock", "start:gif"]);
    assert_eq!(r.store.get_str("current_state", "current_plugin").as_deref(), Some("gif"));
    assert_eq!(r.scheduler.active_plugin().as_deref(), Some("gif"));
    assert_eq!(r.scheduler.with_plugin("clock", |p| p.is_running()), Some(false));
}

#[test]
fn test_unknown_plugin_changes_nothing() {
    let r = rig(&["clock", "gif", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    r.scheduler.switch_to("gif").unwrap();
    take(&r.log);
    let writes = r.store.write_count();

    let err = r.scheduler.switch_to("nonexistent").unwrap_err();

    assert!(matches!(err, SchedulerError::PluginNotFound(ref n) if n == "nonexistent"));
    assert_eq!(r.scheduler.active_plugin().as_deref(), Some("gif"));
    assert!(r.scheduler.status().running);
    assert_eq!(r.store.write_count(), writes);
    assert!(take(&r.log).is_empty());
}

#[test]
fn test_switch_to_active_plugin_is_noop() {
    let r = rig(&["clock", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    take(&r.log);
    let writes = r.store.write_count();

    r.scheduler.switch_to("clock").unwrap();
    r.scheduler.switch_to("clock").unwrap();

    assert!(take(&r.log).is_empty());
    assert_eq!(r.store.write_count(), writes);
    assert!(r.scheduler.status().running);
}

#[test]
fn test_cycle_settings_filter_and_clamp() {
    let r = rig(&["clock", "gif", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    r.scheduler.switch_to("gif").unwrap();

    let names: Vec<String> = ["clock", "moon", "doesnotexist"].iter().map(|s| s.to_string()).collect();
    let applied = r.scheduler.set_plugin_cycling(true, &names, 5).unwrap();

    assert!(applied.enabled);
    assert_eq!(applied.plugins, vec!["clock", "moon"]);
    assert_eq!(applied.duration, 10);
    assert_eq!(r.store.get_str_list("plugin_cycle", "plugins"), vec!["clock", "moon"]);
    assert_eq!(r.store.get_i64("plugin_cycle", "duration"), Some(10));
    assert_eq!(r.store.get_bool("plugin_cycle", "enabled"), Some(true));
    assert_eq!(r.scheduler.active_plugin().as_deref(), Some("clock"));

    let applied = r.scheduler.set_plugin_cycling(true, &["moon".to_string()], 9999).unwrap();
    assert_eq!(applied.duration, 3600);
    assert_eq!(r.store.get_i64("plugin_cycle", "duration"), Some(3600));
}

#[test]
fn test_failed_setup_keeps_previous_plugin() {
    let log = new_log();
    let plugins = vec![Recorder::boxed("clock", &log), Recorder::failing("broken", &log)];
    let r = rig_with(plugins, log, MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    take(&r.log);

    let err = r.scheduler.switch_to("broken").unwrap_err();

    assert!(matches!(err, SchedulerError::PluginSetupFailure { .. }));
    assert_eq!(take(&r.log), vec!["setup:broken", "cleanup:broken"]);
    let status = r.scheduler.status();
    assert_eq!(status.current_plugin.as_deref(), Some("clock"));
    assert!(status.running);
    assert_eq!(status.state, SchedulerState::Active("clock".into()));
    assert_eq!(r.store.get_str("current_state", "current_plugin").as_deref(), Some("clock"));
}

#[test]
fn test_startup_fallback_chain() {
    // persisted plugin is gone, the default fails, the first loaded plugin wins
    let log = new_log();
    let plugins = vec![
        Recorder::boxed("moon", &log),
        Recorder::failing("clock", &log),
        Recorder::boxed("gif", &log),
    ];
    let store = MemoryStore::new(json!({
        "current_state": { "current_plugin": "weather" },
        "plugins": { "default": "clock" }
    }));
    let r = rig_with(plugins, log, store, quick_options());

    assert_eq!(r.scheduler.startup().unwrap(), "moon");
    assert_eq!(take(&r.log), vec!["setup:clock", "cleanup:clock", "setup:moon", "start:moon"]);
    assert_eq!(r.store.get_str("current_state", "current_plugin").as_deref(), Some("moon"));
}

#[test]
fn test_switch_completes_when_transition_fails() {
    let r = rig(&["clock", "gif", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    take(&r.log);
    r.panel.state().lock().unwrap().simulate_present_failure = true;

    r.scheduler.switch_to("gif").unwrap();

    assert_eq!(take(&r.log), vec!["setup:gif", "stop:clock", "cleanup:clock", "start:gif"]);
    let status = r.scheduler.status();
    assert_eq!(status.current_plugin.as_deref(), Some("gif"));
    assert!(status.running);
    assert_eq!(status.state, SchedulerState::Active("gif".into()));
    assert_eq!(r.store.get_str("current_state", "current_plugin").as_deref(), Some("gif"));

    // the panel recovers on the next frame
    r.panel.state().lock().unwrap().simulate_present_failure = false;
    let before = r.panel.state().lock().unwrap().present_count;
    r.scheduler.tick();
    assert!(r.panel.state().lock().unwrap().present_count > before);
}

fn intro_options() -> SchedulerOptions {
    SchedulerOptions { display_mode: Some("intro".into()), ..default_clock() }
}

#[test]
fn test_finished_plugin_hands_off_to_next_cycle_entry() {
    let log = new_log();
    let plugins = vec![
        Recorder::one_shot("intro", &log),
        Recorder::boxed("clock", &log),
        Recorder::boxed("moon", &log),
    ];
    let store = MemoryStore::new(json!({
        "plugin_cycle": { "enabled": true, "plugins": ["moon", "clock"], "duration": 3600 }
    }));
    let r = rig_with(plugins, log, store, intro_options());
    assert_eq!(r.scheduler.startup().unwrap(), "intro");
    take(&r.log);

    r.scheduler.tick();

    assert_eq!(take(&r.log), vec!["setup:moon", "stop:intro", "cleanup:intro", "start:moon"]);
    assert_eq!(r.scheduler.active_plugin().as_deref(), Some("moon"));
    assert!(r.scheduler.status().running);
}

#[test]
fn test_finished_plugin_hands_off_to_default() {
    let log = new_log();
    let plugins = vec![
        Recorder::one_shot("intro", &log),
        Recorder::boxed("moon", &log),
        Recorder::boxed("clock", &log),
    ];
    let r = rig_with(plugins, log, MemoryStore::new(json!({})), intro_options());
    r.scheduler.startup().unwrap();
    take(&r.log);

    r.scheduler.tick();

    assert_eq!(take(&r.log), vec!["setup:clock", "stop:intro", "cleanup:intro", "start:clock"]);
    assert_eq!(r.scheduler.active_plugin().as_deref(), Some("clock"));
}

#[test]
fn test_finished_plugin_restarts_when_alone() {
    let log = new_log();
    let r = rig_with(vec![Recorder::one_shot("intro", &log)], log, MemoryStore::new(json!({})), intro_options());
    r.scheduler.startup().unwrap();
    take(&r.log);

    r.scheduler.tick();

    assert_eq!(take(&r.log), vec!["setup:intro", "start:intro"]);
    let status = r.scheduler.status();
    assert_eq!(status.current_plugin.as_deref(), Some("intro"));
    assert!(status.running);
    assert_eq!(status.state, SchedulerState::Active("intro".into()));
}

#[test]
fn test_switch_after_shutdown_is_refused() {
    let r = rig(&["clock", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    r.scheduler.shutdown();
    take(&r.log);

    assert!(matches!(r.scheduler.switch_to("moon"), Err(SchedulerError::Stopped)));

    assert!(take(&r.log).is_empty());
    let status = r.scheduler.status();
    assert_eq!(status.state, SchedulerState::Stopped);
    assert!(!status.running);
}

#[test]
fn test_run_restores_default_on_fresh_scheduler() {
    let r = rig(&["clock", "gif", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.tick();
    assert_eq!(r.scheduler.active_plugin(), None);

    let stop = Arc::new(AtomicBool::new(false));
    let handle = {
        let scheduler = Arc::clone(&r.scheduler);
        let stop = Arc::clone(&stop);
        thread::spawn(move || scheduler.run(&stop))
    };
    thread::sleep(Duration::from_millis(20));
    assert_eq!(r.scheduler.active_plugin().as_deref(), Some("clock"));
    assert!(r.scheduler.status().running);
    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap().unwrap();

    assert_eq!(take(&r.log), vec!["setup:clock", "start:clock", "stop:clock", "cleanup:clock"]);
}

#[test]
fn test_run_with_no_plugins_fails() {
    let r = rig_with(Vec::new(), new_log(), MemoryStore::new(json!({})), default_clock());
    let stop = AtomicBool::new(false);

    assert!(matches!(r.scheduler.run(&stop), Err(SchedulerError::NoPlugins)));
    assert_eq!(r.scheduler.active_plugin(), None);
}

#[test]
fn test_startup_with_no_plugins_is_fatal() {
    let r = rig_with(Vec::new(), new_log(), MemoryStore::new(json!({})), default_clock());

    assert!(matches!(r.scheduler.startup(), Err(SchedulerError::NoPlugins)));
    assert_eq!(r.scheduler.active_plugin(), None);
    assert_eq!(r.store.write_count(), 0);
}

#[test]
fn test_brightness_validation() {
    let r = rig(&["clock"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    let writes = r.store.write_count();

    for bad in [0, 101, -5] {
        let err = r.scheduler.set_brightness(bad).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidBrightness(b) if b == bad));
    }
    assert_eq!(r.store.write_count(), writes);
    assert_eq!(r.store.get_i64("matrix", "brightness"), None);

    r.scheduler.set_brightness(50).unwrap();
    assert_eq!(r.store.get_i64("matrix", "brightness"), Some(50));
    assert_eq!(r.panel.state().lock().unwrap().last_brightness, Some(50));
}

#[test]
fn test_concurrent_switches_never_interleave() {
    let r = rig(&["clock", "gif", "moon", "weather"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    take(&r.log);

    let stop = Arc::new(AtomicBool::new(false));
    let ticker = {
        let scheduler = Arc::clone(&r.scheduler);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                scheduler.tick();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let workers: Vec<_> = ["gif", "moon", "weather", "clock"]
        .into_iter()
        .map(|target| {
            let scheduler = Arc::clone(&r.scheduler);
            thread::spawn(move || {
                for _ in 0..5 {
                    scheduler.switch_to(target).unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    ticker.join().unwrap();

    // every switch is setup:X, stop:Y, cleanup:Y, start:X with nothing in between
    let log = take(&r.log);
    assert_eq!(log.len() % 4, 0, "partial switch in {:?}", log);
    let mut active = "clock".to_string();
    for chunk in log.chunks(4) {
        let target = chunk[0].strip_prefix("setup:").expect("switch starts with setup");
        assert_eq!(chunk[1], format!("stop:{}", active));
        assert_eq!(chunk[2], format!("cleanup:{}", active));
        assert_eq!(chunk[3], format!("start:{}", target));
        active = target.to_string();
    }

    let status = r.scheduler.status();
    assert_eq!(status.current_plugin.as_deref(), Some(active.as_str()));
    assert!(status.running);
}

#[test]
fn test_run_loop_exits_and_shuts_down() {
    let r = rig(&["clock", "moon"], MemoryStore::new(json!({})), default_clock());
    r.scheduler.startup().unwrap();
    take(&r.log);

    let stop = Arc::new(AtomicBool::new(false));
    let handle = {
        let scheduler = Arc::clone(&r.scheduler);
        let stop = Arc::clone(&stop);
        thread::spawn(move || scheduler.run(&stop).unwrap())
    };
    thread::sleep(Duration::from_millis(20));
    r.scheduler.switch_to("moon").unwrap();
    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();

    assert_eq!(r.scheduler.status().state, SchedulerState::Stopped);
    assert!(!r.scheduler.status().running);
    let log = take(&r.log);
    assert_eq!(&log[log.len() - 2..], ["stop:moon", "cleanup:moon"]);
}
