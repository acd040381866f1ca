/*
 *  main.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
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
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use env_logger::Env;
use log::{error, info, warn};
use serde_json::Value;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;

use infocube::config;
use infocube::control::ControlServer;
use infocube::display::{DisplayScheduler, SchedulerOptions, SurfaceFactory};
use infocube::plugin::{PluginCatalog, PluginContext, PluginRegistry};
use infocube::store::{ConfigStore, JsonFileStore};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

async fn signal_handler() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load().context("loading configuration")?;

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - plugin driven LED matrix display", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let store = Arc::new(JsonFileStore::open(cfg.state_file()));
    info!("State file: {}", store.path().display());

    // a brightness stored by set_brightness wins over the YAML value
    let mut matrix = cfg.matrix();
    if let Some(level) = store.get_i64("matrix", "brightness").filter(|b| (1..=100).contains(b)) {
        matrix.brightness = Some(level as u8);
    }
    let surface = SurfaceFactory::create(&matrix).context("opening matrix panel")?;
    let (width, height) = surface.dimensions();
    info!("Matrix {}x{} at brightness {}", width, height, matrix.brightness());

    let ctx = PluginContext {
        width,
        height,
        runtime: Some(tokio::runtime::Handle::current()),
        resource_dir: cfg.resource_dir(),
        api_keys: store
            .snapshot()
            .get("api_keys")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    };

    let catalog = PluginCatalog::builtin();
    let mut enabled = store.get_str_list("plugins", "enabled");
    if enabled.is_empty() {
        warn!("No enabled plugins in state file, loading all built-ins");
        enabled = catalog.names().into_iter().map(str::to_string).collect();
    }
    let registry = PluginRegistry::load(&enabled, &catalog, store.as_ref(), &ctx);
    if registry.is_empty() {
        bail!("no plugins could be loaded from {:?}", enabled);
    }

    let options = SchedulerOptions {
        display_mode: cfg.display_mode.clone(),
        gif_name: cfg.gif_name.clone(),
        ..SchedulerOptions::from_config(&cfg.scheduler())
    };
    let scheduler = Arc::new(DisplayScheduler::new(registry, surface, store.clone(), options));

    let first = tokio::task::spawn_blocking({
        let scheduler = Arc::clone(&scheduler);
        move || scheduler.startup()
    })
    .await
    .context("startup task failed")?
    .context("no plugin could be activated")?;
    info!("Display started with {}", first);

    let shutdown = Arc::new(Notify::new());
    let control = cfg.control();
    let control_task = if control.enabled() {
        let server = ControlServer::bind(&control, Arc::clone(&scheduler))
            .await
            .with_context(|| format!("binding control socket {}:{}", control.host(), control.port()))?;
        Some(tokio::spawn(server.serve(Arc::clone(&shutdown))))
    } else {
        info!("Control endpoint disabled");
        None
    };

    let stop = Arc::new(AtomicBool::new(false));
    let mut frame_loop = tokio::task::spawn_blocking({
        let scheduler = Arc::clone(&scheduler);
        let stop = Arc::clone(&stop);
        move || scheduler.run(&stop)
    });

    let loop_exited = tokio::select! {
        res = signal_handler() => {
            if let Err(e) = res {
                error!("Signal handling failed: {}", e);
            }
            false
        }
        res = &mut frame_loop => {
            match res {
                Ok(Ok(())) => error!("Frame loop exited unexpectedly"),
                Ok(Err(e)) => error!("Frame loop failed: {}", e),
                Err(e) => error!("Frame loop task failed: {}", e),
            }
            true
        }
    };

    // control endpoint first, then the frame loop and the active plugin
    shutdown.notify_one();
    if let Some(task) = control_task {
        if let Err(e) = task.await {
            warn!("Control server task failed: {}", e);
        }
    }

    stop.store(true, Ordering::Relaxed);
    if loop_exited {
        scheduler.shutdown();
    } else {
        match frame_loop.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Frame loop failed: {}", e),
            Err(e) => error!("Frame loop task failed: {}", e),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
