/*
 *  bin/infocube-ctl.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Command line client for the control socket
 *
 *  Usage:
 *    infocube-ctl status
 *    infocube-ctl mode clock
 *    infocube-ctl gif fire
 *    infocube-ctl brightness 60
 *    infocube-ctl cycle on clock weather moon --duration 45
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use env_logger::Env;

use infocube::config::DEFAULT_CONTROL_PORT;
use infocube::control::ControlClient;

#[derive(Debug, Parser)]
#[command(name = "infocube-ctl", version, about = "Send commands to a running InfoCube display")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(short = 'p', long, default_value_t = DEFAULT_CONTROL_PORT)]
    port: u16,
    /// give up after this many milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    debug: bool,
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Switch to a plugin
    Mode { plugin: String },
    /// Play a GIF by name (without .gif)
    Gif { name: String },
    /// Show the current plugin and cycle settings
    Status,
    /// Set panel brightness, 1-100
    Brightness {
        #[arg(allow_negative_numbers = true)]
        level: i64,
    },
    /// Configure automatic plugin cycling
    Cycle {
        #[arg(value_enum)]
        state: Toggle,
        plugins: Vec<String>,
        /// seconds per plugin, 10-3600
        #[arg(short, long, default_value_t = 30)]
        duration: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(if cli.debug { "debug" } else { "warn" }))
        .format_timestamp_secs()
        .init();

    let client = ControlClient::new(format!("{}:{}", cli.host, cli.port))
        .with_timeout(Duration::from_millis(cli.timeout_ms));

    let response = match cli.action {
        Action::Mode { plugin } => client.set_mode(&plugin).await?,
        Action::Gif { name } => client.set_gif(&name).await?,
        Action::Status => client.status().await?,
        Action::Brightness { level } => client.set_brightness(level).await?,
        Action::Cycle { state, plugins, duration } => {
            client.set_plugin_cycle(matches!(state, Toggle::On), plugins, duration).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        bail!("{}", response.message.unwrap_or_else(|| "request failed".to_string()));
    }
    Ok(())
}
