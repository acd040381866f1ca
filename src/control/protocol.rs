/*
 *  control/protocol.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Control protocol - one JSON request, one JSON response
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

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::display::cycle::{DEFAULT_CYCLE_SECS, MAX_CYCLE_SECS, MIN_CYCLE_SECS};
use crate::display::scheduler::{BrightnessApplied, DisplayScheduler, SchedulerError, GIF_PLUGIN};
use crate::plugin::gif::is_valid_gif_name;

const DEFAULT_BRIGHTNESS_REQUEST: i64 = 50;

/// A validated control request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetMode { plugin: String },
    SetGif { gif_name: String },
    GetStatus,
    SetBrightness { brightness: i64 },
    SetPluginCycle { enabled: bool, plugins: Vec<String>, duration: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<String>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self { status: Status::Success, message: Some(message.into()), data: None, applied: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: Status::Error, message: Some(message.into()), data: None, applied: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl Command {
    /// Validate a decoded request. The error is the response to send back.
    pub fn parse(request: &Value) -> Result<Command, Response> {
        let Some(fields) = request.as_object() else {
            return Err(Response::error("Invalid JSON"));
        };
        let command = fields.get("command").and_then(Value::as_str).unwrap_or("");

        match command {
            "set_mode" => {
                let plugin = non_empty_str(fields.get("plugin"))
                    .ok_or_else(|| Response::error("No plugin specified"))?;
                Ok(Command::SetMode { plugin })
            }
            "set_gif" => {
                let gif_name = non_empty_str(fields.get("gif_name"))
                    .ok_or_else(|| Response::error("No GIF specified"))?;
                if !is_valid_gif_name(&gif_name) {
                    return Err(Response::error("Invalid GIF name"));
                }
                Ok(Command::SetGif { gif_name })
            }
            "get_status" => Ok(Command::GetStatus),
            "set_brightness" => {
                let brightness = match fields.get("brightness") {
                    None => DEFAULT_BRIGHTNESS_REQUEST,
                    Some(v) => v.as_i64().ok_or_else(|| Response::error("Invalid brightness value"))?,
                };
                if !(1..=100).contains(&brightness) {
                    return Err(Response::error("Invalid brightness value"));
                }
                Ok(Command::SetBrightness { brightness })
            }
            "set_plugin_cycle" => {
                let enabled = match fields.get("enabled") {
                    None => false,
                    Some(v) => v.as_bool().ok_or_else(|| Response::error("Enabled must be a boolean"))?,
                };
                let plugins = match fields.get("plugins") {
                    None => Vec::new(),
                    Some(v) => v
                        .as_array()
                        .ok_or_else(|| Response::error("Plugins must be a list"))?
                        .iter()
                        .filter_map(|p| p.as_str().map(str::to_string))
                        .collect(),
                };
                let duration = match fields.get("duration") {
                    None => Some(DEFAULT_CYCLE_SECS as i64),
                    Some(v) => v.as_i64(),
                }
                .filter(|d| (MIN_CYCLE_SECS as i64..=MAX_CYCLE_SECS as i64).contains(d))
                .ok_or_else(|| Response::error("Duration must be between 10 and 3600 seconds"))?;
                Ok(Command::SetPluginCycle { enabled, plugins, duration })
            }
            other => Err(Response::error(format!("Unknown command: {other}"))),
        }
    }

    /// Wire form of this command
    pub fn to_request(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decode, validate and execute one raw request
pub fn handle_request(bytes: &[u8], scheduler: &DisplayScheduler) -> Response {
    let request: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            debug!("Rejecting malformed request: {}", e);
            return Response::error("Invalid JSON");
        }
    };
    match Command::parse(&request) {
        Ok(command) => dispatch(command, scheduler),
        Err(response) => response,
    }
}

/// Execute a validated command against the scheduler
pub fn dispatch(command: Command, scheduler: &DisplayScheduler) -> Response {
    info!("Control command: {:?}", command);
    match command {
        Command::SetMode { plugin } => match scheduler.switch_to(&plugin) {
            Ok(()) => Response::success(format!("Switched to {plugin}")),
            Err(e) => Response::error(format!("Failed to switch to {plugin}: {e}")),
        },

        Command::SetGif { gif_name } => match scheduler.set_gif(&gif_name) {
            Ok(()) => Response::success(format!("Changed GIF to: {gif_name}")),
            Err(SchedulerError::PluginNotFound(name)) if name == GIF_PLUGIN => {
                Response::error("GIF plugin not available")
            }
            Err(e) => Response::error(format!("Failed to switch to GIF {gif_name}: {e}")),
        },

        Command::GetStatus => {
            let status = scheduler.status();
            let showing_gif = status.current_plugin.as_deref() == Some(GIF_PLUGIN);
            Response {
                status: Status::Success,
                message: None,
                data: Some(json!({
                    "current_plugin": status.current_plugin,
                    "running": status.running,
                    "current_gif": if showing_gif { status.current_gif.as_str() } else { "" },
                    "state": status.state.label(),
                    "plugins": status.plugins,
                    "cycle": {
                        "enabled": status.cycle.enabled,
                        "plugins": status.cycle.plugins,
                        "duration": status.cycle.duration,
                    },
                })),
                applied: None,
            }
        }

        Command::SetBrightness { brightness } => match scheduler.set_brightness(brightness) {
            Ok(applied) => {
                let message = match applied {
                    BrightnessApplied::Immediate => format!("Brightness set to {brightness}%"),
                    BrightnessApplied::Restart => format!("Brightness set to {brightness}% (will apply on restart)"),
                };
                Response { applied: Some(applied.as_str().to_string()), ..Response::success(message) }
            }
            Err(SchedulerError::InvalidBrightness(_)) => Response::error("Invalid brightness value"),
            Err(e) => Response::error(format!("Failed to update brightness in config: {e}")),
        },

        Command::SetPluginCycle { enabled, plugins, duration } => {
            match scheduler.set_plugin_cycling(enabled, &plugins, duration) {
                Ok(stored) => Response::success("Plugin cycling settings updated").with_data(json!({
                    "enabled": stored.enabled,
                    "plugins": stored.plugins,
                    "duration": stored.duration,
                })),
                Err(e) => Response::error(format!("Failed to update plugin cycling: {e}")),
            }
        }
    }
}
