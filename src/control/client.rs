/*
 *  control/client.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Control socket client
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

use std::time::Duration;

use log::debug;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::control::protocol::{Command, Response};
use crate::control::server::MAX_REQUEST_BYTES;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("malformed reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed without a reply")]
    EmptyResponse,
}

/// Sends one command per connection to a running display
#[derive(Debug, Clone)]
pub struct ControlClient {
    addr: String,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), timeout: Duration::from_secs(5) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn send(&self, command: &Command) -> Result<Response, ControlError> {
        let request = serde_json::to_vec(&command.to_request())?;
        self.send_raw(&request).await
    }

    /// Send raw request bytes and decode the reply
    pub async fn send_raw(&self, request: &[u8]) -> Result<Response, ControlError> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(request).await?;
            stream.write_all(b"\n").await?;

            let mut reply = Vec::new();
            (&mut stream).take(MAX_REQUEST_BYTES as u64).read_to_end(&mut reply).await?;
            Ok::<_, ControlError>(reply)
        };

        let reply = time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ControlError::Timeout(self.timeout))??;
        debug!("Reply from {}: {}", self.addr, String::from_utf8_lossy(&reply));

        if reply.trim_ascii().is_empty() {
            return Err(ControlError::EmptyResponse);
        }
        Ok(serde_json::from_slice(&reply)?)
    }

    pub async fn set_mode(&self, plugin: &str) -> Result<Response, ControlError> {
        self.send(&Command::SetMode { plugin: plugin.to_string() }).await
    }

    pub async fn set_gif(&self, gif_name: &str) -> Result<Response, ControlError> {
        self.send(&Command::SetGif { gif_name: gif_name.to_string() }).await
    }

    pub async fn status(&self) -> Result<Response, ControlError> {
        self.send(&Command::GetStatus).await
    }

    pub async fn set_brightness(&self, brightness: i64) -> Result<Response, ControlError> {
        self.send(&Command::SetBrightness { brightness }).await
    }

    pub async fn set_plugin_cycle(
        &self,
        enabled: bool,
        plugins: Vec<String>,
        duration: i64,
    ) -> Result<Response, ControlError> {
        self.send(&Command::SetPluginCycle { enabled, plugins, duration }).await
    }
}
