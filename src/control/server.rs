/*
 *  control/server.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Control socket listener
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

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time;

use crate::config::ControlConfig;
use crate::control::protocol::{handle_request, Response};
use crate::display::scheduler::DisplayScheduler;

/// Largest accepted request
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// How long in-flight handlers get to finish on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq)]
enum Incoming {
    Request(Vec<u8>),
    Empty,
    TooLarge,
}

pub struct ControlServer {
    listener: TcpListener,
    scheduler: Arc<DisplayScheduler>,
    io_timeout: Duration,
    max_connections: usize,
}

impl ControlServer {
    pub async fn bind(config: &ControlConfig, scheduler: Arc<DisplayScheduler>) -> io::Result<Self> {
        let addr = format!("{}:{}", config.host(), config.port());
        let listener = TcpListener::bind(&addr).await?;
        info!("Control server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            scheduler,
            io_timeout: Duration::from_millis(config.io_timeout_ms()),
            max_connections: config.max_connections().max(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` is notified, then close the socket and give
    /// in-flight handlers a bounded time to finish
    pub async fn serve(self, shutdown: Arc<Notify>) {
        let Self { listener, scheduler, io_timeout, max_connections } = self;
        let conn_limit = Arc::new(Semaphore::new(max_connections));
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    break;
                }
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("Accept error: {}", err);
                            continue;
                        }
                    };

                    let permit = match conn_limit.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("Connection limit reached, rejecting {}", peer);
                            continue;
                        }
                    };

                    let scheduler = Arc::clone(&scheduler);
                    handlers.spawn(async move {
                        let _permit = permit;
                        handle_connection(stream, peer, scheduler, io_timeout).await;
                    });
                }
                Some(done) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(err) = done {
                        error!("Control handler failed: {}", err);
                    }
                }
            }
        }

        drop(listener);
        info!("Control server stopping, {} handler(s) in flight", handlers.len());

        let drained = time::timeout(DRAIN_TIMEOUT, async {
            while handlers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Aborting {} stalled control handler(s)", handlers.len());
            handlers.abort_all();
        }
        info!("Control server stopped");
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    scheduler: Arc<DisplayScheduler>,
    io_timeout: Duration,
) {
    debug!("Control connection from {}", peer);

    let response = match time::timeout(io_timeout, read_request(&mut stream)).await {
        Ok(Ok(Incoming::Request(bytes))) => {
            debug!("Request from {}: {}", peer, String::from_utf8_lossy(&bytes));
            match tokio::task::spawn_blocking(move || handle_request(&bytes, &scheduler)).await {
                Ok(response) => response,
                Err(err) => {
                    error!("Control command panicked: {}", err);
                    Response::error("Internal error")
                }
            }
        }
        Ok(Ok(Incoming::Empty)) => {
            debug!("Empty request from {}, closing", peer);
            return;
        }
        Ok(Ok(Incoming::TooLarge)) => {
            warn!("Oversized request from {}", peer);
            Response::error("Invalid JSON")
        }
        Ok(Err(err)) => {
            warn!("Error reading from {}: {}", peer, err);
            return;
        }
        Err(_) => {
            warn!("Request from {} timed out", peer);
            Response::error("Request timed out")
        }
    };

    let mut payload = match serde_json::to_vec(&response) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to encode response: {}", err);
            return;
        }
    };
    payload.push(b'\n');

    let written = time::timeout(io_timeout, async {
        stream.write_all(&payload).await?;
        stream.shutdown().await
    })
    .await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("Error writing to {}: {}", peer, err),
        Err(_) => warn!("Write to {} timed out", peer),
    }
}

/// Read one request: up to a newline, EOF, or a complete JSON value
async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Incoming> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Ok(Incoming::TooLarge);
        }
        if buf.contains(&b'\n') || is_complete_json(buf.trim_ascii_start()) {
            break;
        }
    }

    let body = buf.trim_ascii_start();
    let line = match body.iter().position(|&b| b == b'\n') {
        Some(end) => &body[..end],
        None => body,
    };
    let line = line.trim_ascii();
    if line.is_empty() {
        Ok(Incoming::Empty)
    } else {
        Ok(Incoming::Request(line.to_vec()))
    }
}

fn is_complete_json(bytes: &[u8]) -> bool {
    !bytes.is_empty() && serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}
