/*
 *  plugin/refresh.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Background data refresh decoupled from the render tick
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

use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A polling task that publishes its latest result through a watch channel.
///
/// `render()` reads `latest()` without blocking; the task runs `fetch`
/// immediately and then every `interval` until stopped or dropped.
pub struct BackgroundRefresh<T> {
    rx: watch::Receiver<T>,
    stop_sender: Option<mpsc::Sender<()>>,
    poll_handle: Option<JoinHandle<()>>,
}

impl<T> BackgroundRefresh<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn<F, Fut>(runtime: &Handle, label: &str, initial: T, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = watch::channel(initial);
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let label = label.to_string();

        let poll_handle = runtime.spawn(async move {
            loop {
                let value = fetch().await;
                tx.send_replace(value);
                debug!("{} refresh published", label);

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.recv() => {
                        info!("{} refresh received stop signal. Exiting.", label);
                        break;
                    }
                }
            }
        });

        Self {
            rx,
            stop_sender: Some(stop_tx),
            poll_handle: Some(poll_handle),
        }
    }

    /// Most recent published value (lock-free for the caller)
    pub fn latest(&self) -> T {
        self.rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.poll_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task and abort it if it is mid-fetch
    pub fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
        }
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
    }
}

impl<T> Drop for BackgroundRefresh<T> {
    fn drop(&mut self) {
        self.stop_sender.take();
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_publishes_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut refresh = BackgroundRefresh::spawn(
            &Handle::current(),
            "test",
            0usize,
            Duration::from_millis(10),
            move || {
                let counter = Arc::clone(&counter);
                async move { counter.fetch_add(1, Ordering::SeqCst) + 1 }
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(refresh.latest() >= 2);
        assert!(refresh.is_running());

        refresh.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
        assert!(!refresh.is_running());
    }
}
