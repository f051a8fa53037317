//! Poll Timer
//!
//! Cancelable periodic tick source feeding the app loop.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::app::AppEvent;

/// Sends `AppEvent::Tick` every period until stopped.
#[derive(Debug, Default)]
pub struct PollTimer {
    handle: Option<JoinHandle<()>>,
}

impl PollTimer {
    /// Stopped timer.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Start ticking; the first tick fires immediately. Restarts if already running.
    pub fn start(&mut self, period: Duration, events: mpsc::UnboundedSender<AppEvent>) {
        self.stop();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Stop ticking. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether ticks are being produced.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
