use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant},
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLimitState {
    pub seconds_remaining: u64,
}

/// Server-reported throttle window, counted down locally once per second.
/// Cloning shares the same counter.
#[derive(Clone)]
pub struct ServerLimit {
    state: Arc<watch::Sender<ServerLimitState>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl Default for ServerLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLimit {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerLimitState::default());
        Self {
            state: Arc::new(tx),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.state.borrow().seconds_remaining
    }

    pub fn is_limited(&self) -> bool {
        self.seconds_remaining() > 0
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerLimitState> {
        self.state.subscribe()
    }

    /// Sets the counter and (re)starts the countdown. Any running ticker is
    /// stopped first so two countdowns never overlap.
    pub async fn start_countdown(&self, seconds: u64) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        self.state.send_replace(ServerLimitState {
            seconds_remaining: seconds,
        });
        if seconds == 0 {
            return;
        }
        log_debug!("server limit countdown started at {seconds}s");

        let state = self.state.clone();
        let period = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;

                let mut finished = false;
                state.send_modify(|s| {
                    s.seconds_remaining = s.seconds_remaining.saturating_sub(1);
                    finished = s.seconds_remaining == 0;
                });

                if finished {
                    log_debug!("server limit countdown finished");
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    pub async fn cancel(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        self.state.send_replace(ServerLimitState::default());
    }
}
