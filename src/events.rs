use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

const BUS_CAPACITY: usize = 64;

/// Lifecycle signals shared between the engine and the popup UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PopupEvent {
    Open,
    Close,
    Pin { pinned: bool },
    ForceClose,
}

impl PopupEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PopupEvent::Open => "popup:open",
            PopupEvent::Close => "popup:close",
            PopupEvent::Pin { .. } => "popup:pin",
            PopupEvent::ForceClose => "popup:forceClose",
        }
    }
}

/// Broadcast channel the host UI subscribes to.
#[derive(Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<PopupEvent>,
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PopupEvent> {
        self.tx.subscribe()
    }

    /// Nobody listening is not an error.
    pub fn emit(&self, event: PopupEvent) {
        log_debug!("emit {}", event.name());
        let _ = self.tx.send(event);
    }
}
