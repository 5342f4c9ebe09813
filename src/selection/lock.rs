use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockEventKind {
    SelectStart,
    DragStart,
    KeyDown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyChord {
    pub key: String,
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyChord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Shift+navigation keys and select-all extend the page selection.
    pub fn extends_selection(&self) -> bool {
        let navigation = matches!(
            self.key.as_str(),
            "ArrowLeft" | "ArrowRight" | "ArrowUp" | "ArrowDown" | "Home" | "End" | "PageUp" | "PageDown"
        );
        let select_all = (self.ctrl || self.meta) && self.key.eq_ignore_ascii_case("a");
        (self.shift && navigation) || select_all
    }
}

/// A document-level event offered to the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEvent {
    pub kind: LockEventKind,
    pub key: Option<KeyChord>,
    /// Whether the event path includes the popup host.
    pub inside_popup: bool,
}

impl LockEvent {
    pub fn select_start(inside_popup: bool) -> Self {
        Self {
            kind: LockEventKind::SelectStart,
            key: None,
            inside_popup,
        }
    }

    pub fn drag_start(inside_popup: bool) -> Self {
        Self {
            kind: LockEventKind::DragStart,
            key: None,
            inside_popup,
        }
    }

    pub fn key_down(chord: KeyChord, inside_popup: bool) -> Self {
        Self {
            kind: LockEventKind::KeyDown,
            key: Some(chord),
            inside_popup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Allow,
    Prevent,
}

/// Suppresses page selection gestures while a response is on screen.
/// One instance per page; `add`/`remove` are idempotent.
#[derive(Debug, Default)]
pub struct SelectionLock {
    active: bool,
}

impl SelectionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the handlers were newly installed.
    pub fn add(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        log_debug!("selection lock installed");
        true
    }

    /// Returns `true` when installed handlers were removed.
    pub fn remove(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        log_debug!("selection lock removed");
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn filter(&self, event: &LockEvent) -> EventDisposition {
        if !self.active || event.inside_popup {
            return EventDisposition::Allow;
        }

        match event.kind {
            LockEventKind::SelectStart | LockEventKind::DragStart => EventDisposition::Prevent,
            LockEventKind::KeyDown => match &event.key {
                Some(chord) if chord.extends_selection() => EventDisposition::Prevent,
                _ => EventDisposition::Allow,
            },
        }
    }
}
