use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Size, Viewport};

/// The browser selection as read on one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSelection {
    pub text: String,
    pub collapsed: bool,
    /// Client rects of the first range, in document order.
    pub rects: Vec<Rect>,
}

impl LiveSelection {
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    pub fn has_text(&self) -> bool {
        !self.trimmed_text().is_empty()
    }
}

/// Surroundings of a selection used to build prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub paragraph: String,
    pub heading: String,
    pub url: String,
}

/// DOM reads the engine depends on. Implemented by the content-script host;
/// any of these may fail and callers degrade instead of propagating.
pub trait PageHost {
    fn live_selection(&self) -> Result<Option<LiveSelection>>;

    fn viewport(&self) -> Viewport;

    /// Last measured size of the popup element.
    fn popup_size(&self) -> Size;

    fn page_context(&self) -> Result<PageContext>;
}

/// Last non-empty selection seen by the visibility controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    pub text: String,
    pub range_rects: Vec<Rect>,
    pub captured_at: DateTime<Utc>,
}

impl SelectionSnapshot {
    /// Returns `None` for whitespace-only selections so an empty selection can
    /// never replace a meaningful one.
    pub fn capture(live: &LiveSelection) -> Option<Self> {
        if !live.has_text() {
            return None;
        }
        Some(Self {
            text: live.trimmed_text().to_string(),
            range_rects: live.rects.clone(),
            captured_at: Utc::now(),
        })
    }
}
