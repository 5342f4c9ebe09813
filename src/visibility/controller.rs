use crate::{
    events::PopupEvent,
    geometry::{place_below, Point, Rect},
    selection::{
        resolver::{Anchor, AnchorSource},
        LiveSelection, PageHost, RectResolver, SelectionSnapshot,
    },
};

use super::{PopupFlags, PopupInput, PopupPhase};

const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_warn};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub phase: PopupPhase,
    pub anchor: Option<Anchor>,
    /// Top-left of the popup when it is shown and anchored.
    pub position: Option<Point>,
    /// Open/close signal, only on the tick where visibility flips.
    pub signal: Option<PopupEvent>,
}

/// Reconciles the live selection against the rendered popup.
pub struct VisibilityController {
    resolver: RectResolver,
    flags: PopupFlags,
    phase: PopupPhase,
    last_text: String,
    snapshot: Option<SelectionSnapshot>,
    popup_margin: f64,
    corner_margin: f64,
}

impl VisibilityController {
    pub fn new(popup_margin: f64, corner_margin: f64) -> Self {
        Self {
            resolver: RectResolver::new(),
            flags: PopupFlags::default(),
            phase: PopupPhase::Hidden,
            last_text: String::new(),
            snapshot: None,
            popup_margin,
            corner_margin,
        }
    }

    pub fn flags(&self) -> PopupFlags {
        self.flags
    }

    pub fn phase(&self) -> PopupPhase {
        self.phase
    }

    pub fn is_shown(&self) -> bool {
        self.phase.is_shown()
    }

    pub fn snapshot(&self) -> Option<&SelectionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn apply(&mut self, input: PopupInput) {
        let next = self.flags.apply(input);
        if next != self.flags {
            log_debug!("visibility flags {:?} -> {:?} on {:?}", self.flags, next, input);
        }
        self.flags = next;
    }

    /// One pass: resolve the anchor, apply pin/force-close rules, position the
    /// popup and report open/close transitions.
    pub fn reconcile(&mut self, host: &dyn PageHost, overlay_blocks: &[Rect]) -> TickOutcome {
        let live = read_selection(host);
        let viewport = host.viewport();
        let text = live
            .as_ref()
            .map(|s| s.trimmed_text().to_string())
            .unwrap_or_default();

        let mut anchor = self
            .resolver
            .resolve_visible(live.as_ref(), overlay_blocks, &viewport);
        if anchor.is_none() && (!text.is_empty() || self.flags.pinned) {
            anchor = Some(self.resolver.corner(&viewport, self.corner_margin));
        }
        let selection_visible = anchor.is_some();

        if text != self.last_text {
            self.apply(PopupInput::SelectionChanged);
            self.last_text = text;
        }

        if let Some(snapshot) = live.as_ref().and_then(SelectionSnapshot::capture) {
            self.snapshot = Some(snapshot);
        }

        let cornered = matches!(anchor, Some(a) if a.source == AnchorSource::Corner);
        let phase = PopupPhase::derive(&self.flags, selection_visible, cornered);

        let position = if phase.is_shown() {
            anchor.map(|a| place_below(&a.rect, host.popup_size(), &viewport, self.popup_margin))
        } else {
            None
        };

        let signal = match (self.phase.is_shown(), phase.is_shown()) {
            (false, true) => Some(PopupEvent::Open),
            (true, false) => {
                self.snapshot = None;
                Some(PopupEvent::Close)
            }
            _ => None,
        };
        if self.phase != phase {
            log_debug!("popup phase {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;

        TickOutcome {
            phase,
            anchor,
            position,
            signal,
        }
    }
}

/// DOM read failures count as "no selection" for this tick.
fn read_selection(host: &dyn PageHost) -> Option<LiveSelection> {
    match host.live_selection() {
        Ok(selection) => selection,
        Err(err) => {
            log_warn!("selection read failed: {err:?}");
            None
        }
    }
}
